//! Load files for applet upgrades
//!
//! The provisioning applet ships either as an `ijc` file, which already holds
//! linked load file data, or as a CAP archive whose components are joined in
//! the standard order. Both end up inside a `C4` load file data block that is
//! sent in numbered LOAD blocks.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;
use zip::ZipArchive;

use crate::{Error, Result, constants::tags};

/// CAP components in load order
const INTERNAL_FILES: &[&str] = &[
    "Header",
    "Directory",
    "Import",
    "Applet",
    "Class",
    "Method",
    "StaticField",
    "Export",
    "ConstantPool",
    "RefLocation",
    "Descriptor",
];

/// LOAD numbers blocks with a single byte
const MAX_BLOCKS: usize = 256;

/// Load file data ready to be sent to a card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFile {
    /// Size of the load file before wrapping
    code_size: usize,
    /// `C4` wrapped load file data block
    data: Bytes,
}

impl LoadFile {
    /// Wrap already linked load file data (`ijc`)
    pub fn from_ijc(contents: &[u8]) -> Self {
        Self::wrap(contents)
    }

    /// Read a CAP archive and join its components
    pub fn from_cap<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut zip = ZipArchive::new(reader).map_err(|_| Error::CapFile("invalid ZIP file"))?;
        let names: Vec<String> = zip.file_names().map(str::to_owned).collect();

        let mut contents = BytesMut::new();
        for component in INTERNAL_FILES {
            let suffix = format!("/{component}.cap");
            let Some(name) = names.iter().find(|name| name.ends_with(&suffix)) else {
                continue;
            };
            let mut file = zip
                .by_name(name)
                .map_err(|_| Error::CapFile("unreadable CAP component"))?;
            let mut component_data = Vec::new();
            file.read_to_end(&mut component_data)?;
            debug!(component, size = component_data.len(), "Read CAP component");
            contents.put_slice(&component_data);
        }

        if contents.is_empty() {
            return Err(Error::CapFile("no CAP components found"));
        }
        Ok(Self::wrap(&contents))
    }

    /// Read a load file from disk, choosing the format by extension
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let is_cap = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("cap"));
        if is_cap {
            Self::from_cap(File::open(path)?)
        } else {
            Ok(Self::from_ijc(&std::fs::read(path)?))
        }
    }

    fn wrap(contents: &[u8]) -> Self {
        let length = encode_length(contents.len());
        let mut data = BytesMut::with_capacity(1 + length.len() + contents.len());
        data.put_u8(tags::LOAD_FILE_DATA_BLOCK);
        data.put_slice(&length);
        data.put_slice(contents);
        Self {
            code_size: contents.len(),
            data: data.freeze(),
        }
    }

    /// Size of the load file before wrapping, announced in INSTALL [for load]
    pub const fn code_size(&self) -> usize {
        self.code_size
    }

    /// The wrapped load file data block
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Split into LOAD blocks of at most `block_size` bytes
    pub fn blocks(&self, block_size: usize) -> Result<LoadCommandStream> {
        if block_size == 0 {
            return Err(Error::InvalidFormat("load block size must not be zero"));
        }
        let count = self.data.len().div_ceil(block_size);
        if count > MAX_BLOCKS {
            return Err(Error::CapFile("load file needs more than 256 blocks"));
        }
        Ok(LoadCommandStream {
            data: self.data.clone(),
            block_size,
            position: 0,
            current_block: 0,
            blocks_count: count,
        })
    }
}

/// Encode a length value in BER form
fn encode_length(length: usize) -> Vec<u8> {
    match length {
        0..0x80 => vec![length as u8],
        0x80..0x100 => vec![0x81, length as u8],
        0x100..0x10000 => vec![0x82, (length >> 8) as u8, length as u8],
        _ => vec![0x83, (length >> 16) as u8, (length >> 8) as u8, length as u8],
    }
}

/// One LOAD block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBlock {
    /// Block number sent as P2
    pub number: u8,
    /// Whether this is the last block
    pub last: bool,
    /// Block contents
    pub data: Bytes,
}

/// Iterator over the LOAD blocks of a load file
#[derive(Debug)]
pub struct LoadCommandStream {
    data: Bytes,
    block_size: usize,
    position: usize,
    current_block: usize,
    blocks_count: usize,
}

impl LoadCommandStream {
    /// Total number of blocks
    pub const fn blocks_count(&self) -> usize {
        self.blocks_count
    }

    /// Index of the next block
    pub const fn current_block(&self) -> usize {
        self.current_block
    }
}

impl Iterator for LoadCommandStream {
    type Item = LoadBlock;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.data.len() {
            return None;
        }
        let remaining = self.data.len() - self.position;
        let size = remaining.min(self.block_size);
        let block = LoadBlock {
            number: self.current_block as u8,
            last: remaining <= self.block_size,
            data: self.data.slice(self.position..self.position + size),
        };
        self.position += size;
        self.current_block += 1;
        Some(block)
    }
}
