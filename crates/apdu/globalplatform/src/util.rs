//! Common utilities for GlobalPlatform operations

pub mod tlv {
    use bytes::Bytes;
    use iso7816_tlv::simple::Tlv;

    /// Parse all simple TLVs from the input data
    pub fn parse_tlvs(data: &Bytes) -> Vec<Tlv> {
        Tlv::parse_all(data)
    }

    /// Find the first TLV value with the given tag
    ///
    /// Parsing stops at the first malformed element.
    pub fn find_tlv_value(data: Bytes, tag: u8) -> Option<Bytes> {
        let mut current = data.as_ref();

        while !current.is_empty() {
            let (parsed, remaining) = Tlv::parse(current);
            let tlv = parsed.ok()?;
            let tlv_tag: u8 = tlv.tag().into();
            if tlv_tag == tag {
                return Some(Bytes::copy_from_slice(tlv.value()));
            }
            current = remaining;
        }

        None
    }

    /// Extract all TLV values with the given tag
    pub fn find_all_tlv_values(data: Bytes, tag: u8) -> Vec<Bytes> {
        Tlv::parse_all(&data)
            .into_iter()
            .filter(|tlv| {
                let tlv_tag: u8 = tlv.tag().into();
                tlv_tag == tag
            })
            .map(|tlv| Bytes::copy_from_slice(tlv.value()))
            .collect()
    }

    /// Encode a length-prefixed value (one byte length)
    pub fn length_value(value: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(value.len() + 1);
        out.push(value.len() as u8);
        out.extend_from_slice(value);
        out
    }

    /// Encode a tag, a one byte length and the value
    pub fn tag_length_value(tag: u8, value: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(value.len() + 2);
        out.push(tag);
        out.extend(length_value(value));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use hex_literal::hex;

    #[test]
    fn test_find_tlv_value() {
        let data = Bytes::from(hex!("4F07A000000003000084074143434F554E54").to_vec());

        let aid = tlv::find_tlv_value(data.clone(), 0x4F);
        assert_eq!(aid, Some(Bytes::from(hex!("A0000000030000").to_vec())));

        let label = tlv::find_tlv_value(data.clone(), 0x84);
        assert_eq!(label.as_deref(), Some(&b"ACCOUNT"[..]));

        assert_eq!(tlv::find_tlv_value(data, 0x50), None);
    }

    #[test]
    fn test_find_all_key_information_entries() {
        let data = Bytes::from(hex!("C00401FF8810C00402FF8810").to_vec());
        assert_eq!(tlv::parse_tlvs(&data).len(), 2);
        let entries = tlv::find_all_tlv_values(data, 0xC0);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].as_ref(), &hex!("02FF8810"));
    }

    #[test]
    fn test_length_prefixed_encodings() {
        assert_eq!(tlv::length_value(&hex!("A00000")), hex!("03A00000"));
        assert_eq!(tlv::length_value(&[]), hex!("00"));
        assert_eq!(tlv::tag_length_value(0x4F, &hex!("0102")), hex!("4F020102"));
    }
}
