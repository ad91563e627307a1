//! One client connection

use tps_protocol::{ApduRelay, MessageChannel, TpsMessage};
use tracing::{info, instrument, warn};

use crate::{EndOpStatus, EngineContext, Error, Result, TpsProcessor};

/// Services a single client from BEGIN_OP to END_OP
#[derive(Debug)]
pub struct TpsConnection<C> {
    context: EngineContext,
    relay: ApduRelay<C>,
}

impl<C: MessageChannel> TpsConnection<C> {
    /// Connection over `channel`
    pub const fn new(context: EngineContext, channel: C) -> Self {
        Self {
            context,
            relay: ApduRelay::new(channel),
        }
    }

    /// Give the channel back
    pub fn into_inner(self) -> C {
        self.relay.into_inner()
    }

    /// Read BEGIN_OP, run the operation and answer with END_OP
    ///
    /// END_OP is sent whatever the outcome; the operation's error is still
    /// returned to the caller.
    #[instrument(skip_all)]
    pub fn run(&mut self) -> Result<()> {
        let TpsMessage::BeginOp {
            operation,
            extensions,
        } = self.relay.receive_begin_op()?
        else {
            return Err(Error::Connection("BEGIN_OP expected".into()));
        };
        info!(%operation, ?extensions, "Operation requested");

        let result = TpsProcessor::new(self.context.clone(), &mut self.relay, operation, &extensions)
            .process();

        let status = match &result {
            Ok(()) => EndOpStatus::Success,
            Err(e) => e.status(),
        };
        let code = u8::from(result.is_err());
        if let Err(e) = self.relay.end_op(operation, code, status.code()) {
            warn!(error = %e, "Could not send END_OP");
            result?;
            return Err(e.into());
        }
        info!(%operation, %status, "Operation finished");
        result
    }
}
