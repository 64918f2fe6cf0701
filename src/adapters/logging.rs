use tracing::error;

use crate::domain::{StreamContext, TunnelError};
use crate::ports::ErrorSink;

/// Error sink writing one line per error to the process-wide tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorSink;

impl LogErrorSink {
    pub fn new() -> Self {
        Self
    }
}

impl ErrorSink for LogErrorSink {
    fn handle(&self, ctx: &StreamContext, err: &TunnelError) {
        error!(session = %ctx.session_id, stream = %ctx.stream_name, "[ERR] {}", err);
    }
}
