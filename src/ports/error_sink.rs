use crate::domain::{StreamContext, TunnelError};

/// Receives errors that ended an exchange, for diagnostic purposes.
/// Usually this means logging the error.
pub trait ErrorSink: Send + Sync {
    fn handle(&self, ctx: &StreamContext, err: &TunnelError);
}

impl<F> ErrorSink for F
where
    F: Fn(&StreamContext, &TunnelError) + Send + Sync,
{
    fn handle(&self, ctx: &StreamContext, err: &TunnelError) {
        self(ctx, err)
    }
}
