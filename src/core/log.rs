// User-facing log channel injected into scan-plan construction.

pub trait LogChannel {
    fn log_basic(&self, message: &str);
}

/// Forwards log lines to the `tracing` subscriber installed by the host.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLog;

impl LogChannel for TracingLog {
    fn log_basic(&self, message: &str) {
        tracing::info!(target: "hbtable", "{message}");
    }
}
