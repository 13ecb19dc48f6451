use crate::domain::{PipelineStage, ScalingError, ScalingResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared abort flag polled between outer iterations only.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns a cancelled error attributed to `stage` when an abort was requested.
    pub fn check(&self, stage: PipelineStage) -> ScalingResult<()> {
        if self.is_cancelled() {
            return Err(ScalingError::cancelled(stage));
        }
        Ok(())
    }
}
