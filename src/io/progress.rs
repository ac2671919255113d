use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Download,
    Extract,
    Separate,
    Encode,
}

/// Observational progress report. Never affects control flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub stage: Stage,
    pub percent: f32,
    pub message: String,
}

impl Progress {
    pub fn new(stage: Stage, percent: f32, message: impl Into<String>) -> Self {
        Self {
            stage,
            percent,
            message: message.into(),
        }
    }
}

/// Lifecycle of one separation job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Idle,
    LoadingModel,
    ExtractingAudio,
    Separating { chunk: usize, total: usize },
    Encoding,
    Done,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Cancelled)
    }
}

pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &Progress);

    fn on_state(&self, _state: &JobState) {}
}

impl<F> ProgressObserver for F
where
    F: Fn(&Progress) + Send + Sync,
{
    fn on_progress(&self, progress: &Progress) {
        self(progress)
    }
}

/// Cooperative cancellation flag, checked at stage boundaries and before
/// each chunk.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
