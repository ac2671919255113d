//! # vocal-split-core
//!
//! Separates a stereo mix into an instrumental estimate (from a pretrained
//! MDX-Net style ONNX model driven through a 6144-point STFT) and a vocal
//! residual, with chunked processing for long inputs, staged progress and
//! cooperative cancellation.

mod error;
mod types;

pub mod core {
    pub mod audio;
    pub mod chunk;
    pub mod dsp;
    pub mod engine;
    pub mod fft;
    pub mod splitter;
    pub mod tensor;
}

pub mod model {
    pub mod model_manager;
    pub mod registry;
}

pub mod io {
    pub mod cache;
    pub mod crypto;
    pub mod net;
    pub mod paths;
    pub mod progress;
}

// Public API
pub use crate::core::audio::{decode_to_stereo, encode_wav_stereo, read_audio, write_wav};
pub use crate::core::engine::{InferenceSession, OrtFactory, SessionFactory};
pub use crate::core::splitter::{split_file, Separator};
pub use crate::core::tensor::TensorFrame;
pub use crate::error::{Result, StemError};
pub use crate::io::cache::{BlobCache, DiskCache};
pub use crate::io::progress::{CancelToken, JobState, Progress, ProgressObserver, Stage};
pub use crate::model::model_manager::ModelGateway;
pub use crate::model::registry::{list_models, resolve_model};
pub use crate::types::{
    ModelSpec, Outcome, SeparatedStems, SeparatorConfig, SplitOptions, SplitResult, StemWavs,
    StereoSignal, SAMPLE_RATE,
};

/// Fetch (or reuse the cached copy of) a registered model and build its
/// inference session, so later splits start immediately.
pub fn prepare_model(model_name: &str, observer: &dyn ProgressObserver) -> Result<ModelGateway> {
    let spec = resolve_model(model_name)?;
    let gateway = ModelGateway::with_defaults(spec)?;
    gateway.load(observer)?;
    Ok(gateway)
}
