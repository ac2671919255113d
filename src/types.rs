use serde::{Deserialize, Serialize};

use crate::core::chunk::ChunkConfig;

pub const SAMPLE_RATE: u32 = 44_100;

/// Planar stereo PCM at [`SAMPLE_RATE`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StereoSignal {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl StereoSignal {
    pub fn new(left: Vec<f32>, right: Vec<f32>) -> Self {
        debug_assert_eq!(left.len(), right.len());
        Self { left, right }
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.len() as f64 / SAMPLE_RATE as f64
    }
}

/// Where to fetch a pretrained separation model from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Fixed identifier, also used as the persistent cache key.
    pub name: String,
    /// Tried in order; the first successful download wins.
    pub mirrors: Vec<String>,
    #[serde(default)]
    pub sha256: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SeparatorConfig {
    #[serde(default)]
    pub chunk: ChunkConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SplitOptions {
    pub output_dir: String,
    pub model_name: String,
    pub chunk_seconds: f32,
    pub overlap_seconds: f32,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            output_dir: ".".into(),
            model_name: "UVR-MDX-NET-Inst_HQ_2".into(),
            chunk_seconds: 30.0,
            overlap_seconds: 2.0,
        }
    }
}

impl SplitOptions {
    pub fn separator_config(&self) -> SeparatorConfig {
        SeparatorConfig {
            chunk: ChunkConfig::from_seconds(self.chunk_seconds, self.overlap_seconds),
        }
    }
}

/// Float estimates produced by one separation job.
#[derive(Clone, Debug)]
pub struct SeparatedStems {
    pub vocals: StereoSignal,
    pub instrumental: StereoSignal,
}

/// Encoded 16-bit stereo WAV blobs, ready to hand to a muxer.
#[derive(Clone, Debug)]
pub struct StemWavs {
    pub vocals: Vec<u8>,
    pub instrumental: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct SplitResult {
    pub vocals_path: String,
    pub instrumental_path: String,
}

/// Terminal result of a job that did not fail.
#[derive(Clone, Debug)]
pub enum Outcome<T> {
    Done(T),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn done(self) -> Option<T> {
        match self {
            Outcome::Done(v) => Some(v),
            Outcome::Cancelled => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Done(v) => Outcome::Done(f(v)),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }
}
