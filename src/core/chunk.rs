//! Bounded, overlapping windows over long signals and their linear
//! crossfade merge.
//!
//! ```text
//! signal:  [==========================================]
//! chunk 0: [==============]
//! chunk 1:             [==============]
//! chunk 2:                         [==============]
//!                      ^^^ overlap, linear crossfade
//! ```

use serde::{Deserialize, Serialize};

use crate::{core::fft::FFT_SIZE, types::SAMPLE_RATE};

const WEIGHT_FLOOR: f32 = 1e-8;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub chunk_samples: usize,
    pub overlap_samples: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self::from_seconds(30.0, 2.0)
    }
}

impl ChunkConfig {
    pub fn from_seconds(chunk_secs: f32, overlap_secs: f32) -> Self {
        Self {
            chunk_samples: (chunk_secs * SAMPLE_RATE as f32) as usize,
            overlap_samples: (overlap_secs * SAMPLE_RATE as f32) as usize,
        }
    }

    /// Distance between consecutive chunk starts.
    pub fn step(&self) -> usize {
        self.chunk_samples.saturating_sub(self.overlap_samples).max(1)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    /// Sample offset of the chunk's first sample in the full signal.
    pub offset: usize,
    pub samples: Vec<f32>,
}

pub fn split_into_chunks(signal: &[f32], config: &ChunkConfig) -> Vec<Chunk> {
    if signal.len() <= config.chunk_samples {
        return vec![Chunk {
            offset: 0,
            samples: signal.to_vec(),
        }];
    }

    let mut chunks = Vec::new();
    let mut pos = 0;
    while pos < signal.len() {
        let end = (pos + config.chunk_samples).min(signal.len());
        let mut samples = signal[pos..end].to_vec();
        if samples.len() < FFT_SIZE {
            samples.resize(FFT_SIZE, 0.0);
        }
        chunks.push(Chunk {
            offset: pos,
            samples,
        });

        if end >= signal.len() {
            break;
        }
        pos += config.step();
    }
    chunks
}

/// Weighted overlap-add of per-chunk results into a `total_len` signal.
pub fn merge_chunks(chunks: &[Chunk], total_len: usize, overlap: usize) -> Vec<f32> {
    if let [only] = chunks {
        let mut out = only.samples.clone();
        out.truncate(total_len);
        return out;
    }

    let mut out = vec![0.0f32; total_len];
    let mut weight = vec![0.0f32; total_len];
    let last = chunks.len().saturating_sub(1);

    for (c, chunk) in chunks.iter().enumerate() {
        if chunk.offset >= total_len {
            continue;
        }
        let len = chunk.samples.len().min(total_len - chunk.offset);
        let fade_out_from = len.saturating_sub(overlap);

        for (i, &x) in chunk.samples[..len].iter().enumerate() {
            let mut w = 1.0f32;
            if c > 0 && i < overlap {
                w = i as f32 / overlap as f32;
            }
            if c < last && i >= fade_out_from {
                w = (len - i) as f32 / overlap as f32;
            }
            out[chunk.offset + i] += x * w;
            weight[chunk.offset + i] += w;
        }
    }

    for (sample, &w) in out.iter_mut().zip(&weight) {
        if w > WEIGHT_FLOOR {
            *sample /= w;
        }
    }
    out
}
