//! Model and context parameter surfaces.
//!
//! Defaults mirror the native library's own defaults; `validate` rejects
//! degenerate values before they reach the backend.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Seed value the native library treats as "pick one".
pub const DEFAULT_SEED: u32 = u32::MAX;

/// Parameters for loading model weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    /// Number of layers to offload to the GPU (0 = CPU only).
    pub n_gpu_layers: u32,
    /// Index of the primary GPU when offloading.
    pub main_gpu: u32,
    /// Load only the vocabulary, skipping the weights.
    pub vocab_only: bool,
    /// Memory-map the weights file.
    pub use_mmap: bool,
    /// Pin the weights in RAM.
    pub use_mlock: bool,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            n_gpu_layers: 0,
            main_gpu: 0,
            vocab_only: false,
            use_mmap: true,
            use_mlock: false,
        }
    }
}

/// Parameters for creating an inference context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextParams {
    /// RNG seed for probabilistic sampling.
    pub seed: u32,
    /// Context window size in tokens.
    pub n_ctx: u32,
    /// Maximum tokens submitted to a single decode call.
    pub n_batch: u32,
    /// Worker threads for decoding (0 = auto-detect).
    pub n_threads: u32,
    /// RoPE base frequency (0.0 = model default).
    pub rope_freq_base: f32,
    /// RoPE frequency scaling factor (0.0 = model default).
    pub rope_freq_scale: f32,
    /// Use quantized matrix multiplication kernels.
    pub mul_mat_q: bool,
    /// Keep the KV cache in half precision.
    pub f16_kv: bool,
    /// Compute logits for every batch position, not just flagged ones.
    pub logits_all: bool,
    /// Embedding extraction mode; no generation.
    pub embedding: bool,
}

impl Default for ContextParams {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            n_ctx: 2048,
            n_batch: 512,
            n_threads: 0,
            rope_freq_base: 0.0,
            rope_freq_scale: 0.0,
            mul_mat_q: true,
            f16_kv: true,
            logits_all: true,
            embedding: false,
        }
    }
}

impl ContextParams {
    /// Reject parameter combinations the decode loops cannot operate with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.n_ctx == 0 {
            return Err(Error::InvalidArgument("n_ctx must be nonzero".into()));
        }
        if self.n_batch == 0 {
            return Err(Error::InvalidArgument("n_batch must be nonzero".into()));
        }
        if self.rope_freq_scale < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "rope_freq_scale must be non-negative, got {}",
                self.rope_freq_scale
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ContextParams::default().validate().is_ok());
    }

    #[test]
    fn zero_window_rejected() {
        let params = ContextParams { n_ctx: 0, ..Default::default() };
        assert!(matches!(params.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn zero_batch_rejected() {
        let params = ContextParams { n_batch: 0, ..Default::default() };
        assert!(matches!(params.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn negative_rope_scale_rejected() {
        let params = ContextParams { rope_freq_scale: -1.0, ..Default::default() };
        assert!(matches!(params.validate(), Err(Error::InvalidArgument(_))));
    }
}
