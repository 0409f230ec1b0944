//! Configuration for a conversation turn.
//!
//! One [`TurnConfig`] is constructed at startup and passed by value to the
//! [`Agent`](super::Agent); the loop never reads ambient state. Builder
//! methods cover the common overrides:
//!
//! ```
//! use charla::agent::TurnConfig;
//!
//! let config = TurnConfig::new("llama3.2", "You are a helpful assistant.")
//!     .with_temperature(0.2)
//!     .with_num_ctx(16384)
//!     .with_max_tool_iterations(4);
//! # assert_eq!(config.max_tool_iterations, 4);
//! ```

use crate::ChatOptions;
use crate::context::CompressionConfig;

/// Per-turn parameters for the agent loop.
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Model name passed to the endpoint.
    pub model: String,
    /// System prompt for fresh conversations.
    pub system_prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Context window size in tokens.
    pub num_ctx: u32,
    /// Maximum model iterations per turn. The sole backpressure against a
    /// model that keeps requesting tools.
    pub max_tool_iterations: u32,
    /// Number of trailing messages retained by a purge.
    pub keep_count: usize,
    /// History length above which a purge triggers.
    pub max_count: usize,
    /// Summarization-based compression settings.
    pub compression: CompressionConfig,
}

impl TurnConfig {
    pub fn new(model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            system_prompt: system_prompt.into(),
            temperature: 0.0,
            num_ctx: 8192,
            max_tool_iterations: 6,
            keep_count: 10,
            max_count: 40,
            compression: CompressionConfig::new(&model),
            model,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_num_ctx(mut self, num_ctx: u32) -> Self {
        self.num_ctx = num_ctx;
        self
    }

    pub fn with_max_tool_iterations(mut self, max: u32) -> Self {
        self.max_tool_iterations = max;
        self
    }

    /// Set the purge thresholds: keep the last `keep_count` messages once
    /// the history grows past `max_count`.
    pub fn with_purge_thresholds(mut self, keep_count: usize, max_count: usize) -> Self {
        self.keep_count = keep_count;
        self.max_count = max_count;
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    /// Sampling options for the main model calls of this turn.
    pub fn options(&self) -> ChatOptions {
        ChatOptions {
            temperature: self.temperature,
            num_ctx: self.num_ctx,
        }
    }
}
