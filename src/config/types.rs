use serde::{Deserialize, Serialize};
use voicetrim_media::DEFAULT_SAMPLES_PER_CHUNK;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub trim: TrimConfig,

    #[serde(default)]
    pub writer: WriterConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TrimConfig {
    /// Sample buffer allocated at the start of a trim, in bytes
    #[serde(default = "default_initial_buffer_bytes")]
    pub initial_buffer_bytes: usize,

    /// Largest sample the buffer may grow to hold (default: 16 MiB)
    #[serde(default = "default_max_sample_bytes")]
    pub max_sample_bytes: usize,

    /// fsync the trimmed file before it replaces the original
    #[serde(default = "default_fsync")]
    pub fsync: bool,
}

fn default_initial_buffer_bytes() -> usize {
    64 * 1024
}

fn default_max_sample_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_fsync() -> bool {
    true
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            initial_buffer_bytes: default_initial_buffer_bytes(),
            max_sample_bytes: default_max_sample_bytes(),
            fsync: default_fsync(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WriterConfig {
    /// Samples grouped into each chunk of the output
    #[serde(default = "default_samples_per_chunk")]
    pub samples_per_chunk: u32,
}

fn default_samples_per_chunk() -> u32 {
    DEFAULT_SAMPLES_PER_CHUNK
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            samples_per_chunk: default_samples_per_chunk(),
        }
    }
}
