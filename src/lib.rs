//! Voicetrim - Lossless trimming of recorded audio
//!
//! This library crate exposes the trim engine for the CLI and for integration
//! testing. Container parsing and writing live in `voicetrim-media`.

pub mod config;
pub mod error;
pub mod probe;
pub mod trim;

pub use error::{Error, ErrorKind, Result, TrimStage};
pub use trim::{
    trim_async, ProgressSender, TimeRange, TrimOptions, TrimPlan, TrimReport, TrimRequest, Trimmer,
};
