//! Signal Sentry Library
//!
//! Multi-stage screening pipeline for memecoin trading signals with a
//! self-tuning adaptation loop.

pub mod adaptive;
pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod replay;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use filter::{Action, Signal};
pub use pipeline::Pipeline;
