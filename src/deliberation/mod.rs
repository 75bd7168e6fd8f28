// src/deliberation/mod.rs

pub mod barrier;
pub mod capability;
pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod context;
pub mod debate;
pub mod error;
pub mod event;
pub mod graph;
pub mod judge;
pub mod memory;
pub mod pipeline;
pub mod roles;
pub mod state;
pub mod tool_protocol;
pub mod tool_protocols;
pub mod trader;

// Export the entry points so callers can write deliberation::Pipeline instead of
// deliberation::pipeline::Pipeline.
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use pipeline::{Decisions, Pipeline, PipelineBuilder, PipelineRun};
