//! Stage resolution and the run orchestrator: wires a loaded record set
//! through the conductor into a sink.

pub mod config;
pub mod error;
mod orchestrator;
pub mod serializer;
pub mod sink;
pub mod source;
pub mod timestamper;

pub use config::Configuration;
pub use error::PipelineError;
pub use orchestrator::{Pipeline, RunSummary};
