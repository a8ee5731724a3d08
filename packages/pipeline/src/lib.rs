//! Assessment pipeline core.
//!
//! Teacher-uploaded documents flow through a durable task queue into an
//! assessment worker that extracts text, enforces per-teacher monthly
//! quotas, calls the AI-detection endpoint, and persists document/result
//! state; a batch coordinator derives batch rollups from document states.

pub mod config;
pub mod domains;
pub mod error;
pub mod kernel;

pub use config::{Config, PlanLimits};
pub use error::{FailureClass, PipelineError};
