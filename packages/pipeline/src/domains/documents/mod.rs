//! Documents domain: document/result/batch entities, the state store, the
//! tokenization rule, and the usage-stats read surface.

pub mod models;
pub mod state_store;
pub mod text;
pub mod usage;

pub use state_store::{PostgresStateStore, StateStore};
