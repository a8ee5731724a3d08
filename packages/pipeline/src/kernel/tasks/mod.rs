//! Task infrastructure: the durable queue and the services that drain it.
//!
//! - [`Task`] - queue row model with the atomic claim statement
//! - [`PostgresTaskStore`] - database-backed queue with dead-lettering
//! - [`AssessmentWorker`] - long-running consumer driving tasks end-to-end
//! - [`BatchCoordinator`] - periodic batch rollup reconciler
//!
//! ```text
//! upload path ──enqueue──► tasks
//!                               │ claim (lease, attempts += 1)
//!                               ▼
//!                        AssessmentWorker ──complete──► (deleted)
//!                               │   └── defer ──► RETRYING (backoff)
//!                               └── attempts > max ──► dead letter
//! ```

pub mod coordinator;
pub mod store;
pub mod task;
pub mod worker;

pub use coordinator::{derive_batch_status, BatchCoordinator};
pub use store::{backoff_delay, PostgresTaskStore, TaskStore};
pub use task::{Task, TaskStatus};
pub use worker::{map_detection, AssessmentWorker, WorkerConfig};
