// Kernel - infrastructure with dependency injection
//
// Infrastructure only: collaborator traits, their default implementations,
// the service host, and the task queue machinery. Business logic belongs
// to the domains and the worker.

pub mod blob;
pub mod detector;
pub mod extraction;
pub mod service_host;
pub mod tasks;
pub mod test_dependencies;
pub mod traits;

pub use blob::FsBlobStorage;
pub use detector::DetectorClient;
pub use extraction::PlainTextExtractor;
pub use service_host::{Service, ServiceHost};
pub use traits::*;
