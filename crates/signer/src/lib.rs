pub mod config;
pub mod digest;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod format;
pub mod invoker;
pub mod server;
pub mod signing;

pub use config::{KeyConfig, ServerConfig};
pub use digest::{DigestAlgorithm, DigestDescriptor};
pub use dispatch::{Dispatcher, SigningRequest, SigningResponse};
pub use engine::{Invocation, LocalEngine, ProcessEngine, SigningEngine};
pub use error::SigningError;
pub use format::ArtifactFormat;
pub use invoker::SubprocessOutcome;
pub use server::{AppState, router, run};
