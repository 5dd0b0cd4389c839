mod broadcaster;
mod normalizer;
mod polling_scheduler;
mod roster_resolver;
mod webhook_ingestor;
mod webhook_service;

pub use broadcaster::*;
pub use normalizer::*;
pub use polling_scheduler::*;
pub use roster_resolver::*;
pub use webhook_ingestor::*;
pub use webhook_service::*;
