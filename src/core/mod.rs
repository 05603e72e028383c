// Core engine exports
pub mod compat;
pub mod orchestrator;
pub mod timeout;

pub use compat::is_compatible;
pub use orchestrator::{MatchError, MatchingOrchestrator, SubmittedRequest};
pub use timeout::TimeoutManager;
