//! Matchpool - atomic Redis-backed matchmaking pool
//!
//! This library pairs waiting users into two-party sessions based on their
//! declared topic/difficulty preferences. A shared Redis pool plus two
//! server-side atomic scripts let any number of stateless instances
//! cooperate: each match attempt either consumes a compatible pending
//! request or enrolls the new one, never both, and outcomes fan out to all
//! instances over pub/sub.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{is_compatible, MatchError, MatchingOrchestrator, SubmittedRequest, TimeoutManager};
pub use crate::models::{MatchNotification, MatchOutcome, MatchRequest, MatchStatus, Notification, UserPreference};
pub use crate::services::{NotificationPublisher, PoolError, PoolStore, RedisBus, RedisPool};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        // Verify that the library exports work correctly
        let a = UserPreference {
            user_id: "u1".to_string(),
            topics: vec!["graphs".to_string()],
            difficulties: vec!["easy".to_string()],
        };
        let b = UserPreference {
            user_id: "u2".to_string(),
            topics: vec!["graphs".to_string()],
            difficulties: vec!["easy".to_string()],
        };
        assert!(is_compatible(&a, &b));
    }
}
