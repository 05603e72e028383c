use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declared matchmaking preferences for one user.
///
/// The engine treats `topics` and `difficulties` as opaque compatibility
/// payload; the only interpretation happens inside the atomic match script
/// (and its Rust mirror in `core::compat`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreference {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub difficulties: Vec<String>,
}

/// A single submission to the matchmaking pool.
///
/// `request_id` is generated per submission, so repeated submissions by the
/// same user are distinguishable. Serialized form is the pool-entry wire
/// format: `{"requestId": ..., "userPreference": ..., "enqueuedAt": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRequest {
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(rename = "userPreference")]
    pub preference: UserPreference,
    #[serde(rename = "enqueuedAt", default = "Utc::now")]
    pub enqueued_at: DateTime<Utc>,
}

impl MatchRequest {
    /// Create a request for a preference with a fresh v4 request id.
    pub fn new(preference: UserPreference) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            preference,
            enqueued_at: Utc::now(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.preference.user_id
    }
}

/// Result of one atomic match attempt against the pool.
///
/// Exactly one of the two outcomes happened: `matched` is `Some` and the
/// counterpart was removed from the pool, or `matched` is `None` and the
/// submitted request was inserted. `replaced_request_id` reports a stale
/// entry for the same user that the script deleted before either outcome.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub matched: Option<MatchRequest>,
    pub replaced_request_id: Option<String>,
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        self.matched.is_some()
    }
}

/// Lifecycle state of a match request.
///
/// `Pooled` and `Matched` are transient; the other four are terminal and a
/// request reaches exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Pooled,
    Matched,
    Accepted,
    Voided,
    Expired,
    Cancelled,
}

impl MatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MatchStatus::Accepted
                | MatchStatus::Voided
                | MatchStatus::Expired
                | MatchStatus::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_entry_wire_field_names() {
        let request = MatchRequest::new(UserPreference {
            user_id: "u1".to_string(),
            topics: vec!["graphs".to_string()],
            difficulties: vec!["easy".to_string()],
        });

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("requestId").is_some());
        assert!(json.get("userPreference").is_some());
        assert_eq!(json["userPreference"]["userId"], "u1");
    }

    #[test]
    fn test_deserialize_without_enqueued_at() {
        // Entries written by other producers may omit the timestamp
        let json = r#"{"requestId":"r1","userPreference":{"userId":"u1","topics":[],"difficulties":[]}}"#;
        let request: MatchRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.request_id, "r1");
        assert_eq!(request.user_id(), "u1");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!MatchStatus::Pooled.is_terminal());
        assert!(!MatchStatus::Matched.is_terminal());
        assert!(MatchStatus::Accepted.is_terminal());
        assert!(MatchStatus::Voided.is_terminal());
        assert!(MatchStatus::Expired.is_terminal());
        assert!(MatchStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_request_ids_unique_per_submission() {
        let pref = UserPreference {
            user_id: "u1".to_string(),
            topics: vec![],
            difficulties: vec![],
        };
        let a = MatchRequest::new(pref.clone());
        let b = MatchRequest::new(pref);
        assert_ne!(a.request_id, b.request_id);
    }
}
