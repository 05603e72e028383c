use serde::{Deserialize, Serialize};

use crate::models::domain::UserPreference;

/// Broadcast when an atomic match pairs two requests.
///
/// Carries both parties' request ids and preference payloads so that any
/// subscribed instance can advance its local records without a pool read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchNotification {
    #[serde(rename = "user1Preference")]
    pub user1_preference: UserPreference,
    #[serde(rename = "user2Preference")]
    pub user2_preference: UserPreference,
    #[serde(rename = "requestId1")]
    pub request_id_1: String,
    #[serde(rename = "requestId2")]
    pub request_id_2: String,
}

/// A decoded bus message, tagged by kind.
///
/// Decoding happens once at the bus boundary; everything downstream
/// dispatches by exhaustive `match` rather than channel-name comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Match(MatchNotification),
    Cancel(String),
}
