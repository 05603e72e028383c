use serde::{Deserialize, Serialize};

use crate::models::domain::MatchStatus;

/// Response for submit endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitMatchResponse {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub status: MatchStatus,
}

/// Response for status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStatusResponse {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub status: MatchStatus,
    #[serde(rename = "counterpartRequestId", skip_serializing_if = "Option::is_none")]
    pub counterpart_request_id: Option<String>,
}

/// Response for cancel endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// Response for accept endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptResponse {
    pub accepted: bool,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
