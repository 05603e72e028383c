use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::domain::UserPreference;

/// Request to enter the matchmaking pool
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitMatchRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: String,
    #[validate(length(min = 1))]
    #[serde(default)]
    pub topics: Vec<String>,
    #[validate(length(min = 1))]
    #[serde(default)]
    pub difficulties: Vec<String>,
}

impl SubmitMatchRequest {
    pub fn into_preference(self) -> UserPreference {
        UserPreference {
            user_id: self.user_id,
            topics: self.topics,
            difficulties: self.difficulties,
        }
    }
}
