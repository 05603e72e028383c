// Model exports
pub mod domain;
pub mod notifications;
pub mod requests;
pub mod responses;

pub use domain::{MatchOutcome, MatchRequest, MatchStatus, UserPreference};
pub use notifications::{MatchNotification, Notification};
pub use requests::SubmitMatchRequest;
pub use responses::{
    AcceptResponse, CancelResponse, ErrorResponse, HealthResponse, MatchStatusResponse,
    SubmitMatchResponse,
};
