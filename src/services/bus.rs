use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use thiserror::Error;

use crate::core::MatchingOrchestrator;
use crate::models::{MatchNotification, Notification};
use crate::services::pool::PoolStore;

/// Channel announcing that an atomic match paired two requests
pub const MATCH_CHANNEL: &str = "match-notifications";
/// Channel announcing that a request was withdrawn (cancel, expiry, void)
pub const CANCEL_CHANNEL: &str = "cancel-notifications";

/// Errors that can occur on the notification bus
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Encoding error: {0}")]
    EncodingError(#[from] serde_json::Error),
}

/// Publish side of the notification bus.
///
/// One publish per state change; every subscribed instance, including the
/// publisher itself, learns the outcome through the same channel.
pub trait NotificationPublisher: Send + Sync + 'static {
    fn publish_match(
        &self,
        notification: &MatchNotification,
    ) -> impl Future<Output = Result<(), BusError>> + Send;

    fn publish_cancel(&self, request_id: &str)
        -> impl Future<Output = Result<(), BusError>> + Send;
}

// Match payloads are double-encoded: the record is serialized to JSON, and
// that string is serialized again as a JSON string literal. This is the
// transport's default string marshalling and is preserved for wire
// compatibility; consumers unwrap the outer literal before parsing the
// record. Cancel payloads carry a bare string, so the string-literal layer
// is the only one.

pub fn encode_match(notification: &MatchNotification) -> Result<String, BusError> {
    let inner = serde_json::to_string(notification)?;
    Ok(serde_json::to_string(&inner)?)
}

pub fn decode_match(body: &str) -> Result<MatchNotification, BusError> {
    let inner: String = serde_json::from_str(body)?;
    Ok(serde_json::from_str(&inner)?)
}

pub fn encode_cancel(request_id: &str) -> Result<String, BusError> {
    Ok(serde_json::to_string(request_id)?)
}

pub fn decode_cancel(body: &str) -> Result<String, BusError> {
    Ok(serde_json::from_str(body)?)
}

/// Decode one raw bus message into a tagged notification.
///
/// Returns `Ok(None)` for channels this engine does not own.
pub fn decode_message(channel: &str, body: &str) -> Result<Option<Notification>, BusError> {
    match channel {
        MATCH_CHANNEL => Ok(Some(Notification::Match(decode_match(body)?))),
        CANCEL_CHANNEL => Ok(Some(Notification::Cancel(decode_cancel(body)?))),
        _ => Ok(None),
    }
}

/// Redis pub/sub publisher
#[derive(Clone)]
pub struct RedisBus {
    conn: ConnectionManager,
}

impl RedisBus {
    pub async fn new(redis_url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub fn with_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<(), BusError> {
        let mut conn = self.conn.clone();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        tracing::debug!("Published to {} ({} subscribers)", channel, receivers);
        Ok(())
    }
}

impl NotificationPublisher for RedisBus {
    async fn publish_match(&self, notification: &MatchNotification) -> Result<(), BusError> {
        self.publish(MATCH_CHANNEL, encode_match(notification)?).await
    }

    async fn publish_cancel(&self, request_id: &str) -> Result<(), BusError> {
        self.publish(CANCEL_CHANNEL, encode_cancel(request_id)?).await
    }
}

/// Subscriber loop: decode inbound messages and feed them to the
/// orchestrator.
///
/// Runs until the pub/sub connection closes. Malformed payloads are logged
/// and dropped; processing continues with the next message. Messages on a
/// single channel are handled in arrival order because this loop is the
/// only consumer on this instance.
pub async fn run_listener<P, B>(
    client: redis::Client,
    orchestrator: Arc<MatchingOrchestrator<P, B>>,
) -> Result<(), BusError>
where
    P: PoolStore,
    B: NotificationPublisher,
{
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(MATCH_CHANNEL).await?;
    pubsub.subscribe(CANCEL_CHANNEL).await?;

    tracing::info!("Subscribed to {} and {}", MATCH_CHANNEL, CANCEL_CHANNEL);

    let mut stream = pubsub.on_message();
    while let Some(message) = stream.next().await {
        let channel = message.get_channel_name().to_string();
        let body: String = match message.get_payload() {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Dropping non-UTF8 message on {}: {}", channel, e);
                continue;
            }
        };

        match decode_message(&channel, &body) {
            Ok(Some(notification)) => orchestrator.handle_notification(notification),
            Ok(None) => tracing::debug!("Ignoring message on unknown channel {}", channel),
            Err(e) => tracing::warn!("Dropping malformed message on {}: {}", channel, e),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserPreference;

    fn sample_notification() -> MatchNotification {
        MatchNotification {
            user1_preference: UserPreference {
                user_id: "u1".to_string(),
                topics: vec!["graphs".to_string()],
                difficulties: vec!["medium".to_string()],
            },
            user2_preference: UserPreference {
                user_id: "u2".to_string(),
                topics: vec!["graphs".to_string(), "trees".to_string()],
                difficulties: vec!["medium".to_string()],
            },
            request_id_1: "r1".to_string(),
            request_id_2: "r2".to_string(),
        }
    }

    #[test]
    fn test_match_payload_is_double_encoded() {
        let encoded = encode_match(&sample_notification()).unwrap();

        // Outer layer is a JSON string literal, not an object
        assert!(encoded.starts_with('"'));
        let inner: String = serde_json::from_str(&encoded).unwrap();
        assert!(inner.starts_with('{'));
    }

    #[test]
    fn test_match_double_decode_round_trip() {
        let original = sample_notification();
        let decoded = decode_match(&encode_match(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_cancel_round_trip() {
        let encoded = encode_cancel("r42").unwrap();
        assert_eq!(encoded, r#""r42""#);
        assert_eq!(decode_cancel(&encoded).unwrap(), "r42");
    }

    #[test]
    fn test_single_encoded_match_is_rejected() {
        // Missing the outer string-literal wrapper
        let inner = serde_json::to_string(&sample_notification()).unwrap();
        assert!(decode_match(&inner).is_err());
    }

    #[test]
    fn test_decode_message_dispatch() {
        let body = encode_cancel("r1").unwrap();
        match decode_message(CANCEL_CHANNEL, &body).unwrap() {
            Some(Notification::Cancel(id)) => assert_eq!(id, "r1"),
            other => panic!("unexpected: {:?}", other),
        }

        let body = encode_match(&sample_notification()).unwrap();
        assert!(matches!(
            decode_message(MATCH_CHANNEL, &body).unwrap(),
            Some(Notification::Match(_))
        ));

        // Unknown channels are ignored, not errors
        assert!(decode_message("presence-notifications", "whatever")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_malformed_payload_is_error() {
        assert!(decode_message(MATCH_CHANNEL, "not json").is_err());
        assert!(decode_message(CANCEL_CHANNEL, "{\"not\":\"a string\"}").is_err());
    }
}
