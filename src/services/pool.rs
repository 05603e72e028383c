use std::future::Future;

use redis::aio::ConnectionManager;
use redis::Script;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{MatchOutcome, MatchRequest};

/// Sorted set of pending user ids, scored by enqueue time (oldest first)
pub const MATCH_POOL_KEY: &str = "matchmaking:pool";
/// Prefix for the side map holding the serialized request per user
pub const USER_PREF_KEY_PREFIX: &str = "userpref:";

/// Errors that can occur against the pool store
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// The two atomic pool operations.
///
/// These are the only code paths allowed to mutate pool state. Both must be
/// indivisible across all instances: no caller may observe the scan and the
/// mutation as separate steps. A transport failure surfaces as `Err`, never
/// as a "no match" outcome.
pub trait PoolStore: Send + Sync + 'static {
    /// Atomically find and remove one compatible pending request, or insert
    /// this request into the pool if none is compatible.
    fn find_or_enqueue(
        &self,
        request: &MatchRequest,
    ) -> impl Future<Output = Result<MatchOutcome, PoolError>> + Send;

    /// Atomically remove a user's pending request from both pool views,
    /// but only while it still holds the given request id. A resubmission
    /// replaces the entry under the same user id, and a stale remove (a
    /// late expiry, say) must not evict the replacement. Idempotent;
    /// returns whether anything was removed.
    fn remove(
        &self,
        user_id: &str,
        request_id: &str,
    ) -> impl Future<Output = Result<bool, PoolError>> + Send;

    /// Liveness probe against the store.
    fn ping(&self) -> impl Future<Output = Result<(), PoolError>> + Send;
}

// Scans candidates oldest-first; the first entry whose topics AND
// difficulties both intersect the requester's is consumed. A stale entry
// for the same user is replaced, and its request id reported so the caller
// can cancel it. The reply is assembled by string concatenation so the
// matched entry passes through byte-for-byte.
const MATCH_SCRIPT: &str = r#"
local pool = KEYS[1]
local req = cjson.decode(ARGV[1])
local prefix = ARGV[2]
local user_id = req['userPreference']['userId']

local old_deleted = 'false'
local old_id = 'null'
local old_json = redis.call('GET', prefix .. user_id)
if old_json then
  old_id = cjson.encode(cjson.decode(old_json)['requestId'])
  redis.call('ZREM', pool, user_id)
  redis.call('DEL', prefix .. user_id)
  old_deleted = 'true'
end

local function intersects(a, b)
  for i = 1, #a do
    for j = 1, #b do
      if a[i] == b[j] then return true end
    end
  end
  return false
end

local topics = req['userPreference']['topics']
local difficulties = req['userPreference']['difficulties']

local candidates = redis.call('ZRANGE', pool, 0, -1)
for i = 1, #candidates do
  local cand_id = candidates[i]
  local cand_json = redis.call('GET', prefix .. cand_id)
  if cand_json then
    local cand_pref = cjson.decode(cand_json)['userPreference']
    if intersects(topics, cand_pref['topics'])
        and intersects(difficulties, cand_pref['difficulties']) then
      redis.call('ZREM', pool, cand_id)
      redis.call('DEL', prefix .. cand_id)
      return '{"oldRequestDeleted":' .. old_deleted
          .. ',"oldRequestId":' .. old_id
          .. ',"matched":' .. cand_json .. '}'
    end
  end
end

local now = redis.call('TIME')
local score = tonumber(now[1]) * 1000 + math.floor(tonumber(now[2]) / 1000)
redis.call('ZADD', pool, score, user_id)
redis.call('SET', prefix .. user_id, ARGV[1])
return '{"oldRequestDeleted":' .. old_deleted
    .. ',"oldRequestId":' .. old_id
    .. ',"matched":null}'
"#;

// Guarded by the request id: the entry is only removed while it still
// belongs to the request asking for the removal.
const REMOVE_SCRIPT: &str = r#"
local pool = KEYS[1]
local user_id = ARGV[1]
local request_id = ARGV[2]
local prefix = ARGV[3]
local entry = redis.call('GET', prefix .. user_id)
if not entry then return 0 end
if cjson.decode(entry)['requestId'] ~= request_id then return 0 end
redis.call('ZREM', pool, user_id)
redis.call('DEL', prefix .. user_id)
return 1
"#;

/// Raw reply of the match script
#[derive(Debug, Deserialize)]
struct MatchScriptReply {
    #[serde(rename = "oldRequestDeleted", default)]
    old_request_deleted: bool,
    #[serde(rename = "oldRequestId", default)]
    old_request_id: Option<String>,
    #[serde(rename = "matched", default)]
    matched: Option<MatchRequest>,
}

impl MatchScriptReply {
    fn into_outcome(self) -> MatchOutcome {
        MatchOutcome {
            matched: self.matched,
            replaced_request_id: if self.old_request_deleted {
                self.old_request_id
            } else {
                None
            },
        }
    }
}

/// Redis-backed matchmaking pool.
///
/// All mutation goes through two server-side Lua scripts, which gives the
/// linearizable read-modify-write semantics the engine depends on without
/// any in-process lock.
pub struct RedisPool {
    conn: ConnectionManager,
    match_script: Script,
    remove_script: Script,
}

impl RedisPool {
    /// Connect to Redis and prepare the atomic scripts
    pub async fn new(redis_url: &str) -> Result<Self, PoolError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::with_connection(conn))
    }

    pub fn with_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            match_script: Script::new(MATCH_SCRIPT),
            remove_script: Script::new(REMOVE_SCRIPT),
        }
    }

    /// Side-map key for a user's pending request
    pub fn preference_key(user_id: &str) -> String {
        format!("{}{}", USER_PREF_KEY_PREFIX, user_id)
    }
}

impl PoolStore for RedisPool {
    async fn find_or_enqueue(&self, request: &MatchRequest) -> Result<MatchOutcome, PoolError> {
        let payload = serde_json::to_string(request)?;

        let mut conn = self.conn.clone();
        let reply: String = self
            .match_script
            .key(MATCH_POOL_KEY)
            .arg(payload)
            .arg(USER_PREF_KEY_PREFIX)
            .invoke_async(&mut conn)
            .await?;

        tracing::debug!("Match script reply: {}", reply);

        let parsed: MatchScriptReply = serde_json::from_str(&reply)?;
        Ok(parsed.into_outcome())
    }

    async fn remove(&self, user_id: &str, request_id: &str) -> Result<bool, PoolError> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .remove_script
            .key(MATCH_POOL_KEY)
            .arg(user_id)
            .arg(request_id)
            .arg(USER_PREF_KEY_PREFIX)
            .invoke_async(&mut conn)
            .await?;

        Ok(removed > 0)
    }

    async fn ping(&self) -> Result<(), PoolError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}
