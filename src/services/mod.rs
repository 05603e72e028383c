// Service exports
pub mod bus;
pub mod pool;

pub use bus::{run_listener, BusError, NotificationPublisher, RedisBus, CANCEL_CHANNEL, MATCH_CHANNEL};
pub use pool::{PoolError, PoolStore, RedisPool, MATCH_POOL_KEY, USER_PREF_KEY_PREFIX};
