//! Volatile OTP cache: a time-expiring key-value service keyed by the
//! normalized recovery email.
//!
//! The cache is injected (`Arc<dyn OtpCache>`) rather than ambient process
//! state: the production implementation rides on Redis with native TTLs,
//! the in-memory one backs the tests. Repeated recovery requests for the
//! same key overwrite the previous entry: last request wins.

use async_trait::async_trait;
use chrono::Utc;
use redis::{Client, aio::ConnectionManager};

use crate::models::OtpEntry;

#[async_trait]
pub trait OtpCache: Send + Sync {
    /// Store (or overwrite) the entry for a recovery key.
    async fn put(&self, key: &str, entry: OtpEntry) -> Result<(), anyhow::Error>;

    /// Fetch the live entry for a key. Expiry is checked lazily: an expired
    /// entry reports `None` exactly like a missing one.
    async fn get(&self, key: &str) -> Result<Option<OtpEntry>, anyhow::Error>;

    /// Drop the entry for a key (consume-on-success). Idempotent.
    async fn remove(&self, key: &str) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct RedisOtpCache {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisOtpCache {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %config.url, "Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        // ConnectionManager reconnects automatically
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }

    fn cache_key(key: &str) -> String {
        format!("otp:{}", key)
    }
}

#[async_trait]
impl OtpCache for RedisOtpCache {
    async fn put(&self, key: &str, entry: OtpEntry) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        let ttl_seconds = (entry.expires_utc - Utc::now()).num_seconds().max(1);
        let payload = serde_json::to_string(&entry)?;

        redis::cmd("SET")
            .arg(Self::cache_key(key))
            .arg(payload)
            .arg("EX")
            .arg(ttl_seconds)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to store OTP entry: {}", e))
    }

    async fn get(&self, key: &str) -> Result<Option<OtpEntry>, anyhow::Error> {
        let mut conn = self.manager.clone();
        let payload: Option<String> = redis::cmd("GET")
            .arg(Self::cache_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read OTP entry: {}", e))?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        let entry: OtpEntry = serde_json::from_str(&payload)?;

        // Redis TTL already bounds the key; the trait contract still
        // requires a lazy check at read.
        if entry.is_expired() {
            return Ok(None);
        }

        Ok(Some(entry))
    }

    async fn remove(&self, key: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(Self::cache_key(key))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to remove OTP entry: {}", e))
    }
}

/// In-memory OTP cache for tests.
#[derive(Default)]
pub struct MemoryOtpCache {
    entries: std::sync::Mutex<std::collections::HashMap<String, OtpEntry>>,
}

impl MemoryOtpCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OtpCache for MemoryOtpCache {
    async fn put(&self, key: &str, entry: OtpEntry) -> Result<(), anyhow::Error> {
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("OTP cache mutex poisoned: {}", e))?
            .insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<OtpEntry>, anyhow::Error> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("OTP cache mutex poisoned: {}", e))?;

        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.clone())),
            None => Ok(None),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), anyhow::Error> {
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("OTP cache mutex poisoned: {}", e))?
            .remove(key);
        Ok(())
    }
}
