//! Distributed [`Storage`] backend backed by Redis, coordinating claims
//! across a fleet via `SET key value NX EX ttl`.

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use serde::{Deserialize, Serialize};

use crate::error::{IdempotencyError, Result};
use crate::record::{Record, Status};

use super::{ClaimOutcome, Storage};

#[derive(Debug, Serialize, Deserialize)]
struct WireRecord {
    key: String,
    status: String,
    result_hex: Option<String>,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

impl From<&Record> for WireRecord {
    fn from(record: &Record) -> Self {
        Self {
            key: record.key.clone(),
            status: record.status.as_wire_str().to_string(),
            result_hex: record.result.as_ref().map(|bytes| hex::encode(bytes)),
            error_message: record.error_message.clone(),
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

fn wire_to_record(key: &str, wire: WireRecord) -> Result<Record> {
    let status = Status::from_wire_str(&wire.status).ok_or_else(|| IdempotencyError::StorageFailure {
        key: key.to_string(),
        reason: format!("unknown status '{}'", wire.status),
    })?;
    let result = wire
        .result_hex
        .map(|hexstr| hex::decode(hexstr).map_err(|e| IdempotencyError::StorageFailure { key: key.to_string(), reason: e.to_string() }))
        .transpose()?;
    let created_at = chrono::DateTime::parse_from_rfc3339(&wire.created_at)
        .map_err(|e| IdempotencyError::StorageFailure { key: key.to_string(), reason: e.to_string() })?
        .with_timezone(&chrono::Utc);
    let updated_at = chrono::DateTime::parse_from_rfc3339(&wire.updated_at)
        .map_err(|e| IdempotencyError::StorageFailure { key: key.to_string(), reason: e.to_string() })?
        .with_timezone(&chrono::Utc);
    Ok(Record { key: key.to_string(), status, result, error_message: wire.error_message, created_at, updated_at })
}

fn encode(record: &Record, key: &str) -> Result<String> {
    serde_json::to_string(&WireRecord::from(record))
        .map_err(|e| IdempotencyError::SerializationFailure { key: key.to_string(), reason: e.to_string() })
}

fn decode(key: &str, raw: &str) -> Result<Record> {
    let wire: WireRecord = serde_json::from_str(raw)
        .map_err(|e| IdempotencyError::SerializationFailure { key: key.to_string(), reason: e.to_string() })?;
    wire_to_record(key, wire)
}

/// Redis-backed storage, namespacing every key under a fixed prefix so the
/// idempotency keyspace can share a database with other consumers.
pub struct RedisStorage {
    manager: ConnectionManager,
    namespace: String,
}

impl RedisStorage {
    /// Connect to `redis_url` and namespace keys under `namespace`.
    pub async fn connect(redis_url: &str, namespace: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| IdempotencyError::StorageFailure { key: String::new(), reason: e.to_string() })?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| IdempotencyError::StorageFailure { key: String::new(), reason: e.to_string() })?;
        Ok(Self { manager, namespace: namespace.into() })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn load(&self, key: &str) -> Result<Option<Record>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(self.namespaced(key)).await?;
        raw.map(|raw| decode(key, &raw)).transpose()
    }

    async fn claim(&self, key: &str, ttl: Duration) -> Result<ClaimOutcome> {
        let mut conn = self.manager.clone();
        let namespaced = self.namespaced(key);
        let record = Record::claimed(key);
        let encoded = encode(&record, key)?;
        let set: Option<String> = redis::cmd("SET")
            .arg(&namespaced)
            .arg(&encoded)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        if set.is_some() {
            return Ok(ClaimOutcome::Claimed(record));
        }
        let raw: Option<String> = conn.get(&namespaced).await?;
        let raw: String = raw.ok_or_else(|| IdempotencyError::StorageFailure {
            key: key.to_string(),
            reason: "claim lost the race and the winning record vanished".to_string(),
        })?;
        Ok(ClaimOutcome::Existing(decode(key, &raw)?))
    }

    async fn save_result(&self, key: &str, result: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        let base = self.load(key).await?.unwrap_or_else(|| Record::claimed(key));
        let record = base.completed(result);
        let encoded = encode(&record, key)?;
        let _: () = conn.set_ex(self.namespaced(key), encoded, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn save_error(&self, key: &str, message: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        let base = self.load(key).await?.unwrap_or_else(|| Record::claimed(key));
        let record = base.failed(message);
        let encoded = encode(&record, key)?;
        let _: () = conn.set_ex(self.namespaced(key), encoded, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.del(self.namespaced(key)).await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
