//! Redis-backed distributed lock serializing anonymization runs per entity type.

use async_trait::async_trait;
use redis::Script;
use redis::aio::MultiplexedConnection;
use scrubline_application::{AnonymizationRunLease, AnonymizationRunLock};
use scrubline_core::{AppError, AppResult};
use tracing::{debug, warn};

const RELEASE_RUN_LOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

/// Redis implementation of the anonymization run lock.
///
/// Each entity type maps to one key holding the current holder's token. The key is
/// written together with its expiry, so a crashed holder never leaves a lock behind.
#[derive(Clone)]
pub struct RedisAnonymizationRunLock {
    client: redis::Client,
    key_prefix: String,
}

impl RedisAnonymizationRunLock {
    /// Creates one lock adapter.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn lock_key(&self, scope_key: &str) -> String {
        format!("{}:{scope_key}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

fn validate_lock_request(scope_key: &str, holder_id: &str, lease_seconds: u32) -> AppResult<()> {
    if scope_key.trim().is_empty() {
        return Err(AppError::Validation(
            "anonymization run lock scope must not be empty".to_owned(),
        ));
    }

    if holder_id.trim().is_empty() {
        return Err(AppError::Validation(
            "anonymization run lock holder must not be empty".to_owned(),
        ));
    }

    if lease_seconds == 0 {
        return Err(AppError::Validation(
            "anonymization run lock lease must be at least one second".to_owned(),
        ));
    }

    Ok(())
}

#[async_trait]
impl AnonymizationRunLock for RedisAnonymizationRunLock {
    async fn try_acquire(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<AnonymizationRunLease>> {
        validate_lock_request(scope_key, holder_id, lease_seconds)?;

        let key = self.lock_key(scope_key);
        let token = format!("{holder_id}:{}", uuid::Uuid::new_v4());
        let mut connection = self.connection().await?;

        // SET NX EX answers OK when written and nil when another holder owns the key.
        let written: Option<String> = redis::cmd("SET")
            .arg(key.as_str())
            .arg(token.as_str())
            .arg("NX")
            .arg("EX")
            .arg(lease_seconds)
            .query_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to acquire anonymization run lock for '{scope_key}': {error}"
                ))
            })?;

        if written.is_none() {
            debug!(scope_key, holder_id, "anonymization run lock is held elsewhere");
            return Ok(None);
        }

        Ok(Some(AnonymizationRunLease {
            scope_key: scope_key.to_owned(),
            token,
            holder_id: holder_id.to_owned(),
        }))
    }

    async fn release(&self, lease: &AnonymizationRunLease) -> AppResult<()> {
        let mut connection = self.connection().await?;

        let deleted: i32 = Script::new(RELEASE_RUN_LOCK_SCRIPT)
            .key(self.lock_key(lease.scope_key.as_str()))
            .arg(lease.token.as_str())
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to release anonymization run lock for '{}': {error}",
                    lease.scope_key
                ))
            })?;

        if deleted == 0 {
            warn!(
                scope_key = %lease.scope_key,
                holder_id = %lease.holder_id,
                "anonymization run lock expired before release"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use redis::AsyncCommands;
    use scrubline_application::AnonymizationRunLock;
    use scrubline_core::AppError;
    use uuid::Uuid;

    use super::RedisAnonymizationRunLock;

    fn offline_lock() -> RedisAnonymizationRunLock {
        let client =
            redis::Client::open("redis://127.0.0.1:1").unwrap_or_else(|_| unreachable!());
        RedisAnonymizationRunLock::new(client, "scrubline:test")
    }

    fn live_lock() -> Option<RedisAnonymizationRunLock> {
        let redis_url = std::env::var("REDIS_URL").ok()?;
        let client = match redis::Client::open(redis_url.as_str()) {
            Ok(client) => client,
            Err(error) => panic!("invalid REDIS_URL in test: {error}"),
        };
        Some(RedisAnonymizationRunLock::new(client, "scrubline:test"))
    }

    #[tokio::test]
    async fn rejects_invalid_requests_before_connecting() {
        let lock = offline_lock();

        let blank_scope = lock.try_acquire(" ", "worker-a", 30).await;
        assert!(matches!(blank_scope, Err(AppError::Validation(_))));

        let blank_holder = lock.try_acquire("anonymize:customer", "", 30).await;
        assert!(matches!(blank_holder, Err(AppError::Validation(_))));

        let no_lease = lock.try_acquire("anonymize:customer", "worker-a", 0).await;
        assert!(matches!(no_lease, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn acquired_locks_always_carry_an_expiry() {
        let Some(lock) = live_lock() else {
            return;
        };
        let scope_key = format!("anonymize:customer_{}", Uuid::new_v4().simple());

        let lease = lock
            .try_acquire(scope_key.as_str(), "worker-a", 30)
            .await
            .unwrap_or_else(|_| unreachable!())
            .unwrap_or_else(|| unreachable!());

        let mut connection = lock
            .connection()
            .await
            .unwrap_or_else(|_| unreachable!());
        let ttl: i64 = connection
            .ttl(lock.lock_key(scope_key.as_str()))
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!((1..=30).contains(&ttl));

        assert!(lock.release(&lease).await.is_ok());
    }

    #[tokio::test]
    async fn second_holder_waits_until_release() {
        let Some(lock) = live_lock() else {
            return;
        };
        let scope_key = format!("anonymize:customer_{}", Uuid::new_v4().simple());

        let first = lock.try_acquire(scope_key.as_str(), "worker-a", 30).await;
        let first = first
            .unwrap_or_else(|_| unreachable!())
            .unwrap_or_else(|| unreachable!());

        let contended = lock.try_acquire(scope_key.as_str(), "worker-b", 30).await;
        assert!(matches!(contended, Ok(None)));

        assert!(lock.release(&first).await.is_ok());

        let second = lock.try_acquire(scope_key.as_str(), "worker-b", 30).await;
        assert!(matches!(second, Ok(Some(ref lease)) if lease.holder_id == "worker-b"));
        if let Ok(Some(lease)) = second {
            assert!(lock.release(&lease).await.is_ok());
        }
    }
}
