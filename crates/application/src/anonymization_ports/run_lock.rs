use async_trait::async_trait;
use scrubline_core::AppResult;

/// Lease held while one anonymization run owns an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymizationRunLease {
    /// Coordination scope key.
    pub scope_key: String,
    /// Lease token used for safe release.
    pub token: String,
    /// Lease holder identity.
    pub holder_id: String,
}

/// Distributed coordination port serializing runs per entity type.
#[async_trait]
pub trait AnonymizationRunLock: Send + Sync {
    /// Attempts to acquire the lease for one scope; `None` when another holder owns it.
    async fn try_acquire(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<AnonymizationRunLease>>;

    /// Releases a lease using token compare-and-delete semantics.
    async fn release(&self, lease: &AnonymizationRunLease) -> AppResult<()>;
}
