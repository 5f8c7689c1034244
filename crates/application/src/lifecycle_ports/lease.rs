use async_trait::async_trait;
use elevate_core::AppResult;

/// One distributed worker lease claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerLease {
    /// Coordination scope key.
    pub scope_key: String,
    /// Lease token used for safe release.
    pub token: String,
    /// Lease holder identity.
    pub holder_id: String,
}

/// Distributed coordination port for exclusive change-feed polling.
#[async_trait]
pub trait WorkerLeaseCoordinator: Send + Sync {
    /// Attempts to acquire one lease for the given scope.
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<WorkerLease>>;

    /// Releases one lease using token compare-and-delete semantics.
    async fn release_lease(&self, lease: &WorkerLease) -> AppResult<()>;

    /// Renews one existing lease and returns false when token ownership changed.
    async fn renew_lease(&self, lease: &WorkerLease, lease_seconds: u32) -> AppResult<bool>;
}
