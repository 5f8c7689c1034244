use async_trait::async_trait;
use elevate_core::AppResult;
use elevate_domain::Settings;

/// Read-through accessor for lifecycle settings.
///
/// Callers fetch a fresh snapshot at each decision point instead of caching
/// one, so policy changes take effect for requests that are mid-lifecycle.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    /// Returns the latest settings snapshot.
    async fn current(&self) -> AppResult<Settings>;
}
