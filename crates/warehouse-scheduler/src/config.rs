use crate::contracts::UserIdentity;
use std::time::Duration;

/// Configuration surface required of any scheduler deployment.
/// Constructed once at daemon startup and shared (`Arc`) across every
/// coordinator a `ViewManager` creates.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SchedulerConfig {
    /// Retries beyond the first attempt.
    pub max_retries: u32,
    /// How long to wait for a dependency lookup in the `ViewManager`.
    #[serde(with = "humantime_serde")]
    pub dependency_timeout: Duration,
    /// Bounds filesystem request/reply (touch, delete, marker checks).
    #[serde(with = "humantime_serde")]
    pub file_action_timeout: Duration,
    /// Bounds schema service calls.
    #[serde(with = "humantime_serde")]
    pub schema_action_timeout: Duration,
    /// Identity under which filesystem and action calls run.
    pub user_identity: UserIdentity,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            dependency_timeout: Duration::from_secs(5),
            file_action_timeout: Duration::from_secs(30),
            schema_action_timeout: Duration::from_secs(10),
            user_identity: UserIdentity("warehouse-scheduler".to_string()),
        }
    }
}
