//! Shared data-access helpers for the engines.

use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, Result};

/// Default bound applied to every store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct StoreSettings {
    /// Upper bound for a single store operation
    pub timeout: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

/// Runs a store operation under the configured timeout.
///
/// A timeout surfaces as `AppError::Transient`; any other failure is
/// wrapped with `context` as `AppError::Store`.
pub(crate) async fn bounded<T, F>(timeout: Duration, context: &'static str, op: F) -> Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, op).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(AppError::Store(e.context(context))),
        Err(_) => Err(AppError::Transient(format!(
            "{context} timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}
