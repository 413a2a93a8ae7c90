use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;

use crate::error::ReportError;
use crate::models::location::GeoPoint;

/// Source of the vehicle's current position fix.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<GeoPoint, ReportError>;
}

/// Serves whatever position was last pushed into it. With nothing pushed,
/// every read fails and the caller falls back.
#[derive(Debug, Default)]
pub struct StaticLocationProvider {
    position: RwLock<Option<GeoPoint>>,
}

impl StaticLocationProvider {
    pub fn new(position: Option<GeoPoint>) -> Self {
        Self {
            position: RwLock::new(position),
        }
    }

    pub fn set(&self, position: GeoPoint) {
        *self.position.write() = Some(position);
    }
}

#[async_trait]
impl LocationProvider for StaticLocationProvider {
    async fn current_position(&self) -> Result<GeoPoint, ReportError> {
        match *self.position.read() {
            Some(p) if p.is_valid() => Ok(p),
            Some(p) => Err(ReportError::Location(format!("invalid fix {:?}", p))),
            None => Err(ReportError::Location("no fix available".to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub point: GeoPoint,
    pub is_fallback: bool,
}

/// One bounded position read. Any failure or timeout yields `fallback`.
pub async fn locate(provider: &dyn LocationProvider, timeout: Duration, fallback: GeoPoint) -> Fix {
    match tokio::time::timeout(timeout, provider.current_position()).await {
        Ok(Ok(point)) => Fix {
            point,
            is_fallback: false,
        },
        Ok(Err(e)) => {
            warn!("Position read failed, using fallback: {}", e);
            Fix {
                point: fallback,
                is_fallback: true,
            }
        }
        Err(_) => {
            warn!("Position read timed out after {:?}, using fallback", timeout);
            Fix {
                point: fallback,
                is_fallback: true,
            }
        }
    }
}

pub struct Locator {
    provider: Arc<dyn LocationProvider>,
    timeout: Duration,
    fallback: GeoPoint,
    failures: AtomicU32,
}

impl Locator {
    pub fn new(provider: Arc<dyn LocationProvider>, timeout: Duration, fallback: GeoPoint) -> Self {
        Self {
            provider,
            timeout,
            fallback,
            failures: AtomicU32::new(0),
        }
    }

    pub async fn locate(&self) -> Fix {
        let fix = locate(self.provider.as_ref(), self.timeout, self.fallback).await;
        if fix.is_fallback {
            self.failures.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.store(0, Ordering::Relaxed);
        }
        fix
    }

    /// Fallbacks served in a row since the last real fix.
    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::location::FALLBACK_LOCATION;

    struct Stalled;

    #[async_trait]
    impl LocationProvider for Stalled {
        async fn current_position(&self) -> Result<GeoPoint, ReportError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(GeoPoint::new(0.0, 0.0))
        }
    }

    #[tokio::test]
    async fn timeout_falls_back() {
        let fix = locate(&Stalled, Duration::from_millis(20), FALLBACK_LOCATION).await;
        assert!(fix.is_fallback);
        assert_eq!(fix.point, GeoPoint::new(12.9716, 77.5946));
    }

    #[tokio::test]
    async fn failures_are_counted_until_a_real_fix() {
        let provider = Arc::new(StaticLocationProvider::new(None));
        let locator = Locator::new(provider.clone(), Duration::from_secs(1), FALLBACK_LOCATION);

        assert!(locator.locate().await.is_fallback);
        assert!(locator.locate().await.is_fallback);
        assert_eq!(locator.consecutive_failures(), 2);

        provider.set(GeoPoint::new(12.93, 77.62));
        let fix = locator.locate().await;
        assert!(!fix.is_fallback);
        assert_eq!(fix.point, GeoPoint::new(12.93, 77.62));
        assert_eq!(locator.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn invalid_fix_is_rejected() {
        let provider = StaticLocationProvider::new(Some(GeoPoint::new(123.0, 77.6)));
        assert!(provider.current_position().await.is_err());
    }
}
