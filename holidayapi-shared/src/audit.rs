/// Audit trail service
///
/// Writes are synchronous with the operation that triggers them. A failed
/// write through [`AuditTrail::record`] is logged at error level and
/// swallowed, so auditing can never fail the operation it describes.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use holidayapi_shared::audit::AuditTrail;
/// use holidayapi_shared::models::audit::{
///     AuditAction, AuditFilter, AuditResource, InMemoryAuditRepository, NewAuditRecord,
/// };
///
/// # async fn example() {
/// let trail = AuditTrail::new(Arc::new(InMemoryAuditRepository::new()));
///
/// trail
///     .record(NewAuditRecord::new(AuditAction::Login, AuditResource::Auth, true).username("alice"))
///     .await;
///
/// let page = trail.query(AuditFilter::default()).await.unwrap();
/// assert_eq!(page.total, 1);
/// assert_eq!(page.per_page, 50);
/// # }
/// ```

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::models::audit::{AuditFilter, AuditPage, AuditRecord, AuditRepository, NewAuditRecord};

/// Page size when none is requested
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Largest page a caller may request
pub const MAX_PAGE_SIZE: i64 = 100;

/// Retention when none is configured
pub const DEFAULT_RETENTION_DAYS: i64 = 90;

/// Longest retention [`AuditTrail::cleanup`] accepts
pub const MAX_RETENTION_DAYS: i64 = 365 * 1000;

/// Append-only audit log over an [`AuditRepository`]
#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn AuditRepository>,
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail").finish_non_exhaustive()
    }
}

fn normalize_limit(limit: i64) -> i64 {
    if limit <= 0 {
        DEFAULT_PAGE_SIZE
    } else {
        limit.min(MAX_PAGE_SIZE)
    }
}

impl AuditTrail {
    pub fn new(store: Arc<dyn AuditRepository>) -> Self {
        Self { store }
    }

    /// Writes a record, logging instead of returning any failure
    pub async fn record(&self, record: NewAuditRecord) {
        let action = record.action;
        let username = record.username.clone();

        if let Err(e) = self.store.insert(record).await {
            tracing::error!(
                error = %e,
                action = %action,
                username = %username,
                "Failed to write audit record"
            );
        }
    }

    /// Writes a record and returns the stored form
    pub async fn log_action(&self, record: NewAuditRecord) -> AuthResult<AuditRecord> {
        self.store.insert(record).await
    }

    /// Filtered, paginated records, newest first
    ///
    /// `limit` defaults to 50 and is capped at 100; a negative offset is
    /// treated as 0.
    pub async fn query(&self, mut filter: AuditFilter) -> AuthResult<AuditPage> {
        filter.limit = normalize_limit(filter.limit);
        filter.offset = filter.offset.max(0);

        let (data, total) = self.store.query(&filter).await?;

        Ok(AuditPage {
            data,
            total,
            page: filter.offset / filter.limit + 1,
            per_page: filter.limit,
            total_pages: (total + filter.limit - 1) / filter.limit,
        })
    }

    /// Records about one user, newest first
    pub async fn user_records(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AuthResult<Vec<AuditRecord>> {
        let filter = AuditFilter {
            user_id: Some(user_id),
            limit,
            offset,
            ..Default::default()
        };

        Ok(self.query(filter).await?.data)
    }

    /// Deletes records older than `days_to_keep` days
    ///
    /// A non-positive value falls back to 90 days.
    ///
    /// # Errors
    ///
    /// `AuthError::ValidationFailed` if `days_to_keep` exceeds
    /// [`MAX_RETENTION_DAYS`].
    pub async fn cleanup(&self, days_to_keep: i64) -> AuthResult<u64> {
        let days = if days_to_keep <= 0 {
            DEFAULT_RETENTION_DAYS
        } else {
            days_to_keep
        };

        let cutoff = Some(days)
            .filter(|days| *days <= MAX_RETENTION_DAYS)
            .and_then(Duration::try_days)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .ok_or_else(|| {
                AuthError::ValidationFailed(format!(
                    "days_to_keep must be at most {}",
                    MAX_RETENTION_DAYS
                ))
            })?;
        let deleted = self.store.delete_older_than(cutoff).await?;

        tracing::info!(deleted, days_to_keep = days, "Audit retention cleanup completed");
        Ok(deleted)
    }

    /// Runs [`cleanup`](Self::cleanup) every `interval` until `shutdown` fires
    pub fn spawn_retention_sweep(
        &self,
        interval: StdDuration,
        days_to_keep: i64,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let trail = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Audit retention sweep stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = trail.cleanup(days_to_keep).await {
                            tracing::error!(error = %e, "Audit retention cleanup failed");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audit::{AuditAction, AuditResource, InMemoryAuditRepository};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};

    fn login(success: bool) -> NewAuditRecord {
        let action = if success { AuditAction::Login } else { AuditAction::LoginFailed };
        NewAuditRecord::new(action, AuditResource::Auth, success)
    }

    struct FailingStore;

    #[async_trait]
    impl AuditRepository for FailingStore {
        async fn insert(&self, _record: NewAuditRecord) -> AuthResult<AuditRecord> {
            Err(AuthError::Internal("disk full".to_string()))
        }

        async fn query(&self, _filter: &AuditFilter) -> AuthResult<(Vec<AuditRecord>, i64)> {
            Err(AuthError::Internal("disk full".to_string()))
        }

        async fn delete_older_than(&self, _cutoff: DateTime<Utc>) -> AuthResult<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_record_swallows_store_failure() {
        let trail = AuditTrail::new(Arc::new(FailingStore));

        trail.record(login(true)).await;
        assert!(trail.log_action(login(true)).await.is_err());
    }

    #[tokio::test]
    async fn test_pagination_math() {
        let store = Arc::new(InMemoryAuditRepository::new());
        let trail = AuditTrail::new(store.clone());

        for _ in 0..7 {
            trail.record(login(true)).await;
        }

        let page = trail
            .query(AuditFilter { limit: 3, offset: 3, ..Default::default() })
            .await
            .unwrap();

        assert_eq!(page.total, 7);
        assert_eq!(page.page, 2);
        assert_eq!(page.per_page, 3);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.data.len(), 3);

        let empty = AuditTrail::new(Arc::new(InMemoryAuditRepository::new()));
        let page = empty.query(AuditFilter::default()).await.unwrap();
        assert_eq!(page.total_pages, 0);
        assert_eq!(page.page, 1);
    }

    #[tokio::test]
    async fn test_limit_default_and_cap() {
        let trail = AuditTrail::new(Arc::new(InMemoryAuditRepository::new()));

        let page = trail.query(AuditFilter::default()).await.unwrap();
        assert_eq!(page.per_page, DEFAULT_PAGE_SIZE);

        let page = trail.query(AuditFilter { limit: 1000, ..Default::default() }).await.unwrap();
        assert_eq!(page.per_page, MAX_PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_filters_and_date_range() {
        let store = Arc::new(InMemoryAuditRepository::new());
        let trail = AuditTrail::new(store.clone());
        let user = Uuid::new_v4();

        let day = |d: u32| Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap();
        store.insert_at(login(true).user_id(user), day(1));
        store.insert_at(login(false).user_id(user), day(2));
        store.insert_at(login(true), day(3));

        let page = trail
            .query(AuditFilter {
                start_date: Some(day(2)),
                end_date: Some(day(3)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert!(page.data[0].created_at > page.data[1].created_at);

        let page = trail
            .query(AuditFilter {
                action: Some(AuditAction::LoginFailed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert!(!page.data[0].success);

        let mine = trail.user_records(user, 0, 0).await.unwrap();
        assert_eq!(mine.len(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_defaults_to_ninety_days() {
        let store = Arc::new(InMemoryAuditRepository::new());
        let trail = AuditTrail::new(store.clone());

        store.insert_at(login(true), Utc::now() - Duration::days(91));
        store.insert_at(login(true), Utc::now() - Duration::days(30));

        assert_eq!(trail.cleanup(0).await.unwrap(), 1);
        assert_eq!(trail.cleanup(7).await.unwrap(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_rejects_out_of_range_retention() {
        let store = Arc::new(InMemoryAuditRepository::new());
        let trail = AuditTrail::new(store.clone());
        store.insert_at(login(true), Utc::now() - Duration::days(400));

        for days in [i64::MAX, MAX_RETENTION_DAYS + 1] {
            let err = trail.cleanup(days).await.unwrap_err();
            assert!(matches!(err, AuthError::ValidationFailed(_)), "{}: {:?}", days, err);
        }
        assert_eq!(store.len(), 1);

        assert_eq!(trail.cleanup(MAX_RETENTION_DAYS).await.unwrap(), 0);
    }
}
