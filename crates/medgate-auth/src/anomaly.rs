//! Suspicious-activity heuristics over the audit trail.
//!
//! Two independent checks run against one principal's recent audit history:
//!
//! 1. **Large-transaction burst**: when the current amount is above the
//!    threshold, count that principal's records with an amount above the
//!    threshold in the trailing window and flag if the count exceeds the
//!    limit.
//! 2. **Rapid activity**: count all of the principal's records in a shorter
//!    trailing window and flag if the count exceeds the limit.
//!
//! The signal is advisory. Nothing here blocks or locks out a principal;
//! a store failure simply leaves the affected check unflagged.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::audit::{AuditAction, AuditCountFilter};
use crate::config::AnomalyConfig;
use crate::principal::UserId;
use crate::storage::AuditStore;

/// Which heuristic fired and what it counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyReason {
    LargeTransactionBurst { count: u64 },
    RapidActivity { count: u64 },
}

/// Outcome of an anomaly evaluation, valid only for the triggering request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnomalySignal {
    pub flagged: bool,
    pub reasons: Vec<AnomalyReason>,
}

impl AnomalySignal {
    /// A signal with nothing flagged.
    #[must_use]
    pub fn clear() -> Self {
        Self::default()
    }

    fn push(&mut self, reason: AnomalyReason) {
        self.flagged = true;
        self.reasons.push(reason);
    }
}

/// Evaluates recent audit history for suspicious patterns.
#[derive(Clone)]
pub struct AnomalyDetector {
    store: Arc<dyn AuditStore>,
    config: AnomalyConfig,
}

impl AnomalyDetector {
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>, config: AnomalyConfig) -> Self {
        Self { store, config }
    }

    /// Runs both heuristics for `user_id`.
    ///
    /// Expected to run after the current action's audit record was written,
    /// so the current action is part of the counts.
    pub async fn evaluate(
        &self,
        user_id: UserId,
        action: &AuditAction,
        amount: Option<Decimal>,
    ) -> AnomalySignal {
        let mut signal = AnomalySignal::clear();
        if !self.config.enabled {
            return signal;
        }

        let threshold = self.config.large_transaction_threshold;
        if amount.is_some_and(|amount| amount > threshold) {
            let filter = AuditCountFilter {
                user_id,
                window: self.config.large_transaction_window,
                amount_above: Some(threshold),
            };
            if let Some(count) = self.count(&filter).await {
                if count > self.config.large_transaction_limit {
                    signal.push(AnomalyReason::LargeTransactionBurst { count });
                }
            }
        }

        let filter = AuditCountFilter {
            user_id,
            window: self.config.rate_window,
            amount_above: None,
        };
        if let Some(count) = self.count(&filter).await {
            if count > self.config.rate_limit {
                signal.push(AnomalyReason::RapidActivity { count });
            }
        }

        if signal.flagged {
            tracing::warn!(
                user_id,
                action = %action,
                reasons = ?signal.reasons,
                "Suspicious activity detected"
            );
        }

        signal
    }

    async fn count(&self, filter: &AuditCountFilter) -> Option<u64> {
        match self.store.count_recent(filter).await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    user_id = filter.user_id,
                    "Failed to count recent audit records"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditEntry;
    use crate::clock::FixedClock;
    use crate::storage::memory::InMemoryStore;
    use serde_json::json;
    use time::macros::datetime;

    struct Fixture {
        clock: Arc<FixedClock>,
        store: Arc<InMemoryStore>,
        detector: AnomalyDetector,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::new(datetime!(2024-06-12 09:00 UTC)));
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        let detector = AnomalyDetector::new(store.clone(), AnomalyConfig::default());
        Fixture {
            clock,
            store,
            detector,
        }
    }

    async fn record(store: &InMemoryStore, user_id: UserId, amount: Option<u32>) {
        let mut entry = AuditEntry::new(user_id, "transactions", AuditAction::Insert);
        if let Some(amount) = amount {
            entry = entry.new_values(json!({ "amount": amount }));
        }
        store.append(&entry).await.unwrap();
    }

    #[tokio::test]
    async fn test_large_transaction_boundary() {
        let f = fixture();
        let amount = Some(Decimal::from(15_000));

        for _ in 0..3 {
            record(&f.store, 1, Some(15_000)).await;
            f.clock.advance(time::Duration::minutes(10));
        }
        let signal = f.detector.evaluate(1, &AuditAction::Insert, amount).await;
        assert!(!signal.flagged, "three large transactions must not flag");

        record(&f.store, 1, Some(15_000)).await;
        let signal = f.detector.evaluate(1, &AuditAction::Insert, amount).await;
        assert!(signal.flagged);
        assert_eq!(
            signal.reasons,
            vec![AnomalyReason::LargeTransactionBurst { count: 4 }]
        );
    }

    #[tokio::test]
    async fn test_large_transactions_outside_window_ignored() {
        let f = fixture();
        for _ in 0..3 {
            record(&f.store, 1, Some(20_000)).await;
        }
        f.clock.advance(time::Duration::minutes(61));
        record(&f.store, 1, Some(20_000)).await;

        let signal = f
            .detector
            .evaluate(1, &AuditAction::Insert, Some(Decimal::from(20_000)))
            .await;
        assert!(!signal.flagged);
    }

    #[tokio::test]
    async fn test_small_amount_skips_large_transaction_check() {
        let f = fixture();
        for _ in 0..5 {
            record(&f.store, 1, Some(50_000)).await;
        }
        let signal = f
            .detector
            .evaluate(1, &AuditAction::Insert, Some(Decimal::from(10_000)))
            .await;
        assert!(!signal.flagged);
    }

    #[tokio::test]
    async fn test_rapid_activity_boundary() {
        let f = fixture();
        for i in 1..=21 {
            record(&f.store, 2, None).await;
            let signal = f.detector.evaluate(2, &AuditAction::Update, None).await;
            if i <= 20 {
                assert!(!signal.flagged, "action {i} must not flag");
            } else {
                assert_eq!(
                    signal.reasons,
                    vec![AnomalyReason::RapidActivity { count: 21 }]
                );
            }
        }
    }

    #[tokio::test]
    async fn test_other_principals_not_counted() {
        let f = fixture();
        for _ in 0..30 {
            record(&f.store, 3, None).await;
        }
        let signal = f.detector.evaluate(4, &AuditAction::Insert, None).await;
        assert!(!signal.flagged);
    }

    #[tokio::test]
    async fn test_thresholds_are_configurable() {
        let f = fixture();
        let config = AnomalyConfig {
            rate_limit: 1,
            ..AnomalyConfig::default()
        };
        let detector = AnomalyDetector::new(f.store.clone(), config);
        record(&f.store, 5, None).await;
        record(&f.store, 5, None).await;
        assert!(detector.evaluate(5, &AuditAction::Insert, None).await.flagged);
    }

    #[tokio::test]
    async fn test_disabled_detector_never_flags() {
        let f = fixture();
        let config = AnomalyConfig {
            enabled: false,
            ..AnomalyConfig::default()
        };
        let detector = AnomalyDetector::new(f.store.clone(), config);
        for _ in 0..25 {
            record(&f.store, 6, None).await;
        }
        assert_eq!(
            detector.evaluate(6, &AuditAction::Insert, None).await,
            AnomalySignal::clear()
        );
    }
}
