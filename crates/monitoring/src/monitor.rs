//! Background monitoring loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::metrics::SagaMetrics;

/// Spawns the periodic monitoring task.
///
/// Each tick records a system snapshot into the trend history and
/// evaluates the alert thresholds against it. The caller owns the
/// handle and stops the loop by aborting it.
pub fn spawn_monitor(metrics: Arc<SagaMetrics>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let snapshot = metrics.record_snapshot();
            tracing::debug!(
                total = snapshot.total_sagas,
                active = snapshot.active_sagas,
                failed = snapshot.failed_sagas,
                "Collected system metrics snapshot"
            );
            for alert in metrics.evaluate(&snapshot) {
                tracing::warn!(
                    metric = %alert.metric,
                    value = alert.value,
                    threshold = alert.threshold,
                    severity = ?alert.severity,
                    "{}",
                    alert.message
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertSeverity, AlertThreshold, SystemMetricKind};
    use crate::audit::SagaAuditTrail;
    use common::{PartnerId, SagaId};
    use saga_log::SagaLog;

    #[tokio::test]
    async fn test_monitor_records_history_each_tick() {
        let audit = Arc::new(SagaAuditTrail::new());
        let metrics = Arc::new(SagaMetrics::new(audit));

        let handle = spawn_monitor(metrics.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();

        assert!(!metrics.history().is_empty());
    }

    #[tokio::test]
    async fn test_monitor_triggers_alerts_on_breach() {
        let log = SagaLog::new();
        let audit = Arc::new(SagaAuditTrail::new());
        let metrics = Arc::new(SagaMetrics::new(audit.clone()));
        log.add_consumer(audit.clone());
        metrics.add_threshold(AlertThreshold::above(
            SystemMetricKind::ErrorRatePercent,
            50.0,
            AlertSeverity::Critical,
        ));

        let saga_id = SagaId::new();
        let partner_id = PartnerId::new();
        log.saga_started(saga_id, partner_id);
        log.saga_failed(saga_id, partner_id, "downstream outage");

        let handle = spawn_monitor(metrics.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();

        let active = metrics.active_alerts();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].metric, SystemMetricKind::ErrorRatePercent);
    }
}
