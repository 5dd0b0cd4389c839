use crate::domain::{Normalizer, RosterResolver};
use common::domain::{DomainError, LocationBroadcaster, PositionProvider};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Counts for one completed tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub operators: usize,
    pub positions: usize,
    pub published: usize,
    pub unmatched: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A previous tick was still in flight; nothing was done
    Skipped,
    Completed(TickReport),
}

/// Resets the in-flight flag when the tick ends, including on unwind
struct TickGuard<'a> {
    in_flight: &'a AtomicBool,
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

/// Periodic poll: roster -> provider -> normalizer -> broadcaster
///
/// At most one tick runs at a time. A tick that fires while another is in
/// flight is skipped, so it makes no provider call and publishes nothing.
pub struct PollingScheduler {
    roster_resolver: Arc<RosterResolver>,
    position_provider: Arc<dyn PositionProvider>,
    normalizer: Normalizer,
    broadcaster: Arc<dyn LocationBroadcaster>,
    interval: Duration,
    in_flight: AtomicBool,
}

impl PollingScheduler {
    pub fn new(
        roster_resolver: Arc<RosterResolver>,
        position_provider: Arc<dyn PositionProvider>,
        normalizer: Normalizer,
        broadcaster: Arc<dyn LocationBroadcaster>,
        interval: Duration,
    ) -> Self {
        Self {
            roster_resolver,
            position_provider,
            normalizer,
            broadcaster,
            interval,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_tick_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn begin_tick(&self) -> Option<TickGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickGuard {
                in_flight: &self.in_flight,
            })
    }

    /// Runs one tick unless another is already in flight
    #[instrument(skip(self))]
    pub async fn try_tick(&self) -> TickOutcome {
        let Some(_guard) = self.begin_tick() else {
            debug!("previous tick still in flight, skipping");
            return TickOutcome::Skipped;
        };

        let mut report = TickReport::default();

        let roster = self.roster_resolver.active_operators().await;
        report.operators = roster.len();
        if roster.is_empty() {
            debug!("no active operators, nothing to poll");
            return TickOutcome::Completed(report);
        }

        let positions = self
            .position_provider
            .fetch_positions(&roster.external_ids())
            .await;
        report.positions = positions.len();

        for raw in &positions {
            match self.normalizer.normalize(raw, &roster) {
                Ok(event) => {
                    self.broadcaster.publish(&event);
                    report.published += 1;
                }
                Err(DomainError::NoMatchingOperator(external_id)) => {
                    debug!(external_id = %external_id, "no active operator for position, dropping");
                    report.unmatched += 1;
                }
                Err(e) => {
                    warn!(external_id = %raw.external_id, error = %e, "rejected position");
                    report.rejected += 1;
                }
            }
        }

        debug!(
            operators = report.operators,
            positions = report.positions,
            published = report.published,
            unmatched = report.unmatched,
            rejected = report.rejected,
            "tick complete"
        );

        TickOutcome::Completed(report)
    }

    /// Fires `try_tick` every interval until cancelled
    ///
    /// Each firing runs on its own task so a slow tick turns the next firing
    /// into a skip instead of delaying the timer. Ticks in flight at
    /// cancellation run to completion before this returns.
    pub async fn run(self: Arc<Self>, ctx: CancellationToken) -> anyhow::Result<()> {
        info!(interval = ?self.interval, "starting location poller");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = JoinSet::new();

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("location poller received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    let scheduler = Arc::clone(&self);
                    ticks.spawn(async move { scheduler.try_tick().await });
                }
                Some(joined) = ticks.join_next(), if !ticks.is_empty() => {
                    log_tick_result(joined);
                }
            }
        }

        while let Some(joined) = ticks.join_next().await {
            log_tick_result(joined);
        }

        info!("location poller stopped");
        Ok(())
    }
}

fn log_tick_result(joined: Result<TickOutcome, tokio::task::JoinError>) {
    match joined {
        Ok(TickOutcome::Completed(report)) if report.rejected > 0 => {
            warn!(rejected = report.rejected, "tick completed with rejected positions");
        }
        Ok(_) => {}
        Err(e) => error!("tick task failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::domain::{
        MockLocationBroadcaster, MockOperatorRepository, MockPositionProvider, Operator,
        OperatorStatus, RawPosition,
    };
    use std::collections::BTreeSet;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn operator(id: i64, external_id: &str, first: &str, last: &str) -> Operator {
        Operator {
            id,
            external_id: Some(external_id.to_string()),
            first_name: Some(first.to_string()),
            last_name: Some(last.to_string()),
            role: Some("exec".to_string()),
            region: None,
            area: None,
            status: OperatorStatus::Active,
        }
    }

    fn resolver(operators: Vec<Operator>) -> Arc<RosterResolver> {
        let mut repo = MockOperatorRepository::new();
        repo.expect_list_active_operators()
            .returning(move || Ok(operators.clone()));
        Arc::new(RosterResolver::new(Arc::new(repo)))
    }

    fn scheduler(
        operators: Vec<Operator>,
        provider: Arc<dyn PositionProvider>,
        broadcaster: MockLocationBroadcaster,
    ) -> PollingScheduler {
        PollingScheduler::new(
            resolver(operators),
            provider,
            Normalizer::new("operator"),
            Arc::new(broadcaster),
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn test_tick_publishes_matching_position() {
        let mut provider = MockPositionProvider::new();
        provider
            .expect_fetch_positions()
            .withf(|ids| ids.iter().map(String::as_str).eq(["E1"]))
            .times(1)
            .returning(|_| vec![RawPosition::new("E1", 12.9, 77.6, "2024-01-01T00:00:00Z")]);

        let mut broadcaster = MockLocationBroadcaster::new();
        broadcaster
            .expect_publish()
            .withf(|event| {
                event.operator_id == 1
                    && event.name == "Asha Rao"
                    && event.latitude == 12.9
                    && event.longitude == 77.6
            })
            .times(1)
            .return_const(());

        let outcome = scheduler(
            vec![operator(1, "E1", "Asha", "Rao")],
            Arc::new(provider),
            broadcaster,
        )
        .try_tick()
        .await;

        assert_eq!(
            outcome,
            TickOutcome::Completed(TickReport {
                operators: 1,
                positions: 1,
                published: 1,
                unmatched: 0,
                rejected: 0,
            })
        );
    }

    #[tokio::test]
    async fn test_empty_roster_makes_no_provider_call() {
        let mut provider = MockPositionProvider::new();
        provider.expect_fetch_positions().times(0);
        let mut broadcaster = MockLocationBroadcaster::new();
        broadcaster.expect_publish().times(0);

        let outcome = scheduler(Vec::new(), Arc::new(provider), broadcaster)
            .try_tick()
            .await;

        assert_eq!(outcome, TickOutcome::Completed(TickReport::default()));
    }

    #[tokio::test]
    async fn test_invalid_record_does_not_block_siblings() {
        let mut provider = MockPositionProvider::new();
        provider.expect_fetch_positions().returning(|_| {
            vec![
                RawPosition::new("E1", 12.9, 77.6, "2024-01-01T00:00:00Z"),
                RawPosition::new("E2", f64::NAN, 77.6, "2024-01-01T00:00:00Z"),
                RawPosition::new("E3", 13.0, 77.7, "2024-01-01T00:00:00Z"),
            ]
        });

        let mut broadcaster = MockLocationBroadcaster::new();
        broadcaster
            .expect_publish()
            .withf(|event| event.operator_id == 1 || event.operator_id == 3)
            .times(2)
            .return_const(());

        let outcome = scheduler(
            vec![
                operator(1, "E1", "Asha", "Rao"),
                operator(2, "E2", "Ravi", "Kumar"),
                operator(3, "E3", "Meera", "Iyer"),
            ],
            Arc::new(provider),
            broadcaster,
        )
        .try_tick()
        .await;

        let TickOutcome::Completed(report) = outcome else {
            panic!("tick should not be skipped");
        };
        assert_eq!(report.published, 2);
        assert_eq!(report.rejected, 1);
    }

    #[tokio::test]
    async fn test_position_for_unknown_operator_is_dropped() {
        let mut provider = MockPositionProvider::new();
        provider
            .expect_fetch_positions()
            .returning(|_| vec![RawPosition::new("E9", 12.9, 77.6, "2024-01-01T00:00:00Z")]);
        let mut broadcaster = MockLocationBroadcaster::new();
        broadcaster.expect_publish().times(0);

        let outcome = scheduler(
            vec![operator(1, "E1", "Asha", "Rao")],
            Arc::new(provider),
            broadcaster,
        )
        .try_tick()
        .await;

        let TickOutcome::Completed(report) = outcome else {
            panic!("tick should not be skipped");
        };
        assert_eq!(report.unmatched, 1);
        assert_eq!(report.published, 0);
    }

    /// Blocks inside the provider call until released
    struct GatedProvider {
        calls: AtomicUsize,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl PositionProvider for GatedProvider {
        async fn fetch_positions(&self, _external_ids: &BTreeSet<String>) -> Vec<RawPosition> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            vec![RawPosition::new("E1", 12.9, 77.6, "2024-01-01T00:00:00Z")]
        }
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let provider = Arc::new(GatedProvider {
            calls: AtomicUsize::new(0),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let mut broadcaster = MockLocationBroadcaster::new();
        broadcaster.expect_publish().times(1).return_const(());

        let scheduler = scheduler(
            vec![operator(1, "E1", "Asha", "Rao")],
            provider.clone(),
            broadcaster,
        );

        let (first, second) = tokio::join!(scheduler.try_tick(), async {
            provider.entered.notified().await;
            assert!(scheduler.is_tick_in_flight());
            let second = scheduler.try_tick().await;
            provider.release.notify_one();
            second
        });

        assert_eq!(second, TickOutcome::Skipped);
        assert!(matches!(first, TickOutcome::Completed(report) if report.published == 1));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_tick_in_flight());
    }

    #[tokio::test]
    async fn test_guard_is_released_after_tick() {
        let mut provider = MockPositionProvider::new();
        provider.expect_fetch_positions().times(2).returning(|_| Vec::new());
        let broadcaster = MockLocationBroadcaster::new();

        let scheduler = scheduler(
            vec![operator(1, "E1", "Asha", "Rao")],
            Arc::new(provider),
            broadcaster,
        );

        assert!(matches!(scheduler.try_tick().await, TickOutcome::Completed(_)));
        assert!(matches!(scheduler.try_tick().await, TickOutcome::Completed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_until_cancelled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut provider = MockPositionProvider::new();
        provider.expect_fetch_positions().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        });

        let scheduler = Arc::new(scheduler(
            vec![operator(1, "E1", "Asha", "Rao")],
            Arc::new(provider),
            MockLocationBroadcaster::new(),
        ));
        let token = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(token.clone()));

        tokio::time::sleep(Duration::from_secs(25)).await;
        token.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
