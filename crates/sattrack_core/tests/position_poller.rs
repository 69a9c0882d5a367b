mod common;

use common::{sample, settle, wait_until, FakeSatelliteService};
use sattrack_core::{
    ActiveSatellites, PollerPhase, PositionPoller, RefreshBus, TickOutcome, TrackStatus,
    TrackingError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

const INTERVAL: Duration = Duration::from_secs(60);

fn make_poller(
    service: &Arc<FakeSatelliteService>,
    bus: &RefreshBus,
) -> PositionPoller<FakeSatelliteService> {
    PositionPoller::new(Arc::clone(service), bus.clone(), INTERVAL)
}

async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
    settle().await;
}

#[tokio::test(start_paused = true)]
async fn start_fetches_immediately_then_on_interval() {
    let service = FakeSatelliteService::with_catalog(&[(1, "ISS")]);
    service.seed_selection(1);
    let bus = RefreshBus::new();
    let poller = make_poller(&service, &bus);

    assert!(poller.start());
    assert!(!poller.start(), "second start must be refused");
    settle().await;
    assert_eq!(service.position_calls(), 1);
    assert!(!poller.snapshot().loading);

    advance(Duration::from_secs(30)).await;
    assert_eq!(service.position_calls(), 1);

    advance(Duration::from_secs(31)).await;
    assert_eq!(service.position_calls(), 2);
    poller.stop();
}

#[tokio::test]
async fn empty_sample_list_is_waiting_not_unknown() {
    let service = FakeSatelliteService::with_catalog(&[(1, "ISS")]);
    service.seed_selection(1);
    let bus = RefreshBus::new();
    let poller = make_poller(&service, &bus);

    let outcome = poller.poll_once().await;
    assert_eq!(outcome, TickOutcome::Updated { satellites: 1 });

    let snapshot = poller.snapshot();
    assert_eq!(snapshot.history.samples("ISS"), Some(&[][..]));
    assert_eq!(snapshot.history.status("ISS"), TrackStatus::Waiting);
    assert_eq!(snapshot.history.status("HUBBLE"), TrackStatus::Unknown);
    assert!(snapshot.error.is_none());
    assert_eq!(poller.phase(), PollerPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn failed_tick_keeps_history_and_next_success_clears_error() {
    let service = FakeSatelliteService::with_catalog(&[(1, "ISS")]);
    service.seed_selection(1);
    service.fail_position_calls(&[3]);
    let bus = RefreshBus::new();
    let poller = make_poller(&service, &bus);

    poller.start();
    settle().await;
    service.set_samples("ISS", vec![sample(1, 10.0, 20.0), sample(0, 9.0, 19.0)]);

    advance(Duration::from_secs(61)).await;
    assert_eq!(service.position_calls(), 2);
    let after_tick_two = poller.snapshot();
    assert_eq!(after_tick_two.history.status("ISS"), TrackStatus::Tracking { samples: 2 });

    service.set_samples("ISS", vec![sample(2, 11.0, 21.0)]);
    advance(INTERVAL).await;
    assert_eq!(service.position_calls(), 3);
    let after_failure = poller.snapshot();
    assert!(matches!(after_failure.error, Some(TrackingError::PollFailure(_))));
    assert_eq!(after_failure.history, after_tick_two.history);
    assert_eq!(after_failure.last_update, after_tick_two.last_update);
    assert_eq!(after_failure.phase, PollerPhase::Scheduled);
    assert_eq!(after_failure.failed_ticks, 1);

    advance(INTERVAL).await;
    assert_eq!(service.position_calls(), 4);
    let recovered = poller.snapshot();
    assert!(recovered.error.is_none());
    assert_eq!(recovered.history.status("ISS"), TrackStatus::Tracking { samples: 1 });
    assert_eq!(recovered.completed_ticks, 3);
    poller.stop();
}

#[tokio::test]
async fn stop_is_idempotent_and_safe_before_start() {
    let service = FakeSatelliteService::with_catalog(&[(1, "ISS")]);
    let bus = RefreshBus::new();
    let poller = make_poller(&service, &bus);

    poller.stop();
    poller.stop();
    assert_eq!(poller.phase(), PollerPhase::Idle);

    assert!(poller.start());
    poller.stop();
    poller.stop();
    assert_eq!(poller.phase(), PollerPhase::Stopped);

    poller.shutdown().await;
    assert_eq!(poller.phase(), PollerPhase::Stopped);
}

#[tokio::test(start_paused = true)]
async fn stopped_poller_schedules_no_more_ticks() {
    let service = FakeSatelliteService::with_catalog(&[(1, "ISS")]);
    let bus = RefreshBus::new();
    let poller = make_poller(&service, &bus);

    poller.start();
    settle().await;
    poller.shutdown().await;
    let calls = service.position_calls();

    advance(INTERVAL * 5).await;
    bus.publish();
    settle().await;
    assert_eq!(service.position_calls(), calls);
    assert_eq!(poller.poll_once().await, TickOutcome::Skipped);
}

#[tokio::test]
async fn burst_of_publishes_during_fetch_triggers_one_refetch() {
    let service = FakeSatelliteService::with_catalog(&[(1, "ISS")]);
    let gate = Arc::new(Notify::new());
    service.hold_positions(Arc::clone(&gate));
    let bus = RefreshBus::new();
    let poller = PositionPoller::new(Arc::clone(&service), bus.clone(), Duration::from_secs(3600));

    poller.start();
    wait_until(|| service.position_calls() == 1).await;
    assert_eq!(poller.phase(), PollerPhase::Fetching);

    for _ in 0..5 {
        bus.publish();
    }
    gate.notify_one();
    wait_until(|| service.position_calls() == 2).await;
    gate.notify_one();
    settle().await;

    assert_eq!(service.position_calls(), 2);
    assert_eq!(poller.phase(), PollerPhase::Scheduled);
    poller.stop();
}

#[tokio::test]
async fn manual_poll_is_skipped_while_a_tick_is_fetching() {
    let service = FakeSatelliteService::with_catalog(&[(1, "ISS")]);
    let gate = Arc::new(Notify::new());
    service.hold_positions(Arc::clone(&gate));
    let bus = RefreshBus::new();
    let poller = PositionPoller::new(Arc::clone(&service), bus.clone(), Duration::from_secs(3600));

    poller.start();
    wait_until(|| service.position_calls() == 1).await;

    assert_eq!(poller.poll_once().await, TickOutcome::Skipped);
    assert_eq!(service.position_calls(), 1);

    gate.notify_one();
    settle().await;
    assert_eq!(poller.phase(), PollerPhase::Scheduled);
    poller.stop();
}

#[tokio::test]
async fn result_of_fetch_finishing_after_stop_is_discarded() {
    let service = FakeSatelliteService::with_catalog(&[(1, "ISS")]);
    service.seed_selection(1);
    let gate = Arc::new(Notify::new());
    service.hold_positions(Arc::clone(&gate));
    let bus = RefreshBus::new();
    let poller = PositionPoller::new(Arc::clone(&service), bus.clone(), Duration::from_secs(3600));

    poller.start();
    wait_until(|| service.position_calls() == 1).await;
    poller.stop();
    gate.notify_one();
    settle().await;

    let snapshot = poller.snapshot();
    assert_eq!(snapshot.phase, PollerPhase::Stopped);
    assert!(snapshot.history.is_empty());
    assert_eq!(snapshot.completed_ticks, 0);
}

struct NothingSelected;

impl ActiveSatellites for NothingSelected {
    fn active_satellites(&self) -> Option<Vec<String>> {
        Some(Vec::new())
    }
}

#[tokio::test]
async fn empty_active_set_skips_the_round_trip() {
    let service = FakeSatelliteService::with_catalog(&[(1, "ISS")]);
    let bus = RefreshBus::new();
    let poller = make_poller(&service, &bus).with_active_source(Arc::new(NothingSelected));

    assert_eq!(poller.poll_once().await, TickOutcome::Updated { satellites: 0 });
    assert_eq!(service.position_calls(), 0);
    assert!(poller.history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn refresh_publish_triggers_out_of_band_tick_and_resets_phase() {
    let service = FakeSatelliteService::with_catalog(&[(1, "ISS")]);
    let bus = RefreshBus::new();
    let poller = make_poller(&service, &bus);

    poller.start();
    settle().await;
    assert_eq!(service.position_calls(), 1);

    advance(Duration::from_secs(40)).await;
    bus.publish();
    settle().await;
    assert_eq!(service.position_calls(), 2);

    // No tick at the pre-reset 60 s boundary.
    advance(Duration::from_secs(30)).await;
    assert_eq!(service.position_calls(), 2);

    advance(Duration::from_secs(31)).await;
    assert_eq!(service.position_calls(), 3);
    poller.stop();
}
