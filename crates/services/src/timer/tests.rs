use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use olympiad_core::model::{Session, SessionId};
use olympiad_core::time::{fixed_clock, fixed_now};
use olympiad_core::urgency::CLASS_PULSE;
use olympiad_core::{Drift, TerminationCause, TimerState, UrgencyBand};
use tokio::time::sleep;

use super::*;
use crate::testing::{FakeSessionApi, RecordingView};
use crate::view::FramePhase;

const SESSION: SessionId = SessionId::new(5);

struct Harness {
    api: Arc<FakeSessionApi>,
    view: Arc<RecordingView>,
    timer: SessionTimer,
}

fn harness_for(session: &Session) -> Harness {
    let api = Arc::new(FakeSessionApi::new());
    let view = Arc::new(RecordingView::new());
    let timer = SessionTimer::new(
        session,
        fixed_clock(),
        TimerConfig::default(),
        api.clone(),
        view.clone(),
        CsrfToken::resolve(Some("form-token"), None),
    );
    Harness { api, view, timer }
}

fn harness(secs: u64) -> Harness {
    let session =
        Session::with_time_limit(SESSION, fixed_now(), Duration::from_secs(secs)).unwrap();
    harness_for(&session)
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn secs_f(n: f64) -> Duration {
    Duration::from_secs_f64(n)
}

#[tokio::test(start_paused = true)]
async fn start_renders_first_frame_immediately() {
    let h = harness(300);
    h.timer.start();

    let frame = h.view.last_frame().unwrap();
    assert_eq!(frame.phase, FramePhase::UntilEnd);
    assert_eq!(frame.text, "00:05:00");
    assert_eq!(frame.urgency, UrgencyBand::Warning);
    assert!(frame.progress.abs() < f64::EPSILON);
    assert!(h.timer.is_started());
}

#[tokio::test(start_paused = true)]
async fn countdown_reaches_zero_and_submits_once_after_grace() {
    let h = harness(300);
    h.timer.start();

    sleep(secs_f(295.5)).await;
    assert_eq!(h.timer.remaining(), secs(5));
    let frame = h.view.last_frame().unwrap();
    assert_eq!(frame.text, "00:00:05");
    assert_eq!(frame.urgency, UrgencyBand::Critical);
    assert!((frame.progress_percent() - 98.333).abs() < 0.01);

    sleep(secs(5)).await;
    assert_eq!(h.timer.remaining(), Duration::ZERO);
    assert_eq!(
        h.timer.state(),
        TimerState::Expiring(TerminationCause::Expired)
    );
    assert_eq!(h.view.messages(), vec![MESSAGE_TIME_UP.to_string()]);
    assert!(h.api.finish_calls().is_empty());
    let finished_frame = h.view.last_frame().unwrap();
    assert_eq!(finished_frame.phase, FramePhase::Finished);
    assert_eq!(finished_frame.text, "00:00:00");

    sleep(secs(3)).await;
    let calls = h.api.finish_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].session_id, SESSION);
    assert_eq!(calls[0].csrf.as_deref(), Some("form-token"));
    assert_eq!(
        h.timer.state(),
        TimerState::Terminated(TerminationCause::Expired)
    );
    let navigations = h.view.navigations();
    assert_eq!(navigations.len(), 1);
    assert!(navigations[0].path().ends_with("/olympiads/5/results/"));

    let renders = h.view.render_count();
    sleep(secs(30)).await;
    assert_eq!(h.view.render_count(), renders);
    assert_eq!(h.timer.remaining(), Duration::ZERO);
    assert_eq!(h.api.finish_calls().len(), 1);
    h.timer.join().await;
}

#[tokio::test(start_paused = true)]
async fn remaining_never_increases_without_reconciliation() {
    let h = harness(20);
    h.timer.start();
    sleep(secs(25)).await;

    let remaining: Vec<_> = h.view.frames().iter().map(|f| f.remaining).collect();
    assert!(remaining.windows(2).all(|pair| pair[1] <= pair[0]));
    assert_eq!(remaining.last().copied(), Some(Duration::ZERO));
}

#[tokio::test(start_paused = true)]
async fn late_tick_subtracts_the_whole_delay() {
    let h = harness(300);
    h.timer.start();

    // The runtime stalls for 30s; the next tick must account for all of it.
    tokio::time::advance(secs(30)).await;
    sleep(Duration::from_millis(1)).await;

    assert_eq!(h.timer.remaining(), secs(270));
    assert_eq!(h.view.last_frame().unwrap().text, "00:04:30");
    assert_eq!(h.timer.state(), TimerState::Active);
}

#[tokio::test(start_paused = true)]
async fn stall_past_deadline_expires_on_the_same_tick() {
    let h = harness(10);
    h.timer.start();

    tokio::time::advance(secs(15)).await;
    sleep(Duration::from_millis(1)).await;

    assert_eq!(h.timer.remaining(), Duration::ZERO);
    assert_eq!(
        h.timer.state(),
        TimerState::Expiring(TerminationCause::Expired)
    );
    assert_eq!(h.view.messages(), vec![MESSAGE_TIME_UP.to_string()]);
    assert_eq!(h.view.last_frame().unwrap().phase, FramePhase::Finished);
    assert!(h.api.finish_calls().is_empty());

    sleep(secs(4)).await;
    assert_eq!(h.api.finish_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn late_tick_across_the_start_carries_into_the_session() {
    let start = fixed_now() + TimeDelta::seconds(5);
    let session = Session::ending_at(SESSION, start, start + TimeDelta::seconds(60)).unwrap();
    let h = harness_for(&session);
    h.timer.start();

    tokio::time::advance(secs(8)).await;
    sleep(Duration::from_millis(1)).await;

    assert_eq!(h.timer.state(), TimerState::Active);
    assert_eq!(h.timer.remaining(), secs(57));
}

#[tokio::test(start_paused = true)]
async fn reconcile_overwrites_large_drift() {
    let h = harness(600);
    h.api
        .push_progress(ProgressReport::Remaining(secs(400)));

    let outcome = h.timer.reconcile_now().await;

    assert_eq!(
        outcome,
        ReconcileOutcome::Reconciled(Drift::Corrected {
            previous: secs(600),
            current: secs(400),
            total_raised: false,
        })
    );
    assert_eq!(h.timer.remaining(), secs(400));
    assert_eq!(h.timer.total(), secs(600));
}

#[tokio::test(start_paused = true)]
async fn reconcile_ignores_small_drift() {
    let h = harness(600);
    h.api
        .push_progress(ProgressReport::Remaining(secs(570)));

    let outcome = h.timer.reconcile_now().await;

    assert_eq!(
        outcome,
        ReconcileOutcome::Reconciled(Drift::Within { delta: secs(30) })
    );
    assert_eq!(h.timer.remaining(), secs(600));
}

#[tokio::test(start_paused = true)]
async fn server_extension_raises_total() {
    let h = harness(300);
    h.api
        .push_progress(ProgressReport::Remaining(secs(900)));

    h.timer.reconcile_now().await;

    assert_eq!(h.timer.remaining(), secs(900));
    assert_eq!(h.timer.total(), secs(900));
}

#[tokio::test(start_paused = true)]
async fn periodic_reconciliation_runs_every_minute() {
    let h = harness(600);
    h.api
        .push_progress(ProgressReport::Remaining(secs(400)));
    h.timer.start();

    sleep(secs_f(59.5)).await;
    assert_eq!(h.api.progress_calls(), 0);

    sleep(secs(1)).await;
    assert_eq!(h.api.progress_calls(), 1);
    // The tick at 60s may land on either side of the correction.
    let remaining = h.timer.remaining();
    assert!(remaining >= secs(399) && remaining <= secs(400));

    sleep(secs(60)).await;
    assert_eq!(h.api.progress_calls(), 2);
    assert_eq!(h.timer.state(), TimerState::Active);
}

#[tokio::test(start_paused = true)]
async fn network_failures_leave_countdown_running() {
    let h = harness(600);
    h.api.push_failure();
    h.timer.start();

    sleep(secs_f(120.5)).await;

    assert_eq!(h.api.progress_calls(), 2);
    assert_eq!(h.timer.state(), TimerState::Active);
    assert_eq!(h.timer.remaining(), secs(480));
    assert!(h.api.finish_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn server_closure_terminates_without_waiting_for_zero() {
    let h = harness(600);
    h.api.push_progress(ProgressReport::Closed);
    h.timer.start();

    sleep(secs_f(60.5)).await;
    assert_eq!(
        h.timer.state(),
        TimerState::Expiring(TerminationCause::ClosedByServer)
    );
    assert_eq!(h.timer.remaining(), Duration::ZERO);
    assert_eq!(h.view.messages(), vec![MESSAGE_CLOSED.to_string()]);

    let renders = h.view.render_count();
    sleep(secs(3)).await;
    assert_eq!(h.api.finish_calls().len(), 1);
    assert_eq!(h.view.navigations().len(), 1);
    assert_eq!(h.view.render_count(), renders);
}

#[tokio::test(start_paused = true)]
async fn closure_and_local_expiry_in_same_slice_submit_once() {
    let h = harness(60);
    h.api.push_progress(ProgressReport::Closed);
    h.timer.start();

    sleep(secs(70)).await;

    assert_eq!(h.api.finish_calls().len(), 1);
    assert_eq!(h.view.messages().len(), 1);
    assert_eq!(h.view.navigations().len(), 1);
    assert!(h.timer.state().is_terminated());
}

#[tokio::test(start_paused = true)]
async fn overlapping_reconciliation_is_skipped() {
    let h = harness(600);
    h.api.set_progress_delay(secs(30));
    h.api
        .push_progress(ProgressReport::Remaining(secs(590)));

    let (first, second) = tokio::join!(h.timer.reconcile_now(), async {
        sleep(secs(1)).await;
        h.timer.reconcile_now().await
    });

    assert!(matches!(first, ReconcileOutcome::Reconciled(_)));
    assert_eq!(second, ReconcileOutcome::Skipped(SkipReason::InFlight));
    assert_eq!(h.api.progress_calls(), 1);

    // The flag is released once the first request returns.
    h.api
        .push_progress(ProgressReport::Remaining(secs(590)));
    assert!(matches!(
        h.timer.reconcile_now().await,
        ReconcileOutcome::Reconciled(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn pulse_class_is_added_once_when_entering_critical() {
    let h = harness(65);
    h.timer.start();

    sleep(secs_f(10.5)).await;

    let frames = h.view.frames();
    let pulse_starts = frames.iter().filter(|f| f.pulse_started).count();
    assert_eq!(pulse_starts, 1);
    for frame in frames.iter().filter(|f| f.urgency == UrgencyBand::Critical) {
        assert_eq!(
            frame.classes.iter().filter(|c| *c == CLASS_PULSE).count(),
            1
        );
    }
}

#[tokio::test(start_paused = true)]
async fn dispose_during_grace_cancels_submission() {
    let h = harness(10);
    h.timer.start();

    sleep(secs(11)).await;
    assert_eq!(
        h.timer.state(),
        TimerState::Expiring(TerminationCause::Expired)
    );

    h.timer.dispose();
    sleep(secs(10)).await;

    assert!(h.api.finish_calls().is_empty());
    assert!(h.view.navigations().is_empty());
    assert_eq!(
        h.timer.state(),
        TimerState::Terminated(TerminationCause::Disposed)
    );
    h.timer.join().await;
}

#[tokio::test(start_paused = true)]
async fn dispose_cancels_both_schedules() {
    let h = harness(600);
    h.timer.start();

    sleep(secs_f(5.5)).await;
    h.timer.dispose();
    h.timer.dispose();
    let renders = h.view.render_count();

    sleep(secs(120)).await;
    assert_eq!(h.view.render_count(), renders);
    assert_eq!(h.api.progress_calls(), 0);
    assert_eq!(h.timer.remaining(), secs(595));
    h.timer.join().await;
}

#[tokio::test(start_paused = true)]
async fn stop_freezes_countdown_without_terminating() {
    let h = harness(600);
    h.timer.start();

    sleep(secs_f(3.5)).await;
    h.timer.stop();
    sleep(secs(10)).await;

    assert_eq!(h.timer.remaining(), secs(597));
    assert_eq!(h.timer.state(), TimerState::Active);
    h.timer.join().await;
}

#[tokio::test(start_paused = true)]
async fn failed_submission_is_retried() {
    let h = harness(5);
    h.api.fail_finish(2);
    h.timer.start();

    // Expiry at 5s, grace until 8s, retries at 10s and 12s.
    sleep(secs_f(12.5)).await;

    assert_eq!(h.api.finish_calls().len(), 3);
    assert_eq!(h.view.navigations().len(), 1);
    assert_eq!(
        h.timer.state(),
        TimerState::Terminated(TerminationCause::Expired)
    );
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_still_leave_the_page() {
    let h = harness(5);
    h.api.fail_finish(10);
    h.timer.start();

    sleep(secs(30)).await;

    assert_eq!(h.api.finish_calls().len(), 3);
    assert_eq!(h.view.navigations().len(), 1);
    assert!(h.timer.state().is_terminated());
}

#[tokio::test(start_paused = true)]
async fn pending_session_counts_down_to_start_then_activates() {
    let start = fixed_now() + TimeDelta::seconds(5);
    let session = Session::ending_at(SESSION, start, start + TimeDelta::seconds(60)).unwrap();
    let h = harness_for(&session);
    h.timer.start();

    let first = h.view.last_frame().unwrap();
    assert_eq!(first.phase, FramePhase::UntilStart);
    assert_eq!(first.text, "00:00:05");
    assert_eq!(h.timer.state(), TimerState::Pending);

    sleep(secs_f(5.5)).await;
    assert_eq!(h.timer.state(), TimerState::Active);
    assert_eq!(h.timer.remaining(), secs(60));
    assert_eq!(h.view.last_frame().unwrap().phase, FramePhase::UntilEnd);
}

#[tokio::test(start_paused = true)]
async fn expired_page_terminates_on_start() {
    let session = Session::ending_at(SESSION, fixed_now() - TimeDelta::seconds(60), fixed_now())
        .unwrap();
    let h = harness_for(&session);
    h.timer.start();

    assert_eq!(h.view.messages(), vec![MESSAGE_TIME_UP.to_string()]);
    sleep(secs(4)).await;
    assert_eq!(h.api.finish_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn start_is_idempotent() {
    let h = harness(600);
    h.timer.start();
    h.timer.start();

    sleep(secs_f(1.5)).await;
    // One initial frame plus one tick, not two of each.
    assert_eq!(h.view.render_count(), 2);
}

#[test]
fn unmounted_page_yields_no_timer() {
    let page = PageData::new(SESSION).with_remaining_minutes(10.0);
    let page = PageData {
        timer_mounted: false,
        ..page
    };
    let timer = SessionTimer::mount(
        &page,
        fixed_clock(),
        TimerConfig::default(),
        Arc::new(FakeSessionApi::new()),
        Arc::new(RecordingView::new()),
    )
    .unwrap();
    assert!(timer.is_none());
}

#[test]
fn mount_reads_remaining_minutes() {
    let page = PageData::new(SESSION).with_remaining_minutes(2.5);
    let timer = SessionTimer::mount(
        &page,
        fixed_clock(),
        TimerConfig::default(),
        Arc::new(FakeSessionApi::new()),
        Arc::new(RecordingView::new()),
    )
    .unwrap()
    .unwrap();

    assert_eq!(timer.session_id(), SESSION);
    assert_eq!(timer.remaining(), secs(150));
    assert_eq!(timer.total(), secs(150));
    assert!(!timer.is_started());
}
