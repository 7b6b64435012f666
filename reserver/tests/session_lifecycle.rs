use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use reserver::core::inspection::SuccessPolicy;
use reserver::core::interval::RetryConfig;
use reserver::core::machine::TimerKind;
use reserver::core::types::{ErrorClassification, MachineState, StopReason};
use reserver::session::{SessionHandle, SessionOptions, spawn_session_with_rng};
use reserver::test_support::{PageFrame, RecordingReporter, ScriptedPage};
use tokio::time::{Instant, sleep};

fn options(min_secs: u64, max_secs: u64) -> SessionOptions {
    SessionOptions {
        retry: RetryConfig::new(min_secs, max_secs),
        success_policy: SuccessPolicy::InferFromMissingAction,
    }
}

fn spawn(
    frames: Vec<PageFrame>,
    options: SessionOptions,
) -> (SessionHandle, std::sync::Arc<ScriptedPage>, RecordingReporter) {
    let page = ScriptedPage::new(frames);
    let reporter = RecordingReporter::new();
    let handle =
        spawn_session_with_rng(page.clone(), reporter.clone(), options, StdRng::seed_from_u64(11));
    (handle, page, reporter)
}

/// Delay announced in a retry status, e.g. "... next in 17.3s".
fn announced_delay(message: &str) -> f64 {
    let tail = message.rsplit(' ').next().expect("delay token");
    tail.trim_end_matches('s').parse().expect("delay seconds")
}

async fn wait_for_clicks(page: &ScriptedPage, clicks: u32) {
    for _ in 0..1_000 {
        if page.clicks() >= clicks {
            return;
        }
        sleep(Duration::from_secs(1)).await;
    }
    panic!("page never reached {clicks} clicks");
}

#[tokio::test(start_paused = true)]
async fn high_demand_then_reserved_succeeds_after_one_retry() {
    let (handle, page, reporter) = spawn(
        vec![
            PageFrame::ready(),
            PageFrame::error(ErrorClassification::HighDemand),
            PageFrame::reserved(),
        ],
        options(15, 30),
    );
    let started = Instant::now();

    handle.start();
    let state = handle.wait_for_terminal().await.expect("terminal");
    let elapsed = started.elapsed();

    assert_eq!(state, MachineState::Succeeded);
    assert_eq!(page.clicks(), 2);
    assert!(elapsed >= Duration::from_millis(18_500), "elapsed {elapsed:?}");
    assert!(elapsed <= Duration::from_millis(33_500), "elapsed {elapsed:?}");

    let messages = reporter.messages();
    let retry = messages
        .iter()
        .find(|message| message.starts_with("High demand. Retrying... next in"))
        .expect("retry status");
    let delay = announced_delay(retry);
    assert!((15.0..=30.0).contains(&delay), "delay {delay}");
    assert_eq!(messages.last().map(String::as_str), Some("Study reserved!"));

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.pending, None);
    assert_eq!(snapshot.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn full_study_stops_and_never_clicks_again() {
    let (handle, page, reporter) = spawn(
        vec![
            PageFrame::ready(),
            PageFrame::error(ErrorClassification::Full),
        ],
        options(15, 30),
    );

    handle.start();
    let state = handle.wait_for_terminal().await.expect("terminal");
    assert_eq!(
        state,
        MachineState::Stopped {
            reason: StopReason::Unavailable(ErrorClassification::Full)
        }
    );

    sleep(Duration::from_secs(120)).await;
    assert_eq!(page.clicks(), 1);
    assert_eq!(handle.snapshot().pending, None);
    let last = reporter.statuses().pop().expect("status");
    assert_eq!(last.message, "Stopped: error - study full");
    assert!(!last.running);
}

#[tokio::test(start_paused = true)]
async fn repeated_high_demand_keeps_retrying() {
    let (handle, page, reporter) = spawn(
        vec![
            PageFrame::ready(),
            PageFrame::error(ErrorClassification::HighDemand),
        ],
        options(15, 30),
    );

    handle.start();
    wait_for_clicks(&page, 6).await;

    let snapshot = handle.snapshot();
    assert!(snapshot.state.is_running(), "state {:?}", snapshot.state);
    assert!(snapshot.pending.is_some());
    let retries: Vec<_> = reporter
        .messages()
        .into_iter()
        .filter(|message| message.starts_with("High demand."))
        .collect();
    assert!(retries.len() >= 5, "retries {retries:?}");
    for message in &retries {
        let delay = announced_delay(message);
        assert!((15.0..=30.0).contains(&delay), "delay {delay}");
    }
}

#[tokio::test(start_paused = true)]
async fn stop_while_retrying_cancels_the_pending_attempt() {
    let (handle, page, reporter) = spawn(
        vec![
            PageFrame::ready(),
            PageFrame::error(ErrorClassification::HighDemand),
        ],
        options(15, 30),
    );
    let mut snapshots = handle.subscribe();

    handle.start();
    snapshots
        .wait_for(|snapshot| snapshot.state == MachineState::Retrying)
        .await
        .expect("retrying");
    let clicks = page.clicks();

    handle.stop("Manually stopped");
    let state = handle.wait_for_terminal().await.expect("terminal");
    assert_eq!(
        state,
        MachineState::Stopped {
            reason: StopReason::Operator("Manually stopped".to_string())
        }
    );

    sleep(Duration::from_secs(120)).await;
    assert_eq!(page.clicks(), clicks);
    assert_eq!(handle.snapshot().pending, None);
    assert_eq!(
        reporter.messages().last().map(String::as_str),
        Some("Stopped: Manually stopped")
    );
}

#[tokio::test(start_paused = true)]
async fn restart_replaces_the_pending_first_attempt() {
    let (handle, page, _reporter) = spawn(vec![PageFrame::ready()], options(15, 30));

    handle.start();
    sleep(Duration::from_millis(300)).await;
    handle.start();
    sleep(Duration::from_millis(300)).await;

    // The first start's attempt would have fired at 500ms.
    assert_eq!(page.clicks(), 0);
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.pending, Some(TimerKind::Attempt));

    sleep(Duration::from_millis(300)).await;
    assert_eq!(page.clicks(), 1);
}

#[tokio::test(start_paused = true)]
async fn unreadable_page_keeps_retrying() {
    let (handle, page, reporter) = spawn(vec![PageFrame::ready()], options(2, 3));
    page.set_fail_reads(true);

    handle.start();
    wait_for_clicks(&page, 3).await;

    assert!(handle.snapshot().state.is_running());
    assert_eq!(page.inspections(), 0);
    assert!(
        reporter
            .messages()
            .iter()
            .any(|message| message.starts_with("Running... next try in"))
    );
}

#[tokio::test(start_paused = true)]
async fn configure_applies_to_the_next_retry() {
    let (handle, _page, reporter) = spawn(
        vec![
            PageFrame::ready(),
            PageFrame::error(ErrorClassification::HighDemand),
            PageFrame::reserved(),
        ],
        options(15, 30),
    );
    let started = Instant::now();

    handle.configure(RetryConfig::new(2, 3));
    handle.start();
    let state = handle.wait_for_terminal().await.expect("terminal");
    let elapsed = started.elapsed();

    assert_eq!(state, MachineState::Succeeded);
    assert!(elapsed >= Duration::from_millis(5_500), "elapsed {elapsed:?}");
    assert!(elapsed <= Duration::from_millis(6_500), "elapsed {elapsed:?}");
    assert_eq!(
        reporter.messages().first().map(String::as_str),
        Some("Intervals saved (2-3s)")
    );
}

#[tokio::test(start_paused = true)]
async fn stop_when_idle_reports_not_running() {
    let (handle, page, reporter) = spawn(vec![PageFrame::ready()], options(15, 30));

    handle.stop("Manually stopped");
    sleep(Duration::from_secs(5)).await;

    assert_eq!(reporter.messages(), vec!["Not running".to_string()]);
    assert_eq!(handle.snapshot().state, MachineState::Idle);
    assert_eq!(page.clicks(), 0);
    assert_eq!(handle.shutdown().await.expect("shutdown"), MachineState::Idle);
}

#[tokio::test(start_paused = true)]
async fn disabled_button_without_error_keeps_retrying() {
    let (handle, page, reporter) = spawn(vec![PageFrame::disabled()], options(2, 3));
    let mut snapshots = handle.subscribe();

    handle.start();
    snapshots
        .wait_for(|snapshot| snapshot.attempts >= 3)
        .await
        .expect("three attempts");

    let snapshot = handle.snapshot();
    assert!(snapshot.state.is_running(), "state {:?}", snapshot.state);
    assert_eq!(page.clicks(), 0);
    let messages = reporter.messages();
    assert!(!messages.iter().any(|message| message == "Study reserved!"));
    assert!(
        messages
            .iter()
            .any(|message| message.starts_with("Running... next try in"))
    );
}
