//! Last-will lifecycle scenarios driven through the public service API.
//!
//! Timing uses paused tokio time so delays are exact and instant.

mod common;

use common::{session, settle, will_msg, LogCapture, RecordingDispatcher, TestClock};
use sessioncore::mqtt::{LastWillService, MemoryRetainedProcessor, NoopRetained, WillDecision};
use std::sync::Arc;
use std::time::Duration;

fn wills(dispatcher: &Arc<RecordingDispatcher>) -> LastWillService {
    LastWillService::new("last-will-scheduler", dispatcher.clone(), Arc::new(NoopRetained))
}

#[tokio::test(start_paused = true)]
async fn delayed_will_fires_after_delay_on_clean_restart() {
    let dispatcher = RecordingDispatcher::new();
    let wills = wills(&dispatcher);
    let a = session("node-1", "client-a", true);
    wills.save_last_will_msg(&a, will_msg("client-a", Some(5)));

    let decision = wills.remove_and_execute_last_will_if_needed(a.session_id, true, true);
    assert!(matches!(decision, WillDecision::Scheduled(_)));
    assert_eq!(wills.scheduled_wills(), 1);

    tokio::time::sleep(Duration::from_millis(4_999)).await;
    assert_eq!(dispatcher.count(), 0);

    tokio::time::sleep(Duration::from_millis(2)).await;
    let sent = dispatcher.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.client_id(), "client-a");
    assert_eq!(sent[0].1.topic_name, "devices/client-a/status");
    assert_eq!(wills.scheduled_wills(), 0);
}

#[tokio::test(start_paused = true)]
async fn reconnect_within_delay_window_suppresses_will() {
    let dispatcher = RecordingDispatcher::new();
    let wills = wills(&dispatcher);
    let b = session("node-1", "client-b", true);
    wills.save_last_will_msg(&b, will_msg("client-b", Some(5)));
    wills.remove_and_execute_last_will_if_needed(b.session_id, true, true);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(wills.cancel_last_will_delay_if_scheduled("client-b"));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(dispatcher.count(), 0);
    assert_eq!(wills.scheduled_wills(), 0);
}

#[tokio::test(start_paused = true)]
async fn non_clean_restart_with_delay_drops_will() {
    let dispatcher = RecordingDispatcher::new();
    let wills = wills(&dispatcher);
    let a = session("node-1", "client-a", false);
    wills.save_last_will_msg(&a, will_msg("client-a", Some(5)));

    let decision = wills.remove_and_execute_last_will_if_needed(a.session_id, true, false);
    assert!(matches!(decision, WillDecision::Deferred));
    assert_eq!(wills.pending_wills(), 0);
    assert_eq!(wills.scheduled_wills(), 0);

    // A second disconnect call finds nothing to fire.
    let again = wills.remove_and_execute_last_will_if_needed(a.session_id, true, true);
    assert!(matches!(again, WillDecision::Absent));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(dispatcher.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn absent_delay_property_fires_immediately() {
    let dispatcher = RecordingDispatcher::new();
    let wills = wills(&dispatcher);
    let a = session("node-1", "client-a", false);
    wills.save_last_will_msg(&a, will_msg("client-a", None));
    wills.remove_and_execute_last_will_if_needed(a.session_id, true, false);
    settle().await;
    assert_eq!(dispatcher.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_save_keeps_last_write() {
    let dispatcher = RecordingDispatcher::new();
    let wills = wills(&dispatcher);
    let a = session("node-1", "client-a", true);
    let (logs, _guard) = LogCapture::install();
    wills.save_last_will_msg(&a, will_msg("first", None));
    assert_eq!(logs.count("ERROR", "saved already"), 0);
    wills.save_last_will_msg(&a, will_msg("second", None));
    assert_eq!(wills.pending_wills(), 1);
    assert_eq!(logs.count("ERROR", "saved already"), 1);

    wills.remove_and_execute_last_will_if_needed(a.session_id, true, true);
    settle().await;
    let sent = dispatcher.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.topic_name, "devices/second/status");
}

#[tokio::test(start_paused = true)]
async fn concurrent_removals_fire_once() {
    let dispatcher = RecordingDispatcher::new();
    let wills = wills(&dispatcher);
    let a = session("node-1", "client-a", true);
    wills.save_last_will_msg(&a, will_msg("client-a", None));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let wills = wills.clone();
        let session_id = a.session_id;
        handles.push(tokio::spawn(async move {
            wills.remove_and_execute_last_will_if_needed(session_id, true, true)
        }));
    }
    let mut scheduled = 0;
    for handle in handles {
        if matches!(handle.await.unwrap(), WillDecision::Scheduled(_)) {
            scheduled += 1;
        }
    }
    settle().await;
    assert_eq!(scheduled, 1);
    assert_eq!(dispatcher.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn retained_will_is_stored_before_dispatch() {
    let dispatcher = RecordingDispatcher::new();
    let retained = Arc::new(MemoryRetainedProcessor::new());
    let wills = LastWillService::new("last-will-scheduler", dispatcher.clone(), retained.clone());
    let a = session("node-1", "client-a", true);
    wills.save_last_will_msg(&a, will_msg("client-a", Some(1)).with_retain(true));
    wills.remove_and_execute_last_will_if_needed(a.session_id, true, true);

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(dispatcher.count(), 1);
    let record = retained.fetch("devices/client-a/status").unwrap();
    assert_eq!(&record.payload[..], b"offline");
}

#[tokio::test(start_paused = true)]
async fn failed_dispatch_is_logged_not_retried() {
    let dispatcher = RecordingDispatcher::failing();
    let wills = wills(&dispatcher);
    let (logs, _guard) = LogCapture::install();
    let a = session("node-1", "client-a", true);
    wills.save_last_will_msg(&a, will_msg("client-a", None));
    wills.remove_and_execute_last_will_if_needed(a.session_id, true, true);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(dispatcher.count(), 1);
    assert_eq!(wills.pending_wills(), 0);
    assert_eq!(logs.count("WARN", "failed to acknowledge last will msg"), 1);
    assert_eq!(logs.count("WARN", "publish topic unavailable"), 1);
}

#[tokio::test(start_paused = true)]
async fn will_delay_follows_injected_clock() {
    let dispatcher = RecordingDispatcher::new();
    let clock = TestClock::new();
    let wills = LastWillService::with_clock(
        "last-will-scheduler",
        clock.clone(),
        dispatcher.clone(),
        Arc::new(NoopRetained),
    );
    let a = session("node-1", "client-a", true);
    wills.save_last_will_msg(&a, will_msg("client-a", Some(30)));
    let decision = wills.remove_and_execute_last_will_if_needed(a.session_id, true, true);
    assert!(matches!(decision, WillDecision::Scheduled(_)));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(dispatcher.count(), 0);

    clock.advance(Duration::from_secs(29));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(dispatcher.count(), 0);

    clock.advance(Duration::from_secs(1));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(dispatcher.count(), 1);
    assert_eq!(wills.scheduled_wills(), 0);
}
