// Integration tests for the per-Area dispatch workers (paused tokio clock)

mod common;

use area::Cursor;
use area_engine::areas::AreaPatch;
use common::{Harness, Seen, FAST_ACTION, SLOW_ACTION};
use std::time::Duration;

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

fn seen(cursor: &Cursor) -> u64 {
    cursor.decode::<Seen>().map(|s| s.seen).unwrap_or(0)
}

/// Polls start one effective interval apart.
#[tokio::test(start_paused = true)]
async fn test_polls_respect_area_interval() {
    let h = Harness::new();
    let (user_id, _) = h.user("alice");
    h.service.create(user_id, &h.new_area(SLOW_ACTION, 30)).unwrap();

    advance(95).await;

    let polls = h.script.poll_times();
    assert!(polls.len() >= 3, "expected at least 3 polls, got {}", polls.len());
    assert!(polls.len() <= 4, "expected at most 4 polls, got {}", polls.len());
    for pair in polls.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_secs(30));
    }
}

/// An Area interval below the Action minimum is raised to the minimum.
#[tokio::test(start_paused = true)]
async fn test_action_minimum_interval_wins() {
    let h = Harness::new();
    let (user_id, _) = h.user("alice");
    h.service.create(user_id, &h.new_area(SLOW_ACTION, 0)).unwrap();

    advance(25).await;

    let polls = h.script.poll_times();
    assert_eq!(polls.len(), 3);
    for pair in polls.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_secs(10));
    }
}

/// With no floor at all the worker still does not spin.
#[tokio::test(start_paused = true)]
async fn test_zero_interval_is_throttled() {
    let h = Harness::new();
    let (user_id, _) = h.user("alice");
    h.service.create(user_id, &h.new_area(FAST_ACTION, 0)).unwrap();

    advance(10).await;

    let polls = h.script.poll_times();
    assert!(polls.len() >= 9 && polls.len() <= 11, "got {} polls", polls.len());
}

/// One upstream event fires the Reaction exactly once.
#[tokio::test(start_paused = true)]
async fn test_event_fires_once() {
    let h = Harness::new();
    let (user_id, _) = h.user("alice");
    let area = h.service.create(user_id, &h.new_area(FAST_ACTION, 0)).unwrap();

    h.script.emit();
    advance(20).await;

    assert_eq!(h.script.fire_count(), 1);
    let results = h.results.find_by_area(area.id).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].result, "recorded 1");

    h.script.emit();
    advance(5).await;
    assert_eq!(h.script.fire_count(), 2);
    assert_eq!(h.results.find_by_area(area.id).unwrap().len(), 2);

    let status = h.engine.status(area.id).await.unwrap();
    assert_eq!(status.fire_count, 2);
    assert!(status.poll_count > 2);
    assert!(status.last_fire.is_some());
}

/// The Reaction only runs after the cursor marking its event is durable.
#[tokio::test(start_paused = true)]
async fn test_cursor_persisted_before_reaction() {
    let h = Harness::new();
    let (user_id, _) = h.user("alice");
    let area = h.service.create(user_id, &h.new_area(FAST_ACTION, 0)).unwrap();

    h.script.emit();
    advance(3).await;

    let cursors = h.script.cursors_at_fire.lock().unwrap().clone();
    assert_eq!(cursors.len(), 1);
    assert_eq!(seen(&cursors[0]), 1);

    let stored = h.areas.find_by_id(area.id).unwrap().unwrap();
    assert_eq!(seen(&stored.cursor), 1);
}

/// A failing Reaction does not replay its event.
#[tokio::test(start_paused = true)]
async fn test_failed_reaction_is_not_retried() {
    let h = Harness::new();
    let (user_id, _) = h.user("alice");
    let area = h.service.create(user_id, &h.new_area(FAST_ACTION, 0)).unwrap();

    h.script
        .fail_reaction
        .store(true, std::sync::atomic::Ordering::SeqCst);
    h.script.emit();
    advance(10).await;

    assert_eq!(h.script.fire_count(), 1);
    assert!(h.results.find_by_area(area.id).unwrap().is_empty());
    let stored = h.areas.find_by_id(area.id).unwrap().unwrap();
    assert_eq!(seen(&stored.cursor), 1);
}

/// Poll failures are counted and cleared by the next good poll.
#[tokio::test(start_paused = true)]
async fn test_poll_failures_are_tracked() {
    let h = Harness::new();
    let (user_id, _) = h.user("alice");
    let area = h.service.create(user_id, &h.new_area(FAST_ACTION, 0)).unwrap();

    h.script
        .fail_poll
        .store(true, std::sync::atomic::Ordering::SeqCst);
    advance(4).await;

    let status = h.engine.status(area.id).await.unwrap();
    assert!(status.consecutive_failures >= 3);
    assert!(status
        .last_error
        .as_deref()
        .unwrap()
        .contains("unable to poll script_event_fast"));
    assert!(h.engine.is_running(area.id));

    h.script
        .fail_poll
        .store(false, std::sync::atomic::Ordering::SeqCst);
    advance(2).await;

    let status = h.engine.status(area.id).await.unwrap();
    assert_eq!(status.consecutive_failures, 0);
    assert!(status.last_error.is_none());
}

/// Disabling an Area mid-sleep stops it before the next poll.
#[tokio::test(start_paused = true)]
async fn test_disable_stops_worker() {
    let h = Harness::new();
    let (user_id, _) = h.user("alice");
    let area = h.service.create(user_id, &h.new_area(SLOW_ACTION, 60)).unwrap();

    advance(1).await;
    assert_eq!(h.script.poll_times().len(), 1);

    h.service
        .update(
            user_id,
            area.id,
            AreaPatch {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
    h.script.emit();
    advance(200).await;

    assert_eq!(h.script.poll_times().len(), 1);
    assert_eq!(h.script.fire_count(), 0);
    assert!(!h.engine.is_running(area.id));

    // Re-enabling resumes from the stored cursor and picks the event up.
    h.service
        .update(
            user_id,
            area.id,
            AreaPatch {
                enabled: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
    advance(1).await;
    assert_eq!(h.script.fire_count(), 1);
}

/// Deleting an Area stops its worker and removes its results.
#[tokio::test(start_paused = true)]
async fn test_delete_stops_worker() {
    let h = Harness::new();
    let (user_id, _) = h.user("alice");
    let area = h.service.create(user_id, &h.new_area(FAST_ACTION, 0)).unwrap();

    h.script.emit();
    advance(2).await;
    assert_eq!(h.results.find_by_area(area.id).unwrap().len(), 1);

    h.service.delete(user_id, area.id).unwrap();
    let polls = h.script.poll_times().len();
    h.script.emit();
    advance(10).await;

    assert_eq!(h.script.poll_times().len(), polls);
    assert_eq!(h.script.fire_count(), 1);
    assert!(h.results.find_by_area(area.id).unwrap().is_empty());
    assert!(!h.engine.is_running(area.id));
}

/// A restarted worker resumes from the persisted cursor without replaying.
#[tokio::test(start_paused = true)]
async fn test_restart_resumes_from_cursor() {
    let h = Harness::new();
    let (user_id, _) = h.user("alice");
    let area = h.service.create(user_id, &h.new_area(FAST_ACTION, 0)).unwrap();

    h.script.emit();
    advance(3).await;
    assert_eq!(h.script.fire_count(), 1);

    assert!(h.engine.stop_area(area.id));
    advance(1).await;
    h.engine.start_area(area.id);
    advance(5).await;

    assert_eq!(h.script.fire_count(), 1);
    assert!(h.engine.is_running(area.id));
}

/// A result finishing after its Area was deleted leaves no row behind.
#[tokio::test(start_paused = true)]
async fn test_result_of_deleted_area_is_dropped() {
    let h = Harness::new();
    let (user_id, _) = h.user("alice");
    let area = h.service.create(user_id, &h.new_area(FAST_ACTION, 0)).unwrap();

    h.script
        .delete_areas_on_fire
        .store(true, std::sync::atomic::Ordering::SeqCst);
    h.script.emit();
    advance(5).await;

    assert_eq!(h.script.fire_count(), 1);
    assert!(h.results.find_by_area(area.id).unwrap().is_empty());
    assert!(!h.engine.is_running(area.id));
}

/// An interval at the storage limit sleeps without overflowing the clock.
#[tokio::test(start_paused = true)]
async fn test_largest_interval_polls_once() {
    let h = Harness::new();
    let (user_id, _) = h.user("alice");
    let area = h
        .service
        .create(user_id, &h.new_area(SLOW_ACTION, i64::MAX as u64))
        .unwrap();

    advance(600).await;

    assert_eq!(h.script.poll_times().len(), 1);
    assert!(h.engine.is_running(area.id));
    h.engine.shutdown().await;
}

/// Boot starts a worker for every enabled Area and shutdown stops them all.
#[tokio::test(start_paused = true)]
async fn test_start_and_shutdown() {
    let h = Harness::new();
    let (user_id, _) = h.user("alice");
    h.areas.insert(user_id, &h.new_area(SLOW_ACTION, 0)).unwrap();
    h.areas.insert(user_id, &h.new_area(FAST_ACTION, 0)).unwrap();

    assert_eq!(h.engine.start().unwrap(), 2);
    advance(1).await;
    assert_eq!(h.engine.running_count(), 2);

    h.engine.shutdown().await;
    assert_eq!(h.engine.running_count(), 0);

    let polls = h.script.poll_times().len();
    advance(30).await;
    assert_eq!(h.script.poll_times().len(), polls);
}

/// A worker whose Area vanished underneath it exits on its next tick.
#[tokio::test(start_paused = true)]
async fn test_worker_exits_when_area_removed() {
    let h = Harness::new();
    let (user_id, _) = h.user("alice");
    let area = h.areas.insert(user_id, &h.new_area(SLOW_ACTION, 0)).unwrap();
    h.engine.start_area(area.id);
    advance(1).await;

    h.areas.delete(area.id).unwrap();
    advance(11).await;

    assert!(!h.engine.is_running(area.id));
    assert_eq!(h.engine.running_count(), 0);
}
