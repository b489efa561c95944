mod common;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use rusty_dj::commands::music::utils::session::{
    Advance, DisconnectTimer, Enqueued, SessionRegistry, next_timer_id,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::fixtures::{guild, song, text_channel};

const IDLE: Duration = Duration::from_secs(15);

fn open_registry() -> SessionRegistry {
    common::init_tracing();
    let registry = SessionRegistry::default();
    registry.open(guild(), text_channel(), None);
    registry
}

fn next_title(registry: &SessionRegistry) -> Option<String> {
    match registry.advance(guild()) {
        Advance::Next(song) => Some(song.title),
        _ => None,
    }
}

/// A timer that raises `fired` if it is allowed to run to completion.
fn flag_timer(fired: Arc<AtomicBool>) -> DisconnectTimer {
    let id = next_timer_id();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(IDLE).await;
        fired.store(true, Ordering::SeqCst);
    });
    DisconnectTimer::new(id, handle)
}

#[test]
fn first_song_on_idle_guild_plays_now() {
    let registry = open_registry();

    let outcome = registry.enqueue(guild(), vec![song("Bohemian Rhapsody")]);

    assert_eq!(outcome, Some(Enqueued::PlayNow { queued: 1 }));
    // Reserved as playing before the song is even started
    assert_eq!(
        registry.enqueue(guild(), vec![song("Under Pressure")]),
        Some(Enqueued::Queued { first: 2, last: 2 })
    );
}

#[test]
fn songs_behind_the_current_one_get_their_queue_position() {
    let registry = open_registry();
    registry.enqueue(guild(), vec![song("A")]);
    assert_eq!(next_title(&registry), Some("A".to_string()));

    assert_eq!(
        registry.enqueue(guild(), vec![song("B")]),
        Some(Enqueued::Queued { first: 1, last: 1 })
    );
    assert_eq!(
        registry.enqueue(guild(), vec![song("C")]),
        Some(Enqueued::Queued { first: 2, last: 2 })
    );
    assert_eq!(
        registry.enqueue(guild(), vec![song("D"), song("E"), song("F")]),
        Some(Enqueued::Queued { first: 3, last: 5 })
    );
}

#[test]
fn queue_is_played_in_fifo_order() {
    let registry = open_registry();
    registry.enqueue(guild(), vec![song("one"), song("two")]);
    registry.enqueue(guild(), vec![song("three")]);

    let order: Vec<String> = std::iter::from_fn(|| next_title(&registry)).collect();

    assert_eq!(order, vec!["one", "two", "three"]);
}

#[test]
fn empty_queue_makes_the_guild_idle() {
    let registry = open_registry();
    registry.enqueue(guild(), vec![song("only")]);
    registry.advance(guild());
    assert!(registry.current_song(guild()).is_some());

    assert_eq!(registry.advance(guild()), Advance::Drained);
    assert_eq!(registry.current_song(guild()), None);

    // A new request after draining starts playback again
    assert_matches!(
        registry.enqueue(guild(), vec![song("again")]),
        Some(Enqueued::PlayNow { .. })
    );
}

#[test]
fn snapshot_lists_current_and_upcoming() {
    let registry = open_registry();
    registry.enqueue(guild(), vec![song("now"), song("next"), song("later")]);
    registry.advance(guild());

    let snapshot = registry.snapshot(guild()).unwrap();

    assert_eq!(snapshot.current.clone().map(|s| s.title), Some("now".to_string()));
    assert_eq!(
        snapshot.upcoming.iter().map(|s| s.title.as_str()).collect::<Vec<_>>(),
        vec!["next", "later"]
    );
    assert_eq!(snapshot.upcoming_duration(), Duration::from_secs(360));
}

#[test]
fn unknown_guild_has_no_session() {
    let registry = SessionRegistry::default();

    assert_eq!(registry.enqueue(guild(), vec![song("x")]), None);
    assert_eq!(registry.advance(guild()), Advance::Closed);
    assert_eq!(registry.record_failure(guild()), None);
    assert!(registry.snapshot(guild()).is_none());
    assert!(registry.remove(guild()).is_none());
}

#[test]
fn remove_is_idempotent() {
    let registry = open_registry();
    registry.enqueue(guild(), vec![song("x")]);

    assert!(registry.remove(guild()).is_some());
    assert!(registry.remove(guild()).is_none());
    assert!(!registry.contains(guild()));
}

#[test]
fn failures_count_up_until_reset() {
    let registry = open_registry();

    let failures = || registry.record_failure(guild()).map(|streak| streak.failures);

    assert_eq!(failures(), Some(1));
    assert_eq!(failures(), Some(2));
    registry.reset_failures(guild());
    assert_eq!(failures(), Some(1));
}

#[test]
fn reopened_guild_gets_a_new_session_id() {
    let registry = open_registry();
    let session_id = || registry.record_failure(guild()).map(|streak| streak.session_id);
    let first = session_id().unwrap();

    registry.open(guild(), text_channel(), None);
    assert_eq!(session_id(), Some(first));

    registry.remove(guild());
    registry.open(guild(), text_channel(), None);
    assert_ne!(session_id(), Some(first));
}

#[tokio::test(start_paused = true)]
async fn stale_advance_leaves_the_new_session_alone() {
    let registry = open_registry();
    registry.enqueue(guild(), vec![song("fails to stream")]);
    registry.advance(guild());
    let old_session = registry.record_failure(guild()).unwrap().session_id;

    // stop, then play X before the old retry wakes up
    registry.remove(guild()).unwrap().shutdown();
    registry.open(guild(), text_channel(), None);
    registry.enqueue(guild(), vec![song("X")]);
    assert_matches!(registry.advance(guild()), Advance::Next(song) if song.title == "X");

    assert_eq!(registry.advance_session(guild(), old_session), Advance::Closed);

    assert_eq!(
        registry.current_song(guild()).map(|s| s.title),
        Some("X".to_string())
    );
    let fired = Arc::new(AtomicBool::new(false));
    assert!(!registry.arm_disconnect(guild(), flag_timer(fired.clone())));

    // The live session still advances normally
    let current = registry.record_failure(guild()).unwrap().session_id;
    assert_ne!(current, old_session);
    assert_eq!(registry.advance_session(guild(), current), Advance::Drained);
}

#[tokio::test(start_paused = true)]
async fn enqueue_cancels_the_idle_timer() {
    let registry = open_registry();
    let fired = Arc::new(AtomicBool::new(false));

    assert!(registry.arm_disconnect(guild(), flag_timer(fired.clone())));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_matches!(
        registry.enqueue(guild(), vec![song("just in time")]),
        Some(Enqueued::PlayNow { queued: 1 })
    );

    tokio::time::sleep(IDLE * 2).await;
    assert!(!fired.load(Ordering::SeqCst));
    assert!(registry.contains(guild()));
}

#[tokio::test(start_paused = true)]
async fn timer_is_refused_while_playing() {
    let registry = open_registry();
    registry.enqueue(guild(), vec![song("playing")]);
    let fired = Arc::new(AtomicBool::new(false));

    assert!(!registry.arm_disconnect(guild(), flag_timer(fired.clone())));

    tokio::time::sleep(IDLE * 2).await;
    assert!(!fired.load(Ordering::SeqCst));
    assert!(registry.contains(guild()));
}

#[tokio::test(start_paused = true)]
async fn rearming_replaces_the_previous_timer() {
    let registry = open_registry();
    let first_fired = Arc::new(AtomicBool::new(false));
    let second_fired = Arc::new(AtomicBool::new(false));

    let first = flag_timer(first_fired.clone());
    let first_id = first.id;
    assert!(registry.arm_disconnect(guild(), first));

    let second = flag_timer(second_fired.clone());
    let second_id = second.id;
    assert!(registry.arm_disconnect(guild(), second));

    assert!(registry.take_expired(guild(), first_id).is_none());
    assert!(registry.contains(guild()));

    tokio::time::sleep(IDLE * 2).await;
    assert!(!first_fired.load(Ordering::SeqCst));
    assert!(second_fired.load(Ordering::SeqCst));

    assert!(registry.take_expired(guild(), second_id).is_some());
    assert!(!registry.contains(guild()));
}

#[tokio::test(start_paused = true)]
async fn shutting_a_session_down_cancels_its_timer() {
    let registry = open_registry();
    let fired = Arc::new(AtomicBool::new(false));
    let timer = flag_timer(fired.clone());
    let id = timer.id;
    assert!(registry.arm_disconnect(guild(), timer));

    registry.remove(guild()).unwrap().shutdown();

    tokio::time::sleep(IDLE * 2).await;
    assert!(!fired.load(Ordering::SeqCst));
    assert!(registry.take_expired(guild(), id).is_none());
}

#[tokio::test(start_paused = true)]
async fn drained_guild_is_removed_when_the_timer_fires() {
    let registry = Arc::new(open_registry());
    registry.enqueue(guild(), vec![song("last song")]);
    registry.advance(guild());
    assert_eq!(registry.advance(guild()), Advance::Drained);

    let finished = Arc::new(AtomicBool::new(false));
    let id = next_timer_id();
    let handle = {
        let registry = registry.clone();
        let finished = finished.clone();
        tokio::spawn(async move {
            tokio::time::sleep(IDLE).await;
            if let Some(mut session) = registry.take_expired(guild(), id) {
                session.shutdown();
                finished.store(true, Ordering::SeqCst);
            }
        })
    };
    assert!(registry.arm_disconnect(guild(), DisconnectTimer::new(id, handle)));

    tokio::time::sleep(IDLE - Duration::from_secs(1)).await;
    assert!(registry.contains(guild()));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(finished.load(Ordering::SeqCst));
    assert!(!registry.contains(guild()));

    // Cleaning up again afterwards is a no-op
    assert!(registry.remove(guild()).is_none());
}
