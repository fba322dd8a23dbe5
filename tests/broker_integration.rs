//! Integration tests for the broker lifecycle
//!
//! Drives complete broker runs over in-memory links, scripted links and
//! recorded frame logs, observing them only through the subscriber queues,
//! the handle and the link counters.

use bytes::Bytes;
use s7_broker::broker::{Broker, BrokerMessage, BrokerOptions, BrokerState, StopSignal};
use s7_broker::broker::{HandoffQueue, TerminateReason};
use s7_broker::codec::frame_log::format_line;
use s7_broker::codec::Value;
use s7_broker::consumer::{run_consumer, ConsumerExit, JsonLinesSink};
use s7_broker::link::{Failures, MemoryLink, PlcLink};
use s7_broker::source::{LiveFrameSource, ReplayFrameSource};
use s7_broker::{BrokerError, Schema, SchemaRow};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Helpers
// =============================================================================

fn tank_schema() -> Schema {
    Schema::load(&[
        SchemaRow::new("iT1_LVL", "Int", "0"),
        SchemaRow::new("iT1_DIS_FL", "Int", "2"),
        SchemaRow::new("iT1_SP", "Int", "4"),
        SchemaRow::new("rT1_MV", "Real", "6"),
        SchemaRow::new("xT1_PUMP", "Bool", "10.1"),
    ])
    .unwrap()
}

fn tank_image() -> Vec<u8> {
    let mut image = vec![0u8; 11];
    image[0..2].copy_from_slice(&33i16.to_be_bytes());
    image[2..4].copy_from_slice(&12i16.to_be_bytes());
    image[4..6].copy_from_slice(&66i16.to_be_bytes());
    image[6..10].copy_from_slice(&10.5f32.to_be_bytes());
    image[10] = 0b0000_0010;
    image
}

fn fast_options() -> BrokerOptions {
    BrokerOptions {
        poll_interval: Duration::from_millis(10),
        reconnect_attempts: 3,
        reconnect_delay: Duration::from_millis(20),
        queue_capacity: 64,
        record_path: None,
    }
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("s7broker_{}_{}.txt", name, std::process::id()))
}

/// Pop until `Terminate` (inclusive)
fn collect_until_terminate(queue: &HandoffQueue<BrokerMessage>) -> Vec<BrokerMessage> {
    let mut messages = Vec::new();
    while let Some(message) = queue.pop_timeout(WAIT) {
        let done = message.is_terminate();
        messages.push(message);
        if done {
            break;
        }
    }
    messages
}

fn next_snapshot(queue: &HandoffQueue<BrokerMessage>) -> s7_broker::ValueSnapshot {
    loop {
        match queue.pop_timeout(WAIT) {
            Some(BrokerMessage::Snapshot(snapshot)) => return snapshot,
            Some(_) => continue,
            None => panic!("no snapshot within {:?}", WAIT),
        }
    }
}

fn terminations(messages: &[BrokerMessage]) -> Vec<TerminateReason> {
    messages
        .iter()
        .filter_map(|m| match m {
            BrokerMessage::Terminate(reason) => Some(*reason),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Scripted link
// =============================================================================

/// Link whose first connect succeeds and every later call fails
#[derive(Default)]
struct FlakyLink {
    connected: bool,
    connects: Arc<AtomicU32>,
    disconnects: Arc<AtomicU32>,
}

impl PlcLink for FlakyLink {
    fn connect(&mut self, address: &str) -> s7_broker::Result<()> {
        let previous = self.connects.fetch_add(1, Ordering::SeqCst);
        if previous == 0 {
            self.connected = true;
            return Ok(());
        }
        Err(BrokerError::Connect {
            address: address.to_string(),
            reason: "host unreachable".into(),
        })
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn read_area(&mut self, start: usize, length: usize) -> s7_broker::Result<Bytes> {
        Err(BrokerError::Read {
            start,
            length,
            reason: "connection reset".into(),
        })
    }

    fn disconnect(&mut self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected = false;
    }
}

// =============================================================================
// Lifecycle tests
// =============================================================================

#[test]
fn test_reconnect_budget_then_single_terminate() {
    let link = FlakyLink::default();
    let connects = link.connects.clone();
    let disconnects = link.disconnects.clone();

    let mut broker = Broker::new(
        LiveFrameSource::new(link, "10.0.0.1:102"),
        tank_schema(),
        fast_options(),
    )
    .unwrap();
    let queue = broker.subscribe();

    let started = Instant::now();
    let handle = broker.spawn().unwrap();
    let messages = collect_until_terminate(&queue);
    let elapsed = started.elapsed();

    assert_eq!(
        messages,
        vec![
            BrokerMessage::ReconnectNotice {
                attempt: 1,
                max_attempts: 3
            },
            BrokerMessage::ReconnectNotice {
                attempt: 2,
                max_attempts: 3
            },
            BrokerMessage::ReconnectNotice {
                attempt: 3,
                max_attempts: 3
            },
            BrokerMessage::Terminate(TerminateReason::ReconnectExhausted),
        ]
    );
    // The delay is waited before every attempt
    assert!(elapsed >= Duration::from_millis(60));

    let stats = handle.stats().clone();
    assert_eq!(handle.join(), Some(TerminateReason::ReconnectExhausted));
    assert!(queue.is_empty());

    // Initial connect + 3 reconnects
    assert_eq!(connects.load(Ordering::SeqCst), 4);
    // Dropped once after the failed read, not again on exit
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(stats.read_failures(), 1);
    assert_eq!(stats.reconnect_attempts(), 3);
    assert_eq!(stats.snapshots_published(), 0);
}

#[test]
fn test_terminated_state_after_exhaustion() {
    let mut broker = Broker::new(
        LiveFrameSource::new(FlakyLink::default(), "10.0.0.1:102"),
        tank_schema(),
        fast_options(),
    )
    .unwrap();
    let queue = broker.subscribe();
    let handle = broker.spawn().unwrap();

    collect_until_terminate(&queue);
    while !handle.is_finished() {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(handle.state(), BrokerState::Terminated);
}

#[test]
fn test_initial_connect_failure_is_not_retried() {
    let link = MemoryLink::new(tank_image());
    let control = link.control();
    control.fail_connects(Failures::Always);

    let mut broker = Broker::new(
        LiveFrameSource::new(link, "10.0.0.1:102"),
        tank_schema(),
        fast_options(),
    )
    .unwrap();
    let queue = broker.subscribe();
    let handle = broker.spawn().unwrap();

    let messages = collect_until_terminate(&queue);
    assert_eq!(
        messages,
        vec![BrokerMessage::Terminate(TerminateReason::ConnectFailed)]
    );
    assert_eq!(handle.join(), Some(TerminateReason::ConnectFailed));

    assert_eq!(control.connect_calls(), 1);
    assert_eq!(control.read_calls(), 0);
    // Released on this exit path too
    assert_eq!(control.disconnect_calls(), 1);
}

#[test]
fn test_read_failure_recovers_and_resumes() {
    let link = MemoryLink::new(tank_image());
    let control = link.control();
    control.fail_reads(Failures::Next(1));

    let mut broker = Broker::new(
        LiveFrameSource::new(link, "10.0.0.1:102"),
        tank_schema(),
        fast_options(),
    )
    .unwrap();
    let queue = broker.subscribe();
    let handle = broker.spawn().unwrap();

    assert_eq!(
        queue.pop_timeout(WAIT),
        Some(BrokerMessage::ReconnectNotice {
            attempt: 1,
            max_attempts: 3
        })
    );
    let snapshot = next_snapshot(&queue);
    assert_eq!(snapshot.sequence(), 1);
    assert_eq!(snapshot.get("iT1_LVL"), Some(Value::Int(33)));

    handle.stop();
    let messages = collect_until_terminate(&queue);
    assert_eq!(terminations(&messages), [TerminateReason::Stopped]);
    assert_eq!(handle.join(), Some(TerminateReason::Stopped));

    // Initial connect + one reconnect
    assert_eq!(control.connect_calls(), 2);
}

#[test]
fn test_stop_during_sleep_disconnects_once() {
    let link = MemoryLink::new(tank_image());
    let control = link.control();

    let options = BrokerOptions {
        poll_interval: Duration::from_secs(30),
        ..fast_options()
    };
    let mut broker = Broker::new(
        LiveFrameSource::new(link, "10.0.0.1:102"),
        tank_schema(),
        options,
    )
    .unwrap();
    let queue = broker.subscribe();
    let handle = broker.spawn().unwrap();

    // Broker is now sleeping out its poll interval
    let snapshot = next_snapshot(&queue);
    assert_eq!(snapshot.get("xT1_PUMP"), Some(Value::Bit(true)));

    let stopped_at = Instant::now();
    handle.stop();
    let messages = collect_until_terminate(&queue);
    assert!(stopped_at.elapsed() < Duration::from_secs(5));

    assert_eq!(
        messages,
        vec![BrokerMessage::Terminate(TerminateReason::Stopped)]
    );
    assert_eq!(handle.join(), Some(TerminateReason::Stopped));
    assert_eq!(control.disconnect_calls(), 1);
    assert!(!control.is_connected());
}

#[test]
fn test_stop_during_reconnect_delay_disconnects_once() {
    let link = MemoryLink::new(tank_image());
    let control = link.control();
    control.fail_reads(Failures::Always);

    let options = BrokerOptions {
        reconnect_delay: Duration::from_secs(30),
        ..fast_options()
    };
    let mut broker = Broker::new(
        LiveFrameSource::new(link, "10.0.0.1:102"),
        tank_schema(),
        options,
    )
    .unwrap();
    let queue = broker.subscribe();
    let handle = broker.spawn().unwrap();

    // Broker is now waiting out the first reconnect delay
    assert_eq!(
        queue.pop_timeout(WAIT),
        Some(BrokerMessage::ReconnectNotice {
            attempt: 1,
            max_attempts: 3
        })
    );

    let stopped_at = Instant::now();
    handle.stop();
    let messages = collect_until_terminate(&queue);
    assert!(stopped_at.elapsed() < Duration::from_secs(5));

    assert_eq!(
        messages,
        vec![BrokerMessage::Terminate(TerminateReason::Stopped)]
    );
    assert_eq!(handle.join(), Some(TerminateReason::Stopped));
    assert_eq!(control.connect_calls(), 1);
    assert_eq!(control.disconnect_calls(), 1);
}

#[test]
fn test_stop_is_idempotent() {
    let link = MemoryLink::new(tank_image());
    let control = link.control();

    let mut broker = Broker::new(
        LiveFrameSource::new(link, "10.0.0.1:102"),
        tank_schema(),
        fast_options(),
    )
    .unwrap();
    let queue = broker.subscribe();
    let handle = broker.spawn().unwrap();
    next_snapshot(&queue);

    handle.stop();
    handle.stop();
    collect_until_terminate(&queue);
    while !handle.is_finished() {
        std::thread::sleep(Duration::from_millis(5));
    }

    // After termination: no effect at all
    handle.stop();
    assert_eq!(handle.state(), BrokerState::Disconnected);
    assert!(queue.pop_timeout(Duration::from_millis(50)).is_none());
    assert_eq!(handle.join(), Some(TerminateReason::Stopped));
    assert_eq!(control.disconnect_calls(), 1);
}

#[test]
fn test_run_on_caller_thread_with_stop_already_set() {
    let link = MemoryLink::new(tank_image());
    let control = link.control();

    let mut broker = Broker::new(
        LiveFrameSource::new(link, "10.0.0.1:102"),
        tank_schema(),
        fast_options(),
    )
    .unwrap();
    let queue = broker.subscribe();

    let stop = StopSignal::new();
    stop.stop();
    assert_eq!(broker.run(stop), TerminateReason::Stopped);

    assert_eq!(
        queue.try_pop(),
        Some(BrokerMessage::Terminate(TerminateReason::Stopped))
    );
    assert_eq!(control.read_calls(), 0);
}

// =============================================================================
// Hand-off tests
// =============================================================================

#[test]
fn test_slow_consumer_sees_latest_snapshot() {
    let link = MemoryLink::new(tank_image());

    let options = BrokerOptions {
        poll_interval: Duration::from_millis(2),
        ..fast_options()
    };
    let mut broker = Broker::new(
        LiveFrameSource::new(link, "10.0.0.1:102"),
        tank_schema(),
        options,
    )
    .unwrap();
    let queue = broker.subscribe_with_capacity(2);
    let handle = broker.spawn().unwrap();

    // Let several cycles pile up without consuming
    while handle.stats().snapshots_published() < 5 {
        std::thread::sleep(Duration::from_millis(5));
    }
    handle.stop();
    let stats = handle.stats().clone();
    assert_eq!(handle.join(), Some(TerminateReason::Stopped));

    assert_eq!(queue.len(), 2);
    match queue.try_pop() {
        Some(BrokerMessage::Snapshot(snapshot)) => {
            assert_eq!(snapshot.sequence(), stats.snapshots_published());
        }
        other => panic!("expected the latest snapshot, got {:?}", other),
    }
    assert_eq!(
        queue.try_pop(),
        Some(BrokerMessage::Terminate(TerminateReason::Stopped))
    );
    assert!(stats.evicted() >= 4);
}

#[test]
fn test_frame_rate_reflects_polling() {
    let link = MemoryLink::new(tank_image());
    let mut broker = Broker::new(
        LiveFrameSource::new(link, "10.0.0.1:102"),
        tank_schema(),
        fast_options(),
    )
    .unwrap();
    let _queue = broker.subscribe();
    let handle = broker.spawn().unwrap();

    std::thread::sleep(Duration::from_millis(700));
    let stats = handle.stats().clone();
    let rate = stats.update_rate();
    handle.stop();
    assert_eq!(handle.join(), Some(TerminateReason::Stopped));

    // Polling every 10 ms: at most ~100 frames/s
    assert!(rate > 0.0);
    assert!(rate < 150.0);
}

#[test]
fn test_every_subscriber_gets_every_message() {
    let path = temp_path("subscribers");
    let frame = tank_image();
    std::fs::write(
        &path,
        format!("{}\n{}\n", format_line(&frame), format_line(&frame)),
    )
    .unwrap();

    let mut broker =
        Broker::new(ReplayFrameSource::new(&path), tank_schema(), fast_options()).unwrap();
    let first = broker.subscribe();
    let second = broker.subscribe_with_capacity(8);
    let handle = broker.spawn().unwrap();

    let a = collect_until_terminate(&first);
    let b = collect_until_terminate(&second);
    assert_eq!(handle.join(), Some(TerminateReason::EndOfStream));

    assert_eq!(a, b);
    assert_eq!(a.len(), 3);
    assert_eq!(terminations(&a), [TerminateReason::EndOfStream]);

    let _ = std::fs::remove_file(&path);
}

// =============================================================================
// Frame tests
// =============================================================================

#[test]
fn test_short_frame_decodes_fields_in_range() {
    // Only the first 6 bytes exist: the Real and the Bool are cut off
    let link = MemoryLink::new(tank_image()[..6].to_vec());

    let mut broker = Broker::new(
        LiveFrameSource::new(link, "10.0.0.1:102"),
        tank_schema(),
        fast_options(),
    )
    .unwrap();
    assert_eq!(broker.window().length, 11);
    let queue = broker.subscribe();
    let handle = broker.spawn().unwrap();

    let snapshot = next_snapshot(&queue);
    handle.stop();

    assert_eq!(snapshot.get("iT1_LVL"), Some(Value::Int(33)));
    assert_eq!(snapshot.get("iT1_DIS_FL"), Some(Value::Int(12)));
    assert_eq!(snapshot.get("iT1_SP"), Some(Value::Int(66)));
    assert_eq!(snapshot.get("rT1_MV"), None);
    assert_eq!(snapshot.get("xT1_PUMP"), None);
    assert_eq!(snapshot.len(), 5);
}

#[test]
fn test_window_offset_frames_decode_at_db_offsets() {
    // Schema starting at DB byte 4: the link only returns bytes 4..
    let schema = Schema::load(&[
        SchemaRow::new("iT1_SP", "Int", "4"),
        SchemaRow::new("rT1_MV", "Real", "6"),
    ])
    .unwrap();
    let link = MemoryLink::new(tank_image());
    let control = link.control();

    let mut broker =
        Broker::new(LiveFrameSource::new(link, "10.0.0.1:102"), schema, fast_options()).unwrap();
    assert_eq!(broker.window().start, 4);
    let queue = broker.subscribe();
    let handle = broker.spawn().unwrap();

    let snapshot = next_snapshot(&queue);
    handle.stop();
    assert_eq!(snapshot.get("iT1_SP"), Some(Value::Int(66)));
    assert_eq!(snapshot.get("rT1_MV"), Some(Value::Real(10.5)));
    assert!(control.read_calls() >= 1);
}

#[test]
fn test_replay_ends_with_end_of_stream() {
    let path = temp_path("replay");
    let mut second = tank_image();
    second[0..2].copy_from_slice(&34i16.to_be_bytes());
    std::fs::write(
        &path,
        format!(
            "{}\nnot a frame\n\n{}\n",
            format_line(&tank_image()),
            format_line(&second)
        ),
    )
    .unwrap();

    let mut broker =
        Broker::new(ReplayFrameSource::new(&path), tank_schema(), fast_options()).unwrap();
    let queue = broker.subscribe();
    let handle = broker.spawn().unwrap();

    let messages = collect_until_terminate(&queue);
    assert_eq!(handle.join(), Some(TerminateReason::EndOfStream));

    let levels: Vec<(u64, Option<Value>)> = messages
        .iter()
        .filter_map(|m| match m {
            BrokerMessage::Snapshot(s) => Some((s.sequence(), s.get("iT1_LVL"))),
            _ => None,
        })
        .collect();
    assert_eq!(
        levels,
        [(1, Some(Value::Int(33))), (2, Some(Value::Int(34)))]
    );
    assert_eq!(terminations(&messages), [TerminateReason::EndOfStream]);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_missing_replay_file_is_connect_failure() {
    let path = temp_path("does_not_exist");
    let _ = std::fs::remove_file(&path);

    let mut broker =
        Broker::new(ReplayFrameSource::new(&path), tank_schema(), fast_options()).unwrap();
    let queue = broker.subscribe();
    let handle = broker.spawn().unwrap();

    assert_eq!(
        collect_until_terminate(&queue),
        vec![BrokerMessage::Terminate(TerminateReason::ConnectFailed)]
    );
    assert_eq!(handle.join(), Some(TerminateReason::ConnectFailed));
}

#[test]
fn test_recorded_frames_replay_identically() {
    let record = temp_path("record");
    let _ = std::fs::remove_file(&record);

    let link = MemoryLink::new(tank_image());
    let options = BrokerOptions {
        record_path: Some(record.clone()),
        ..fast_options()
    };
    let mut broker = Broker::new(
        LiveFrameSource::new(link, "10.0.0.1:102"),
        tank_schema(),
        options,
    )
    .unwrap();
    let queue = broker.subscribe();
    let handle = broker.spawn().unwrap();

    let live = next_snapshot(&queue);
    handle.stop();
    assert_eq!(handle.join(), Some(TerminateReason::Stopped));

    let mut replay =
        Broker::new(ReplayFrameSource::new(&record), tank_schema(), fast_options()).unwrap();
    let replay_queue = replay.subscribe();
    let replayed = replay.run(StopSignal::new());
    assert_eq!(replayed, TerminateReason::EndOfStream);

    match replay_queue.try_pop() {
        Some(BrokerMessage::Snapshot(snapshot)) => {
            for field in live.iter() {
                assert_eq!(snapshot.get(&field.name), field.value);
            }
        }
        other => panic!("expected a replayed snapshot, got {:?}", other),
    }

    let _ = std::fs::remove_file(&record);
}

// =============================================================================
// Construction tests
// =============================================================================

#[test]
fn test_zero_capacity_is_rejected() {
    let options = BrokerOptions {
        queue_capacity: 0,
        ..fast_options()
    };
    let result = Broker::new(
        LiveFrameSource::new(MemoryLink::new(Vec::new()), "10.0.0.1:102"),
        tank_schema(),
        options,
    );
    assert!(matches!(result, Err(e) if e.is_config()));
}

// =============================================================================
// Consumer tests
// =============================================================================

#[tokio::test]
async fn test_consumer_task_ends_on_terminate() {
    let path = temp_path("consumer");
    std::fs::write(&path, format!("{}\n", format_line(&tank_image()))).unwrap();

    let mut broker =
        Broker::new(ReplayFrameSource::new(&path), tank_schema(), fast_options()).unwrap();
    let queue = broker.subscribe();
    let handle = broker.spawn().unwrap();

    let (exit, output) = tokio::task::spawn_blocking(move || {
        let mut sink = JsonLinesSink::new(Vec::new());
        let exit = run_consumer(&queue, WAIT, &mut sink);
        (exit, sink.into_inner())
    })
    .await
    .unwrap();

    assert_eq!(exit, ConsumerExit::Terminated(TerminateReason::EndOfStream));
    let text = String::from_utf8(output).unwrap();
    let line: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
    assert_eq!(line["values"]["iT1_LVL"], 33);
    assert_eq!(line["values"]["xT1_PUMP"], true);

    drop(handle);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_consumer_times_out_when_broker_is_silent() {
    let queue = Arc::new(HandoffQueue::<BrokerMessage>::new(1));
    let exit = tokio::task::spawn_blocking(move || {
        let mut sink = JsonLinesSink::new(Vec::new());
        run_consumer(&queue, Duration::from_millis(20), &mut sink)
    })
    .await
    .unwrap();
    assert_eq!(exit, ConsumerExit::TimedOut);
}
