// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Integration tests for the publish/subscribe transport, covering the
// SPSC/SPMC happy paths, queue-full back-pressure policies, the STmin
// rate limiter, geometry-mismatch rejection, and idempotent disconnect.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use shm_ipc::{
    IpcType, NullHooks, Publisher, PublisherConfig, QueueFullPolicy, SegmentConfig, Subscriber,
    SubscriberConfig,
};

static COUNTER: AtomicUsize = AtomicUsize::new(0);
static TRACING_INIT: Once = Once::new();

/// Route `tracing` events to stderr, gated by `RUST_LOG` (defaults to
/// `warn`). `cargo test -- --nocapture` then shows the segment
/// create/attach, connect/disconnect, and overrun spans emitted by
/// `SharedMemoryManager`/`Publisher`/`Subscriber`.
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn unique_name(prefix: &str) -> String {
    init_tracing();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_pubsub_{n}")
}

fn spmc_config(chunk_size: usize, max_chunks: u32, queue_capacity: u32) -> SegmentConfig {
    SegmentConfig {
        chunk_size,
        max_chunks,
        max_subscribers: 8,
        queue_capacity,
        ipc_type: IpcType::Spmc,
    }
}

// Scenario A: SPSC happy path.
#[test]
fn spsc_happy_path() {
    let path = unique_name("spsc");
    let cfg = spmc_config(64, 16, 64);
    let hooks = Arc::new(NullHooks);

    let publisher = Publisher::create(&path, cfg, PublisherConfig::default(), hooks.clone())
        .expect("create publisher");
    let subscriber = Subscriber::create(&path, cfg, SubscriberConfig::default(), hooks)
        .expect("create subscriber");

    for i in 0u32..100 {
        publisher
            .publish(|buf| {
                buf[0..4].copy_from_slice(&i.to_le_bytes());
                4
            })
            .expect("send");
    }

    for expected in 0u32..100 {
        let sample = subscriber
            .receive_with_timeout(Duration::from_millis(200))
            .expect("receive")
            .expect("message present");
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&sample.as_slice()[0..4]);
        assert_eq!(u32::from_le_bytes(bytes), expected);
    }

    drop(subscriber);
    drop(publisher);
}

// Scenario B: SPMC fan-out.
#[test]
fn spmc_fan_out() {
    let path = unique_name("spmc");
    let cfg = spmc_config(64, 32, 64);
    let hooks = Arc::new(NullHooks);

    let publisher = Publisher::create(&path, cfg, PublisherConfig::default(), hooks.clone())
        .expect("create publisher");
    let subs: Vec<Subscriber> = (0..3)
        .map(|_| {
            Subscriber::create(&path, cfg, SubscriberConfig::default(), hooks.clone())
                .expect("create subscriber")
        })
        .collect();

    for i in 0u32..10 {
        publisher
            .publish(|buf| {
                buf[0..4].copy_from_slice(&i.to_le_bytes());
                4
            })
            .expect("send");
    }

    for sub in &subs {
        for expected in 0u32..10 {
            let sample = sub
                .receive_with_timeout(Duration::from_millis(200))
                .expect("receive")
                .expect("message present");
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&sample.as_slice()[0..4]);
            assert_eq!(u32::from_le_bytes(bytes), expected);
        }
    }

    drop(subs);
    drop(publisher);
}

// Scenario C: queue-full under the Drop policy.
#[test]
fn queue_full_drop_policy() {
    let path = unique_name("qfdrop");
    let cfg = spmc_config(32, 128, 4);
    let hooks = Arc::new(NullHooks);

    let publisher = Publisher::create(&path, cfg, PublisherConfig::default(), hooks.clone())
        .expect("create publisher");
    let subscriber = Subscriber::create(&path, cfg, SubscriberConfig::default(), hooks)
        .expect("create subscriber");
    // Never drained until the end: the queue fills and further sends drop.

    for i in 0u32..100 {
        publisher
            .publish(|buf| {
                buf[0..4].copy_from_slice(&i.to_le_bytes());
                4
            })
            .expect("send (drop policy never errors)");
    }

    let overruns = subscriber.overrun_count().expect("overrun_count");
    assert_eq!(overruns, 96);

    let mut received = 0;
    while subscriber
        .receive()
        .expect("receive")
        .is_some()
    {
        received += 1;
    }
    assert!(received <= 4);

    drop(subscriber);
    drop(publisher);
}

// Scenario D: queue-full under the Overwrite policy.
#[test]
fn queue_full_overwrite_policy() {
    let path = unique_name("qfover");
    // max_chunks (8) is far smaller than the send count below: if the
    // chunk evicted by Overwrite ever leaked (its ref_count never
    // decremented), the pool would be exhausted and `publish` would
    // start failing well before the loop finishes.
    let cfg = spmc_config(32, 8, 4);
    let hooks = Arc::new(NullHooks);

    let mut pub_cfg = PublisherConfig::default();
    pub_cfg.default_queue_full_policy = QueueFullPolicy::Overwrite;
    let publisher =
        Publisher::create(&path, cfg, pub_cfg, hooks.clone()).expect("create publisher");

    let subscriber = Subscriber::create(&path, cfg, SubscriberConfig::default(), hooks)
        .expect("create subscriber");
    publisher
        .set_queue_full_policy(QueueFullPolicy::Overwrite)
        .expect("apply overwrite policy to the now-connected subscriber");

    for i in 0u32..500 {
        publisher
            .publish(|buf| {
                buf[0..4].copy_from_slice(&i.to_le_bytes());
                4
            })
            .expect("send (no pool leak from evicted chunks)");
    }

    let mut last_four = Vec::new();
    while let Some(sample) = subscriber.receive().expect("receive") {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&sample.as_slice()[0..4]);
        last_four.push(u32::from_le_bytes(bytes));
    }
    assert_eq!(last_four, vec![496, 497, 498, 499]);

    drop(subscriber);
    drop(publisher);
}

// Scenario E (coarse wall-clock tolerance appropriate for CI): STmin limiter.
#[test]
fn stmin_limiter() {
    let path = unique_name("stmin");
    let cfg = spmc_config(32, 32, 32);
    let hooks = Arc::new(NullHooks);

    let publisher = Publisher::create(&path, cfg, PublisherConfig::default(), hooks.clone())
        .expect("create publisher");
    let mut sub_cfg = SubscriberConfig::default();
    sub_cfg.stmin_ns = 5_000_000; // 5ms
    let subscriber =
        Subscriber::create(&path, cfg, sub_cfg, hooks).expect("create subscriber");

    let start = Instant::now();
    for i in 0u32..10 {
        publisher
            .publish(|buf| {
                buf[0..4].copy_from_slice(&i.to_le_bytes());
                4
            })
            .expect("send");
        std::thread::sleep(Duration::from_micros(500));
    }
    let elapsed = start.elapsed();

    let mut received = 0;
    while subscriber.receive().expect("receive").is_some() {
        received += 1;
    }
    // Over a ~5ms send window with a 5ms STmin, at most a handful of
    // messages should have made it through.
    assert!(received <= (elapsed.as_millis() as u64 / 5 + 2) as usize);

    drop(subscriber);
    drop(publisher);
}

// Scenario F: attaching with mismatched geometry fails cleanly.
#[test]
fn geometry_mismatch_rejected() {
    let path = unique_name("geom");
    let hooks = Arc::new(NullHooks);
    let creator_cfg = spmc_config(128, 16, 16);

    let publisher = Publisher::create(&path, creator_cfg, PublisherConfig::default(), hooks.clone())
        .expect("create publisher");

    let mismatched_cfg = spmc_config(256, 16, 16);
    let err = Subscriber::create(&path, mismatched_cfg, SubscriberConfig::default(), hooks)
        .expect_err("geometry mismatch must be rejected");
    assert!(matches!(err, shm_ipc::IpcError::ShmSizeMismatch { .. }));

    drop(publisher);
}

// Invariant 6: disconnect() is idempotent.
#[test]
fn disconnect_is_idempotent() {
    let path = unique_name("idempotent");
    let cfg = spmc_config(32, 16, 16);
    let hooks = Arc::new(NullHooks);

    let _publisher = Publisher::create(&path, cfg, PublisherConfig::default(), hooks.clone())
        .expect("create publisher");
    let subscriber = Subscriber::create(&path, cfg, SubscriberConfig::default(), hooks)
        .expect("create subscriber");

    subscriber.disconnect();
    subscriber.disconnect();
    subscriber.disconnect();
    assert!(!subscriber.is_connected());
}

// Invariant 2: allocated_count + |free_list| == max_chunks, observed
// indirectly: after every loaned chunk is sent to zero subscribers (and
// thus immediately reclaimed) or fully drained, no chunks remain on loan.
#[test]
fn pool_conserves_chunks_with_no_subscribers() {
    let path = unique_name("conserve");
    let cfg = spmc_config(32, 8, 8);
    let hooks = Arc::new(NullHooks);

    let publisher = Publisher::create(&path, cfg, PublisherConfig::default(), hooks)
        .expect("create publisher");
    for _ in 0..50 {
        publisher.publish(|_| 0).expect("send with no subscribers");
    }
    // Every send above should have looped straight back to the pool since
    // the subscriber snapshot was empty; a leak here would eventually
    // exhaust the 8-chunk pool.
    publisher.publish(|_| 0).expect("pool not exhausted");
}
