//! Property-based tests (fuzzing) for queue and scheduler resilience.
//!
//! Uses proptest to generate random/malformed inputs and verify the pipeline
//! never panics and never loses a sample it accepted.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use serde_json::Value;

use telemetry_sync::{
    CollectorSet, FlushReason, InMemoryQueue, JsonlQueue, MotionContext, Sample, SampleQueue,
    SyncConfig, SyncScheduler, Uploader,
};

// =============================================================================
// Strategies for generating test data
// =============================================================================

fn timestamp_strategy() -> impl Strategy<Value = chrono::DateTime<Utc>> {
    (1_600_000_000i64..1_900_000_000).prop_map(|secs| Utc.timestamp_opt(secs, 0).unwrap())
}

fn motion_strategy() -> impl Strategy<Value = MotionContext> {
    prop_oneof![
        Just(MotionContext::Stationary),
        Just(MotionContext::Walking),
        Just(MotionContext::Running),
        Just(MotionContext::Cycling),
        Just(MotionContext::Driving),
        Just(MotionContext::Unknown),
    ]
}

/// Any sample, including labels with control characters and newlines
fn sample_strategy() -> impl Strategy<Value = Sample> {
    prop_oneof![
        (timestamp_strategy(), 0i64..200, -1e6f64..1e6)
            .prop_map(|(t, code, val)| Sample::vital(t, code, val)),
        (
            timestamp_strategy(),
            -90f64..90.0,
            -180f64..180.0,
            0f64..5000.0,
            prop::option::of(motion_strategy()),
        )
            .prop_map(|(t, lat, lon, acc, motion)| {
                let s = Sample::location(t, lat, lon, acc);
                match motion {
                    Some(m) => s.with_motion_context(m),
                    None => s,
                }
            }),
        (timestamp_strategy(), ".*", prop::option::of(".*"))
            .prop_map(|(t, label, text)| {
                let s = Sample::event(t, label);
                match text {
                    Some(text) => s.with_text(text),
                    None => s,
                }
            }),
    ]
}

/// Generate arbitrary JSON values (including invalid structures)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        prop_oneof![Just("vital"), Just("gps"), Just("event"), Just("other")]
            .prop_map(|s| Value::String(s.to_string())),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(
        3,   // depth
        32,  // max nodes
        8,   // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
                prop::collection::hash_map(
                    prop_oneof![Just("type".to_string()), Just("t".to_string()), ".{0,6}".prop_map(String::from)],
                    inner,
                    0..8,
                )
                .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

fn vital(id: usize) -> Sample {
    Sample::vital(Utc.timestamp_opt(1_740_000_000, 0).unwrap(), id as i64, 0.0)
}

fn codes(samples: &[Sample]) -> Vec<i64> {
    samples
        .iter()
        .map(|s| match s {
            Sample::Vital(v) => v.code,
            _ => -1,
        })
        .collect()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Returns scripted outcomes in order, then succeeds.
struct PatternUploader {
    outcomes: Mutex<VecDeque<bool>>,
    delivered: Mutex<Vec<Sample>>,
}

#[async_trait]
impl Uploader for PatternUploader {
    async fn send(&self, _device_id: &str, samples: &[Sample]) -> bool {
        let ok = self.outcomes.lock().unwrap().pop_front().unwrap_or(true);
        if ok {
            self.delivered.lock().unwrap().extend_from_slice(samples);
        }
        ok
    }
}

// =============================================================================
// Deserialization Fuzz Tests
// =============================================================================

proptest! {
    /// Sample decoding should never panic on arbitrary bytes
    #[test]
    fn fuzz_sample_from_random_bytes(bytes in prop::collection::vec(any::<u8>(), 0..4096)) {
        let _ = serde_json::from_slice::<Sample>(&bytes);
    }

    /// Sample decoding should handle arbitrary JSON gracefully
    #[test]
    fn fuzz_sample_from_arbitrary_json(json in arbitrary_json_strategy()) {
        let serialized = serde_json::to_vec(&json).unwrap();
        let _ = serde_json::from_slice::<Sample>(&serialized);
    }

    /// One record per line: an encoded sample never contains a raw newline
    #[test]
    fn prop_encoded_sample_is_single_line(sample in sample_strategy()) {
        let encoded = serde_json::to_vec(&sample).unwrap();
        prop_assert!(!encoded.contains(&b'\n'));

        let decoded: Sample = serde_json::from_slice(&encoded).unwrap();
        prop_assert_eq!(decoded.kind(), sample.kind());
        prop_assert_eq!(decoded.timestamp(), sample.timestamp());
    }
}

// =============================================================================
// Queue File Invariants
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Whatever is on disk, open + count + drain never panic and stay bounded
    #[test]
    fn fuzz_queue_file_with_arbitrary_contents(
        bytes in prop::collection::vec(any::<u8>(), 0..2048),
        limit in 0usize..20,
    ) {
        runtime().block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("q.jsonl");
            std::fs::write(&path, &bytes).unwrap();

            let queue = JsonlQueue::open(&path).await.unwrap();
            let before = queue.count().await.unwrap();
            let drained = queue.drain(limit).await.unwrap();
            let after = queue.count().await.unwrap();

            assert!(drained.len() <= limit);
            assert_eq!(after, before - limit.min(before));
        });
    }

    /// Valid records mixed with garbage lines: every valid record comes out once, in order
    #[test]
    fn prop_queue_skips_garbage_keeps_order(
        layout in prop::collection::vec(prop::bool::weighted(0.8), 0..40),
        garbage in "[a-z{}:\\[\\] ]{1,20}",
    ) {
        runtime().block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("q.jsonl");
            let mut contents = String::new();
            let mut expected = Vec::new();
            for (i, valid) in layout.iter().enumerate() {
                if *valid {
                    contents.push_str(&serde_json::to_string(&vital(i)).unwrap());
                    expected.push(i as i64);
                } else {
                    contents.push_str(&garbage);
                }
                contents.push('\n');
            }
            std::fs::write(&path, contents).unwrap();

            let queue = JsonlQueue::open(&path).await.unwrap();
            let mut out = Vec::new();
            loop {
                if queue.count().await.unwrap() == 0 {
                    break;
                }
                out.extend(codes(&queue.drain(7).await.unwrap()));
            }

            assert_eq!(out, expected);
        });
    }

    /// Drain returns exactly the oldest min(n, limit) samples
    #[test]
    fn prop_drain_is_bounded_fifo(n in 0usize..60, limit in 0usize..80) {
        runtime().block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let queue = JsonlQueue::open(dir.path().join("q.jsonl")).await.unwrap();
            let samples: Vec<_> = (0..n).map(vital).collect();
            queue.append_batch(&samples).await.unwrap();

            let drained = queue.drain(limit).await.unwrap();

            let take = n.min(limit);
            assert_eq!(codes(&drained), (0..take as i64).collect::<Vec<_>>());
            assert_eq!(queue.count().await.unwrap(), n - take);
        });
    }
}

// =============================================================================
// Scheduler Invariants
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// For any failure pattern: delivered + still queued == appended, no duplicates
    #[test]
    fn prop_no_loss_no_duplication_under_failures(
        n in 0usize..120,
        batch_limit in 1usize..25,
        pattern in prop::collection::vec(any::<bool>(), 0..30),
    ) {
        runtime().block_on(async {
            let queue = Arc::new(InMemoryQueue::new());
            queue.append_batch(&(0..n).map(vital).collect::<Vec<_>>()).await.unwrap();
            let uploader = Arc::new(PatternUploader {
                outcomes: Mutex::new(pattern.iter().copied().collect()),
                delivered: Mutex::new(Vec::new()),
            });
            let config = SyncConfig { batch_limit, ..Default::default() };
            let s = SyncScheduler::new(config, queue.clone(), uploader.clone(), Arc::new(CollectorSet::new()));

            for _ in 0..pattern.len() {
                s.flush(FlushReason::Scheduled).await;
            }

            let mut seen = codes(&uploader.delivered.lock().unwrap());
            seen.extend(codes(&queue.snapshot()));
            seen.sort_unstable();
            assert_eq!(seen, (0..n as i64).collect::<Vec<_>>());

            let stats = s.stats();
            assert_eq!(stats.samples_delivered as usize, uploader.delivered.lock().unwrap().len());
            assert!(stats.samples_delivered as usize <= n);
        });
    }
}
