//! Integration tests for the ingestion pipeline, driven through
//! `CompressService` with a fake encoder.

mod common;

use assert_matches::assert_matches;
use autocompress::pipeline::{
    IngestionCoordinator, IngestionEvent, IngestionKind, SizeProbe, StabilityDetector, Submission,
};
use autocompress::report::{FailureKind, ResultRecorder};
use autocompress::state::{JobState, PipelineEvent};
use common::{
    collect_terminal, next_terminal, wait_for_state, FakeTranscoder, Outcome, TestHarness, MIB,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn scenario_a_compresses_and_removes_source() {
    let h = TestHarness::new();
    let fake = FakeTranscoder::new(Outcome::Succeed { bytes: 25 * MIB });
    let service = h.start(fake.clone());
    let mut events = service.subscribe();

    let source = h.write_source("a.webm", 100 * MIB);
    assert_matches!(service.handle().submit_path(&source), Submission::Queued(_));

    let event = next_terminal(&mut events).await;
    let record = match event {
        PipelineEvent::JobCompleted { record, .. } => record,
        other => panic!("expected completion, got {:?}", other),
    };

    assert_eq!(record.original_name, "a.webm");
    assert_eq!(record.output_name, "a.mp4");
    assert_eq!(record.original_size, 100 * MIB);
    assert_eq!(record.output_size, 25 * MIB);
    assert_eq!(record.compression_ratio, 4.0);

    let output = h.output_dir().join("a.mp4");
    assert!(!source.exists());
    assert_eq!(fs::metadata(&output).unwrap().len(), 25 * MIB);

    let report = service.report();
    assert!(report.starts_with("Processed files: 1\n"));
    assert!(report.contains("Compression ratio: 4.00"));
    assert!(report.contains("Original file size: 100.00 MB"));

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn scenario_b_encoder_failure_keeps_source() {
    let h = TestHarness::new();
    let fake = FakeTranscoder::scripted(
        vec![Outcome::Succeed { bytes: MIB }, Outcome::Fail { code: 1 }],
        Outcome::NoOutput,
    );
    let service = h.start(fake.clone());
    let mut events = service.subscribe();

    let first = h.write_source("first.webm", 4 * MIB);
    service.handle().submit_path(&first);
    assert_matches!(next_terminal(&mut events).await, PipelineEvent::JobCompleted { .. });

    let contents: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    let source = h.write_source_bytes("a.webm", &contents);
    service.handle().submit_path(&source);

    let failure = match next_terminal(&mut events).await {
        PipelineEvent::JobFailed { failure, .. } => failure,
        other => panic!("expected failure, got {:?}", other),
    };
    assert_eq!(failure.kind, FailureKind::Conversion);
    assert_eq!(failure.original_name, "a.webm");

    assert_eq!(fs::read(&source).unwrap(), contents);
    assert!(!h.output_dir().join("a.mp4").exists());

    let recorder = service.recorder();
    assert_eq!(recorder.completed_count(), 1);
    assert_eq!(recorder.records()[0].original_name, "first.webm");
    assert_eq!(recorder.failed_count(), 1);

    let report = service.report();
    assert!(report.starts_with("Processed files: 1\n"));
    assert!(report.contains("Failed files: 1"));

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn scenario_c_back_to_back_arrivals_both_complete_in_order() {
    let h = TestHarness::new();
    let fake = FakeTranscoder::new(Outcome::Succeed { bytes: MIB });
    let service = h.start(fake.clone());
    let mut events = service.subscribe();

    let a = h.write_source("a.webm", 2 * MIB);
    let b = h.write_source("b.webm", 3 * MIB);
    service.handle().submit_path(&a);
    service.handle().submit_path(&b);

    let done = collect_terminal(&mut events, 2).await;
    assert!(done
        .iter()
        .all(|e| matches!(e, PipelineEvent::JobCompleted { .. })));

    let names: Vec<String> = service
        .recorder()
        .records()
        .into_iter()
        .map(|r| r.original_name)
        .collect();
    assert_eq!(names, vec!["a.webm", "b.webm"]);
    assert!(!a.exists());
    assert!(!b.exists());
    assert!(h.output_dir().join("a.mp4").exists());
    assert!(h.output_dir().join("b.mp4").exists());

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn duplicate_events_create_one_job() {
    let h = TestHarness::new();
    let fake = FakeTranscoder::slow(Outcome::Succeed { bytes: MIB }, Duration::from_millis(50));
    let service = h.start(fake.clone());
    let mut events = service.subscribe();

    let source = h.write_source("a.webm", 2 * MIB);
    let handle = service.handle();
    assert_matches!(handle.submit_path(&source), Submission::Queued(_));
    assert_eq!(handle.submit_path(&source), Submission::Duplicate);
    assert_eq!(handle.submit_path(&source), Submission::Duplicate);
    assert!(handle.is_active(&source));

    next_terminal(&mut events).await;
    assert_eq!(fake.call_count(), 1);
    assert_eq!(service.recorder().completed_count(), 1);
    assert!(!handle.is_active(&source));

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn jobs_run_one_at_a_time_in_arrival_order() {
    let h = TestHarness::new();
    let fake = FakeTranscoder::slow(Outcome::Succeed { bytes: MIB }, Duration::from_millis(30));
    let service = h.start(fake.clone());
    let mut events = service.subscribe();

    let names = ["c.webm", "a.webm", "b.webm"];
    for name in names {
        let path = h.write_source(name, 2 * MIB);
        service.handle().submit_path(&path);
    }

    collect_terminal(&mut events, names.len()).await;

    assert_eq!(fake.max_concurrent(), 1);
    let order: Vec<String> = fake
        .calls()
        .iter()
        .map(|c| c.input.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(order, names);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn source_is_not_converted_before_it_has_data() {
    let h = TestHarness::new();
    let fake = FakeTranscoder::new(Outcome::Succeed { bytes: MIB });
    let service = h.start(fake.clone());
    let mut events = service.subscribe();

    let source = h.write_source("a.webm", 0);
    service.handle().submit_path(&source);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fake.call_count(), 0);

    fs::write(&source, vec![7u8; 2048]).unwrap();
    assert_matches!(next_terminal(&mut events).await, PipelineEvent::JobCompleted { .. });
    assert_eq!(fake.calls()[0].input_size, 2048);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn empty_file_does_not_block_later_jobs() {
    let mut h = TestHarness::new();
    h.config.stability.zero_size_polls = 20;
    let fake = FakeTranscoder::new(Outcome::Succeed { bytes: MIB });
    let service = h.start(fake.clone());
    let mut events = service.subscribe();

    let empty = h.write_source("empty.webm", 0);
    let real = h.write_source("real.webm", 2 * MIB);
    service.handle().submit_path(&empty);
    service.handle().submit_path(&real);

    let done = collect_terminal(&mut events, 2).await;
    let failure = match &done[0] {
        PipelineEvent::JobFailed { failure, .. } => failure.clone(),
        other => panic!("expected failure, got {:?}", other),
    };
    assert_eq!(failure.kind, FailureKind::Stabilization);
    assert_eq!(failure.original_name, "empty.webm");
    assert!(failure.message.contains("still empty after 20 polls"));
    assert_matches!(&done[1], PipelineEvent::JobCompleted { record, .. } if record.original_name == "real.webm");

    assert!(empty.exists());
    assert!(!real.exists());
    assert_eq!(fake.call_count(), 1);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn paths_outside_the_folder_are_filtered() {
    let h = TestHarness::new();
    let fake = FakeTranscoder::new(Outcome::Succeed { bytes: MIB });
    let service = h.start(fake.clone());

    let nested = h.folder().join("sub");
    fs::create_dir_all(&nested).unwrap();
    let inner = nested.join("x.webm");
    fs::write(&inner, vec![1u8; 1024]).unwrap();
    let outside = h.dir.path().join("y.webm");
    fs::write(&outside, vec![1u8; 1024]).unwrap();

    assert_eq!(service.handle().submit_path(&inner), Submission::Filtered);
    assert_eq!(service.handle().submit_path(&outside), Submission::Filtered);
    assert_eq!(service.handle().active_jobs(), 0);

    service.shutdown().await.unwrap();
    assert_eq!(fake.call_count(), 0);
    assert!(inner.exists());
    assert!(outside.exists());
}

/// Reports a fixed sequence of sizes, repeating the last one.
struct ScriptedSizes {
    sizes: Mutex<VecDeque<u64>>,
    polls: Mutex<u32>,
}

impl ScriptedSizes {
    fn new(sizes: &[u64]) -> Arc<Self> {
        Arc::new(Self {
            sizes: Mutex::new(sizes.iter().copied().collect()),
            polls: Mutex::new(0),
        })
    }

    fn polls(&self) -> u32 {
        *self.polls.lock()
    }
}

impl SizeProbe for ScriptedSizes {
    fn size(&self, _path: &Path) -> io::Result<u64> {
        *self.polls.lock() += 1;
        let mut sizes = self.sizes.lock();
        match sizes.len() {
            0 => Err(io::Error::from(io::ErrorKind::NotFound)),
            1 => Ok(sizes[0]),
            _ => Ok(sizes.pop_front().unwrap_or_default()),
        }
    }
}

#[tokio::test]
async fn coordinator_waits_for_the_detector_before_converting() {
    let h = TestHarness::new();
    let probe = ScriptedSizes::new(&[10, 20, 30, 30]);
    let detector = StabilityDetector::with_probe(probe.clone(), Duration::from_millis(5), None);
    let fake = FakeTranscoder::new(Outcome::Succeed { bytes: MIB });
    let recorder = Arc::new(ResultRecorder::new(h.output_dir()));
    let cancel = CancellationToken::new();

    let (coordinator, handle) = IngestionCoordinator::with_detector(
        &h.config,
        detector,
        fake.clone(),
        recorder.clone(),
        cancel.clone(),
    );
    let mut events = handle.subscribe();
    let worker = tokio::spawn(coordinator.run());

    let source = h.write_source("a.webm", 2 * MIB);
    assert_matches!(handle.submit_path(&source), Submission::Queued(_));

    let record = match next_terminal(&mut events).await {
        PipelineEvent::JobCompleted { record, .. } => record,
        other => panic!("expected completion, got {:?}", other),
    };
    assert_eq!(probe.polls(), 4);
    assert_eq!(record.original_size, 30);
    assert_eq!(fake.call_count(), 1);
    assert_eq!(recorder.completed_count(), 1);

    cancel.cancel();
    worker.await.unwrap();
    assert_eq!(handle.submit_path(&source), Submission::Closed);
}

#[tokio::test]
async fn queued_event_comes_first_and_only_for_queued_jobs() {
    let h = TestHarness::new();
    let fake = FakeTranscoder::new(Outcome::Succeed { bytes: MIB });
    let recorder = Arc::new(ResultRecorder::new(h.output_dir()));
    let (coordinator, handle) =
        IngestionCoordinator::new(&h.config, fake.clone(), recorder, CancellationToken::new());
    let mut events = handle.subscribe();
    let worker = tokio::spawn(coordinator.run());

    let source = h.write_source("a.webm", MIB);
    let id = match handle.submit_path(&source) {
        Submission::Queued(id) => id,
        other => panic!("expected a queued job, got {:?}", other),
    };
    assert_matches!(
        events.recv().await.unwrap(),
        PipelineEvent::JobQueued { id: queued, .. } if queued == id
    );
    assert_matches!(
        next_terminal(&mut events).await,
        PipelineEvent::JobCompleted { .. }
    );

    worker.abort();
    let _ = worker.await;
    let late = h.write_source("late.webm", MIB);
    assert_eq!(handle.submit_path(&late), Submission::Closed);
    assert!(!handle.is_active(&late));
    assert_matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    );
}

#[tokio::test]
async fn missing_output_fails_finalization_and_keeps_source() {
    let h = TestHarness::new();
    let fake = FakeTranscoder::new(Outcome::NoOutput);
    let service = h.start(fake.clone());
    let mut events = service.subscribe();

    let source = h.write_source("a.webm", MIB);
    service.handle().submit_path(&source);

    let failure = match next_terminal(&mut events).await {
        PipelineEvent::JobFailed { failure, .. } => failure,
        other => panic!("expected failure, got {:?}", other),
    };
    assert_eq!(failure.kind, FailureKind::Finalization);
    assert!(failure.message.contains("was not created"));
    assert!(source.exists());
    assert_eq!(service.recorder().completed_count(), 0);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn non_matching_events_are_ignored() {
    let h = TestHarness::new();
    let fake = FakeTranscoder::new(Outcome::Succeed { bytes: MIB });
    let service = h.start(fake.clone());
    let handle = service.handle();

    let mp4 = h.write_source("a.mp4", MIB);
    assert_eq!(handle.submit_path(&mp4), Submission::Filtered);

    let webm = h.write_source("b.webm", MIB);
    assert_eq!(
        handle.submit(IngestionEvent::other(&webm)),
        Submission::Filtered
    );
    assert_eq!(
        handle.submit(IngestionEvent {
            path: h.folder().join("dir.webm"),
            kind: IngestionKind::Created,
            is_dir: true,
        }),
        Submission::Filtered
    );
    assert_eq!(
        handle.submit_path(h.output_dir().join("old.webm")),
        Submission::Filtered
    );

    assert_eq!(handle.active_jobs(), 0);
    let recorder = service.shutdown().await.unwrap();
    assert_eq!(fake.call_count(), 0);
    assert_eq!(recorder.completed_count() + recorder.failed_count(), 0);
    assert!(mp4.exists());
    assert!(webm.exists());
}

#[tokio::test]
async fn shutdown_cancels_running_and_queued_jobs() {
    let h = TestHarness::new();
    let fake = FakeTranscoder::new(Outcome::Block);
    let service = h.start(fake.clone());
    let mut events = service.subscribe();
    let handle = service.handle().clone();

    let a = h.write_source("a.webm", MIB);
    let b = h.write_source("b.webm", MIB);
    handle.submit_path(&a);
    handle.submit_path(&b);

    assert_eq!(wait_for_state(&mut events, JobState::Converting).await, a);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let recorder = service.shutdown().await.unwrap();

    let failures = recorder.failures();
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|f| f.kind == FailureKind::Cancelled));
    assert_eq!(failures[0].original_name, "a.webm");
    assert_eq!(failures[1].original_name, "b.webm");

    assert!(a.exists());
    assert!(b.exists());
    assert!(!h.output_dir().join("a.mp4").exists());
    assert_eq!(fake.call_count(), 1);

    let late = h.write_source("late.webm", MIB);
    assert_eq!(handle.submit_path(&late), Submission::Closed);
}

#[tokio::test]
async fn vanished_file_fails_after_io_retries() {
    let mut h = TestHarness::new();
    h.config.stability.io_retries = Some(2);
    let fake = FakeTranscoder::new(Outcome::Succeed { bytes: MIB });
    let service = h.start(fake.clone());
    let mut events = service.subscribe();

    service
        .handle()
        .submit_path(h.folder().join("ghost.webm"));

    let failure = match next_terminal(&mut events).await {
        PipelineEvent::JobFailed { failure, .. } => failure,
        other => panic!("expected failure, got {:?}", other),
    };
    assert_eq!(failure.kind, FailureKind::Stabilization);
    assert!(failure.message.contains("gave up after 2 retries"));
    assert_eq!(fake.call_count(), 0);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn file_that_keeps_growing_is_exhausted() {
    let mut h = TestHarness::new();
    h.config.stability.poll_interval_ms = 100;
    h.config.stability.max_polls = Some(3);
    let fake = FakeTranscoder::new(Outcome::Succeed { bytes: MIB });
    let service = h.start(fake.clone());
    let mut events = service.subscribe();

    let source = h.write_source("a.webm", 1);
    let grower = {
        let source = source.clone();
        tokio::spawn(async move {
            for size in 2..400u64 {
                tokio::time::sleep(Duration::from_millis(5)).await;
                if fs::File::options()
                    .write(true)
                    .open(&source)
                    .and_then(|f| f.set_len(size))
                    .is_err()
                {
                    break;
                }
            }
        })
    };
    service.handle().submit_path(&source);

    let failure = match next_terminal(&mut events).await {
        PipelineEvent::JobFailed { failure, .. } => failure,
        other => panic!("expected failure, got {:?}", other),
    };
    grower.abort();

    assert_eq!(failure.kind, FailureKind::Stabilization);
    assert!(failure.message.contains("exceeded max stabilization attempts"));
    assert!(source.exists());

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn path_can_be_resubmitted_after_its_job_retires() {
    let h = TestHarness::new();
    let fake = FakeTranscoder::scripted(vec![Outcome::NoOutput], Outcome::Succeed { bytes: MIB });
    let service = h.start(fake.clone());
    let mut events = service.subscribe();

    let source = h.write_source("a.webm", 2 * MIB);
    service.handle().submit_path(&source);
    assert_matches!(next_terminal(&mut events).await, PipelineEvent::JobFailed { .. });

    assert_matches!(service.handle().submit_path(&source), Submission::Queued(_));
    assert_matches!(next_terminal(&mut events).await, PipelineEvent::JobCompleted { .. });

    assert!(!source.exists());
    assert_eq!(fake.call_count(), 2);
    // The first attempt's missing output never claimed the name.
    assert!(h.output_dir().join("a.mp4").exists());

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn name_collisions_get_numbered_outputs() {
    let h = TestHarness::new();
    let fake = FakeTranscoder::new(Outcome::Succeed { bytes: MIB });
    fs::create_dir_all(h.output_dir()).unwrap();
    fs::write(h.output_dir().join("a.mp4"), b"older").unwrap();

    let service = h.start(fake.clone());
    let mut events = service.subscribe();

    let source = h.write_source("a.webm", 2 * MIB);
    service.handle().submit_path(&source);

    let record = match next_terminal(&mut events).await {
        PipelineEvent::JobCompleted { record, .. } => record,
        other => panic!("expected completion, got {:?}", other),
    };
    assert_eq!(record.output_name, "a_1.mp4");
    assert_eq!(fs::read(h.output_dir().join("a.mp4")).unwrap(), b"older");

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn existing_files_are_queued_by_name() {
    let h = TestHarness::new();
    let fake = FakeTranscoder::new(Outcome::Succeed { bytes: MIB });
    h.write_source("b.webm", MIB);
    h.write_source("a.webm", MIB);
    h.write_source("notes.txt", 10);

    let service = h.start(fake.clone());
    let mut events = service.subscribe();
    assert_eq!(service.enqueue_existing(), 2);

    collect_terminal(&mut events, 2).await;
    let names: Vec<String> = service
        .recorder()
        .records()
        .into_iter()
        .map(|r| r.original_name)
        .collect();
    assert_eq!(names, vec!["a.webm", "b.webm"]);

    service.shutdown().await.unwrap();
}
