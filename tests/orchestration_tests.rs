//! Run orchestration: ordering, concurrency, failure policy and cancellation

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{FakeEngine, ScriptedBackend};
use sentiovox::audio::processor::rms;
use sentiovox::audio::AudioBuffer;
use sentiovox::config::{ClientSettings, EngineSettings};
use sentiovox::emotion::{EmotionLabel, EmotionParameterMapper, EmotionVector};
use sentiovox::pipeline::{ProgressEvent, SegmentStatus};
use sentiovox::{
    AivisClient, ErrorKind, FailurePolicy, OrchestratorConfig, OutputEncoding, ProcessSupervisor,
    RetryPolicy, RunReport, SegmentInput, SynthesisOrchestrator, TtsError,
};
use tokio_util::sync::CancellationToken;

fn config(workers: usize) -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.encoding.format = OutputEncoding::Wav;
    config.run.workers = workers;
    config
}

fn orchestrator(backend: &Arc<ScriptedBackend>, workers: usize) -> SynthesisOrchestrator {
    SynthesisOrchestrator::from_config(backend.clone(), &config(workers)).unwrap()
}

fn inputs(count: usize) -> Vec<SegmentInput> {
    (0..count)
        .map(|i| SegmentInput::new(format!("セグメント{}", i), EmotionVector::new()))
        .collect()
}

fn unavailable(index: usize) -> TtsError {
    TtsError::SynthesisUnavailable {
        index,
        attempts: 3,
        cause: "HTTP 503".to_string(),
    }
}

fn boundary_indices(report: &RunReport) -> Vec<usize> {
    report.artifact.boundaries.iter().map(|b| b.index).collect()
}

#[tokio::test]
async fn test_output_order_ignores_completion_order() {
    let in_order = Arc::new(ScriptedBackend::new());
    let baseline = orchestrator(&in_order, 4)
        .run(inputs(4), CancellationToken::new())
        .await
        .unwrap();

    // completion order 3, 1, 0, 2
    let scrambled = Arc::new(
        ScriptedBackend::new()
            .delay(0, 120)
            .delay(1, 60)
            .delay(2, 180)
            .delay(3, 0),
    );
    let report = orchestrator(&scrambled, 4)
        .run(inputs(4), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(boundary_indices(&report), vec![0, 1, 2, 3]);
    assert_eq!(report.artifact.bytes, baseline.artifact.bytes);
    assert_eq!(report.artifact.boundaries, baseline.artifact.boundaries);
    assert!(report.is_complete());
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let mut backend = ScriptedBackend::new();
    for i in 0..9 {
        backend = backend.delay(i, 40);
    }
    let backend = Arc::new(backend);

    let report = orchestrator(&backend, 3)
        .run(inputs(9), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.synthesized, 9);
    let peak = backend.max_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {}", peak);
    assert!(peak >= 2, "workers never overlapped");
}

#[tokio::test]
async fn test_gap_only_between_contributing_segments() {
    let backend = Arc::new(ScriptedBackend::new().fail(1, unavailable(1)));
    let config = config(2);
    let report = SynthesisOrchestrator::from_config(backend.clone(), &config)
        .unwrap()
        .run(inputs(3), CancellationToken::new())
        .await
        .unwrap();

    let b = &report.artifact.boundaries;
    assert_eq!(b.len(), 2);
    assert_eq!(b[0].start_sample, 0);
    assert_eq!(b[1].start_sample - b[0].end_sample, config.assembly.gap_samples());
}

#[tokio::test]
async fn test_partial_failure_is_collected() {
    let backend = Arc::new(ScriptedBackend::new().fail(1, unavailable(1)).delay(0, 30));

    let report = orchestrator(&backend, 2)
        .run(inputs(3), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.failed_indices(), vec![1]);
    assert_eq!(report.failures[0].kind, ErrorKind::SynthesisUnavailable);
    assert_eq!(boundary_indices(&report), vec![0, 2]);
    assert!(report.artifact.partial);
    assert!(!report.cancelled);
    assert_eq!(backend.shutdown_calls(), 1);
}

#[tokio::test]
async fn test_all_or_nothing_fails_run() {
    let backend = Arc::new(ScriptedBackend::new().fail(1, unavailable(1)));

    let err = orchestrator(&backend, 1)
        .with_failure_policy(FailurePolicy::AllOrNothing)
        .run(inputs(4), CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SynthesisUnavailable);
    assert_eq!(err.segment_index(), Some(1));
    // single worker: nothing after the failed segment is dispatched
    assert_eq!(backend.started(), vec![0, 1]);
    assert_eq!(backend.shutdown_calls(), 1);
}

#[tokio::test]
async fn test_engine_not_ready_aborts_before_dispatch() {
    let backend = Arc::new(ScriptedBackend::new().not_ready(TtsError::EnginePortConflict {
        host: "127.0.0.1".to_string(),
        port: 10101,
    }));

    let err = orchestrator(&backend, 3)
        .run(inputs(3), CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::EnginePortConflict);
    assert!(backend.started().is_empty());
    assert_eq!(backend.shutdown_calls(), 1);
}

#[tokio::test]
async fn test_fatal_error_mid_run_stops_dispatch() {
    let backend = Arc::new(ScriptedBackend::new().fail(
        0,
        TtsError::EngineExited {
            status: "exit status: 1".to_string(),
        },
    ));

    let err = orchestrator(&backend, 1)
        .run(inputs(5), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(backend.started(), vec![0]);
    assert_eq!(backend.shutdown_calls(), 1);
}

#[tokio::test]
async fn test_cancellation_keeps_completed_audio() {
    let mut backend = ScriptedBackend::new();
    for i in 0..6 {
        backend = backend.delay(i, 100);
    }
    let backend = Arc::new(backend);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let report = orchestrator(&backend, 2)
        .run(inputs(6), cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert!(report.artifact.partial);
    assert!(!report.unfinished.is_empty());

    // in-flight work ran to completion and was kept
    let mut started = backend.started();
    started.sort_unstable();
    assert_eq!(boundary_indices(&report), started);
    assert_eq!(report.synthesized + report.unfinished.len(), 6);
    assert_eq!(backend.shutdown_calls(), 1);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let backend = Arc::new(ScriptedBackend::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = orchestrator(&backend, 2).run(inputs(3), cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.unfinished, vec![0, 1, 2]);
    assert_eq!(report.artifact.duration_secs, 0.0);
    assert!(backend.started().is_empty());
}

#[tokio::test]
async fn test_progress_reports_every_segment() {
    let backend = Arc::new(ScriptedBackend::new().fail(2, unavailable(2)));
    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);

    let mut script = inputs(4);
    script[3].text = "   ".to_string();

    orchestrator(&backend, 2)
        .with_progress(Arc::new(move |event: ProgressEvent| sink.lock().unwrap().push(event)))
        .run(script, CancellationToken::new())
        .await
        .unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 4);
    let mut completed: Vec<_> = events.iter().map(|e| e.completed).collect();
    completed.sort_unstable();
    assert_eq!(completed, vec![1, 2, 3, 4]);
    assert!(events.iter().all(|e| e.total == 4));

    let status_of = |index| events.iter().find(|e| e.index == index).map(|e| e.status);
    assert_eq!(status_of(2), Some(SegmentStatus::Failed));
    assert_eq!(status_of(3), Some(SegmentStatus::Skipped));
    assert_eq!(status_of(0), Some(SegmentStatus::Synthesized));
}

#[tokio::test]
async fn test_encoder_failure_downgrades_to_wav() {
    let backend = Arc::new(ScriptedBackend::new());
    let mut config = config(2);
    config.encoding.format = OutputEncoding::M4a;
    config.encoding.ffmpeg_path = "/nonexistent/ffmpeg".into();

    let report = SynthesisOrchestrator::from_config(backend.clone(), &config)
        .unwrap()
        .run(inputs(2), CancellationToken::new())
        .await
        .unwrap();

    let artifact = &report.artifact;
    assert_eq!(artifact.requested_encoding, OutputEncoding::M4a);
    assert_eq!(artifact.encoding, OutputEncoding::Wav);
    assert!(matches!(artifact.downgrade, Some(TtsError::EncodeFailure { .. })));
    assert_eq!(&artifact.bytes[..4], b"RIFF");
    // a downgrade is not a missing segment
    assert!(!artifact.partial);
}

#[tokio::test]
async fn test_end_to_end_with_fake_engine() {
    let engine = FakeEngine::new();
    let base_url = engine.serve().await;

    let mut config = config(2);
    config.engine = EngineSettings {
        base_url,
        command: "/nonexistent/aivis-engine".into(),
        ..Default::default()
    };
    config.client = ClientSettings::default();

    let supervisor = Arc::new(ProcessSupervisor::new(config.engine.clone()).unwrap());
    let client = AivisClient::new(
        Arc::clone(&supervisor),
        config.client.clone(),
        config.assembly.target_sample_rate,
    )
    .unwrap()
    .with_retry_policy(RetryPolicy::immediate(3));
    let orchestrator = SynthesisOrchestrator::from_config(Arc::new(client), &config).unwrap();

    let script = vec![
        SegmentInput::new("こんにちは", EmotionVector::new().with(EmotionLabel::Joy, 0.8)),
        SegmentInput::new("さようなら", EmotionVector::new().with(EmotionLabel::Sadness, 0.6)),
    ];
    let report = orchestrator
        .run(script, CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(boundary_indices(&report), vec![0, 1]);
    assert_eq!(report.artifact.sample_rate, 24000);
    assert_eq!(report.artifact.channels, 1);
    assert!(report.artifact.duration_secs > 0.4);
    let b = &report.artifact.boundaries;
    let gap = config.assembly.gap_samples();
    assert_eq!(gap, (config.assembly.gap_seconds * 24000.0).round() as usize);
    assert_eq!(b[1].start_sample - b[0].end_sample, gap);

    let decoded = AudioBuffer::from_wav_bytes(&report.artifact.bytes, 24000).unwrap();
    let samples = decoded.samples();
    assert_eq!(samples.len(), b[1].end_sample);

    for boundary in b {
        let slice = &samples[boundary.start_sample..boundary.end_sample];
        let db = 20.0 * rms(slice).log10();
        assert!(
            (db - config.assembly.target_dbfs).abs() < 0.5,
            "segment {} at {:.2} dBFS",
            boundary.index,
            db
        );
        // faded in and out
        assert!(slice[0].abs() < 1e-3);
        assert!(slice[slice.len() - 1].abs() < 1e-3);
    }
    assert!(samples[b[0].end_sample..b[1].start_sample]
        .iter()
        .all(|&s| s == 0.0));

    assert_eq!(engine.synthesis_calls(), 2);
    let sad_style = EmotionParameterMapper::default()
        .style_for(&EmotionVector::new().with(EmotionLabel::Sadness, 0.6));
    let speakers = engine.last_speaker.lock().unwrap().clone().unwrap();
    let joy_style = EmotionParameterMapper::default()
        .style_for(&EmotionVector::new().with(EmotionLabel::Joy, 0.8));
    assert!(speakers == sad_style.to_string() || speakers == joy_style.to_string());
}
