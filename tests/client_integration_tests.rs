//! Synthesis client against an in-process fake engine
//!
//! The fake engine is already listening when the supervisor first probes it,
//! so it is adopted and no process is launched.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{FakeEngine, SynthesisMode};
use sentiovox::config::{ClientSettings, EngineSettings};
use sentiovox::emotion::{EmotionLabel, EmotionParameterMapper, EmotionVector};
use sentiovox::pipeline::Segment;
use sentiovox::{
    AivisClient, EngineProcessState, ErrorKind, ProcessSupervisor, RetryPolicy, SynthesisBackend,
    TtsError,
};

async fn client_for(engine: &Arc<FakeEngine>) -> AivisClient {
    client_with(engine, ClientSettings::default()).await
}

async fn client_with(engine: &Arc<FakeEngine>, settings: ClientSettings) -> AivisClient {
    let base_url = engine.serve().await;
    let supervisor = Arc::new(
        ProcessSupervisor::new(EngineSettings {
            base_url,
            // never launched: the fake engine is adopted
            command: "/nonexistent/aivis-engine".into(),
            ..Default::default()
        })
        .unwrap(),
    );
    AivisClient::new(supervisor, settings, 24000)
        .unwrap()
        .with_retry_policy(RetryPolicy::immediate(3))
}

fn short_timeout() -> ClientSettings {
    ClientSettings {
        request_timeout_ms: 200,
        ..Default::default()
    }
}

fn joyful(index: usize, text: &str) -> Segment {
    let mapper = EmotionParameterMapper::default();
    Segment::new(
        index,
        text,
        EmotionVector::new().with(EmotionLabel::Joy, 0.8),
        &mapper,
    )
}

#[tokio::test]
async fn test_adopts_running_engine() {
    let engine = FakeEngine::new();
    let client = client_for(&engine).await;

    client.ensure_ready().await.unwrap();
    assert_eq!(client.supervisor().state(), EngineProcessState::Ready);
    assert!(!client.supervisor().owns_process().await);
    assert_eq!(client.engine_version().await.unwrap(), "1.0.0");

    // adopted engines are left running
    client.shutdown().await.unwrap();
    assert_eq!(client.supervisor().state(), EngineProcessState::Stopped);
    assert!(client.supervisor().probe().await);
}

#[tokio::test]
async fn test_synthesizes_and_merges_parameters() {
    let engine = FakeEngine::new();
    let client = client_for(&engine).await;
    let segment = joyful(0, "こんにちは");

    let audio = client.synthesize(&segment).await.unwrap();
    assert_eq!(audio.sample_rate(), 24000);
    assert!(!audio.is_empty());

    let query = engine.last_query.lock().unwrap().clone().unwrap();
    let params = segment.parameters();
    assert_eq!(query["speedScale"].as_f64().unwrap(), params.speed_scale);
    assert_eq!(query["pitchScale"].as_f64().unwrap(), params.pitch_scale);
    assert_eq!(query["intonationScale"].as_f64().unwrap(), params.intonation_scale);
    assert_eq!(query["outputSamplingRate"].as_u64(), Some(24000));
    assert_eq!(query["outputStereo"].as_bool(), Some(false));
    // the engine-provided query is kept, not replaced
    assert_eq!(query["kana"].as_str(), Some("こんにちは。"));
    assert_eq!(
        engine.last_speaker.lock().unwrap().clone(),
        Some(segment.style_id().to_string())
    );
}

#[tokio::test]
async fn test_retries_transient_failures() {
    let engine = FakeEngine::new();
    engine.fail_next(2);
    let client = client_for(&engine).await;

    client.synthesize(&joyful(0, "おはよう")).await.unwrap();

    // both steps repeat on every attempt
    assert_eq!(engine.synthesis_calls(), 3);
    assert_eq!(engine.query_calls(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_report_unavailable() {
    let engine = FakeEngine::new();
    engine.fail_next(4);
    let client = client_for(&engine).await;

    let err = client.synthesize(&joyful(5, "おやすみ")).await.unwrap_err();
    match err {
        TtsError::SynthesisUnavailable { index, attempts, .. } => {
            assert_eq!(index, 5);
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(engine.synthesis_calls(), 3);
}

#[tokio::test]
async fn test_request_timeout_is_retried() {
    let engine = FakeEngine::new();
    engine.stall_next(2, Duration::from_secs(2));
    let client = client_with(&engine, short_timeout()).await;

    let started = Instant::now();
    let audio = client.synthesize(&joyful(0, "まだかな")).await.unwrap();
    assert!(!audio.is_empty());
    assert_eq!(engine.synthesis_calls(), 3);
    assert_eq!(engine.query_calls(), 3);
    // two timed-out attempts, neither waited out the stall
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_repeated_timeouts_report_unavailable() {
    let engine = FakeEngine::new();
    engine.stall_next(3, Duration::from_secs(2));
    let client = client_with(&engine, short_timeout()).await;

    let err = client.synthesize(&joyful(3, "もう少し")).await.unwrap_err();
    match err {
        TtsError::SynthesisUnavailable { index, attempts, .. } => {
            assert_eq!(index, 3);
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(engine.synthesis_calls(), 3);
}

#[tokio::test]
async fn test_audio_query_server_error_is_retried() {
    let engine = FakeEngine::new();
    engine.fail_next_queries(2);
    let client = client_for(&engine).await;

    client.synthesize(&joyful(0, "もう一度")).await.unwrap();

    // the failed queries never reached /synthesis
    assert_eq!(engine.query_calls(), 3);
    assert_eq!(engine.synthesis_calls(), 1);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let engine = FakeEngine::new();
    engine.set_mode(SynthesisMode::Reject);
    let client = client_for(&engine).await;

    let err = client.synthesize(&joyful(1, "はい")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSynthesisRequest);
    assert_eq!(err.segment_index(), Some(1));
    assert_eq!(engine.synthesis_calls(), 1);
}

#[tokio::test]
async fn test_malformed_audio_is_reported() {
    let engine = FakeEngine::new();
    engine.set_mode(SynthesisMode::Garbage);
    let client = client_for(&engine).await;

    let err = client.synthesize(&joyful(2, "いいえ")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSynthesisResponse);
    assert_eq!(engine.synthesis_calls(), 1);
}

#[tokio::test]
async fn test_blank_and_oversized_text_rejected_locally() {
    let engine = FakeEngine::new();
    let client = client_for(&engine).await;

    let err = client.synthesize(&joyful(0, "  \n ")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSynthesisRequest);

    let long = "あ".repeat(ClientSettings::default().max_text_length + 1);
    let err = client.synthesize(&joyful(1, &long)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSynthesisRequest);

    assert_eq!(engine.query_calls(), 0);
}

#[tokio::test]
async fn test_unreachable_engine_is_fatal() {
    let supervisor = Arc::new(
        ProcessSupervisor::new(EngineSettings {
            base_url: "http://127.0.0.1:9".to_string(),
            command: "/nonexistent/aivis-engine".into(),
            ..Default::default()
        })
        .unwrap(),
    );
    let client = AivisClient::new(supervisor, ClientSettings::default(), 24000).unwrap();

    let err = client.synthesize(&joyful(0, "もしもし")).await.unwrap_err();
    assert!(err.is_fatal(), "unexpected error: {err}");
}
