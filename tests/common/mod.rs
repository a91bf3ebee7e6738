//! Shared test doubles: an in-process fake AivisSpeech engine and a scripted backend

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use sentiovox::audio::AudioBuffer;
use sentiovox::pipeline::Segment;
use sentiovox::{SynthesisBackend, TtsError};

/// How the fake engine answers `/synthesis` once its scripted 503s are used up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisMode {
    Wav,
    Reject,
    Garbage,
}

/// In-process stand-in for the engine HTTP API
pub struct FakeEngine {
    pub query_calls: AtomicUsize,
    pub synthesis_calls: AtomicUsize,
    /// Number of upcoming `/synthesis` calls that answer 503
    pub unavailable_remaining: AtomicUsize,
    /// Number of upcoming `/audio_query` calls that answer 500
    pub query_unavailable_remaining: AtomicUsize,
    /// Number of upcoming `/synthesis` calls that hang for `stall_for`
    pub stall_remaining: AtomicUsize,
    pub stall_for: Mutex<Duration>,
    pub mode: Mutex<SynthesisMode>,
    pub last_query: Mutex<Option<Value>>,
    pub last_speaker: Mutex<Option<String>>,
    /// `/version` answers 503 while false
    pub healthy: AtomicBool,
    pub sample_rate: u32,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            query_calls: AtomicUsize::new(0),
            synthesis_calls: AtomicUsize::new(0),
            unavailable_remaining: AtomicUsize::new(0),
            query_unavailable_remaining: AtomicUsize::new(0),
            stall_remaining: AtomicUsize::new(0),
            stall_for: Mutex::new(Duration::ZERO),
            mode: Mutex::new(SynthesisMode::Wav),
            last_query: Mutex::new(None),
            last_speaker: Mutex::new(None),
            healthy: AtomicBool::new(true),
            sample_rate: 24000,
        })
    }

    pub fn fail_next(&self, count: usize) {
        self.unavailable_remaining.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_queries(&self, count: usize) {
        self.query_unavailable_remaining.store(count, Ordering::SeqCst);
    }

    /// Hang the next `count` synthesis calls for `duration` before answering
    pub fn stall_next(&self, count: usize, duration: Duration) {
        *self.stall_for.lock().unwrap() = duration;
        self.stall_remaining.store(count, Ordering::SeqCst);
    }

    pub fn set_mode(&self, mode: SynthesisMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn synthesis_calls(&self) -> usize {
        self.synthesis_calls.load(Ordering::SeqCst)
    }

    /// Serve on a random local port; returns the base URL
    pub async fn serve(self: &Arc<Self>) -> String {
        self.serve_at("127.0.0.1:0").await
    }

    /// Serve on `addr`; returns the base URL
    pub async fn serve_at(self: &Arc<Self>, addr: &str) -> String {
        let app = Router::new()
            .route("/version", get(version))
            .route("/audio_query", post(audio_query))
            .route("/synthesis", post(synthesis))
            .with_state(Arc::clone(self));

        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }
}

async fn version(State(engine): State<Arc<FakeEngine>>) -> Response {
    if !engine.healthy.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "warming up").into_response();
    }
    Json(json!("1.0.0")).into_response()
}

async fn audio_query(
    State(engine): State<Arc<FakeEngine>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    engine.query_calls.fetch_add(1, Ordering::SeqCst);
    if take_one(&engine.query_unavailable_remaining) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "engine crashed").into_response();
    }
    let Some(text) = params.get("text") else {
        return (StatusCode::UNPROCESSABLE_ENTITY, "missing text").into_response();
    };
    Json(json!({
        "accent_phrases": [],
        "speedScale": 1.0,
        "intonationScale": 1.0,
        "tempoDynamicsScale": 1.0,
        "pitchScale": 0.0,
        "volumeScale": 1.0,
        "prePhonemeLength": 0.1,
        "postPhonemeLength": 0.1,
        "outputSamplingRate": 44100,
        "outputStereo": true,
        "kana": text,
    }))
    .into_response()
}

async fn synthesis(
    State(engine): State<Arc<FakeEngine>>,
    Query(params): Query<HashMap<String, String>>,
    Json(query): Json<Value>,
) -> Response {
    engine.synthesis_calls.fetch_add(1, Ordering::SeqCst);
    *engine.last_query.lock().unwrap() = Some(query.clone());
    *engine.last_speaker.lock().unwrap() = params.get("speaker").cloned();

    if take_one(&engine.stall_remaining) {
        let stall = *engine.stall_for.lock().unwrap();
        tokio::time::sleep(stall).await;
    }

    if take_one(&engine.unavailable_remaining) {
        return (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response();
    }

    let mode = *engine.mode.lock().unwrap();
    match mode {
        SynthesisMode::Reject => (StatusCode::UNPROCESSABLE_ENTITY, "invalid speaker").into_response(),
        SynthesisMode::Garbage => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "audio/wav")],
            b"definitely not RIFF".to_vec(),
        )
            .into_response(),
        SynthesisMode::Wav => {
            let rate = query["outputSamplingRate"]
                .as_u64()
                .unwrap_or(engine.sample_rate as u64) as u32;
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "audio/wav")],
                tone_wav(rate, 0.25),
            )
                .into_response()
        }
    }
}

/// Decrement a scripted-failure counter; true when one was consumed
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Mono 16-bit WAV with a short silent lead-in and tail around a tone
pub fn tone_wav(sample_rate: u32, seconds: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let pad = (sample_rate / 20) as usize;
        let body = (sample_rate as f32 * seconds) as usize;
        for _ in 0..pad {
            writer.write_sample(0i16).unwrap();
        }
        for i in 0..body {
            let t = i as f32 / sample_rate as f32;
            let v = (t * 220.0 * std::f32::consts::TAU).sin() * 0.4;
            writer.write_sample((v * i16::MAX as f32) as i16).unwrap();
        }
        for _ in 0..pad {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// A tone segment whose length identifies the segment index
pub fn tone_buffer(index: usize, sample_rate: u32) -> AudioBuffer {
    let len = 1200 * (index + 1);
    let samples = (0..len)
        .map(|i| (i as f32 * 0.07).sin() * 0.3)
        .collect();
    AudioBuffer::new(samples, sample_rate)
}

/// Backend double with scripted per-index delays and failures
pub struct ScriptedBackend {
    pub sample_rate: u32,
    pub delays: HashMap<usize, Duration>,
    pub failures: HashMap<usize, TtsError>,
    pub ready_error: Option<TtsError>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub started: Mutex<Vec<usize>>,
    pub completed: Mutex<HashSet<usize>>,
    pub ensure_ready_calls: AtomicUsize,
    pub shutdown_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            sample_rate: 24000,
            delays: HashMap::new(),
            failures: HashMap::new(),
            ready_error: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
            completed: Mutex::new(HashSet::new()),
            ensure_ready_calls: AtomicUsize::new(0),
            shutdown_calls: AtomicUsize::new(0),
        }
    }

    pub fn delay(mut self, index: usize, millis: u64) -> Self {
        self.delays.insert(index, Duration::from_millis(millis));
        self
    }

    pub fn fail(mut self, index: usize, error: TtsError) -> Self {
        self.failures.insert(index, error);
        self
    }

    pub fn not_ready(mut self, error: TtsError) -> Self {
        self.ready_error = Some(error);
        self
    }

    pub fn started(&self) -> Vec<usize> {
        self.started.lock().unwrap().clone()
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SynthesisBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn is_ready(&self) -> bool {
        self.ready_error.is_none()
    }

    async fn ensure_ready(&self) -> sentiovox::Result<()> {
        self.ensure_ready_calls.fetch_add(1, Ordering::SeqCst);
        match &self.ready_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn synthesize(&self, segment: &Segment) -> sentiovox::Result<AudioBuffer> {
        let index = segment.index();
        self.started.lock().unwrap().push(index);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(&index) {
            tokio::time::sleep(*delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.lock().unwrap().insert(index);

        match self.failures.get(&index) {
            Some(e) => Err(e.clone()),
            None => Ok(tone_buffer(index, self.sample_rate)),
        }
    }

    async fn shutdown(&self) -> sentiovox::Result<()> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
