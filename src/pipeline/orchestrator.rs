//! Run orchestration
//!
//! A run turns a list of [`SegmentInput`]s into one [`FinalArtifact`]:
//!
//! 1. every input is mapped to a [`Segment`] (parameters and style fixed)
//! 2. the backend is brought to ready once, up front
//! 3. segments are dispatched to at most `workers` concurrent tasks
//! 4. each result is post-processed and placed into a [`ReorderBuffer`]
//! 5. the ordered stream is encoded and the backend is shut down
//!
//! Supervisor-level errors abort the run. Segment failures are collected
//! unless the policy is [`FailurePolicy::AllOrNothing`]. Cancellation stops
//! dispatch, lets in-flight work finish, and still produces a partial artifact.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::report::{FinalArtifact, RunReport, SegmentFailure};
use super::segment::{Segment, SegmentInput};
use crate::audio::{AudioAssembler, AudioEncoder, ReorderBuffer, SegmentOutcome, SegmentProcessor};
use crate::config::OrchestratorConfig;
use crate::core::error::{Result, TtsError};
use crate::emotion::{EmotionParameterMapper, ParameterTable, VoiceMap};
use crate::engine::SynthesisBackend;

/// What a run does with segment failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Leave failed segments out and report them
    #[default]
    CollectPartial,
    /// Abort the run on the first failed segment
    AllOrNothing,
}

/// Per-segment progress notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub index: usize,
    /// Segments settled so far, including this one
    pub completed: usize,
    pub total: usize,
    pub status: SegmentStatus,
}

/// How a segment settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStatus {
    Synthesized,
    Failed,
    Skipped,
}

/// Progress callback, invoked from worker tasks
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Drives one synthesis session from inputs to artifact
pub struct SynthesisOrchestrator {
    backend: Arc<dyn SynthesisBackend>,
    mapper: EmotionParameterMapper,
    voices: VoiceMap,
    assembler: AudioAssembler,
    encoder: AudioEncoder,
    workers: usize,
    policy: FailurePolicy,
    progress: Option<ProgressCallback>,
}

impl SynthesisOrchestrator {
    pub fn new(
        backend: Arc<dyn SynthesisBackend>,
        mapper: EmotionParameterMapper,
        assembler: AudioAssembler,
        encoder: AudioEncoder,
    ) -> Self {
        Self {
            backend,
            mapper,
            voices: VoiceMap::default(),
            assembler,
            encoder,
            workers: 3,
            policy: FailurePolicy::default(),
            progress: None,
        }
    }

    /// Build every component from configuration
    pub fn from_config(backend: Arc<dyn SynthesisBackend>, config: &OrchestratorConfig) -> Result<Self> {
        let table = match &config.mapper.table_path {
            Some(path) => ParameterTable::load(path)?,
            None => ParameterTable::default(),
        };
        let mapper = EmotionParameterMapper::new(table, config.mapper.activation_threshold);
        let assembler = AudioAssembler::new(
            SegmentProcessor::new((&config.assembly).into()),
            config.assembly.target_sample_rate,
            config.assembly.gap_samples(),
        );
        let encoder = AudioEncoder::new(config.encoding.clone());

        Ok(Self::new(backend, mapper, assembler, encoder)
            .with_voices(config.voices.clone())
            .with_workers(config.run.workers)
            .with_failure_policy(config.run.failure_policy))
    }

    /// Concurrency limit; at least one
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Per-speaker styles; speakers not in the map use the emotion styles
    pub fn with_voices(mut self, voices: VoiceMap) -> Self {
        self.voices = voices;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn backend(&self) -> &Arc<dyn SynthesisBackend> {
        &self.backend
    }

    pub fn mapper(&self) -> &EmotionParameterMapper {
        &self.mapper
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Map inputs to segments in input order
    pub fn prepare(&self, inputs: &[SegmentInput]) -> Vec<Segment> {
        inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let segment = Segment::new(index, input.text.clone(), input.emotions, &self.mapper);
                let Some(speaker) = input.speaker.as_deref() else {
                    return segment;
                };
                match self
                    .voices
                    .style_for(speaker, &input.emotions, self.mapper.threshold())
                {
                    Some(style_id) => segment.with_voice(speaker, style_id),
                    None => {
                        tracing::debug!(
                            "Segment {}: no voice configured for '{}', using emotion style",
                            index,
                            speaker
                        );
                        let style_id = segment.style_id();
                        segment.with_voice(speaker, style_id)
                    }
                }
            })
            .collect()
    }

    /// Synthesize and assemble `inputs`
    ///
    /// Returns `Err` only for supervisor-level failures, for the first segment
    /// failure under [`FailurePolicy::AllOrNothing`], and for errors while
    /// encoding. The backend is shut down on every path.
    pub async fn run(&self, inputs: Vec<SegmentInput>, cancel: CancellationToken) -> Result<RunReport> {
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let segments = self.prepare(&inputs);
        let total = segments.len();
        tracing::info!(
            "Run {}: {} segments, {} workers, backend {}",
            run_id,
            total,
            self.workers,
            self.backend.name()
        );

        let outcome = self.execute(segments, cancel.clone()).await;
        self.shutdown_backend().await;
        let settled = outcome?;

        let cancelled = cancel.is_cancelled();
        let (stream, unfinished) = settled.reorder.finish();
        let partial = cancelled || !settled.failures.is_empty() || !unfinished.is_empty();
        let synthesized = stream.boundaries().len();
        let duration_secs = stream.duration_secs();
        let (buffer, boundaries) = stream.into_buffer();

        let encoded = self.encoder.encode(&buffer).await?;

        let report = RunReport {
            run_id,
            artifact: FinalArtifact {
                bytes: encoded.bytes,
                encoding: encoded.encoding,
                requested_encoding: self.encoder.settings().format,
                sample_rate: buffer.sample_rate(),
                channels: buffer.channels(),
                duration_secs,
                boundaries,
                partial,
                downgrade: encoded.downgrade,
            },
            total_segments: total,
            synthesized,
            failures: settled.failures,
            skipped: settled.skipped,
            unfinished,
            cancelled,
            elapsed: started.elapsed(),
        };
        tracing::info!("{}", report.summary());
        Ok(report)
    }

    async fn execute(&self, segments: Vec<Segment>, cancel: CancellationToken) -> Result<Settled> {
        let total = segments.len();
        let reorder = Arc::new(self.assembler.reorder_buffer(total));
        let completed = Arc::new(AtomicUsize::new(0));

        let (blank, work): (Vec<_>, Vec<_>) = segments.into_iter().partition(|s| s.is_blank());
        let mut skipped = Vec::with_capacity(blank.len());
        for segment in blank {
            tracing::debug!("Segment {}: blank text, skipped", segment.index());
            reorder.insert(segment.index(), SegmentOutcome::Skipped)?;
            self.notify(segment.index(), &completed, total, SegmentStatus::Skipped);
            skipped.push(segment.index());
        }

        if work.is_empty() || cancel.is_cancelled() {
            return Self::settle(reorder, Vec::new(), skipped);
        }

        let ready = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.backend.ensure_ready() => Some(result),
        };
        match ready {
            None => {
                tracing::warn!("Cancelled while waiting for the engine");
                return Self::settle(reorder, Vec::new(), skipped);
            }
            Some(Err(e)) => {
                tracing::error!("Engine not ready: {}", e);
                return Err(e);
            }
            Some(Ok(())) => {}
        }

        // Stops dispatch on caller cancellation, fatal errors and all-or-nothing aborts
        let halt = cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks: JoinSet<(usize, std::result::Result<(), TtsError>)> = JoinSet::new();
        let mut dispatched = BTreeSet::new();

        for segment in work {
            let permit = tokio::select! {
                biased;
                _ = halt.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => permit,
            };
            let permit = permit.map_err(|_| TtsError::Internal {
                message: "worker semaphore closed".to_string(),
                location: Some("SynthesisOrchestrator::execute".to_string()),
            })?;

            dispatched.insert(segment.index());
            let worker = Worker {
                backend: Arc::clone(&self.backend),
                assembler: self.assembler.clone(),
                reorder: Arc::clone(&reorder),
                completed: Arc::clone(&completed),
                progress: self.progress.clone(),
                halt: halt.clone(),
                policy: self.policy,
                total,
            };
            tasks.spawn(async move {
                let _permit = permit;
                let index = segment.index();
                (index, worker.process(segment).await)
            });
        }

        let mut failures = Vec::new();
        let mut fatal: Option<TtsError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    dispatched.remove(&index);
                    match result {
                        Ok(()) => {}
                        Err(e) if e.is_fatal() => {
                            if fatal.is_none() {
                                fatal = Some(e);
                            }
                        }
                        Err(e) => failures.push(SegmentFailure::new(index, e)),
                    }
                }
                Err(e) => tracing::error!("Worker task failed: {}", e),
            }
        }

        if let Some(e) = fatal {
            tracing::error!("Run aborted: {}", e);
            return Err(e);
        }

        // Dispatched but never reported: the worker panicked
        for index in dispatched {
            let error = TtsError::Internal {
                message: format!("worker for segment {} did not complete", index),
                location: Some("SynthesisOrchestrator::execute".to_string()),
            };
            if reorder.insert(index, SegmentOutcome::Failed).is_ok() {
                failures.push(SegmentFailure::new(index, error));
            }
        }
        failures.sort_by_key(|f| f.index);

        if self.policy == FailurePolicy::AllOrNothing {
            if let Some(first) = failures.into_iter().next() {
                tracing::error!("Run aborted on segment {}: {}", first.index, first.error);
                return Err(first.error);
            }
            return Self::settle(reorder, Vec::new(), skipped);
        }

        Self::settle(reorder, failures, skipped)
    }

    fn settle(reorder: Arc<ReorderBuffer>, failures: Vec<SegmentFailure>, skipped: Vec<usize>) -> Result<Settled> {
        let reorder = Arc::try_unwrap(reorder).map_err(|_| TtsError::Internal {
            message: "reorder buffer still shared after all workers finished".to_string(),
            location: Some("SynthesisOrchestrator::settle".to_string()),
        })?;
        Ok(Settled {
            reorder,
            failures,
            skipped,
        })
    }

    fn notify(&self, index: usize, completed: &AtomicUsize, total: usize, status: SegmentStatus) {
        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(callback) = &self.progress {
            callback(ProgressEvent {
                index,
                completed: done,
                total,
                status,
            });
        }
    }

    async fn shutdown_backend(&self) {
        if let Err(e) = self.backend.shutdown().await {
            tracing::warn!("Backend shutdown failed: {}", e);
        }
    }
}

struct Settled {
    reorder: ReorderBuffer,
    failures: Vec<SegmentFailure>,
    skipped: Vec<usize>,
}

/// State moved into one worker task
struct Worker {
    backend: Arc<dyn SynthesisBackend>,
    assembler: AudioAssembler,
    reorder: Arc<ReorderBuffer>,
    completed: Arc<AtomicUsize>,
    progress: Option<ProgressCallback>,
    halt: CancellationToken,
    policy: FailurePolicy,
    total: usize,
}

impl Worker {
    async fn process(self, segment: Segment) -> std::result::Result<(), TtsError> {
        let index = segment.index();
        let result = match self.backend.synthesize(&segment).await {
            Ok(buffer) => self.assembler.process_segment(buffer),
            Err(e) => Err(e),
        };

        let (outcome, status) = match &result {
            Ok(buffer) => (SegmentOutcome::Audio(buffer.clone()), SegmentStatus::Synthesized),
            Err(e) => {
                if e.is_fatal() {
                    tracing::error!("Segment {}: {}", index, e);
                    self.halt.cancel();
                } else {
                    tracing::warn!("Segment {} failed: {}", index, e);
                    if self.policy == FailurePolicy::AllOrNothing {
                        self.halt.cancel();
                    }
                }
                (SegmentOutcome::Failed, SegmentStatus::Failed)
            }
        };
        self.reorder.insert(index, outcome)?;

        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("Segment {} settled ({}/{})", index, done, self.total);
        if let Some(callback) = &self.progress {
            callback(ProgressEvent {
                index,
                completed: done,
                total: self.total,
                status,
            });
        }

        result.map(|_| ())
    }
}
