//! Ordered assembly of independently synthesized segments
//!
//! Workers finish in any order. Each result goes into a [`ReorderBuffer`],
//! which appends segments to the output stream strictly by index, inserting
//! a fixed gap of silence between consecutive contributing segments.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;

use super::buffer::AudioBuffer;
use super::processor::SegmentProcessor;
use crate::core::error::{Result, TtsError};

/// What a worker hands to the reorder buffer for one index
#[derive(Debug, Clone)]
pub enum SegmentOutcome {
    /// Processed audio; may be empty after trimming
    Audio(AudioBuffer),
    /// Synthesis failed; the index advances without audio or gap
    Failed,
    /// Nothing to synthesize (blank text) or never dispatched
    Skipped,
}

/// Position of one segment in the assembled stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentBoundary {
    pub index: usize,
    pub start_sample: usize,
    pub end_sample: usize,
    pub start_secs: f64,
    pub end_secs: f64,
}

/// Concatenated output with segment boundaries
#[derive(Debug, Clone)]
pub struct AssembledStream {
    samples: Vec<f32>,
    sample_rate: u32,
    gap_samples: usize,
    boundaries: Vec<SegmentBoundary>,
}

impl AssembledStream {
    fn new(sample_rate: u32, gap_samples: usize) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
            gap_samples,
            boundaries: Vec::new(),
        }
    }

    fn append(&mut self, index: usize, segment: &[f32]) {
        if !self.boundaries.is_empty() {
            self.samples
                .resize(self.samples.len() + self.gap_samples, 0.0);
        }
        let start = self.samples.len();
        self.samples.extend_from_slice(segment);
        let end = self.samples.len();
        let rate = self.sample_rate.max(1) as f64;
        self.boundaries.push(SegmentBoundary {
            index,
            start_sample: start,
            end_sample: end,
            start_secs: start as f64 / rate,
            end_secs: end as f64 / rate,
        });
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn boundaries(&self) -> &[SegmentBoundary] {
        &self.boundaries
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate.max(1) as f64
    }

    pub fn into_buffer(self) -> (AudioBuffer, Vec<SegmentBoundary>) {
        (AudioBuffer::new(self.samples, self.sample_rate), self.boundaries)
    }
}

struct ReorderState {
    pending: BTreeMap<usize, SegmentOutcome>,
    next: usize,
    stream: AssembledStream,
}

impl ReorderState {
    fn drain_ready(&mut self) {
        while let Some(outcome) = self.pending.remove(&self.next) {
            if let SegmentOutcome::Audio(buffer) = outcome {
                self.stream.append(self.next, buffer.samples());
            }
            self.next += 1;
        }
    }
}

/// Guarded index → outcome map plus a monotonically advancing cursor
pub struct ReorderBuffer {
    total: usize,
    state: Mutex<ReorderState>,
}

impl ReorderBuffer {
    pub fn new(total: usize, sample_rate: u32, gap_samples: usize) -> Self {
        Self {
            total,
            state: Mutex::new(ReorderState {
                pending: BTreeMap::new(),
                next: 0,
                stream: AssembledStream::new(sample_rate, gap_samples),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReorderState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Record the outcome for `index`; returns whether every index is in
    pub fn insert(&self, index: usize, outcome: SegmentOutcome) -> Result<bool> {
        if index >= self.total {
            return Err(TtsError::Internal {
                message: format!("Segment index {} out of range (total {})", index, self.total),
                location: Some("ReorderBuffer::insert".to_string()),
            });
        }

        let mut state = self.lock();
        if index < state.next || state.pending.contains_key(&index) {
            return Err(TtsError::Internal {
                message: format!("Segment {} delivered twice", index),
                location: Some("ReorderBuffer::insert".to_string()),
            });
        }

        state.pending.insert(index, outcome);
        state.drain_ready();
        Ok(state.next == self.total)
    }

    /// Next index the cursor is waiting for
    pub fn next_index(&self) -> usize {
        self.lock().next
    }

    pub fn is_complete(&self) -> bool {
        self.lock().next == self.total
    }

    /// Close the buffer; indices that never arrived count as skipped
    ///
    /// Returns the stream and the indices that were missing.
    pub fn finish(self) -> (AssembledStream, Vec<usize>) {
        let mut state = match self.state.into_inner() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut missing = Vec::new();
        while state.next < self.total {
            if !state.pending.contains_key(&state.next) {
                missing.push(state.next);
                state.pending.insert(state.next, SegmentOutcome::Skipped);
            }
            state.drain_ready();
        }

        (state.stream, missing)
    }
}

/// Post-processes segments and concatenates them in order
#[derive(Debug, Clone)]
pub struct AudioAssembler {
    processor: SegmentProcessor,
    sample_rate: u32,
    gap_samples: usize,
}

impl AudioAssembler {
    pub fn new(processor: SegmentProcessor, sample_rate: u32, gap_samples: usize) -> Self {
        Self {
            processor,
            sample_rate,
            gap_samples,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn gap_samples(&self) -> usize {
        self.gap_samples
    }

    /// Trim, fade and normalize one segment
    pub fn process_segment(&self, buffer: AudioBuffer) -> Result<AudioBuffer> {
        if buffer.sample_rate() != self.sample_rate {
            return Err(TtsError::audio(
                crate::core::error::AudioOperation::Assembling,
                format!(
                    "Segment at {} Hz does not match output rate {} Hz",
                    buffer.sample_rate(),
                    self.sample_rate
                ),
            ));
        }
        let processed = self.processor.process(buffer.into_samples());
        Ok(AudioBuffer::new(processed, self.sample_rate))
    }

    /// Reorder buffer sized for `total` segments
    pub fn reorder_buffer(&self, total: usize) -> ReorderBuffer {
        ReorderBuffer::new(total, self.sample_rate, self.gap_samples)
    }

    /// One-shot assembly of already-processed outcomes in any order
    pub fn assemble<I>(&self, total: usize, outcomes: I) -> Result<AssembledStream>
    where
        I: IntoIterator<Item = (usize, SegmentOutcome)>,
    {
        let buffer = self.reorder_buffer(total);
        for (index, outcome) in outcomes {
            buffer.insert(index, outcome)?;
        }
        Ok(buffer.finish().0)
    }
}
