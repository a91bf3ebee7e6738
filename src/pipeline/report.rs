//! Run results

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::{OutputEncoding, SegmentBoundary};
use crate::core::error::{ErrorKind, Result, ResultExt, TtsError};

/// A segment that produced no audio because synthesis failed
#[derive(Debug, Clone)]
pub struct SegmentFailure {
    pub index: usize,
    pub kind: ErrorKind,
    pub error: TtsError,
}

impl SegmentFailure {
    pub fn new(index: usize, error: TtsError) -> Self {
        Self {
            index,
            kind: error.kind(),
            error,
        }
    }
}

/// The encoded output of one run
#[derive(Debug, Clone)]
pub struct FinalArtifact {
    pub bytes: Vec<u8>,
    /// Encoding actually produced
    pub encoding: OutputEncoding,
    /// Encoding that was configured
    pub requested_encoding: OutputEncoding,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_secs: f64,
    pub boundaries: Vec<SegmentBoundary>,
    /// Some segment is absent from the audio
    pub partial: bool,
    /// Why the requested encoding was not produced
    pub downgrade: Option<TtsError>,
}

impl FinalArtifact {
    pub fn is_degraded(&self) -> bool {
        self.downgrade.is_some()
    }

    /// Write the artifact, correcting the file extension to the actual encoding
    ///
    /// Returns the path that was written.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let requested = path.as_ref();
        let path = match requested.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case(self.encoding.extension()) => {
                requested.to_path_buf()
            }
            _ => requested.with_extension(self.encoding.extension()),
        };
        if path.as_path() != requested {
            tracing::warn!(
                "Writing {} output to {} instead of {}",
                self.encoding,
                path.display(),
                requested.display()
            );
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).io_at("Failed to create output directory", parent)?;
        }
        std::fs::write(&path, &self.bytes).io_at("Failed to write output", &path)?;
        Ok(path)
    }
}

/// Everything a caller learns from one orchestration run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub artifact: FinalArtifact,
    pub total_segments: usize,
    /// Segments whose audio is in the artifact
    pub synthesized: usize,
    /// Failed segments, ordered by index
    pub failures: Vec<SegmentFailure>,
    /// Blank segments that had nothing to synthesize
    pub skipped: Vec<usize>,
    /// Segments never dispatched because the run was cancelled
    pub unfinished: Vec<usize>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl RunReport {
    /// Every segment made it into the artifact
    pub fn is_complete(&self) -> bool {
        !self.artifact.partial
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.index).collect()
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "run {}: {}/{} segments, {} failed, {} skipped, {} unfinished, {:.2}s of {} audio{}{}",
            self.run_id,
            self.synthesized,
            self.total_segments,
            self.failures.len(),
            self.skipped.len(),
            self.unfinished.len(),
            self.artifact.duration_secs,
            self.artifact.encoding,
            if self.cancelled { ", cancelled" } else { "" },
            if self.artifact.is_degraded() { ", degraded" } else { "" },
        )
    }
}
