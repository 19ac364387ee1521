use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use crate::debug_artifacts::ArtifactPaths;
use crate::detect::Metrics;
use crate::error::Result;
use crate::explain::{Explanation, Verdict};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub input_file: String,
    pub output_file: String,
    pub processing_date: DateTime<Local>,
    pub model_used: String,
    pub frame_rate_original: f64,
    pub frame_rate_output: f64,
    pub total_frames_processed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictDistribution {
    #[serde(rename = "PASS")]
    pub pass: usize,
    #[serde(rename = "WARNING")]
    pub warning: usize,
    #[serde(rename = "FAIL")]
    pub fail: usize,
}

impl VerdictDistribution {
    pub fn count(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Pass => self.pass += 1,
            Verdict::Warning => self.warning += 1,
            Verdict::Fail => self.fail += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pass + self.warning + self.fail
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub average_severity: f64,
    pub verdict_distribution: VerdictDistribution,
    pub processing_time_seconds: f64,
    /// Streaming stopped early, the frames list is a prefix of the full run
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReportEntry {
    /// Index of the earlier frame of the pair
    pub frame_number: usize,
    /// Presentation time of the synthesized frame in seconds
    pub timestamp: f64,
    pub metrics: Metrics,
    pub severity_score: f64,
    pub verdict: Verdict,
    pub explanation: Vec<String>,
    #[serde(default)]
    pub paths: ArtifactPaths,
}

impl FrameReportEntry {
    pub fn new(frame_number: usize, timestamp: f64, metrics: Metrics, explanation: Explanation, paths: ArtifactPaths) -> Self {
        Self {
            frame_number,
            timestamp,
            metrics,
            severity_score: explanation.severity,
            verdict: explanation.verdict,
            explanation: explanation.details,
            paths,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub metadata: Metadata,
    pub summary: Summary,
    pub frames: Vec<FrameReportEntry>,
}

impl ReportDocument {
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_json(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

/// Append-only ledger of one run. Consumed by `finalize`, so the summary is computed exactly once.
pub struct ReportBuilder {
    metadata: Metadata,
    frames: Vec<FrameReportEntry>,
    started: Instant,
}

impl ReportBuilder {
    /// `metadata.total_frames_processed` is filled in by `finalize`
    pub fn new(metadata: Metadata) -> Self {
        Self { metadata, frames: Vec::new(), started: Instant::now() }
    }

    pub fn append(&mut self, entry: FrameReportEntry) {
        self.frames.push(entry);
    }

    pub fn entries(&self) -> &[FrameReportEntry] {
        &self.frames
    }

    pub fn finalize(self, total_frames_processed: usize, cancelled: bool) -> ReportDocument {
        let mut verdict_distribution = VerdictDistribution::default();
        for entry in &self.frames {
            verdict_distribution.count(entry.verdict);
        }
        let average_severity = if self.frames.is_empty() {
            0.0
        } else {
            self.frames.iter().map(|e| e.severity_score).sum::<f64>() / self.frames.len() as f64
        };

        ReportDocument {
            metadata: Metadata { total_frames_processed, ..self.metadata },
            summary: Summary {
                average_severity,
                verdict_distribution,
                processing_time_seconds: self.started.elapsed().as_secs_f64(),
                cancelled,
            },
            frames: self.frames,
        }
    }
}
