//! Per-stage outcomes for the best-effort enhancement pipelines.
//!
//! Each stage returns a `Result`; the pipeline records what happened here and
//! carries on regardless. The report is what callers (and tests) inspect
//! instead of guessing from the file on disk.

use std::fmt;

use crate::error::EnhanceError;

/// A named step of an enhancement pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Decode,
    Orientation,
    Resize,
    Contrast,
    Sharpen,
    Denoise,
    Deskew,
    TextCrop,
    Encode,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Decode => "decode",
            Stage::Orientation => "orientation",
            Stage::Resize => "resize",
            Stage::Contrast => "contrast",
            Stage::Sharpen => "sharpen",
            Stage::Denoise => "denoise",
            Stage::Deskew => "deskew",
            Stage::TextCrop => "text_crop",
            Stage::Encode => "encode",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage ran and changed the working buffer (or file).
    Applied,

    /// The stage had nothing to do, or a capability it needs is missing.
    Skipped(String),

    /// The stage errored; the buffer is as it was before the stage.
    Failed(String),
}

/// Ordered record of stage outcomes for one file.
#[derive(Debug, Clone, Default)]
pub struct EnhanceReport {
    stages: Vec<(Stage, StageOutcome)>,
}

impl EnhanceReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied(&mut self, stage: Stage) {
        self.stages.push((stage, StageOutcome::Applied));
    }

    pub fn skipped(&mut self, stage: Stage, reason: impl Into<String>) {
        self.stages.push((stage, StageOutcome::Skipped(reason.into())));
    }

    pub fn failed(&mut self, stage: Stage, err: &EnhanceError) {
        self.stages.push((stage, StageOutcome::Failed(err.to_string())));
    }

    /// Record the result of a stage that either changes the buffer or not.
    ///
    /// `Ok(Some(v))` is applied, `Ok(None)` is skipped with `reason`, and an
    /// error is recorded as failed. Returns the new value when there is one.
    pub fn record<T>(
        &mut self,
        stage: Stage,
        result: Result<Option<T>, EnhanceError>,
        reason: &str,
    ) -> Option<T> {
        match result {
            Ok(Some(value)) => {
                self.applied(stage);
                Some(value)
            }
            Ok(None) => {
                self.skipped(stage, reason);
                None
            }
            Err(err) => {
                tracing::debug!("Stage {} failed: {}", stage, err);
                self.failed(stage, &err);
                None
            }
        }
    }

    /// Outcome of `stage`, if it was reached.
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, outcome)| outcome)
    }

    pub fn is_applied(&self, stage: Stage) -> bool {
        matches!(self.outcome(stage), Some(StageOutcome::Applied))
    }

    /// True if the file on disk was rewritten.
    pub fn wrote_file(&self) -> bool {
        self.is_applied(Stage::Encode)
    }

    pub fn stages(&self) -> &[(Stage, StageOutcome)] {
        &self.stages
    }

    pub fn failures(&self) -> impl Iterator<Item = (Stage, &str)> {
        self.stages.iter().filter_map(|(stage, outcome)| match outcome {
            StageOutcome::Failed(message) => Some((*stage, message.as_str())),
            _ => None,
        })
    }
}
