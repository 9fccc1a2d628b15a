// Job record and wipe state machine
//
// CREATED -> RUNNING -> VERIFYING -> COMPLETED | FAILED
// Any non-terminal state may go to FAILED. Nothing is re-entered and terminal
// jobs reject every mutation.

use crate::algorithms::{PatternKind, SanitizationMethod, SanitizationPlan};
use crate::drives::HiddenAreaRecord;
use crate::error::ErrorClass;
use crate::verification::VerificationResult;
use crate::{SanitizeError, SanitizeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const CANCELLED_MARKER: &str = "cancelled, not sanitized";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Created,
    Running,
    Verifying,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Created, JobState::Running)
                | (JobState::Running, JobState::Verifying)
                | (JobState::Verifying, JobState::Completed)
                | (JobState::Created, JobState::Failed)
                | (JobState::Running, JobState::Failed)
                | (JobState::Verifying, JobState::Failed)
        )
    }
}

/// One completed, flushed pass (or the single synthetic record of a vendor command)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PassRecord {
    pub pass_number: u32,
    pub pattern_kind: PatternKind,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub bytes_written: u64,
    pub throughput_bytes_per_sec: f64,
}

impl PassRecord {
    /// Throughput divides by at least one second so short passes don't spike
    pub(crate) fn new(
        pass_number: u32,
        pattern_kind: PatternKind,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        bytes_written: u64,
        elapsed: Duration,
    ) -> Self {
        let seconds = elapsed.as_secs_f64().max(1.0);
        Self {
            pass_number,
            pattern_kind,
            start_time,
            end_time,
            bytes_written,
            throughput_bytes_per_sec: (bytes_written as f64 / seconds).round(),
        }
    }
}

/// Why a job ended in FAILED
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFailure {
    pub class: ErrorClass,
    pub kind: String,
    pub message: String,
}

impl From<&SanitizeError> for JobFailure {
    fn from(err: &SanitizeError) -> Self {
        let message = match err {
            SanitizeError::Cancelled => CANCELLED_MARKER.to_string(),
            other => other.to_string(),
        };
        Self {
            class: err.class(),
            kind: err.kind().to_string(),
            message,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizationJob {
    operation_id: String,
    device_path: String,
    plan: SanitizationPlan,
    executed_method: SanitizationMethod,
    fallback_from: Option<SanitizationMethod>,
    state: JobState,
    hidden_areas: Vec<HiddenAreaRecord>,
    pass_records: Vec<PassRecord>,
    verification: Option<VerificationResult>,
    failure: Option<JobFailure>,
    cancelled: bool,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
}

impl SanitizationJob {
    pub(crate) fn new(operation_id: String, device_path: String, plan: SanitizationPlan) -> Self {
        Self {
            operation_id,
            device_path,
            executed_method: plan.method,
            plan,
            fallback_from: None,
            state: JobState::Created,
            hidden_areas: Vec::new(),
            pass_records: Vec::new(),
            verification: None,
            failure: None,
            cancelled: false,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    pub fn plan(&self) -> &SanitizationPlan {
        &self.plan
    }

    /// The method actually carried out; differs from the plan after a fallback
    pub fn executed_method(&self) -> SanitizationMethod {
        self.executed_method
    }

    pub fn fallback_from(&self) -> Option<SanitizationMethod> {
        self.fallback_from
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn pass_records(&self) -> &[PassRecord] {
        &self.pass_records
    }

    /// HPA/DCO handling done before the first pass
    pub fn hidden_areas(&self) -> &[HiddenAreaRecord] {
        &self.hidden_areas
    }

    /// Some hidden area survived, so the sanitization did not reach every sector
    pub fn has_retained_hidden_area(&self) -> bool {
        self.hidden_areas.iter().any(|r| !r.removed)
    }

    pub fn verification(&self) -> Option<&VerificationResult> {
        self.verification.as_ref()
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        self.failure.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    /// Pattern of the last recorded pass
    pub fn final_pattern(&self) -> Option<PatternKind> {
        self.pass_records.last().map(|r| r.pattern_kind)
    }

    pub(crate) fn transition(&mut self, next: JobState) -> SanitizeResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(SanitizeError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(
            operation_id = %self.operation_id,
            from = ?self.state,
            to = ?next,
            "job state transition"
        );
        self.state = next;
        if next.is_terminal() {
            self.end_time = Some(Utc::now());
        }
        Ok(())
    }

    pub(crate) fn push_pass(&mut self, record: PassRecord) -> SanitizeResult<()> {
        if self.state != JobState::Running {
            return Err(SanitizeError::InvalidTransition {
                from: self.state,
                to: JobState::Running,
            });
        }
        let expected = self.pass_records.len() as u32 + 1;
        if record.pass_number != expected {
            return Err(SanitizeError::Config(format!(
                "pass {} recorded out of order, expected {}",
                record.pass_number, expected
            )));
        }
        self.pass_records.push(record);
        Ok(())
    }

    pub(crate) fn record_hidden_area(&mut self, record: HiddenAreaRecord) -> SanitizeResult<()> {
        if self.state != JobState::Running || !self.pass_records.is_empty() {
            return Err(SanitizeError::InvalidTransition {
                from: self.state,
                to: JobState::Running,
            });
        }
        self.hidden_areas.push(record);
        Ok(())
    }

    /// Switch a running hardware job over to overwrite
    pub(crate) fn begin_fallback(&mut self, overwrite_plan: &SanitizationPlan) -> SanitizeResult<()> {
        if self.state != JobState::Running || !self.pass_records.is_empty() {
            return Err(SanitizeError::InvalidTransition {
                from: self.state,
                to: JobState::Running,
            });
        }
        self.fallback_from = Some(self.executed_method);
        self.executed_method = overwrite_plan.method;
        Ok(())
    }

    pub(crate) fn set_verification(&mut self, result: VerificationResult) -> SanitizeResult<()> {
        if self.state != JobState::Verifying || self.verification.is_some() {
            return Err(SanitizeError::InvalidTransition {
                from: self.state,
                to: JobState::Verifying,
            });
        }
        self.verification = Some(result);
        Ok(())
    }

    /// Move to FAILED, keeping every pass already recorded
    pub(crate) fn fail(&mut self, err: &SanitizeError) {
        if self.state.is_terminal() {
            return;
        }
        self.cancelled = matches!(err, SanitizeError::Cancelled);
        self.failure = Some(JobFailure::from(err));
        self.state = JobState::Failed;
        self.end_time = Some(Utc::now());
    }
}
