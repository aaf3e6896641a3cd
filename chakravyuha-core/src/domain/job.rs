//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Smallest accepted obfuscation cycle count
pub const MIN_CYCLES: u32 = 1;
/// Largest accepted obfuscation cycle count
pub const MAX_CYCLES: u32 = 5;
/// Cycle count used when the request omits it
pub const DEFAULT_CYCLES: u32 = 1;
/// Level label used when the request omits it
pub const DEFAULT_LEVEL: &str = "medium";
/// Source file name used when the request omits it
pub const DEFAULT_FILE_NAME: &str = "source.cpp";

/// Job identifier
///
/// Drawn from a cryptographically secure random source (UUID v4) and rendered
/// as 32 lowercase hex characters. The id names the job's workspace and is the
/// capability a caller presents to download the produced binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses an id from its textual form
    ///
    /// Returns `None` for anything that is not a UUID.
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::try_parse(value).ok().map(Self)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for JobId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        JobId::parse(&value).ok_or_else(|| format!("invalid job id: {}", value))
    }
}

/// Job lifecycle status
///
/// ```text
/// created -> running_primary -> [running_secondary] -> aggregating -> completed
///    \              \                    \                   \
///     +--------------+--------------------+-------------------+--> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    RunningPrimary,
    RunningSecondary,
    Aggregating,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;

        match (self, next) {
            (Created, RunningPrimary) => true,
            (RunningPrimary, RunningSecondary) => true,
            (RunningPrimary, Aggregating) => true,
            (RunningSecondary, Aggregating) => true,
            (Aggregating, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Created => "created",
            JobStatus::RunningPrimary => "running_primary",
            JobStatus::RunningSecondary => "running_secondary",
            JobStatus::Aggregating => "aggregating",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Rejected status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid job transition {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// Validated parameters of one submission
///
/// Built only after request validation succeeded; every field is already in
/// the form handed to the external toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Submitted source text, written verbatim
    pub source_text: String,
    /// Plain file name (single path component)
    pub source_file_name: String,
    /// Opaque pipeline description passed through to the primary tool
    pub pipeline_spec: String,
    pub cycles: u32,
    /// Display label, echoed into the report
    pub level: String,
    pub generate_visualization: bool,
}

/// One obfuscation job
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub spec: JobSpec,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a job in the `created` state with a fresh id
    pub fn new(spec: JobSpec) -> Self {
        Self {
            id: JobId::new(),
            spec,
            status: JobStatus::Created,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Moves the job to `next`, enforcing the lifecycle graph
    pub fn advance(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }

        Ok(())
    }

    /// Milliseconds elapsed since the job was created
    pub fn elapsed_ms(&self) -> i64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.created_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> JobSpec {
        JobSpec {
            source_text: "int main() { return 0; }".to_string(),
            source_file_name: DEFAULT_FILE_NAME.to_string(),
            pipeline_spec: String::new(),
            cycles: DEFAULT_CYCLES,
            level: DEFAULT_LEVEL.to_string(),
            generate_visualization: false,
        }
    }

    #[test]
    fn test_job_id_is_32_hex_chars() {
        let id = JobId::new().to_string();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_job_id_parse() {
        let id = JobId::new();
        assert_eq!(JobId::parse(&id.to_string()), Some(id));
        assert_eq!(JobId::parse("../etc"), None);
        assert_eq!(JobId::parse(""), None);
    }

    #[test]
    fn test_job_ids_are_distinct() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn test_job_id_serializes_as_simple_string() {
        let id = JobId::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));

        let back: JobId = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_happy_path_with_visualization() {
        let mut job = Job::new(spec());
        assert!(job.advance(JobStatus::RunningPrimary).is_ok());
        assert!(job.advance(JobStatus::RunningSecondary).is_ok());
        assert!(job.advance(JobStatus::Aggregating).is_ok());
        assert!(job.advance(JobStatus::Completed).is_ok());
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_primary_may_skip_secondary() {
        let mut job = Job::new(spec());
        job.advance(JobStatus::RunningPrimary).unwrap();
        assert!(job.advance(JobStatus::Aggregating).is_ok());
    }

    #[test]
    fn test_any_live_state_can_fail() {
        for status in [
            JobStatus::Created,
            JobStatus::RunningPrimary,
            JobStatus::RunningSecondary,
            JobStatus::Aggregating,
        ] {
            assert!(status.can_transition_to(JobStatus::Failed), "{}", status);
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = Job::new(spec());
        job.advance(JobStatus::Failed).unwrap();

        let err = job.advance(JobStatus::RunningPrimary).unwrap_err();
        assert_eq!(err.from, JobStatus::Failed);
        assert!(job.advance(JobStatus::Failed).is_err());
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn test_stages_cannot_be_skipped() {
        let mut job = Job::new(spec());
        assert!(job.advance(JobStatus::Aggregating).is_err());
        assert!(job.advance(JobStatus::Completed).is_err());
        assert_eq!(job.status, JobStatus::Created);
    }
}
