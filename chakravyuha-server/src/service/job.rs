//! Job Service
//!
//! Drives one obfuscation job through its lifecycle:
//! validate -> allocate workspace -> primary tool -> [visualization tool]
//! -> aggregate report -> completed (workspace kept for one download).
//!
//! Every failure after allocation goes through [`JobService::fail`], which
//! destroys the workspace before the error is handed back, so a caller never
//! sees a failed job whose files are still on disk.

use chakravyuha_core::domain::artifact::{
    COMPARISON_PAGE, VISUALIZATION_DIR, comparison_page_path, download_path,
};
use chakravyuha_core::domain::job::{
    DEFAULT_CYCLES, DEFAULT_FILE_NAME, DEFAULT_LEVEL, InvalidTransition, Job, JobId, JobSpec,
    JobStatus, MAX_CYCLES, MIN_CYCLES,
};
use chakravyuha_core::dto::obfuscate::ObfuscateRequest;
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::{Config, ToolCommand};
use crate::process::{Invocation, ProcessError, ProcessOutput, ProcessRunner};
use crate::report::{self, ReportError};
use crate::workspace::{Workspace, WorkspaceError, WorkspaceGuard, WorkspaceManager};

/// External tool stage of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Obfuscation,
    Visualization,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Obfuscation => f.write_str("obfuscation"),
            Stage::Visualization => f.write_str("visualization"),
        }
    }
}

/// Service error type
#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Resource(String),

    #[error("The {stage} tool failed: {message}")]
    Execution {
        stage: Stage,
        message: String,
        output: String,
    },

    #[error("The {stage} tool timed out after {} seconds", .timeout.as_secs())]
    Timeout {
        stage: Stage,
        timeout: Duration,
        output: String,
    },

    #[error("{message}")]
    ReportMissing { message: String, output: String },

    #[error("{message}")]
    ReportCorrupt { message: String, raw: String },

    #[error(transparent)]
    InvalidState(#[from] InvalidTransition),
}

impl JobError {
    /// Short machine-readable category exposed to API callers
    pub fn category(&self) -> &'static str {
        match self {
            JobError::Validation(_) => "ValidationError",
            JobError::Resource(_) => "ResourceError",
            JobError::Execution { .. } => "ExecutionError",
            JobError::Timeout { .. } => "TimeoutError",
            JobError::ReportMissing { .. } => "ReportMissingError",
            JobError::ReportCorrupt { .. } => "ReportCorruptError",
            JobError::InvalidState(_) => "InternalError",
        }
    }

    /// Error message followed by any diagnostic text the tools produced
    pub fn details(&self) -> String {
        let attachment = match self {
            JobError::Execution { output, .. }
            | JobError::Timeout { output, .. }
            | JobError::ReportMissing { output, .. } => Some(("SCRIPT OUTPUT", output)),
            JobError::ReportCorrupt { raw, .. } => Some(("ARTIFACT CONTENT", raw)),
            _ => None,
        };

        match attachment {
            Some((label, text)) if !text.is_empty() => {
                format!("{}\n--- {} ---\n{}", self, label, text)
            }
            _ => self.to_string(),
        }
    }

    fn from_process(stage: Stage, err: ProcessError) -> Self {
        match err {
            ProcessError::Timeout {
                timeout, output, ..
            } => JobError::Timeout {
                stage,
                timeout,
                output,
            },
            other => JobError::Execution {
                stage,
                message: other.to_string(),
                output: other.output().to_string(),
            },
        }
    }

    fn from_report(err: ReportError, tool_output: &str) -> Self {
        match err {
            ReportError::Missing { .. } => JobError::ReportMissing {
                message: format!("The obfuscation tool ran, but {}", lowercase_first(&err.to_string())),
                output: tool_output.to_string(),
            },
            ReportError::Corrupt { ref raw, .. } => JobError::ReportCorrupt {
                raw: raw.clone(),
                message: err.to_string(),
            },
            ReportError::Read { .. } => JobError::Resource(err.to_string()),
        }
    }
}

impl From<WorkspaceError> for JobError {
    fn from(err: WorkspaceError) -> Self {
        JobError::Resource(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, JobError>;

/// A job that finished successfully and awaits its download
#[derive(Debug, Clone)]
pub struct CompletedJob {
    pub job_id: JobId,
    pub report: JsonValue,
    pub download_path: String,
    pub comparison_page_path: Option<String>,
}

/// Runs obfuscation jobs
pub struct JobService {
    workspaces: WorkspaceManager,
    runner: Arc<dyn ProcessRunner>,
    obfuscator: ToolCommand,
    visualizer: ToolCommand,
    tool_dir: PathBuf,
    admission: Option<Arc<Semaphore>>,
}

impl JobService {
    pub fn new(config: &Config, workspaces: WorkspaceManager, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            workspaces,
            runner,
            obfuscator: config.obfuscator.clone(),
            visualizer: config.visualizer.clone(),
            tool_dir: config.tool_dir.clone(),
            admission: config
                .max_concurrent_jobs
                .map(|permits| Arc::new(Semaphore::new(permits))),
        }
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Runs a submission to completion
    ///
    /// Validation happens before anything touches the disk. If the returned
    /// future is dropped mid-flight (client went away), the running tool is
    /// killed and the workspace reclaimed by its guard.
    pub async fn submit(&self, req: ObfuscateRequest) -> Result<CompletedJob> {
        let spec = validate_request(req)?;

        let _permit = match &self.admission {
            Some(semaphore) => Some(
                semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| JobError::Resource("Job admission is closed".to_string()))?,
            ),
            None => None,
        };

        let mut job = Job::new(spec);
        info!(
            job_id = %job.id,
            file_name = %job.spec.source_file_name,
            cycles = job.spec.cycles,
            level = %job.spec.level,
            visualization = job.spec.generate_visualization,
            source_size = job.spec.source_text.len(),
            "Job created"
        );

        let workspace = match self.workspaces.create(job.id).await {
            Ok(workspace) => workspace,
            Err(e) => {
                // Nothing was allocated, nothing to clean
                let err = JobError::from(e);
                let _ = job.advance(JobStatus::Failed);
                error!(job_id = %job.id, category = err.category(), "Job failed: {}", err);
                return Err(err);
            }
        };

        let guard = WorkspaceGuard::new(workspace);
        let outcome = self.run_stages(&mut job, guard.workspace()).await;

        match outcome {
            Ok(report) => self.complete(&mut job, guard, report),
            Err(err) => self.fail(&mut job, guard, err).await,
        }
    }

    async fn run_stages(&self, job: &mut Job, workspace: &Workspace) -> Result<JsonValue> {
        let source_path = self
            .workspaces
            .write_source_file(workspace, &job.spec.source_file_name, &job.spec.source_text)
            .await?;

        job.advance(JobStatus::RunningPrimary)?;
        let primary = self
            .run_tool(job, Stage::Obfuscation, self.primary_invocation(job, workspace, &source_path))
            .await?;

        let mut last_output = primary.combined_output;

        if job.spec.generate_visualization {
            job.advance(JobStatus::RunningSecondary)?;
            let secondary = self
                .run_tool(job, Stage::Visualization, self.secondary_invocation(workspace))
                .await?;

            let page = workspace
                .build_dir()
                .join(VISUALIZATION_DIR)
                .join(COMPARISON_PAGE);
            let produced = tokio::fs::try_exists(&page).await.map_err(|e| {
                JobError::Resource(format!(
                    "Failed to check for comparison page {}: {}",
                    page.display(),
                    e
                ))
            })?;
            if !produced {
                return Err(JobError::ReportMissing {
                    message: "The visualization tool ran, but the comparison page was not produced"
                        .to_string(),
                    output: secondary.combined_output,
                });
            }

            last_output = format!("{}{}", last_output, secondary.combined_output);
        }

        job.advance(JobStatus::Aggregating)?;
        report::aggregate(workspace, &job.spec)
            .await
            .map_err(|e| JobError::from_report(e, &last_output))
    }

    async fn run_tool(&self, job: &Job, stage: Stage, invocation: Invocation) -> Result<ProcessOutput> {
        info!(job_id = %job.id, stage = %stage, "Running {} tool", stage);

        let output = self
            .runner
            .run(&invocation)
            .await
            .map_err(|e| JobError::from_process(stage, e))?;

        info!(
            job_id = %job.id,
            stage = %stage,
            exit_code = output.exit_code,
            duration_ms = output.duration.as_millis() as u64,
            "{} tool finished",
            stage
        );
        Ok(output)
    }

    /// Primary tool arguments: configured prefix, then
    /// `source build pipeline cycles visualization file_name`
    fn primary_invocation(&self, job: &Job, workspace: &Workspace, source_path: &Path) -> Invocation {
        let mut args = self.obfuscator.args.clone();
        args.extend([
            source_path.to_string_lossy().to_string(),
            workspace.build_dir().to_string_lossy().to_string(),
            job.spec.pipeline_spec.clone(),
            job.spec.cycles.to_string(),
            job.spec.generate_visualization.to_string(),
            job.spec.source_file_name.clone(),
        ]);

        Invocation {
            program: self.obfuscator.program.clone(),
            args,
            working_dir: self.tool_dir.clone(),
        }
    }

    /// The visualization tool finds everything relative to its working directory
    fn secondary_invocation(&self, workspace: &Workspace) -> Invocation {
        Invocation {
            program: self.visualizer.program.clone(),
            args: self.visualizer.args.clone(),
            working_dir: workspace.root().to_path_buf(),
        }
    }

    fn complete(&self, job: &mut Job, guard: WorkspaceGuard, report: JsonValue) -> Result<CompletedJob> {
        job.advance(JobStatus::Completed)?;
        let workspace = guard.release();

        info!(
            job_id = %job.id,
            duration_ms = job.elapsed_ms(),
            "Job completed, awaiting download from {}",
            workspace.root().display()
        );

        Ok(CompletedJob {
            job_id: job.id,
            report,
            download_path: download_path(&job.id),
            comparison_page_path: job
                .spec
                .generate_visualization
                .then(|| comparison_page_path(&job.id)),
        })
    }

    /// The single failure transition: reclaim the workspace, then report
    async fn fail(&self, job: &mut Job, guard: WorkspaceGuard, err: JobError) -> Result<CompletedJob> {
        let failed_in = job.status;
        if let Err(e) = job.advance(JobStatus::Failed) {
            warn!(job_id = %job.id, "{}", e);
        }

        let workspace = guard.release();
        self.workspaces.destroy(&workspace).await;

        error!(
            job_id = %job.id,
            state = %failed_in,
            category = err.category(),
            duration_ms = job.elapsed_ms(),
            "Job failed: {}",
            err
        );
        Err(err)
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Checks a request and turns it into job parameters
///
/// Runs before any resource is allocated. Out-of-range values are rejected,
/// never clamped.
pub fn validate_request(req: ObfuscateRequest) -> Result<JobSpec> {
    let source_text = match req.code {
        Some(code) if !code.is_empty() => code,
        _ => return Err(JobError::Validation("Missing code parameter.".to_string())),
    };

    Ok(JobSpec {
        source_text,
        source_file_name: validate_file_name(req.filename)?,
        pipeline_spec: pipeline_argument(req.pipeline),
        cycles: parse_cycles(req.cycles.as_ref())?,
        level: req.level.unwrap_or_else(|| DEFAULT_LEVEL.to_string()),
        generate_visualization: req.generate_cfg.unwrap_or(false),
    })
}

fn parse_cycles(value: Option<&JsonValue>) -> Result<u32> {
    let invalid = || {
        JobError::Validation(format!(
            "cycles must be an integer between {} and {}",
            MIN_CYCLES, MAX_CYCLES
        ))
    };

    let cycles = match value {
        None | Some(JsonValue::Null) => return Ok(DEFAULT_CYCLES),
        Some(JsonValue::Number(n)) => n.as_i64(),
        Some(JsonValue::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    }
    .ok_or_else(invalid)?;

    if !(MIN_CYCLES as i64..=MAX_CYCLES as i64).contains(&cycles) {
        return Err(invalid());
    }

    Ok(cycles as u32)
}

/// The file name becomes a path inside the workspace, so it must be a
/// single plain component that does not shadow the build directory
fn validate_file_name(name: Option<String>) -> Result<String> {
    let name = name.unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());

    let is_plain = !name.is_empty()
        && !name.contains(['/', '\\', '\0'])
        && Path::new(&name).file_name().is_some_and(|f| f == name.as_str())
        && name != chakravyuha_core::domain::artifact::BUILD_DIR;

    if !is_plain {
        return Err(JobError::Validation(format!(
            "filename must be a plain file name, got {:?}",
            name
        )));
    }

    Ok(name)
}

/// Strings pass verbatim, other JSON values as compact JSON
fn pipeline_argument(value: Option<JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s,
        Some(other) => other.to_string(),
    }
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
