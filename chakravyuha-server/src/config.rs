//! Server configuration
//!
//! Defines all configurable parameters for the service including the scratch
//! root, the external tool commands, the job timeout and workspace sweeping.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// An external executable plus the leading arguments it is always given
///
/// Job-specific arguments are appended after `args`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ToolCommand {
    /// Parses a whitespace-separated command line
    ///
    /// Relative words containing a path separator (e.g. `scripts/run.sh`) are
    /// resolved against `base_dir`, so the command stays valid whatever working
    /// directory it is later launched from. Bare program names such as `bash`
    /// are left for `PATH` lookup.
    pub fn parse(line: &str, base_dir: &Path) -> anyhow::Result<Self> {
        let mut words = line.split_whitespace().map(|word| resolve_word(word, base_dir));

        let program = words
            .next()
            .ok_or_else(|| anyhow::anyhow!("tool command cannot be empty"))?;

        Ok(Self {
            program: PathBuf::from(program),
            args: words.collect(),
        })
    }
}

fn resolve_word(word: &str, base_dir: &Path) -> String {
    let path = Path::new(word);
    if path.is_relative() && word.contains(std::path::MAIN_SEPARATOR) {
        base_dir.join(path).to_string_lossy().to_string()
    } else {
        word.to_string()
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: String,

    /// Directory holding one workspace per job; wiped at startup
    pub scratch_root: PathBuf,

    /// Working directory of the primary tool
    pub tool_dir: PathBuf,

    /// Primary transformation tool
    pub obfuscator: ToolCommand,

    /// Secondary visualization tool
    pub visualizer: ToolCommand,

    /// Maximum wall-clock time of a single tool invocation
    pub job_timeout: Duration,

    /// How often abandoned workspaces are looked for
    pub sweep_interval: Duration,

    /// Age after which an undownloaded workspace is reclaimed
    pub workspace_max_age: Duration,

    /// Cap on concurrently running jobs, `None` for no cap
    pub max_concurrent_jobs: Option<usize>,

    /// Maximum accepted request body size in bytes
    pub max_body_bytes: usize,
}

impl Config {
    /// Creates a configuration with defaults relative to `tool_dir`
    pub fn new(tool_dir: PathBuf) -> Self {
        Self {
            bind_addr: "0.0.0.0:3001".to_string(),
            scratch_root: tool_dir.join("temp_sessions"),
            obfuscator: ToolCommand {
                program: PathBuf::from("bash"),
                args: vec![
                    tool_dir
                        .join("scripts/run_obfuscation.sh")
                        .to_string_lossy()
                        .to_string(),
                ],
            },
            visualizer: ToolCommand {
                program: PathBuf::from("python3"),
                args: vec![
                    tool_dir
                        .join("scripts/create_comparison.py")
                        .to_string_lossy()
                        .to_string(),
                ],
            },
            tool_dir,
            job_timeout: Duration::from_secs(300), // 5 minutes
            sweep_interval: Duration::from_secs(60),
            workspace_max_age: Duration::from_secs(3600),
            max_concurrent_jobs: None,
            max_body_bytes: 5 * 1024 * 1024,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Every variable is optional:
    /// - CHAKRAVYUHA_BIND_ADDR (default: 0.0.0.0:3001)
    /// - CHAKRAVYUHA_SCRATCH_ROOT (default: ./temp_sessions)
    /// - CHAKRAVYUHA_OBFUSCATOR_CMD (default: bash scripts/run_obfuscation.sh)
    /// - CHAKRAVYUHA_VISUALIZER_CMD (default: python3 scripts/create_comparison.py)
    /// - JOB_TIMEOUT_SECS (default: 300)
    /// - SWEEP_INTERVAL_SECS (default: 60)
    /// - WORKSPACE_MAX_AGE_SECS (default: 3600)
    /// - MAX_CONCURRENT_JOBS (default: unlimited)
    /// - MAX_BODY_BYTES (default: 5 MiB)
    pub fn from_env() -> anyhow::Result<Self> {
        let tool_dir = std::env::current_dir()
            .map_err(|e| anyhow::anyhow!("Failed to resolve working directory: {}", e))?;

        Self::from_vars(tool_dir, |name| std::env::var(name).ok())
    }

    /// Creates configuration from any variable source
    ///
    /// A variable that is set but does not parse is an error, never a silent
    /// fallback to the default.
    pub fn from_vars(
        tool_dir: PathBuf,
        var: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let mut config = Self::new(tool_dir);

        if let Some(addr) = var("CHAKRAVYUHA_BIND_ADDR") {
            config.bind_addr = addr;
        }

        if let Some(root) = var("CHAKRAVYUHA_SCRATCH_ROOT") {
            config.scratch_root = config.tool_dir.join(root);
        }

        if let Some(cmd) = var("CHAKRAVYUHA_OBFUSCATOR_CMD") {
            config.obfuscator = ToolCommand::parse(&cmd, &config.tool_dir)?;
        }

        if let Some(cmd) = var("CHAKRAVYUHA_VISUALIZER_CMD") {
            config.visualizer = ToolCommand::parse(&cmd, &config.tool_dir)?;
        }

        if let Some(secs) = parse_var::<u64>(&var, "JOB_TIMEOUT_SECS")? {
            config.job_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_var::<u64>(&var, "SWEEP_INTERVAL_SECS")? {
            config.sweep_interval = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_var::<u64>(&var, "WORKSPACE_MAX_AGE_SECS")? {
            config.workspace_max_age = Duration::from_secs(secs);
        }

        config.max_concurrent_jobs = parse_var::<usize>(&var, "MAX_CONCURRENT_JOBS")?;

        if let Some(bytes) = parse_var::<usize>(&var, "MAX_BODY_BYTES")? {
            config.max_body_bytes = bytes;
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.scratch_root.as_os_str().is_empty() {
            anyhow::bail!("scratch_root cannot be empty");
        }

        // Wiping "/" or the tool directory at startup would be catastrophic
        if self.scratch_root.parent().is_none() || self.scratch_root == self.tool_dir {
            anyhow::bail!(
                "scratch_root must be a dedicated directory, got {}",
                self.scratch_root.display()
            );
        }

        if self.job_timeout.as_secs() == 0 {
            anyhow::bail!("job_timeout must be greater than 0");
        }

        if self.sweep_interval.as_secs() == 0 {
            anyhow::bail!("sweep_interval must be greater than 0");
        }

        // A job runs at most two stages; it must never be swept mid-flight
        if self.workspace_max_age <= self.job_timeout * 2 {
            anyhow::bail!("workspace_max_age must exceed twice the job_timeout");
        }

        if self.max_concurrent_jobs == Some(0) {
            anyhow::bail!("max_concurrent_jobs must be greater than 0 when set");
        }

        if self.max_body_bytes == 0 {
            anyhow::bail!("max_body_bytes must be greater than 0");
        }

        Ok(())
    }
}

fn parse_var<T>(var: impl Fn(&str) -> Option<String>, name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = var(name) else {
        return Ok(None);
    };

    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", name, raw, e))
}
