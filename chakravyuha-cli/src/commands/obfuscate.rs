//! Obfuscate command handler
//!
//! Submits a source file, prints the report and job ID, downloads the binary
//! unless told not to and points at the comparison page when one was
//! generated.

use anyhow::{Context, Result};
use chakravyuha_core::domain::artifact::job_id_from_download_path;
use chakravyuha_core::domain::job::{DEFAULT_LEVEL, JobId, MAX_CYCLES, MIN_CYCLES};
use chakravyuha_core::dto::obfuscate::{ObfuscateRequest, ObfuscateResponse};
use clap::Args;
use colored::*;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

use crate::commands::download::mark_executable;
use crate::config::Config;

/// Arguments of `chakravyuha obfuscate`
#[derive(Args, Debug)]
pub struct ObfuscateArgs {
    /// Source file to obfuscate
    pub file: PathBuf,

    /// Number of obfuscation cycles
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(MIN_CYCLES as i64..=MAX_CYCLES as i64))]
    pub cycles: u32,

    /// Obfuscation level label
    #[arg(short, long, default_value = DEFAULT_LEVEL)]
    pub level: String,

    /// Pass pipeline handed to the toolchain, e.g. "flatten,strings"
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Also generate the control-flow comparison pages
    #[arg(long)]
    pub cfg: bool,

    /// Where to write the binary (default: <file stem>_obfuscated)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Leave the binary on the server for a later `download`
    #[arg(long, conflicts_with = "output")]
    pub no_download: bool,

    /// Print the full response as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

/// Run one job end to end
pub async fn handle_obfuscate(args: ObfuscateArgs, config: &Config) -> Result<()> {
    let client = config.client();
    let req = build_request(&args).await?;
    let output = args.output.clone().unwrap_or_else(|| default_output(&args.file));

    if !args.json {
        println!(
            "{} {} ({} cycle(s), level {})",
            "Obfuscating".bold(),
            args.file.display(),
            args.cycles,
            args.level.cyan()
        );
    }

    let response = client
        .obfuscate(&req)
        .await
        .with_context(|| format!("Obfuscation of {} failed", args.file.display()))?;

    let job_id = job_id_of(&response)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_report_summary(&response);
        println!("  Job ID:          {}", job_id.to_string().cyan());
    }

    if args.no_download {
        if !args.json {
            println!();
            println!(
                "{} chakravyuha download {}",
                "Binary kept on the server, fetch it once with:".bold(),
                job_id
            );
        }
    } else {
        let bytes = client
            .download(&response.download_path, &output)
            .await
            .context("Failed to download the obfuscated binary")?;
        mark_executable(&output).await?;

        if !args.json {
            println!();
            println!(
                "{} {} ({} bytes)",
                "Binary written to".green().bold(),
                output.display(),
                bytes
            );
        }
    }

    if !args.json {
        if let Some(page) = &response.comparison_page_path {
            println!("{} {}", "Comparison page:".bold(), client.url_for(page).cyan());
        }
    }

    Ok(())
}

fn job_id_of(response: &ObfuscateResponse) -> Result<JobId> {
    job_id_from_download_path(&response.download_path).with_context(|| {
        format!(
            "Server returned an unexpected download path '{}'",
            response.download_path
        )
    })
}

async fn build_request(args: &ObfuscateArgs) -> Result<ObfuscateRequest> {
    let code = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let filename = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().to_string());

    Ok(ObfuscateRequest {
        code: Some(code),
        pipeline: args.pipeline.clone().map(Value::String),
        cycles: Some(json!(args.cycles)),
        level: Some(args.level.clone()),
        generate_cfg: Some(args.cfg),
        filename,
    })
}

fn default_output(file: &Path) -> PathBuf {
    let stem = file
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "program".to_string());
    PathBuf::from(format!("{}_obfuscated", stem))
}

fn print_report_summary(response: &ObfuscateResponse) {
    let report = &response.report;

    println!("{}", "Report:".bold());
    if let Some(level) = report["inputParameters"]["obfuscationLevel"].as_str() {
        println!("  Level:           {}", level);
    }
    if let Some(cycles) = report["obfuscationMetrics"]["cyclesCompleted"].as_u64() {
        println!("  Cycles:          {}", cycles);
    }

    let attributes = &report["outputAttributes"];
    for (label, key) in [
        ("Original size:  ", "originalSize"),
        ("Obfuscated size:", "obfuscatedSize"),
        ("Size change:    ", "sizeChange"),
    ] {
        if let Some(value) = attributes[key].as_str() {
            println!("  {} {}", label, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(file: &str) -> ObfuscateArgs {
        ObfuscateArgs {
            file: PathBuf::from(file),
            cycles: 3,
            level: "high".to_string(),
            pipeline: Some("flatten,strings".to_string()),
            cfg: true,
            output: None,
            no_download: false,
            json: false,
        }
    }

    #[test]
    fn test_default_output() {
        assert_eq!(
            default_output(Path::new("src/main.cpp")),
            PathBuf::from("main_obfuscated")
        );
        assert_eq!(default_output(Path::new("/")), PathBuf::from("program_obfuscated"));
    }

    #[test]
    fn test_job_id_of_response() {
        let id = JobId::new();
        let mut response = ObfuscateResponse {
            success: true,
            report: json!({}),
            download_path: chakravyuha_core::domain::artifact::download_path(&id),
            comparison_page_path: None,
        };
        assert_eq!(job_id_of(&response).unwrap(), id);

        response.download_path = "/elsewhere".to_string();
        assert!(job_id_of(&response).is_err());
    }

    #[test]
    fn test_no_download_flag() {
        use clap::Parser;

        #[derive(Parser)]
        struct Harness {
            #[command(flatten)]
            args: ObfuscateArgs,
        }

        let harness = Harness::try_parse_from(["chakravyuha", "main.c", "--no-download"]).unwrap();
        assert!(harness.args.no_download);
        assert!(
            Harness::try_parse_from(["chakravyuha", "main.c", "--no-download", "-o", "out"])
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_build_request() {
        let dir = std::env::temp_dir().join(format!("chakravyuha-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("hello.c");
        std::fs::write(&file, "int main() { return 0; }").unwrap();

        let req = build_request(&args(&file.to_string_lossy())).await.unwrap();

        assert_eq!(req.code.as_deref(), Some("int main() { return 0; }"));
        assert_eq!(req.filename.as_deref(), Some("hello.c"));
        assert_eq!(req.cycles, Some(json!(3)));
        assert_eq!(req.pipeline, Some(json!("flatten,strings")));
        assert_eq!(req.generate_cfg, Some(true));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_build_request_missing_file() {
        assert!(build_request(&args("/nonexistent/hello.c")).await.is_err());
    }
}
