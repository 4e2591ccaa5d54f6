//! Batch command implementation
//!
//! Handles `upe batch <file>`: every entry becomes a scheduler job, and the
//! command waits for all of them before printing results and stats.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use upe_config::Config;
use upe_engine::CompileRequest;
use upe_llm::Generators;
use upe_scheduler::{COMPILE_JOB, JobOptions, JobScheduler, JobState, JobStatus, SchedulerStats};
use upe_utils::canonicalization::emit_jcs;
use upe_utils::error::UpeError;
use upe_utils::exit_codes::ExitCode;

use crate::setup::{build_compiler, build_scheduler};

/// One job in a batch file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BatchEntry {
    /// `compile` or `generate`
    #[serde(rename = "type", default = "default_job_type")]
    pub job_type: String,
    pub request: CompileRequest,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_job_type() -> String {
    COMPILE_JOB.to_string()
}

/// Final job statuses in submission order, plus scheduler stats.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub jobs: Vec<JobStatus>,
    pub stats: SchedulerStats,
}

impl BatchReport {
    /// Exit code of the first job that did not complete, if any.
    pub fn exit_code(&self) -> ExitCode {
        self.jobs
            .iter()
            .find(|j| j.state != JobState::Completed)
            .map_or(ExitCode::SUCCESS, |j| {
                j.error
                    .as_ref()
                    .map_or(ExitCode::INTERNAL, |e| ExitCode::from_kind(e.kind))
            })
    }
}

pub fn parse_batch(content: &str) -> Result<Vec<BatchEntry>> {
    let entries: Vec<BatchEntry> =
        serde_json::from_str(content).context("Batch file must be a JSON array of jobs")?;
    Ok(entries)
}

/// Submit every entry, then wait for each job to finish.
pub async fn run_batch(scheduler: &JobScheduler, entries: Vec<BatchEntry>) -> Result<BatchReport> {
    let mut ids = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let payload =
            serde_json::to_value(&entry.request).context("Failed to encode job payload")?;
        let options = JobOptions {
            priority: entry.priority,
            max_attempts: entry.max_attempts,
            delay: None,
        };
        let submission = scheduler
            .add_job(&entry.job_type, payload, options)
            .map_err(UpeError::from)
            .with_context(|| format!("Batch entry {index} was rejected"))?;
        debug!(index, job_id = %submission.job_id, "batch entry submitted");
        ids.push(submission.job_id);
    }

    let mut jobs = Vec::with_capacity(ids.len());
    for id in &ids {
        let Some(status) = scheduler.wait_for(id).await else {
            bail!("Job {id} was purged before its status could be read");
        };
        jobs.push(status);
    }

    Ok(BatchReport {
        jobs,
        stats: scheduler.get_stats(),
    })
}

pub async fn execute_batch_command(file: &Path, json: bool, config: &Config) -> Result<ExitCode> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("Failed to read batch file: {}", file.display()))?;
    let entries = parse_batch(&content)?;

    let compiler = build_compiler(config)?;
    let scheduler = build_scheduler(compiler, Generators::default(), config);
    let report = run_batch(&scheduler, entries).await?;

    if json {
        let out = emit_jcs(&report).context("Failed to emit batch report JSON")?;
        println!("{out}");
    } else {
        print_report(&report);
    }
    Ok(report.exit_code())
}

fn print_report(report: &BatchReport) {
    for job in &report.jobs {
        let outcome = match (&job.result, &job.error) {
            (Some(result), _) => result
                .get("status")
                .or_else(|| result.pointer("/compile/status"))
                .and_then(serde_json::Value::as_str)
                .unwrap_or("done")
                .to_string(),
            (None, Some(err)) => format!("{}: {}", err.kind.as_str(), err.message),
            (None, None) => String::new(),
        };
        println!(
            "{:<9} {}  {:<8} p{:<2} attempts={}/{}  {outcome}",
            job.state.as_str(),
            job.id,
            job.job_type,
            job.priority,
            job.attempts,
            job.max_attempts
        );
    }

    let s = &report.stats;
    println!();
    println!(
        "completed={} failed={} cancelled={} total={} peak_active={}/{}",
        s.completed, s.failed, s.cancelled, s.total, s.peak_active, s.max_concurrent
    );
}
