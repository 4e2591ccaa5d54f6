//! Logging and observability infrastructure for upe
//!
//! Library crates emit `tracing` events and spans; only binaries install a
//! subscriber through [`init_tracing`].

use tracing::{Level, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initialize tracing subscriber for structured logging
///
/// `RUST_LOG` takes precedence. Otherwise verbose mode enables debug output
/// for upe crates and closes spans with their durations.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("upe=debug,info")
            } else {
                EnvFilter::try_new("upe=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }

    Ok(())
}

/// Span covering a single compile request.
#[must_use]
pub fn compile_span(request_id: &str, mode: &str) -> tracing::Span {
    span!(Level::INFO, "compile", request_id = %request_id, mode = %mode)
}

/// Span covering one execution attempt of a scheduled job.
#[must_use]
pub fn job_span(job_id: &str, job_type: &str, attempt: u32) -> tracing::Span {
    span!(
        Level::INFO,
        "job",
        job_id = %job_id,
        job_type = %job_type,
        attempt = attempt
    )
}
