//! Compile command implementation
//!
//! Handles `upe compile`.

use anyhow::{Context, Result};

use upe_config::Config;
use upe_engine::{CompileRequest, CompileResponse};
use upe_manifest::CompileStatus;
use upe_templates::{Mode, SlotValue};
use upe_utils::canonicalization::emit_jcs;
use upe_utils::exit_codes::ExitCode;

use crate::setup::build_compiler;

pub fn build_request(
    goal: String,
    mode: Mode,
    slots: Vec<(String, SlotValue)>,
    request_id: Option<String>,
    bypass_cache: bool,
    seed: Option<u64>,
) -> CompileRequest {
    let mut request = CompileRequest::new(goal)
        .with_mode(mode)
        .with_bypass_cache(bypass_cache);
    // Later occurrences of the same slot win
    request.slots.extend(slots);
    if let Some(id) = request_id {
        request = request.with_request_id(id);
    }
    if let Some(seed) = seed {
        request = request.with_seed_override(seed);
    }
    request
}

pub fn execute_compile_command(
    request: CompileRequest,
    json: bool,
    config: &Config,
) -> Result<ExitCode> {
    let compiler = build_compiler(config)?;
    let response = compiler.compile(request);

    if json {
        let out = emit_jcs(&response).context("Failed to emit compile response JSON")?;
        println!("{out}");
    } else {
        print_response(&response);
    }

    Ok(response_exit_code(&response))
}

/// OK exits 0, NEEDED exits 3, ERROR exits by error kind.
pub fn response_exit_code(response: &CompileResponse) -> ExitCode {
    match response.status {
        CompileStatus::Ok => ExitCode::SUCCESS,
        CompileStatus::Needed => ExitCode::NEEDED,
        CompileStatus::Error => response
            .error
            .as_ref()
            .map_or(ExitCode::INTERNAL, |e| ExitCode::from_kind(e.kind)),
    }
}

fn print_response(response: &CompileResponse) {
    let meta = &response.metadata;
    match response.status {
        CompileStatus::Ok => {
            println!(
                "✓ Compiled with {}@{}{}",
                meta.template_id,
                meta.template_version,
                if meta.cache_hit { " (cached)" } else { "" }
            );
            if let Some(compiled) = &response.final_prompt {
                let d = &compiled.determinism;
                let seed = d.seed.map_or_else(|| "none".to_string(), |s| s.to_string());
                println!(
                    "  temperature={:.2} top_p={:.2} seed={seed} max_tokens={}",
                    d.temperature, d.top_p, d.max_tokens
                );
                println!();
                println!("[SYSTEM]");
                println!("{}", compiled.system);
                println!();
                println!("[USER]");
                println!("{}", compiled.user);
                if !compiled.critic.is_empty() {
                    println!();
                    println!("[CRITIC]");
                    println!("{}", compiled.critic);
                }
            }
            if !response.followups.is_empty() {
                println!();
                println!("Follow-ups:");
                for f in &response.followups {
                    println!("  - {}: {}", f.id, f.label);
                }
            }
        }
        CompileStatus::Needed => {
            println!(
                "? {}@{} needs more information:",
                meta.template_id, meta.template_version
            );
            for q in &response.questions {
                println!("  - {q}");
            }
        }
        CompileStatus::Error => {
            if let Some(err) = &response.error {
                println!("✗ {} error: {}", err.kind.as_str(), err.message);
            }
        }
    }
    println!();
    println!(
        "run {} ({} ms, ~{} prompt tokens)",
        meta.provenance.run_id, meta.compile_time_ms, meta.cost.estimated_prompt_tokens
    );
}
