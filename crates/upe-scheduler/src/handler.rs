//! Job execution seam and the compile/generate handler

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use upe_engine::{CompileRequest, Compiler};
use upe_llm::{GenerationRequest, Generators};

use crate::job::{JobContext, JobError};

pub const COMPILE_JOB: &str = "compile";
pub const GENERATE_JOB: &str = "generate";

/// Executes one attempt of a job.
///
/// Returning `Err` fails the attempt; the scheduler retries only errors for
/// which [`JobError::is_retryable`] holds.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: JobContext) -> Result<serde_json::Value, JobError>;
}

/// Handles `compile` and `generate` jobs on top of a shared [`Compiler`].
///
/// A `compile` job completes with the compile response whatever its status.
/// A `generate` job needs an OK compile and then a successful generator call.
#[derive(Debug, Clone)]
pub struct CompileJobHandler {
    compiler: Arc<Compiler>,
    generators: Generators,
}

impl CompileJobHandler {
    #[must_use]
    pub fn new(compiler: Arc<Compiler>, generators: Generators) -> Self {
        Self {
            compiler,
            generators,
        }
    }

    #[must_use]
    pub fn compiler(&self) -> &Arc<Compiler> {
        &self.compiler
    }

    async fn compile(&self, job: &JobContext) -> Result<upe_engine::CompileResponse, JobError> {
        let request: CompileRequest =
            serde_json::from_value(job.payload.clone()).map_err(|e| JobError::InvalidPayload {
                job_type: job.job_type.clone(),
                reason: e.to_string(),
            })?;

        // compile is synchronous and CPU-bound. The lease keeps the slot
        // taken even if the attempt times out before the compile returns.
        let compiler = Arc::clone(&self.compiler);
        let lease = job.slot_lease();
        tokio::task::spawn_blocking(move || {
            let _lease = lease;
            compiler.compile(request)
        })
        .await
        .map_err(|e| JobError::Aborted(e.to_string()))
    }
}

#[async_trait]
impl JobHandler for CompileJobHandler {
    async fn handle(&self, job: JobContext) -> Result<serde_json::Value, JobError> {
        match job.job_type.as_str() {
            COMPILE_JOB => {
                let response = self.compile(&job).await?;
                to_value(&response)
            }
            GENERATE_JOB => {
                let response = self.compile(&job).await?;
                let Some(compiled) = response.final_prompt.as_ref().filter(|_| response.is_ok())
                else {
                    return Err(JobError::CompileNotOk {
                        status: response.status,
                        detail: response.error.clone(),
                    });
                };

                let provider = job
                    .payload
                    .get("providerOverride")
                    .and_then(serde_json::Value::as_str);
                let generator = self.generators.resolve(provider)?;
                debug!(generator = generator.name(), job_id = %job.id, "invoking generator");
                let generation = generator
                    .generate(GenerationRequest::from_compiled(compiled))
                    .await?;

                Ok(json!({
                    "compile": to_value(&response)?,
                    "generation": to_value(&generation)?,
                }))
            }
            other => Err(JobError::UnknownType(other.to_string())),
        }
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, JobError> {
    serde_json::to_value(value).map_err(|e| JobError::Handler(e.to_string()))
}
