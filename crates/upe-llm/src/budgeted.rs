//! Budgeted generator wrapper for call limiting

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

use upe_utils::error::GeneratorError;

use crate::types::{GenerationRequest, GenerationResult, Generator};

/// A wrapper around a `Generator` that enforces a limit on invocations.
///
/// The budget tracks attempted calls, not successful ones: a failed call
/// still consumes its slot, so job retries cannot bypass the limit.
pub struct BudgetedGenerator {
    inner: Arc<dyn Generator>,
    calls: AtomicU32,
    limit: u32,
}

impl BudgetedGenerator {
    pub fn new(inner: Arc<dyn Generator>, limit: u32) -> Self {
        debug!(generator = inner.name(), limit, "Creating BudgetedGenerator");
        Self {
            inner,
            calls: AtomicU32::new(0),
            limit,
        }
    }

    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }
}

#[async_trait]
impl Generator for BudgetedGenerator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResult, GeneratorError> {
        // Count before invoking so concurrent callers cannot overshoot
        let current = self.calls.fetch_add(1, Ordering::SeqCst);

        if current >= self.limit {
            let attempted = current + 1;
            warn!(limit = self.limit, attempted, "Generator budget exceeded");
            return Err(GeneratorError::BudgetExceeded {
                limit: self.limit,
                attempted,
            });
        }

        let result = self.inner.generate(request).await;
        if let Err(e) = &result {
            debug!(
                call_count = current + 1,
                limit = self.limit,
                error = %e,
                "Inner generator failed (budget slot still consumed)"
            );
        }
        result
    }
}
