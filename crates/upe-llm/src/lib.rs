//! Text-generation backend contract for upe
//!
//! The orchestrator never talks to a provider directly. It hands a
//! [`GenerationRequest`] to a [`Generator`] chosen from a [`Generators`] set,
//! by request override or by default.

mod budgeted;
mod echo;
mod types;

pub use budgeted::BudgetedGenerator;
pub use echo::{ECHO_PROVIDER, EchoGenerator};
pub use types::{GenerationRequest, GenerationResult, Generator, Usage, estimate_tokens};

use std::collections::BTreeMap;
use std::sync::Arc;

use upe_utils::error::GeneratorError;

/// Named set of generators with a default.
#[derive(Clone)]
pub struct Generators {
    by_name: BTreeMap<String, Arc<dyn Generator>>,
    default: String,
}

impl Generators {
    /// Create a set whose default is `generator`.
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        let default = generator.name().to_string();
        let mut by_name = BTreeMap::new();
        by_name.insert(default.clone(), generator);
        Self { by_name, default }
    }

    /// Add or replace a generator under its own name.
    #[must_use]
    pub fn with(mut self, generator: Arc<dyn Generator>) -> Self {
        self.by_name.insert(generator.name().to_string(), generator);
        self
    }

    /// Resolve `provider_override`, falling back to the default.
    ///
    /// # Errors
    ///
    /// Returns `GeneratorError::UnknownProvider` if the override names no
    /// registered generator.
    pub fn resolve(
        &self,
        provider_override: Option<&str>,
    ) -> Result<Arc<dyn Generator>, GeneratorError> {
        let name = provider_override.unwrap_or(&self.default);
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| GeneratorError::UnknownProvider(name.to_string()))
    }

    #[must_use]
    pub fn default_name(&self) -> &str {
        &self.default
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for Generators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generators")
            .field("names", &self.by_name.keys().collect::<Vec<_>>())
            .field("default", &self.default)
            .finish()
    }
}

impl Default for Generators {
    fn default() -> Self {
        Self::new(Arc::new(EchoGenerator::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_default_and_override() {
        let budgeted: Arc<dyn Generator> =
            Arc::new(BudgetedGenerator::new(Arc::new(EchoGenerator::new()), 1));
        let generators = Generators::default().with(budgeted);
        assert_eq!(generators.default_name(), ECHO_PROVIDER);
        assert_eq!(generators.resolve(None).unwrap().name(), ECHO_PROVIDER);
        assert_eq!(
            generators.resolve(Some("echo")).unwrap().name(),
            ECHO_PROVIDER
        );
    }

    #[test]
    fn test_resolve_unknown_provider() {
        let err = Generators::default().resolve(Some("gpt-x")).err().unwrap();
        assert_eq!(err, GeneratorError::UnknownProvider("gpt-x".to_string()));
    }
}
