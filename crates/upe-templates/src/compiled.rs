use serde::{Deserialize, Serialize};

use crate::model::DeterminismBlock;

/// Output-contract metadata attached to every compiled prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputContract {
    pub format: String,
    /// End-of-generation marker downstream consumers look for
    pub sentinel: String,
    pub alternatives_required: bool,
}

/// Rendered, ready-to-send prompt package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledPrompt {
    pub system: String,
    pub user: String,
    pub critic: String,
    /// Effective determinism after the mode override
    pub determinism: DeterminismBlock,
    pub output: OutputContract,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub builder_plan: Vec<String>,
}

/// Rough token estimate (four characters per token).
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

impl CompiledPrompt {
    /// Estimated tokens of the system and user texts sent to a generator.
    #[must_use]
    pub fn estimated_prompt_tokens(&self) -> u64 {
        estimate_tokens(&self.system) + estimate_tokens(&self.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
