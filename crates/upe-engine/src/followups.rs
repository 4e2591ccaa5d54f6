//! Follow-up suggestions attached to successful compiles

use serde::{Deserialize, Serialize};

use upe_templates::Mode;

/// A suggested next action for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Followup {
    pub id: String,
    pub label: String,
    pub rationale: String,
    /// Mode to re-run in, when the action is a re-run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    /// Run the suggestion builds on
    pub run_id: String,
}

/// Suggestions for an OK response compiled in `mode`.
#[must_use]
pub fn suggest(mode: Mode, run_id: &str) -> Vec<Followup> {
    let mut out = Vec::new();

    if mode != Mode::Precision {
        out.push(Followup {
            id: "verify_claims".to_string(),
            label: "Verify claims".to_string(),
            rationale: "Re-run in precision mode for a pinned seed and lower temperature"
                .to_string(),
            mode: Some(Mode::Precision),
            run_id: run_id.to_string(),
        });
    }
    if mode != Mode::Creative {
        out.push(Followup {
            id: "explore_alternatives".to_string(),
            label: "Explore alternatives".to_string(),
            rationale: "Re-run in creative mode for more varied drafts".to_string(),
            mode: Some(Mode::Creative),
            run_id: run_id.to_string(),
        });
    }
    out.push(Followup {
        id: "tighten_scope".to_string(),
        label: "Tighten scope".to_string(),
        rationale: "Add optional slots to narrow the output".to_string(),
        mode: None,
        run_id: run_id.to_string(),
    });

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(mode: Mode) -> Vec<String> {
        suggest(mode, "run-1").into_iter().map(|f| f.id).collect()
    }

    #[test]
    fn test_suggestions_depend_on_mode() {
        assert_eq!(
            ids(Mode::Standard),
            vec!["verify_claims", "explore_alternatives", "tighten_scope"]
        );
        assert_eq!(
            ids(Mode::Precision),
            vec!["explore_alternatives", "tighten_scope"]
        );
        assert_eq!(ids(Mode::Creative), vec!["verify_claims", "tighten_scope"]);
    }

    #[test]
    fn test_suggestions_carry_run_id() {
        assert!(suggest(Mode::Standard, "run-9").iter().all(|f| f.run_id == "run-9"));
    }
}
