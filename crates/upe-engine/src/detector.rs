//! Goal-to-template detection
//!
//! Scoring counts every (goal token, keyword token) pair where either token
//! contains the other, so "present" matches "presentation". Ties go to the
//! template registered first.

use std::sync::Arc;
use tracing::debug;

use upe_manifest::DetectionRecord;
use upe_templates::{Template, TemplateRegistry};
use upe_utils::error::UpeError;

/// Outcome of template selection.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub template: Arc<Template>,
    pub score: u32,
    /// Score normalized by the template's keyword token count, capped at 1
    pub confidence: f64,
}

impl DetectionResult {
    #[must_use]
    pub fn template_id(&self) -> &str {
        &self.template.id
    }

    #[must_use]
    pub fn record(&self) -> DetectionRecord {
        DetectionRecord {
            template_id: self.template.id.clone(),
            score: self.score,
            confidence: self.confidence,
        }
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

fn keyword_tokens(template: &Template) -> Vec<String> {
    template.keywords.iter().flat_map(|k| tokens(k)).collect()
}

/// Stateless scorer over a registry snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detector;

impl Detector {
    /// Substring-overlap score of `goal` against `template`'s keywords.
    #[must_use]
    pub fn score(goal: &str, template: &Template) -> u32 {
        let goal_tokens = tokens(goal);
        let keywords = keyword_tokens(template);
        let mut score = 0u32;
        for g in &goal_tokens {
            for k in &keywords {
                if g.contains(k.as_str()) || k.contains(g.as_str()) {
                    score = score.saturating_add(1);
                }
            }
        }
        score
    }

    /// Score normalized by keyword token count.
    #[must_use]
    pub fn confidence(score: u32, template: &Template) -> f64 {
        let count = keyword_tokens(template).len();
        if count == 0 {
            0.0
        } else {
            (f64::from(score) / count as f64).min(1.0)
        }
    }

    /// Pick the highest-scoring template in registration order.
    ///
    /// # Errors
    ///
    /// Returns `UpeError::NoCandidate` when the registry is empty or every
    /// template scores zero. There is no fallback template.
    pub fn select(goal: &str, registry: &TemplateRegistry) -> Result<DetectionResult, UpeError> {
        let mut best: Option<(Arc<Template>, u32)> = None;

        for template in registry.get_all() {
            let score = Self::score(goal, &template);
            debug!(template = %template.id, score, "scored template");
            // Strictly greater keeps the earliest registration on ties
            if score > best.as_ref().map_or(0, |(_, s)| *s) {
                best = Some((template, score));
            }
        }

        match best {
            Some((template, score)) => {
                let confidence = Self::confidence(score, &template);
                Ok(DetectionResult {
                    template,
                    score,
                    confidence,
                })
            }
            None => Err(UpeError::NoCandidate {
                goal: goal.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(id: &str, keywords: &[&str]) -> Template {
        Template::new(id, "1.0.0", "s", "u").with_keywords(keywords.iter().copied())
    }

    #[test]
    fn test_board_deck_scores_at_least_two() {
        let t = template("deck", &["deck", "board"]);
        assert!(Detector::score("board deck for investors", &t) >= 2);
    }

    #[test]
    fn test_substring_overlap_both_directions() {
        let t = template("p", &["presentation"]);
        assert_eq!(Detector::score("present", &t), 1);
        let t = template("p", &["memo"]);
        assert_eq!(Detector::score("memos", &t), 1);
        assert_eq!(Detector::score("MEMO", &t), 1);
    }

    #[test]
    fn test_multi_word_keywords_are_tokenized() {
        let t = template("p", &["exec summary"]);
        assert_eq!(Detector::score("summary please", &t), 1);
    }

    #[test]
    fn test_tie_breaks_by_registration_order() {
        let registry = TemplateRegistry::new();
        registry.register(template("first", &["report"])).unwrap();
        registry.register(template("second", &["report"])).unwrap();
        let result = Detector::select("quarterly report", &registry).unwrap();
        assert_eq!(result.template_id(), "first");
    }

    #[test]
    fn test_higher_score_wins() {
        let registry = TemplateRegistry::new();
        registry.register(template("memo", &["memo"])).unwrap();
        registry
            .register(template("deck", &["deck", "board"]))
            .unwrap();
        let result = Detector::select("board deck", &registry).unwrap();
        assert_eq!(result.template_id(), "deck");
        assert_eq!(result.score, 2);
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_no_candidate_when_empty_or_zero() {
        let registry = TemplateRegistry::new();
        assert!(matches!(
            Detector::select("anything", &registry),
            Err(UpeError::NoCandidate { .. })
        ));

        registry.register(template("deck", &["deck"])).unwrap();
        assert!(matches!(
            Detector::select("quantum", &registry),
            Err(UpeError::NoCandidate { .. })
        ));
    }

    #[test]
    fn test_confidence_without_keywords_is_zero() {
        let t = template("bare", &[]);
        assert_eq!(Detector::confidence(3, &t), 0.0);
    }
}
