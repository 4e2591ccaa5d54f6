//! Template registry
//!
//! Registration order is preserved and is the detector's tie-break order.
//! Stored templates are never mutated: `replace` swaps the `Arc` in place.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};
use upe_utils::error::ValidationError;

use crate::compat;
use crate::model::Template;

/// Result of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Inserted,
    Replaced { previous_version: String },
}

/// Thread-safe, explicitly constructed template store.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    entries: RwLock<Vec<Arc<Template>>>,
}

impl TemplateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from templates in order, rejecting duplicates.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure or duplicate id.
    pub fn with_templates<I>(templates: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = Template>,
    {
        let registry = Self::new();
        for template in templates {
            registry.register(template)?;
        }
        Ok(registry)
    }

    /// Register a new template.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if the template is structurally invalid or
    /// its id is already registered. Use [`TemplateRegistry::replace`] to
    /// overwrite an existing id.
    pub fn register(&self, template: Template) -> Result<Registration, ValidationError> {
        template.validate()?;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.iter().any(|t| t.id == template.id) {
            return Err(ValidationError::DuplicateTemplate { id: template.id });
        }
        debug!(template = %template.label(), "registered template");
        entries.push(Arc::new(template));
        Ok(Registration::Inserted)
    }

    /// Register or fully replace a template.
    ///
    /// A replaced template keeps its original position in registration order.
    /// An id and version always denote the same content, so changing a
    /// template requires a new version.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if the template is structurally invalid or
    /// differs from the registered template with the same id and version.
    pub fn replace(&self, template: Template) -> Result<Registration, ValidationError> {
        template.validate()?;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.iter().position(|t| t.id == template.id) {
            Some(index) => {
                let current = &entries[index];
                if current.version == template.version && **current != template {
                    return Err(ValidationError::ChangedContent {
                        id: template.id,
                        version: template.version,
                    });
                }
                let previous_version = current.version.clone();
                warn!(
                    template_id = %template.id,
                    previous_version = %previous_version,
                    new_version = %template.version,
                    "replacing registered template"
                );
                entries[index] = Arc::new(template);
                Ok(Registration::Replaced { previous_version })
            }
            None => {
                debug!(template = %template.label(), "registered template");
                entries.push(Arc::new(template));
                Ok(Registration::Inserted)
            }
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Template>> {
        self.read().iter().find(|t| t.id == id).cloned()
    }

    /// All templates in registration order.
    #[must_use]
    pub fn get_all(&self) -> Vec<Arc<Template>> {
        self.read().clone()
    }

    /// Templates declaring `keyword` (case-insensitive exact match).
    #[must_use]
    pub fn find_by_keyword(&self, keyword: &str) -> Vec<Arc<Template>> {
        let needle = keyword.trim().to_lowercase();
        self.read()
            .iter()
            .filter(|t| t.keywords.iter().any(|k| k.to_lowercase() == needle))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Whether `engine_version` satisfies the template's minimum engine
    /// version. Unparseable versions are treated as incompatible.
    #[must_use]
    pub fn is_compatible(template: &Template, engine_version: &str) -> bool {
        compat::check(template, engine_version).is_compatible()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<Template>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }
}
