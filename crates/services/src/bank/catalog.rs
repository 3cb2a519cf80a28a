use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use assess_core::model::{ExerciseDraft, ExerciseItem};

use super::ExerciseBank;
use crate::error::CatalogError;

/// A curated set of exercises, as written by content authors.
///
/// ```toml
/// [[exercise]]
/// id = 1
/// topic = "grammar"
/// tier = "easy"
/// kind = "quiz"
/// prompt = "Choose the article: ___ manzana"
/// expected_answer = "la"
/// options = ["el", "la", "los"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default, rename = "exercise")]
    pub exercises: Vec<ExerciseDraft>,
}

impl Catalog {
    /// # Errors
    ///
    /// Returns `CatalogError::Parse` if the document is not a valid catalog.
    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        Ok(toml::from_str(raw)?)
    }

    /// Validates every entry. Nothing is returned unless all entries are valid.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Exercise` for the first invalid entry
    /// - `CatalogError::DuplicateId` if two entries share an id
    pub fn validate(self) -> Result<Vec<ExerciseItem>, CatalogError> {
        let mut seen = HashSet::with_capacity(self.exercises.len());
        let mut items = Vec::with_capacity(self.exercises.len());
        for draft in self.exercises {
            if !seen.insert(draft.id) {
                return Err(CatalogError::DuplicateId(draft.id));
            }
            items.push(draft.validate()?);
        }
        Ok(items)
    }
}

impl ExerciseBank {
    /// Curation path: validates `catalog` and upserts every entry.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if validation fails (nothing is written) or a
    /// write fails.
    pub async fn import(&self, catalog: Catalog) -> Result<usize, CatalogError> {
        let items = catalog.validate()?;
        for item in &items {
            self.exercises.upsert_exercise(item).await?;
        }
        info!(count = items.len(), "catalog imported");
        Ok(items.len())
    }
}
