use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    text_query::TextQueryWeights,
};

/// Default memory budget handed to the index writer (in bytes).
pub const DEFAULT_WRITER_MEMORY_BUDGET: usize = 50_000_000;

/// Runtime settings for a [`crate::SearchService`].
///
/// Every field has a default, so a partial (or absent) `settings.json`
/// is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub writer_memory_budget: usize,
    pub text_query: TextQueryWeights,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            writer_memory_budget: DEFAULT_WRITER_MEMORY_BUDGET,
            text_query: TextQueryWeights::default(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&raw).map_err(|e| {
            Error::Config(format!("invalid {}: {e}", path.display()))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.writer_memory_budget == 0 {
            return Err(Error::Config(
                "writer_memory_budget must be positive".into(),
            ));
        }
        let w = &self.text_query;
        let weights = [w.name, w.description, w.tag, w.ngram, w.tie_breaker];
        if weights.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(Error::Config(
                "text_query weights must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::load(&tmp.path().join("nope.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, r#"{"text_query": {"name": 5.0}}"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.text_query.name, 5.0);
        assert_eq!(settings.text_query.tag, 2.0);
        assert_eq!(
            settings.writer_memory_budget,
            DEFAULT_WRITER_MEMORY_BUDGET
        );
    }

    #[test]
    fn negative_weight_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, r#"{"text_query": {"ngram": -1.0}}"#).unwrap();

        assert!(matches!(Settings::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(Settings::load(&path), Err(Error::Config(_))));
    }
}
