use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One concrete response of a prompt.
///
/// In the catalog file a plain string is a `Speech` variant and a
/// `["text", 2500]` pair is a `Timed` variant whose number is the playback
/// delay, in milliseconds, until the moment the booth should act.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Variant {
    Speech(String),
    Timed(String, u64),
}

impl Variant {
    pub fn text(&self) -> &str {
        match self {
            Variant::Speech(text) | Variant::Timed(text, _) => text,
        }
    }

    pub fn delay(&self) -> Option<Duration> {
        match self {
            Variant::Speech(_) => None,
            Variant::Timed(_, ms) => Some(Duration::from_millis(*ms)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read prompt catalog {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse prompt catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Prompt '{0}' has no variants")]
    EmptyPrompt(String),
    #[error("Prompt catalog is missing required prompts: {0}")]
    MissingPrompts(String),
}

/// Immutable prompt-name → variants table, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct PromptCatalog {
    prompts: HashMap<String, Vec<Variant>>,
}

impl PromptCatalog {
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let prompts: HashMap<String, Vec<Variant>> = serde_json::from_str(json)?;
        if let Some(name) = prompts
            .iter()
            .find_map(|(name, variants)| variants.is_empty().then_some(name))
        {
            return Err(CatalogError::EmptyPrompt(name.clone()));
        }
        Ok(Self { prompts })
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn variants(&self, name: &str) -> Option<&[Variant]> {
        self.prompts.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.prompts.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Fails with every name in `required` that the catalog lacks.
    pub fn require(&self, required: &[&str]) -> Result<(), CatalogError> {
        let mut missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|name| !self.contains(name))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort_unstable();
        Err(CatalogError::MissingPrompts(missing.join(", ")))
    }
}
