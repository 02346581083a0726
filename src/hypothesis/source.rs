use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs;
use tracing::debug;

use super::Hypothesis;
use crate::error::{FalsifyError, Result};

/// Supplier of candidate hypotheses for a defect.
#[async_trait]
pub trait HypothesisSource: Send + Sync {
    async fn generate(&self, bug_description: &str) -> Result<Vec<Hypothesis>>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HypothesesDocument {
    List(Vec<Hypothesis>),
    Session {
        #[serde(default)]
        bug_description: Option<String>,
        hypotheses: Vec<Hypothesis>,
    },
}

/// Reads hypotheses from a JSON file.
///
/// Accepts either a bare array or an object with a `hypotheses` array and an
/// optional `bug_description`.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bug description embedded in the file, if any.
    pub async fn bug_description(&self) -> Result<Option<String>> {
        Ok(match self.read().await? {
            HypothesesDocument::List(_) => None,
            HypothesesDocument::Session {
                bug_description, ..
            } => bug_description.filter(|s| !s.trim().is_empty()),
        })
    }

    async fn read(&self) -> Result<HypothesesDocument> {
        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            FalsifyError::Other(format!(
                "Failed to read hypotheses from {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl HypothesisSource for JsonFileSource {
    async fn generate(&self, _bug_description: &str) -> Result<Vec<Hypothesis>> {
        let hypotheses = match self.read().await? {
            HypothesesDocument::List(list) => list,
            HypothesesDocument::Session { hypotheses, .. } => hypotheses,
        };
        debug!(path = %self.path.display(), count = hypotheses.len(), "Loaded hypotheses");
        Ok(hypotheses)
    }
}

/// Fixed set of hypotheses, for callers that already have them in memory.
pub struct StaticSource {
    hypotheses: Vec<Hypothesis>,
}

impl StaticSource {
    pub fn new(hypotheses: Vec<Hypothesis>) -> Self {
        Self { hypotheses }
    }
}

#[async_trait]
impl HypothesisSource for StaticSource {
    async fn generate(&self, _bug_description: &str) -> Result<Vec<Hypothesis>> {
        Ok(self.hypotheses.clone())
    }
}
