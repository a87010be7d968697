//! Planning output: the requirements text and the artifacts to generate.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// One artifact the planner wants generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    /// Relative path inside the run's output directory.
    pub path: String,
    /// What the artifact is for; handed to the generator as context.
    #[serde(alias = "description", default)]
    pub purpose: String,
}

impl ArtifactSpec {
    /// Creates a new artifact spec.
    #[must_use]
    pub fn new(path: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            purpose: purpose.into(),
        }
    }

    /// Returns true if the path names a readme file.
    #[must_use]
    pub fn is_readme(&self) -> bool {
        is_readme_path(&self.path)
    }
}

/// Result of the planning stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Free-text requirements document.
    pub requirements: String,
    /// Artifacts to generate, in order.
    pub specs: Vec<ArtifactSpec>,
}

impl Plan {
    /// Creates a new plan.
    #[must_use]
    pub fn new(requirements: impl Into<String>, specs: Vec<ArtifactSpec>) -> Self {
        Self {
            requirements: requirements.into(),
            specs,
        }
    }
}

/// Returns true if the file stem of `path` is `readme`, ignoring case.
#[must_use]
pub fn is_readme_path(path: &str) -> bool {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    Path::new(file_name)
        .file_stem()
        .is_some_and(|stem| stem.eq_ignore_ascii_case("readme"))
}
