//! External collaborators the executor drives.
//!
//! Each port is an async trait returning [`anyhow::Result`], so implementors
//! can attach whatever context they like; the executor turns failures into
//! [`ForgeflowError`](crate::errors::ForgeflowError) values at its boundary.

use crate::core::{ArtifactSpec, Plan};
use anyhow::{bail, Context};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// Everything a generator needs to produce one artifact.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    /// The caller's original project description.
    pub description: &'a str,
    /// The requirements text produced by planning.
    pub requirements: &'a str,
    /// The artifact to produce.
    pub spec: &'a ArtifactSpec,
}

/// Turns a project description into requirements and an ordered file plan.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Plans the run. A failure here fails the whole job.
    async fn plan(&self, description: &str, model: &str) -> anyhow::Result<Plan>;
}

/// Produces the content of one artifact.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generates content. Failures are tolerated per artifact.
    async fn generate(&self, request: &GenerationRequest<'_>, model: &str) -> anyhow::Result<String>;
}

/// Stores artifact content under a job's output location.
#[async_trait]
pub trait ArtifactWriter: Send + Sync {
    /// Writes `content` at `relative_path` below `output_location`,
    /// creating parent directories as needed.
    async fn write(
        &self,
        output_location: &Path,
        relative_path: &str,
        content: &str,
    ) -> anyhow::Result<()>;
}

/// Writes artifacts to the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsArtifactWriter;

#[async_trait]
impl ArtifactWriter for FsArtifactWriter {
    async fn write(
        &self,
        output_location: &Path,
        relative_path: &str,
        content: &str,
    ) -> anyhow::Result<()> {
        let full = resolve_relative(output_location, relative_path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory for {relative_path}"))?;
        }
        tokio::fs::write(&full, content)
            .await
            .with_context(|| format!("Failed to write {relative_path}"))?;
        Ok(())
    }
}

/// Joins `relative_path` onto `root`, refusing paths that would escape it.
pub fn resolve_relative(root: &Path, relative_path: &str) -> anyhow::Result<PathBuf> {
    let relative = Path::new(relative_path);
    if relative_path.trim().is_empty() {
        bail!("artifact path is empty");
    }
    for component in relative.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => bail!("artifact path {relative_path:?} leaves the output directory"),
        }
    }
    Ok(root.join(relative))
}
