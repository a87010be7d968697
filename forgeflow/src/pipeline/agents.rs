//! Planner and generator backed by a text completion model.

use super::{GenerationRequest, Generator, Planner};
use crate::core::{ArtifactSpec, Plan};
use crate::llm::CompletionModel;
use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

#[allow(clippy::expect_used)]
static JSON_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[\s\S]*\]").expect("static pattern"));
#[allow(clippy::expect_used)]
static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:\w+)?\n?(.*?)```").expect("static pattern"));
#[allow(clippy::expect_used)]
static OPENING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^```\w*\n?").expect("static pattern"));
#[allow(clippy::expect_used)]
static CLOSING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)\n?```$").expect("static pattern"));

const ARCHITECTURE_EXCERPT: usize = 2000;
const GENERATION_EXCERPT: usize = 500;

/// Plans with two completions: a requirements document, then a file layout.
pub struct CompletionPlanner {
    model: Arc<dyn CompletionModel>,
}

impl CompletionPlanner {
    /// Creates a planner over `model`.
    #[must_use]
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Planner for CompletionPlanner {
    async fn plan(&self, description: &str, model: &str) -> anyhow::Result<Plan> {
        let requirements = self
            .model
            .complete(model, &requirements_prompt(description))
            .await
            .context("requirements completion failed")?;

        let layout = self
            .model
            .complete(model, &architecture_prompt(&requirements))
            .await
            .context("architecture completion failed")?;

        let specs = parse_file_plan(&layout);
        debug!(files = specs.len(), "Parsed file plan");
        Ok(Plan::new(requirements, specs))
    }
}

/// Generates one file per completion and strips code fences from the reply.
pub struct CompletionGenerator {
    model: Arc<dyn CompletionModel>,
}

impl CompletionGenerator {
    /// Creates a generator over `model`.
    #[must_use]
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Generator for CompletionGenerator {
    async fn generate(&self, request: &GenerationRequest<'_>, model: &str) -> anyhow::Result<String> {
        let reply = self
            .model
            .complete(model, &generation_prompt(request))
            .await
            .with_context(|| format!("generation of {} failed", request.spec.path))?;
        Ok(clean_code(&reply))
    }
}

fn requirements_prompt(description: &str) -> String {
    format!(
        "You are a senior product manager.\n\
         Project description: {description}\n\n\
         Expand the idea into a requirements document: user stories, functional and \
         non-functional requirements, and the scope of a first release.\n\n\
         Answer in Markdown."
    )
}

fn architecture_prompt(requirements: &str) -> String {
    format!(
        "You are a software architect.\n\
         Requirements:\n{}\n\n\
         Choose a technology stack and design a small, modular file layout. \
         Include dependency manifests where the stack needs them.\n\n\
         Answer ONLY with a raw JSON array of objects with \"path\" and \"description\" keys, e.g.\n\
         [{{\"path\": \"app.py\", \"description\": \"HTTP entry point\"}}]",
        excerpt(requirements, ARCHITECTURE_EXCERPT)
    )
}

fn generation_prompt(request: &GenerationRequest<'_>) -> String {
    format!(
        "You are a senior software engineer.\n\
         Write production-ready content for '{path}'.\n\n\
         Project description: {description}\n\
         Requirements: {requirements}\n\n\
         File: {path}\n\
         Purpose: {purpose}\n\n\
         Answer ONLY with the complete file content.",
        path = request.spec.path,
        description = request.description,
        requirements = excerpt(request.requirements, GENERATION_EXCERPT),
        purpose = if request.spec.purpose.is_empty() {
            "No description"
        } else {
            request.spec.purpose.as_str()
        },
    )
}

/// Extracts the artifact list from an architecture reply.
///
/// The first `[` to the last `]` is parsed as JSON; entries without a usable
/// `path` are skipped. Anything unparseable or empty yields a lone readme spec.
#[must_use]
pub fn parse_file_plan(reply: &str) -> Vec<ArtifactSpec> {
    let specs: Vec<ArtifactSpec> = JSON_ARRAY
        .find(reply)
        .and_then(|m| serde_json::from_str::<Vec<serde_json::Value>>(m.as_str()).ok())
        .map(|entries| {
            entries
                .into_iter()
                .filter_map(|entry| serde_json::from_value::<ArtifactSpec>(entry).ok())
                .filter(|spec| !spec.path.trim().is_empty())
                .collect()
        })
        .unwrap_or_default();

    if specs.is_empty() {
        warn!("No usable file plan in reply, falling back to a readme");
        return vec![ArtifactSpec::new("README.md", "Project overview")];
    }
    specs
}

/// Strips a surrounding fenced code block from a completion.
#[must_use]
pub fn clean_code(reply: &str) -> String {
    if let Some(inner) = FENCED_BLOCK.captures(reply).and_then(|c| c.get(1)) {
        return inner.as_str().trim().to_string();
    }
    let stripped = OPENING_FENCE.replace_all(reply, "");
    CLOSING_FENCE.replace_all(&stripped, "").trim().to_string()
}

fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
