//! Output directory naming.

use crate::core::JobId;
use regex::Regex;
use std::sync::LazyLock;

// Characters Windows refuses in file names.
#[allow(clippy::expect_used)]
static FORBIDDEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("static pattern"));

#[allow(clippy::expect_used)]
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static pattern"));

/// Turns a project name into a file-system friendly slug.
///
/// Characters that are illegal in Windows file names are removed, the
/// result is trimmed, whitespace becomes `-` and everything is lowercased.
/// An empty result becomes `project`.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let stripped = FORBIDDEN.replace_all(name, "");
    let slug = WHITESPACE
        .replace_all(stripped.trim(), "-")
        .to_lowercase();
    if slug.is_empty() {
        "project".to_string()
    } else {
        slug
    }
}

/// Directory name for a run: `<slug>-<unix millis>-<short id>`.
///
/// The id suffix keeps names distinct even when two runs with the same
/// name start in the same millisecond.
#[must_use]
pub fn output_dir_name(name: &str, id: &JobId) -> String {
    format!(
        "{}-{}-{}",
        sanitize_name(name),
        chrono::Utc::now().timestamp_millis(),
        id.short()
    )
}
