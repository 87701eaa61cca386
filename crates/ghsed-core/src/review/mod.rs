//! Interactive review gate.
//!
//! The pipeline never talks to a terminal directly: every question goes
//! through an [`Operator`]. Repositories are reviewed strictly one after the
//! other, and nothing is confirmed without an explicit "yes".

pub mod console;
pub mod diff;
pub mod scripted;

use async_trait::async_trait;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::transform::ProcessedResult;

pub use console::ConsoleOperator;
pub use diff::render_diff;
pub use scripted::ScriptedOperator;

/// The human in the loop.
#[async_trait]
pub trait Operator: Send {
    /// Display text (diffs, headings, notices).
    fn show(&mut self, text: &str);

    /// Ask a yes/no question. Anything but an explicit yes is `false`.
    async fn confirm(&mut self, prompt: &str) -> bool;

    /// Ask for a line of text, pre-filled with `default`.
    async fn input(&mut self, prompt: &str, default: &str) -> String;

    /// Whether diffs should be rendered with ANSI colour.
    fn color(&self) -> bool {
        false
    }
}

/// One file's decided change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub original: String,
    pub transformed: String,
    pub confirmed: bool,
}

/// The operator's verdict for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoDecision {
    pub repository: String,
    pub branch: String,
    pub files: Vec<FileChange>,
}

impl RepoDecision {
    pub fn confirmed_files(&self) -> impl Iterator<Item = &FileChange> {
        self.files.iter().filter(|f| f.confirmed)
    }

    pub fn has_confirmed(&self) -> bool {
        self.files.iter().any(|f| f.confirmed)
    }
}

/// Walk the operator through one repository.
///
/// Returns `None` when the operator declines the repository. An empty branch
/// answer keeps `suggestion`. Unchanged files are reported and left
/// unconfirmed without a prompt.
pub async fn review_repository(
    operator: &mut dyn Operator,
    processed: ProcessedResult,
    suggestion: &str,
    context_lines: usize,
) -> Option<RepoDecision> {
    let repository = processed.repository;
    let heading = format!("{} ({} file(s) matched)", repository, processed.files.len());
    let heading = if operator.color() {
        heading.bold().to_string()
    } else {
        heading
    };
    operator.show(&heading);

    if !operator
        .confirm(&format!("Proceed with changes to {repository}?"))
        .await
    {
        info!(repo = %repository, "operator declined repository");
        return None;
    }

    let answer = operator.input("Branch name", suggestion).await;
    let branch = match answer.trim() {
        "" => suggestion.to_string(),
        name => name.to_string(),
    };

    let mut files = Vec::with_capacity(processed.files.len());
    for file in processed.files {
        let confirmed = if file.is_changed() {
            operator.show(&format!("--- {}:{}", repository, file.path));
            let rendered = render_diff(
                &file.original,
                &file.transformed,
                context_lines,
                operator.color(),
            );
            operator.show(&rendered);
            operator
                .confirm(&format!("Apply changes to {}?", file.path))
                .await
        } else {
            operator.show(&format!("--- {}:{} (no changes)", repository, file.path));
            false
        };

        if !confirmed {
            info!(repo = %repository, path = %file.path, "file left unchanged");
        }
        files.push(FileChange {
            path: file.path,
            original: file.original,
            transformed: file.transformed,
            confirmed,
        });
    }

    Some(RepoDecision {
        repository,
        branch,
        files,
    })
}
