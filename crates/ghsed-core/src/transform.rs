//! Transform engine: fetch every matched file and apply the instructions.

use std::collections::HashSet;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use ghsed_forge::{ForgeClient, RepoName, SearchMatch};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::instruction::{apply_all, Instruction};
use crate::search::RepoGroup;

/// A fetched file with its proposed new content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedFile {
    pub path: String,
    pub content_ref: String,
    pub original: String,
    pub transformed: String,
}

impl ProcessedFile {
    pub fn is_changed(&self) -> bool {
        self.original != self.transformed
    }
}

/// All processed files of one repository, in search order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedResult {
    pub repository: String,
    pub files: Vec<ProcessedFile>,
}

impl ProcessedResult {
    pub fn has_changes(&self) -> bool {
        self.files.iter().any(ProcessedFile::is_changed)
    }
}

/// Fetch and transform every distinct matched file.
///
/// Repositories are processed concurrently; within a repository at most
/// `concurrency` fetches are in flight. A file whose fetch fails is logged
/// and skipped. Repositories with no fetched file are dropped.
pub async fn transform(
    group: &RepoGroup,
    instructions: &[Instruction],
    client: &dyn ForgeClient,
    concurrency: usize,
) -> Vec<ProcessedResult> {
    let results = join_all(group.iter().map(|(repository, matches)| {
        transform_repository(repository, matches, instructions, client, concurrency)
    }))
    .await;

    results.into_iter().flatten().collect()
}

async fn transform_repository(
    repository: &str,
    matches: &[SearchMatch],
    instructions: &[Instruction],
    client: &dyn ForgeClient,
    concurrency: usize,
) -> Option<ProcessedResult> {
    let repo = match RepoName::parse(repository) {
        Ok(repo) => repo,
        Err(e) => {
            warn!(repo = %repository, error = %e, "skipping repository with unusable name");
            return None;
        }
    };

    let mut seen = HashSet::new();
    let unique: Vec<&SearchMatch> = matches
        .iter()
        .filter(|m| seen.insert(m.path.as_str()))
        .collect();

    let repo = &repo;
    let fetched: Vec<_> = stream::iter(unique)
        .map(|m| async move { (m, client.get_blob(repo, &m.content_ref).await) })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut files = Vec::with_capacity(fetched.len());
    for (m, result) in fetched {
        match result {
            Ok(original) => {
                let transformed = apply_all(instructions, &original);
                debug!(
                    repo = %repository,
                    path = %m.path,
                    changed = original != transformed,
                    "file transformed"
                );
                files.push(ProcessedFile {
                    path: m.path.clone(),
                    content_ref: m.content_ref.clone(),
                    original,
                    transformed,
                });
            }
            Err(e) => {
                error!(repo = %repository, path = %m.path, error = %e, "failed to fetch file; skipping");
            }
        }
    }

    if files.is_empty() {
        warn!(repo = %repository, "no file could be fetched; skipping repository");
        return None;
    }

    Some(ProcessedResult {
        repository: repository.to_string(),
        files,
    })
}
