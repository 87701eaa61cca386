//! The change-orchestration pipeline.
//!
//! ```text
//! queries -> search -> transform -> (per repository, in order)
//!     review -> branch -> commit -> pull request
//! ```
//!
//! Search and fetch failures are logged and skipped. Once the operator has
//! confirmed changes, any branch, commit or pull-request failure stops the run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ghsed_forge::{ForgeClient, PullRequest, RepoName};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::commit::{write_commit, CommitOutcome, CommitResult, SkipReason};
use crate::config::RunConfig;
use crate::error::GhsedResult;
use crate::instruction::Instruction;
use crate::publish::publish;
use crate::query::build_queries;
use crate::review::{review_repository, Operator};
use crate::search::{filter_by_target, search};
use crate::target::Target;
use crate::transform::{transform, ProcessedResult};

/// A repository that produced no commit, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRepository {
    pub repository: String,
    pub reason: SkipReason,
}

/// What a run did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub commits: Vec<CommitResult>,
    pub pull_requests: Vec<PullRequest>,
    pub skipped: Vec<SkippedRepository>,
}

impl RunReport {
    fn new() -> Self {
        RunReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            commits: Vec::new(),
            pull_requests: Vec::new(),
            skipped: Vec::new(),
        }
    }

    fn skip(&mut self, repository: &str, reason: SkipReason) {
        self.skipped.push(SkippedRepository {
            repository: repository.to_string(),
            reason,
        });
    }

    /// Pretty-printed JSON, for `--json` output.
    pub fn to_json(&self) -> GhsedResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Skips with the given reason.
    pub fn skipped_for(&self, reason: SkipReason) -> Vec<&str> {
        self.skipped
            .iter()
            .filter(|s| s.reason == reason)
            .map(|s| s.repository.as_str())
            .collect()
    }
}

/// Runs one invocation against a forge.
pub struct Pipeline {
    client: Arc<dyn ForgeClient>,
    config: RunConfig,
}

impl Pipeline {
    pub fn new(client: Arc<dyn ForgeClient>, config: RunConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Execute the whole pipeline for `target` and `instructions`.
    pub async fn run(
        &self,
        target: &Target,
        instructions: &[Instruction],
        operator: &mut dyn Operator,
    ) -> GhsedResult<RunReport> {
        self.config.validate()?;
        let mut report = RunReport::new();
        info!(
            run_id = %report.run_id,
            target = %target,
            instructions = instructions.len(),
            in_place = self.config.is_in_place(),
            "starting run"
        );

        let queries = build_queries(target, instructions)?;
        let client = self.client.as_ref();
        let group = filter_by_target(search(&queries, client).await, target);
        if group.is_empty() {
            info!(run_id = %report.run_id, "no matching files found");
            return Ok(report);
        }

        let processed = transform(&group, instructions, client, self.config.concurrency).await;

        // Repositories are reviewed and written strictly one at a time; the
        // branch answer of one repository is the suggestion for the next.
        let mut sticky = self.config.initial_branch();
        for result in processed {
            sticky = self
                .process_repository(result, sticky, operator, &mut report)
                .await?;
        }

        info!(
            run_id = %report.run_id,
            commits = report.commits.len(),
            pull_requests = report.pull_requests.len(),
            skipped = report.skipped.len(),
            "run finished"
        );
        Ok(report)
    }

    /// Review, commit and publish one repository; returns the next sticky branch.
    async fn process_repository(
        &self,
        result: ProcessedResult,
        sticky: Option<String>,
        operator: &mut dyn Operator,
        report: &mut RunReport,
    ) -> GhsedResult<Option<String>> {
        let repository = result.repository.clone();
        let client = self.client.as_ref();

        if !result.has_changes() {
            info!(repo = %repository, "matched files need no changes; skipping repository");
            report.skip(&repository, SkipReason::NoChanges);
            return Ok(sticky);
        }

        let suggestion = match &sticky {
            Some(branch) => branch.clone(),
            None => self.repository_default_branch(&repository).await,
        };

        let Some(decision) =
            review_repository(operator, result, &suggestion, self.config.context_lines).await
        else {
            report.skip(&repository, SkipReason::Declined);
            return Ok(sticky);
        };

        let next = if decision.branch != suggestion {
            Some(decision.branch.clone())
        } else {
            sticky
        };

        let commit = match write_commit(&decision, client, &self.config).await {
            Ok(CommitOutcome::Committed(commit)) => commit,
            Ok(CommitOutcome::Skipped(reason)) => {
                report.skip(&repository, reason);
                return Ok(next);
            }
            Err(e) => {
                error!(repo = %repository, branch = %decision.branch, error = %e, "commit failed; aborting run");
                return Err(e);
            }
        };

        match publish(&commit, client, &self.config).await {
            Ok(Some(pr)) => report.pull_requests.push(pr),
            Ok(None) => {}
            Err(e) => {
                error!(repo = %repository, branch = %commit.branch, error = %e, "pull request failed; aborting run");
                return Err(e);
            }
        }
        report.commits.push(commit);

        Ok(next)
    }

    /// Default branch of `repository`, falling back to the configured name.
    async fn repository_default_branch(&self, repository: &str) -> String {
        let lookup = match RepoName::parse(repository) {
            Ok(repo) => self.client.get_default_branch(&repo).await,
            Err(e) => Err(e),
        };
        match lookup {
            Ok(branch) => branch,
            Err(e) => {
                warn!(repo = %repository, error = %e, "could not look up default branch");
                self.config.branch.clone()
            }
        }
    }
}
