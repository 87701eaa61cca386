//! Search aggregation: run every query, group hits by repository.

use futures::future::join_all;
use ghsed_forge::{ForgeClient, SearchMatch};
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::target::Target;

/// Matches keyed by repository full name, in first-seen order.
pub type RepoGroup = IndexMap<String, Vec<SearchMatch>>;

/// Issue all queries concurrently and group the results.
///
/// A failing query is logged and contributes nothing; the others still count.
pub async fn search(queries: &[String], client: &dyn ForgeClient) -> RepoGroup {
    let results = join_all(queries.iter().map(|query| async move {
        (query, client.search_code(query).await)
    }))
    .await;

    let mut group = RepoGroup::new();
    for (query, result) in results {
        match result {
            Ok(matches) => {
                debug!(query = %query, hits = matches.len(), "search completed");
                for hit in matches {
                    group.entry(hit.repository.clone()).or_default().push(hit);
                }
            }
            Err(e) => warn!(query = %query, error = %e, "search query failed; skipping"),
        }
    }
    group
}

/// Drop matches whose path is outside the target's file glob, and repositories left empty.
pub fn filter_by_target(group: RepoGroup, target: &Target) -> RepoGroup {
    group
        .into_iter()
        .filter_map(|(repo, matches)| {
            let kept: Vec<SearchMatch> = matches
                .into_iter()
                .filter(|m| target.matches_path(&m.path))
                .collect();
            (!kept.is_empty()).then_some((repo, kept))
        })
        .collect()
}
