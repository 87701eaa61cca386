//! Turns a target and instruction set into code-search queries.
//!
//! Code search accepts one literal term per query, so every instruction gets
//! its own query.

use crate::error::{GhsedError, GhsedResult};
use crate::instruction::Instruction;
use crate::target::Target;

/// One query per instruction: `repo:` filters, the `user:` filter, then the term.
pub fn build_queries(target: &Target, instructions: &[Instruction]) -> GhsedResult<Vec<String>> {
    target.validate()?;

    let mut filters: Vec<String> = target
        .repos()
        .into_iter()
        .map(|name| format!("repo:{}/{}", target.owner, name))
        .collect();
    filters.push(format!("user:{}", target.owner));
    let filters = filters.join(" ");

    instructions
        .iter()
        .map(|instruction| {
            let term = instruction.search_term().map_err(GhsedError::from)?;
            Ok(format!("{filters} {term}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::parse_instructions;
    use crate::target::parse_target;

    #[test]
    fn test_one_query_per_instruction() {
        let target = parse_target("acme/*").unwrap();
        let instructions = parse_instructions("s/foo/bar/;s/baz qux/x/").unwrap();
        let queries = build_queries(&target, &instructions).unwrap();
        assert_eq!(
            queries,
            vec!["user:acme foo".to_string(), "user:acme \"baz qux\"".to_string()]
        );
    }

    #[test]
    fn test_alternation_stays_in_one_query() {
        let target = parse_target("acme").unwrap();
        let instructions = parse_instructions("s/foo|barbaz/x/").unwrap();
        let queries = build_queries(&target, &instructions).unwrap();
        assert_eq!(queries, vec!["user:acme foo OR barbaz"]);
    }

    #[test]
    fn test_concrete_repos_add_repo_filters() {
        let target = parse_target("acme/api,web").unwrap();
        let instructions = parse_instructions("s/foo/bar/").unwrap();
        let queries = build_queries(&target, &instructions).unwrap();
        assert_eq!(queries, vec!["repo:acme/api repo:acme/web user:acme foo"]);
    }

    #[test]
    fn test_wildcard_owner_is_rejected() {
        let target = Target {
            owner: "*".to_string(),
            repo: "*".to_string(),
            file: "*".to_string(),
        };
        let instructions = parse_instructions("s/foo/bar/").unwrap();
        assert!(matches!(
            build_queries(&target, &instructions),
            Err(GhsedError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn test_pattern_without_literal_fails() {
        let target = parse_target("acme").unwrap();
        let instructions = parse_instructions("s/.*/x/").unwrap();
        assert!(matches!(
            build_queries(&target, &instructions),
            Err(GhsedError::Instruction(_))
        ));
    }
}
