//! ghsed Core Library
//!
//! sed-style find/replace across the repositories of a code-forge owner.
//! A run searches the owner's code, shows the operator every proposed change,
//! and lands the confirmed ones as one commit per repository, optionally
//! followed by a pull request.
//!
//! ## Key Components
//!
//! - `parse_target` / `parse_instructions`: scope and `s///` parsing
//! - `build_queries`, `search`, `transform`: find and rewrite candidate files
//! - `review`: the operator gate (`Operator`, `ConsoleOperator`, `ScriptedOperator`)
//! - `resolve_branch`, `write_commit`, `publish`: land the confirmed changes
//! - `Pipeline`: ties the stages together and produces a `RunReport`

pub mod branch;
pub mod commit;
pub mod config;
pub mod credentials;
pub mod error;
pub mod instruction;
pub mod pipeline;
pub mod publish;
pub mod query;
pub mod review;
pub mod search;
pub mod target;
pub mod telemetry;
pub mod transform;

pub use branch::{resolve_branch, ResolvedBranch};
pub use commit::{write_commit, CommitOutcome, CommitResult, SkipReason};
pub use config::{default_branch_name, RunConfig, RunMode, Settings};
pub use credentials::{resolve_credentials, CredentialSources};
pub use error::{GhsedError, GhsedResult};
pub use instruction::{
    apply_all, parse_expressions, parse_instructions, Instruction, InstructionError,
};
pub use pipeline::{Pipeline, RunReport, SkippedRepository};
pub use publish::publish;
pub use query::build_queries;
pub use review::{
    review_repository, ConsoleOperator, FileChange, Operator, RepoDecision, ScriptedOperator,
};
pub use search::{filter_by_target, search, RepoGroup};
pub use target::{parse_target, Target};
pub use telemetry::{init_tracing, level_for};
pub use transform::{transform, ProcessedFile, ProcessedResult};
