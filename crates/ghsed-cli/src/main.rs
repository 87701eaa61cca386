//! ghsed - sed for GitHub
//!
//! Finds files matching `s/pattern/replacement/flags` expressions across the
//! repositories of an owner, shows every proposed change, and commits the
//! confirmed ones (one commit per repository, plus a pull request unless
//! running in place).
//!
//! ```text
//! ghsed 's/foo/bar/g' acme
//! ghsed -e 's/foo/bar/' -e 's/baz/qux/' acme/api,web/*.md
//! ghsed -i 's/v1/v2/' acme/api
//! ghsed --in-place=hotfix 's/v1/v2/' acme/api
//! ```

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use ghsed_core::{
    init_tracing, level_for, parse_expressions, parse_target, resolve_credentials,
    ConsoleOperator, CredentialSources, GhsedError, Pipeline, RunConfig, RunMode, RunReport,
    Settings,
};
use ghsed_forge::{GitHubClient, GitHubConfig, DEFAULT_API_URL};
use tracing::{debug, error};

const API_URL_ENV: &str = "GITHUB_API_URL";
const REDACTED: &str = "<redacted>";

/// Flags whose values must never leave the machine.
const SECRET_LONG: &[&str] = &["--token", "--password"];
const SECRET_SHORT: &[char] = &['t', 'p'];
/// Other flags that take a value, so the value is not read as a flag.
const VALUED_LONG: &[&str] = &["--expr", "--username", "--api-url", "--config", "--concurrency"];
const VALUED_SHORT: &[char] = &['e', 'u'];

#[derive(Parser, Debug)]
#[command(name = "ghsed")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "sed-style find and replace across GitHub repositories", long_about = None)]
struct Cli {
    /// Expression script, or the scope when only one argument is given
    first: String,

    /// Scope: owner, owner/repo[,repo...] or owner/repo/file-glob
    second: Option<String>,

    /// Substitution expression (repeatable)
    #[arg(short = 'e', long = "expr", value_name = "EXPR")]
    expressions: Vec<String>,

    /// Commit straight to BRANCH (`-i=BRANCH`; default: each repository's
    /// default branch) without a pull request
    #[arg(
        short = 'i',
        long,
        num_args = 0..=1,
        require_equals = true,
        value_name = "BRANCH"
    )]
    in_place: Option<Option<String>>,

    /// API token
    #[arg(short, long)]
    token: Option<String>,

    /// Username for basic authentication
    #[arg(short, long)]
    username: Option<String>,

    /// Password for basic authentication
    #[arg(short, long)]
    password: Option<String>,

    /// API base URL (GitHub Enterprise)
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Settings file (default: $XDG_CONFIG_HOME/ghsed/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Maximum concurrent file fetches per repository
    #[arg(long)]
    concurrency: Option<usize>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON log lines and print the run report as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// `(scope, expressions)` from the positionals and `-e` flags.
    fn scope_and_expressions(&self) -> Result<(String, Vec<String>), GhsedError> {
        let (scope, mut expressions) = match &self.second {
            Some(scope) => (scope.clone(), vec![self.first.clone()]),
            None => (self.first.clone(), Vec::new()),
        };
        expressions.extend(self.expressions.iter().cloned());
        if expressions.iter().all(|e| e.trim().is_empty()) {
            return Err(GhsedError::Configuration(
                "no substitution expression given".to_string(),
            ));
        }
        Ok((scope, expressions))
    }

    fn run_mode(&self) -> RunMode {
        match &self.in_place {
            None => RunMode::PullRequest,
            Some(branch) => RunMode::InPlace {
                branch: branch.clone().filter(|b| !b.trim().is_empty()),
            },
        }
    }

    fn api_url(&self, settings: &Settings) -> String {
        self.api_url
            .clone()
            .or_else(|| settings.api_url.clone())
            .or_else(|| std::env::var(API_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    fn credential_sources(&self, settings: &Settings) -> CredentialSources {
        CredentialSources {
            config_token: self.token.clone().or_else(|| settings.token.clone()),
            username: self.username.clone().or_else(|| settings.username.clone()),
            password: self.password.clone(),
            ..CredentialSources::from_environment()
        }
    }

    fn run_config(&self, settings: &Settings) -> RunConfig {
        let invocation = redacted_invocation(std::env::args());
        let mut config = RunConfig::new(invocation)
            .apply_settings(settings)
            .with_mode(self.run_mode());
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        config
    }
}

/// The command line as it goes into pull request bodies, with the values of
/// `--token` and `--password` (spaced, `=` or attached forms) masked.
fn redacted_invocation(args: impl IntoIterator<Item = String>) -> String {
    let mut out = Vec::new();
    let mut mask_next = false;
    let mut keep_next = false;

    for arg in args {
        if mask_next {
            out.push(REDACTED.to_string());
            mask_next = false;
            continue;
        }
        if keep_next || arg == "-" || !arg.starts_with('-') {
            out.push(arg);
            keep_next = false;
            continue;
        }

        if let Some(long) = arg.strip_prefix("--") {
            let (name, has_value) = match long.split_once('=') {
                Some((name, _)) => (format!("--{name}"), true),
                None => (arg.clone(), false),
            };
            let secret = SECRET_LONG.contains(&name.as_str());
            if has_value && secret {
                out.push(format!("{name}={REDACTED}"));
            } else {
                if !has_value {
                    mask_next = secret;
                    keep_next = VALUED_LONG.contains(&name.as_str());
                }
                out.push(arg);
            }
            continue;
        }

        // Short cluster such as `-v`, `-vt TOKEN` or `-tTOKEN`.
        let mut redacted = String::from("-");
        let mut masked = false;
        for (offset, c) in arg.char_indices().skip(1) {
            if c == '=' {
                break;
            }
            redacted.push(c);
            let rest = &arg[offset + c.len_utf8()..];
            if SECRET_SHORT.contains(&c) {
                if rest.is_empty() {
                    mask_next = true;
                } else {
                    redacted.push_str(REDACTED);
                    masked = true;
                }
                break;
            }
            if VALUED_SHORT.contains(&c) {
                keep_next = rest.is_empty();
                break;
            }
        }
        out.push(if masked { redacted } else { arg });
    }
    out.join(" ")
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json, level_for(cli.verbose));

    match run(&cli).await {
        Ok(report) => {
            if cli.json {
                match report.to_json() {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        error!(error = %e, "could not serialize run report");
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                print_summary(&report);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "ghsed failed");
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<RunReport> {
    let settings =
        Settings::discover(cli.config.as_deref()).context("Failed to load settings file")?;

    // Everything below up to the client is validated before any network call.
    let (scope, expressions) = cli.scope_and_expressions()?;
    let target = parse_target(&scope)?;
    let instructions = parse_expressions(&expressions).context("Failed to parse expressions")?;
    let credentials = resolve_credentials(&cli.credential_sources(&settings))?;
    let config = cli.run_config(&settings);
    config.validate()?;

    let api_url = cli.api_url(&settings);
    debug!(api_url = %api_url, target = %target, "resolved invocation");
    let client = GitHubClient::new(GitHubConfig::new(credentials).with_api_url(&api_url))
        .context("Failed to create GitHub client")?;

    let mut operator = ConsoleOperator::new(std::io::stdout().is_terminal());
    let report = Pipeline::new(Arc::new(client), config)
        .run(&target, &instructions, &mut operator)
        .await?;
    Ok(report)
}

fn print_summary(report: &RunReport) {
    println!();
    if report.commits.is_empty() && report.skipped.is_empty() {
        println!("{}", "No matching files found.".yellow());
        return;
    }

    for commit in &report.commits {
        println!(
            "{} {} on {} ({} file{})",
            "✓".green(),
            commit.repository.bold(),
            commit.branch.cyan(),
            commit.files.len(),
            if commit.files.len() == 1 { "" } else { "s" }
        );
    }
    for pr in &report.pull_requests {
        println!("  {} #{} {}", "PR".green(), pr.number, pr.url);
    }
    for skipped in &report.skipped {
        println!(
            "{} {}: {}",
            "-".yellow(),
            skipped.repository.bold(),
            skipped.reason
        );
    }

    println!(
        "\n{} commit(s), {} pull request(s), {} skipped",
        report.commits.len(),
        report.pull_requests.len(),
        report.skipped.len()
    );
}
