//! Log setup for the `ghsed` binary.
//!
//! Everything goes to stderr; stdout belongs to diffs, prompts and the report.

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Default level for the `--verbose` flag.
pub fn level_for(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Filter from a `RUST_LOG`-style spec, falling back to `level`.
fn filter_for(level: Level, spec: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .parse_lossy(spec.unwrap_or_default())
}

/// Install the process-wide subscriber: human-readable lines, or JSON lines
/// with `json`. `RUST_LOG` wins over `level`.
pub fn init_tracing(json: bool, level: Level) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let human = (!json).then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));
    let lines = json.then(|| {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr)
    });

    // A second call finds a subscriber already set and is ignored.
    let _ = tracing_subscriber::registry()
        .with(filter_for(level, rust_log.as_deref()))
        .with(human)
        .with(lines)
        .try_init();
}
