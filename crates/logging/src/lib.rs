#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! # Overview
//!
//! `bft_logging` owns the one place where a bft binary installs its tracing
//! subscriber, so the client and the daemon emit identically formatted
//! diagnostics on stderr and honour the same `BFT_LOG` filter override.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Environment variable that overrides the verbosity-derived filter.
pub const ENV_FILTER_VAR: &str = "BFT_LOG";

/// Installs the process-wide subscriber.
///
/// `verbose` counts `-v` occurrences on the command line: 0 keeps the default
/// info level, 1 raises it to debug, and 2 or more to trace. `BFT_LOG` wins
/// over the flag when set. Calling this twice is harmless; the second call is
/// ignored, which keeps unit tests that exercise `run` functions independent.
pub fn init(verbose: u8) {
    let default_level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var(ENV_FILTER_VAR)
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
