//! Command-line interface (spec §6.4, §10): catalog path, listen address,
//! and the ambient logging flags, each with a `TOOLBOX_*` environment
//! fallback.

use std::path::PathBuf;

use clap::Parser;

/// A declaratively configured tool gateway: exposes a fixed HTTP/JSON-RPC
/// surface over a catalog of sources, tools, and toolsets.
#[derive(Parser, Debug)]
#[command(name = "toolbox-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the catalog file (multi-document YAML, §6.1).
    #[arg(long, env = "TOOLBOX_CATALOG")]
    pub catalog: PathBuf,

    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1", env = "TOOLBOX_ADDRESS")]
    pub address: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 5000, env = "TOOLBOX_PORT")]
    pub port: u16,

    /// Log level (debug, info, warn, error) (§6.4).
    #[arg(long, default_value = "info", env = "TOOLBOX_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (standard, json) (§6.4).
    #[arg(long, default_value = "standard", env = "TOOLBOX_LOG_FORMAT")]
    pub log_format: String,

    /// Accepted for catalog-file compatibility; no reload path is
    /// implemented (§9, §11 Open Questions: the Resource Manager is
    /// read-only for the process lifetime regardless of this flag).
    #[arg(long, env = "TOOLBOX_DISABLE_RELOAD")]
    pub disable_reload: bool,

    /// Graceful shutdown drain timeout, in seconds.
    #[arg(long, default_value_t = 30, env = "TOOLBOX_SHUTDOWN_TIMEOUT_SECS")]
    pub shutdown_timeout_secs: u64,
}
