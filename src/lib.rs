//! toolbox-gateway
//!
//! A declaratively configured tool gateway: a long-running network service
//! that exposes a fixed HTTP/JSON-RPC surface over a user-supplied catalog
//! of tools, each a parameterized operation executed against a named data
//! source.
//!
//! # Components
//!
//! - [`kind_registry`]: process-wide kind → decoder-factory registries.
//! - [`catalog`]: multi-document YAML catalog loader.
//! - [`manager`]: the resource manager (sources, auth services, tools,
//!   toolsets), initialized once at startup.
//! - [`param`]: the parameter engine (parse, coerce, claim-bind).
//! - [`source`] / [`tool`] / [`auth`]: the kind contracts plus the two
//!   reference backends (`postgres-sql`, `http`) this repo ships.
//! - [`gateway`]: the HTTP router and MCP JSON-RPC dispatcher.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod catalog;
pub mod cli;
pub mod context;
pub mod error;
pub mod gateway;
pub mod instrumentation;
pub mod kind_registry;
pub mod manager;
pub mod param;
pub mod source;
pub mod tool;
pub mod toolset;

pub use error::{Error, Result};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// MCP protocol version this dispatcher implements (§4.8).
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Install a global `tracing` subscriber per the two required log formats
/// and four required log levels (§6.4).
pub fn setup_tracing(level: &str, format: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        "json" => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
