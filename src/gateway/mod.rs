//! Server surface (spec §2 C9-C11, §4.7-§4.8): the HTTP router, the MCP
//! JSON-RPC dispatcher, redaction helpers shared by both, and the
//! top-level `Gateway` that wires a loaded catalog to a bound listener.

mod mcp;
mod redact;
mod router;
mod server;

pub use router::{create_router, AppState};
pub use server::Gateway;
