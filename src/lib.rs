//! # imagegen-mcp
//!
//! A Model Context Protocol server that exposes an image-generation API as two
//! tools, `search_models` and `generate_image`, over JSON-RPC on streamable HTTP.
//!
//! ## Architecture
//!
//! ```text
//! HTTP (axum) → auth → streamable_http → SessionTransport → McpDispatcher → ToolHandler → ImageApi
//!                                             ↑                   ↓
//!                                     SSE notifications    RequestContextStore (cancellation)
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use imagegen_mcp::{Config, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::from_env()?;
//!     imagegen_mcp::startup::run(config, imagegen_mcp::api::shutdown_signal()).await
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod mcp;
pub mod observability;
pub mod startup;
pub mod tools;
pub mod upstream;

pub use config::Config;
pub use errors::{Error, Result};
pub use observability::init_logging;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
