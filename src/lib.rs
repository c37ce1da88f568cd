#![deny(missing_docs)]

//! Bootstrap and diagnostics for the Atlassian MCP stdio server.

/// Command-line flags.
pub mod cli;
/// Credential and server identity resolution.
pub mod config;
/// Mode-aware diagnostic logging and tracing setup.
pub mod logging;
/// Model Context Protocol server startup.
pub mod mcp;
