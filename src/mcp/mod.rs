//! Model Context Protocol (MCP) server startup.
//!
//! The Jira and Confluence tools live behind this boundary; what this module guarantees is the
//! handshake (server name and version from [`crate::config::ServerConfig`]) and the stdio
//! transport, which owns stdout for the lifetime of the process.

mod format;
mod server;

pub use server::{AtlassianMcpServer, CONNECTION_URI, start_server};
