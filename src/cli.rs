//! Command-line surface of the `mcp-atlassian-server` binary.
use clap::Parser;

use crate::config::ConfigOverrides;

/// MCP Server for interacting with Atlassian Jira and Confluence.
///
/// Every flag is optional on the command line; missing credentials are looked up in the
/// environment before the process gives up. Server name and version defaults are applied
/// during resolution so `MCP_SERVER_NAME` / `MCP_SERVER_VERSION` can still fill them.
#[derive(Parser)]
#[command(
    name = "mcp-atlassian-server",
    version,
    about = "MCP Server for interacting with Atlassian Jira and Confluence"
)]
pub struct Cli {
    /// Atlassian site name (e.g., your-domain.atlassian.net)
    #[arg(long, value_name = "site")]
    pub atlassian_site_name: Option<String>,
    /// Atlassian user email
    #[arg(long, value_name = "email")]
    pub atlassian_user_email: Option<String>,
    /// Atlassian API token
    #[arg(long, value_name = "token")]
    pub atlassian_api_token: Option<String>,
    /// MCP server name [default: kb-mcp-atlassian-server]
    #[arg(long, value_name = "name")]
    pub mcp_server_name: Option<String>,
    /// MCP server version [default: 1.0.0]
    #[arg(long, value_name = "version")]
    pub mcp_server_version: Option<String>,
}

impl Cli {
    /// Hand the parsed flags to configuration resolution.
    pub fn into_overrides(self) -> ConfigOverrides {
        ConfigOverrides {
            site_name: self.atlassian_site_name,
            user_email: self.atlassian_user_email,
            api_token: self.atlassian_api_token,
            server_name: self.mcp_server_name,
            server_version: self.mcp_server_version,
        }
    }
}
