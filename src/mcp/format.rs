//! Formatting helpers for MCP resources.

use rmcp::model::ResourceContents;
use serde::Serialize;

use crate::config::ServerConfig;

pub(crate) const APPLICATION_JSON: &str = "application/json";

/// Non-secret view of the active connection settings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConnectionSnapshot<'a> {
    pub(crate) site_name: &'a str,
    pub(crate) base_url: String,
    pub(crate) user_email: &'a str,
    pub(crate) server_name: &'a str,
    pub(crate) server_version: &'a str,
}

impl<'a> From<&'a ServerConfig> for ConnectionSnapshot<'a> {
    fn from(config: &'a ServerConfig) -> Self {
        Self {
            site_name: config.site_name(),
            base_url: config.base_url(),
            user_email: config.user_email(),
            server_name: config.server_name(),
            server_version: config.server_version(),
        }
    }
}

/// Serialize a value to JSON, falling back to compact formatting on error.
pub(crate) fn serialize_json<T: Serialize>(value: &T, context_uri: &str) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|error| {
        tracing::warn!(uri = context_uri, %error, "Failed to serialize JSON prettily");
        serde_json::to_string(value).unwrap_or_else(|_| "{}".into())
    })
}

/// Build JSON resource contents for MCP resource responses.
pub(crate) fn json_resource_contents(uri: &str, text: String) -> ResourceContents {
    ResourceContents::TextResourceContents {
        uri: uri.to_string(),
        mime_type: Some(APPLICATION_JSON.into()),
        text,
        meta: None,
    }
}
