//! MCP server bootstrap and request dispatch.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::{
    ErrorData as McpError,
    handler::server::ServerHandler,
    model::{
        AnnotateAble, ListResourcesResult, RawResource, ReadResourceRequestParam,
        ReadResourceResult, Resource, ServerCapabilities, ServerInfo,
    },
    service::ServiceExt,
    transport::stdio,
};

use crate::{
    config::ServerConfig,
    logging::{Logger, LoggerContext},
    mcp::format::{ConnectionSnapshot, json_resource_contents, serialize_json},
};

/// URI of the resource describing the active Atlassian connection.
pub const CONNECTION_URI: &str = "atlassian://connection";

/// MCP server exposing the configured Atlassian site.
#[derive(Clone)]
pub struct AtlassianMcpServer {
    config: Arc<ServerConfig>,
    logger: Logger,
}

impl AtlassianMcpServer {
    /// Create a server for `config`, logging through `logging`.
    pub fn new(config: ServerConfig, logging: &Arc<LoggerContext>) -> Self {
        Self {
            config: Arc::new(config),
            logger: logging.logger("mcp"),
        }
    }

    /// Configuration the server was started with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn describe_resources(&self) -> Vec<Resource> {
        let mut connection = RawResource::new(CONNECTION_URI, "connection");
        connection.description =
            Some("Atlassian site, account and server identity in use (no secrets)".into());
        connection.mime_type = Some(super::format::APPLICATION_JSON.into());

        vec![connection.no_annotation()]
    }
}

/// Serve MCP over stdio until the client disconnects.
///
/// This is the single hand-off point from bootstrap: `config` has already been validated.
pub async fn start_server(config: ServerConfig, logging: Arc<LoggerContext>) -> Result<()> {
    let logger = logging.logger("server");
    logger.info(format_args!(
        "Starting {} v{} for {}",
        config.server_name(),
        config.server_version(),
        config.site_name()
    ));

    let server = AtlassianMcpServer::new(config, &logging);
    let service = server
        .serve(stdio())
        .await
        .context("failed to start MCP server over stdio")?;
    logger.info("MCP server ready on stdio");

    let reason = service
        .waiting()
        .await
        .context("MCP server terminated unexpectedly")?;
    logger.info(format_args!("MCP server stopped: {reason:?}"));

    Ok(())
}

impl ServerHandler for AtlassianMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut implementation = rmcp::model::Implementation::from_build_env();
        implementation.name = self.config.server_name().to_string();
        implementation.title = Some("Atlassian Jira & Confluence MCP".to_string());
        implementation.version = self.config.server_version().to_string();

        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_resources().build(),
            server_info: implementation,
            instructions: Some(format!(
                "Use this server to work with Jira issues and Confluence pages on {}.",
                self.config.site_name()
            )),
            ..ServerInfo::default()
        }
    }

    fn list_resources(
        &self,
        _request: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        let resources = self.describe_resources();
        std::future::ready(Ok(ListResourcesResult::with_all_items(resources)))
    }

    fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ReadResourceResult, McpError>> + Send + '_ {
        let uri = request.uri;
        self.logger.debug(format_args!("Reading resource {uri}"));

        let result = if uri == CONNECTION_URI {
            let snapshot = ConnectionSnapshot::from(self.config.as_ref());
            Ok(ReadResourceResult {
                contents: vec![json_resource_contents(
                    CONNECTION_URI,
                    serialize_json(&snapshot, CONNECTION_URI),
                )],
            })
        } else {
            self.logger.warn(format_args!("Unknown resource URI requested: {uri}"));
            Err(McpError::invalid_params(
                format!("Unknown resource URI: {uri}"),
                None,
            ))
        };
        std::future::ready(result)
    }
}
