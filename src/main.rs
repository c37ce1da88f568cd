//! MCP server entrypoint (stdio transport).
//!
//! Resolves Atlassian credentials from flags, the environment and `.env`, then serves MCP over
//! stdio. Nothing but protocol frames may reach stdout once the server runs, so every
//! diagnostic here goes through the logger or straight to stderr.
use std::io;
use std::process::ExitCode;

use clap::Parser;
use kb_mcp_atlassian::{
    cli::Cli,
    config::{self, ConfigError, ProcessEnv},
    logging::{self, LoggerContext},
    mcp,
};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_context = LoggerContext::from_process();
    logging::init_tracing(&log_context);
    let logger = log_context.logger("cli");
    logger.debug(format_args!(
        "Execution mode {:?}, log level {}",
        log_context.mode(),
        log_context.log_level()
    ));

    let config = match config::resolve_with_logging(&cli.into_overrides(), &ProcessEnv, &logger)
    {
        Ok(config) => config,
        Err(ConfigError::MissingCredentials { .. }) => {
            let _ = config::write_missing_credentials_report(&mut io::stderr().lock());
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = mcp::start_server(config, log_context).await {
        eprintln!("Failed to start server: {err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
