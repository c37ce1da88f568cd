//! Startup configuration resolution.
//!
//! Every value may come from a command-line flag or from the environment (which includes
//! anything `dotenvy` loaded from `.env`). Flags win over environment variables, and the two
//! optional server identity fields fall back to fixed defaults. Empty strings count as absent
//! at every layer, so `ATLASSIAN_SITE_NAME=""` is the same as leaving it unset.
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::hash::BuildHasher;
use std::io::{self, Write};

use thiserror::Error;

use crate::logging::Logger;

/// Default MCP server name reported when neither flag nor environment provides one.
pub const DEFAULT_SERVER_NAME: &str = "kb-mcp-atlassian-server";
/// Default MCP server version reported when neither flag nor environment provides one.
pub const DEFAULT_SERVER_VERSION: &str = "1.0.0";

/// Environment variable holding the Atlassian site name.
pub const ENV_SITE_NAME: &str = "ATLASSIAN_SITE_NAME";
/// Environment variable holding the Atlassian account email.
pub const ENV_USER_EMAIL: &str = "ATLASSIAN_USER_EMAIL";
/// Environment variable holding the Atlassian API token.
pub const ENV_API_TOKEN: &str = "ATLASSIAN_API_TOKEN";
/// Environment variable overriding the advertised MCP server name.
pub const ENV_SERVER_NAME: &str = "MCP_SERVER_NAME";
/// Environment variable overriding the advertised MCP server version.
pub const ENV_SERVER_VERSION: &str = "MCP_SERVER_VERSION";

/// Errors encountered while resolving the startup configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// One or more required credentials were absent from both flags and environment.
    #[error("Missing required Atlassian credentials: {}", .missing.join(", "))]
    MissingCredentials {
        /// Command-line flags of the credentials that could not be resolved, in declaration order.
        missing: Vec<&'static str>,
    },
}

/// Values supplied on the command line. `None` means the flag was not given.
#[derive(Clone, Default)]
pub struct ConfigOverrides {
    /// `--atlassian-site-name`
    pub site_name: Option<String>,
    /// `--atlassian-user-email`
    pub user_email: Option<String>,
    /// `--atlassian-api-token`
    pub api_token: Option<String>,
    /// `--mcp-server-name`
    pub server_name: Option<String>,
    /// `--mcp-server-version`
    pub server_version: Option<String>,
}

/// Read access to environment variables.
///
/// Resolution goes through this trait so tests can feed a plain map instead of mutating the
/// process environment.
pub trait EnvSource {
    /// Return the value of `key`, or `None` when it is not set.
    fn var(&self, key: &str) -> Option<String>;
}

/// [`EnvSource`] backed by the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

impl<S: BuildHasher> EnvSource for HashMap<String, String, S> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Validated configuration handed to the server startup.
///
/// Only [`resolve`] builds one, and only when all three credentials are non-empty.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerConfig {
    site_name: String,
    user_email: String,
    api_token: String,
    server_name: String,
    server_version: String,
}

impl ServerConfig {
    /// Atlassian site name, e.g. `your-domain.atlassian.net`.
    pub fn site_name(&self) -> &str {
        &self.site_name
    }

    /// Email of the Atlassian account used for API calls.
    pub fn user_email(&self) -> &str {
        &self.user_email
    }

    /// Atlassian API token. Never log this.
    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    /// Name advertised to MCP clients during initialization.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Version advertised to MCP clients during initialization.
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// HTTPS base URL of the site. A site name that already carries a scheme is kept as is.
    pub fn base_url(&self) -> String {
        let site = self.site_name.trim_end_matches('/');
        if site.starts_with("http://") || site.starts_with("https://") {
            site.to_string()
        } else {
            format!("https://{site}")
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("site_name", &self.site_name)
            .field("user_email", &self.user_email)
            .field("api_token", &"<redacted>")
            .field("server_name", &self.server_name)
            .field("server_version", &self.server_version)
            .finish()
    }
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// Command-line flag.
    Flag,
    /// Environment variable (or `.env`).
    Environment,
    /// Built-in default.
    Default,
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Flag => "flag",
            Self::Environment => "environment",
            Self::Default => "default",
        })
    }
}

struct Credential {
    flag: &'static str,
    placeholder: &'static str,
    env: &'static str,
    description: &'static str,
}

const REQUIRED_CREDENTIALS: [Credential; 3] = [
    Credential {
        flag: "--atlassian-site-name",
        placeholder: "<site>",
        env: ENV_SITE_NAME,
        description: "Atlassian site name",
    },
    Credential {
        flag: "--atlassian-user-email",
        placeholder: "<email>",
        env: ENV_USER_EMAIL,
        description: "Atlassian user email",
    },
    Credential {
        flag: "--atlassian-api-token",
        placeholder: "<token>",
        env: ENV_API_TOKEN,
        description: "Atlassian API token",
    },
];

/// Merge command-line values with environment fallbacks into a [`ServerConfig`].
///
/// Precedence per field is flag, then environment variable, then (optional fields only) the
/// built-in default. Fails with [`ConfigError::MissingCredentials`] listing every required
/// credential that resolved to nothing.
pub fn resolve<E>(overrides: &ConfigOverrides, env: &E) -> Result<ServerConfig, ConfigError>
where
    E: EnvSource + ?Sized,
{
    Resolution::gather(overrides, env).into_config()
}

/// Same as [`resolve`], but reports through `logger` where each value came from.
///
/// The API token's value is never written; only its source is.
pub fn resolve_with_logging<E>(
    overrides: &ConfigOverrides,
    env: &E,
    logger: &Logger,
) -> Result<ServerConfig, ConfigError>
where
    E: EnvSource + ?Sized,
{
    let resolution = Resolution::gather(overrides, env);
    for (field, source) in resolution.sources() {
        match source {
            Some(source) => logger.debug(format_args!("Resolved {field} from {source}")),
            None => logger.debug(format_args!("No value for {field}")),
        }
    }

    let result = resolution.into_config();
    match &result {
        Ok(config) => logger.info(format_args!(
            "Configuration resolved for site {} as {}",
            config.site_name(),
            config.user_email()
        )),
        Err(err) => logger.error(err),
    }
    result
}

/// Every field looked up exactly once, together with where it came from.
struct Resolution {
    site_name: Option<(String, ValueSource)>,
    user_email: Option<(String, ValueSource)>,
    api_token: Option<(String, ValueSource)>,
    server_name: (String, ValueSource),
    server_version: (String, ValueSource),
}

impl Resolution {
    fn gather<E>(overrides: &ConfigOverrides, env: &E) -> Self
    where
        E: EnvSource + ?Sized,
    {
        Self {
            site_name: lookup(overrides.site_name.as_deref(), env, ENV_SITE_NAME),
            user_email: lookup(overrides.user_email.as_deref(), env, ENV_USER_EMAIL),
            api_token: lookup(overrides.api_token.as_deref(), env, ENV_API_TOKEN),
            server_name: lookup_or_default(
                overrides.server_name.as_deref(),
                env,
                ENV_SERVER_NAME,
                DEFAULT_SERVER_NAME,
            ),
            server_version: lookup_or_default(
                overrides.server_version.as_deref(),
                env,
                ENV_SERVER_VERSION,
                DEFAULT_SERVER_VERSION,
            ),
        }
    }

    fn sources(&self) -> [(&'static str, Option<ValueSource>); 5] {
        [
            ("site name", self.site_name.as_ref().map(|(_, source)| *source)),
            ("user email", self.user_email.as_ref().map(|(_, source)| *source)),
            ("API token", self.api_token.as_ref().map(|(_, source)| *source)),
            ("server name", Some(self.server_name.1)),
            ("server version", Some(self.server_version.1)),
        ]
    }

    fn into_config(self) -> Result<ServerConfig, ConfigError> {
        match (self.site_name, self.user_email, self.api_token) {
            (Some((site_name, _)), Some((user_email, _)), Some((api_token, _))) => {
                Ok(ServerConfig {
                    site_name,
                    user_email,
                    api_token,
                    server_name: self.server_name.0,
                    server_version: self.server_version.0,
                })
            }
            (site_name, user_email, api_token) => {
                let missing = [site_name.is_none(), user_email.is_none(), api_token.is_none()]
                    .into_iter()
                    .zip(REQUIRED_CREDENTIALS.iter())
                    .filter(|(absent, _)| *absent)
                    .map(|(_, credential)| credential.flag)
                    .collect();
                Err(ConfigError::MissingCredentials { missing })
            }
        }
    }
}

/// Write the usage diagnostic printed when credentials are missing.
///
/// The text always names all three required parameters in both their flag and environment
/// variable forms, whichever subset is actually missing.
pub fn write_missing_credentials_report<W: Write + ?Sized>(writer: &mut W) -> io::Result<()> {
    writeln!(writer, "Error: Missing required Atlassian credentials")?;
    writeln!(writer)?;
    writeln!(writer, "Required parameters:")?;
    for credential in &REQUIRED_CREDENTIALS {
        let usage = format!("{} {}", credential.flag, credential.placeholder);
        writeln!(writer, "  {usage:<33}{}", credential.description)?;
    }
    writeln!(writer)?;
    writeln!(
        writer,
        "These can also be provided via environment variables:"
    )?;
    for credential in &REQUIRED_CREDENTIALS {
        writeln!(writer, "  {}", credential.env)?;
    }
    Ok(())
}

/// Render [`write_missing_credentials_report`] into a string.
pub fn missing_credentials_report() -> String {
    let mut buffer = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_missing_credentials_report(&mut buffer);
    String::from_utf8_lossy(&buffer).into_owned()
}

fn lookup<E>(flag: Option<&str>, env: &E, key: &str) -> Option<(String, ValueSource)>
where
    E: EnvSource + ?Sized,
{
    if let Some(value) = flag.filter(|value| !value.is_empty()) {
        return Some((value.to_string(), ValueSource::Flag));
    }
    env.var(key)
        .filter(|value| !value.is_empty())
        .map(|value| (value, ValueSource::Environment))
}

fn lookup_or_default<E>(
    flag: Option<&str>,
    env: &E,
    key: &str,
    default: &str,
) -> (String, ValueSource)
where
    E: EnvSource + ?Sized,
{
    lookup(flag, env, key).unwrap_or_else(|| (default.to_string(), ValueSource::Default))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect()
    }

    fn full_env() -> HashMap<String, String> {
        env_of(&[
            (ENV_SITE_NAME, "env.atlassian.net"),
            (ENV_USER_EMAIL, "env@example.com"),
            (ENV_API_TOKEN, "env-token"),
        ])
    }

    #[test]
    fn flag_takes_precedence_over_environment() {
        let overrides = ConfigOverrides {
            site_name: Some("cli.atlassian.net".into()),
            ..ConfigOverrides::default()
        };
        let config = resolve(&overrides, &full_env()).unwrap();
        assert_eq!(config.site_name(), "cli.atlassian.net");
        assert_eq!(config.user_email(), "env@example.com");
        assert_eq!(config.api_token(), "env-token");
    }

    type SetFlag = fn(&mut ConfigOverrides, String);
    type ReadField = fn(&ServerConfig) -> &str;

    const REQUIRED_FIELDS: [(&str, &str, SetFlag, ReadField); 3] = [
        (
            ENV_SITE_NAME,
            "--atlassian-site-name",
            |overrides: &mut ConfigOverrides, value: String| overrides.site_name = Some(value),
            ServerConfig::site_name,
        ),
        (
            ENV_USER_EMAIL,
            "--atlassian-user-email",
            |overrides: &mut ConfigOverrides, value: String| overrides.user_email = Some(value),
            ServerConfig::user_email,
        ),
        (
            ENV_API_TOKEN,
            "--atlassian-api-token",
            |overrides: &mut ConfigOverrides, value: String| overrides.api_token = Some(value),
            ServerConfig::api_token,
        ),
    ];

    #[test]
    fn each_required_field_follows_flag_then_env() {
        for (key, flag, set_flag, read_field) in REQUIRED_FIELDS {
            for (flag_present, env_present) in
                [(true, true), (true, false), (false, true), (false, false)]
            {
                let mut env = full_env();
                if !env_present {
                    env.remove(key);
                }
                let mut overrides = ConfigOverrides::default();
                if flag_present {
                    set_flag(&mut overrides, "from-flag".to_string());
                }

                let result = resolve(&overrides, &env);
                match (flag_present, env_present) {
                    (true, _) => assert_eq!(read_field(&result.unwrap()), "from-flag", "{key}"),
                    (false, true) => assert_eq!(read_field(&result.unwrap()), env[key], "{key}"),
                    (false, false) => assert_eq!(
                        result.unwrap_err(),
                        ConfigError::MissingCredentials {
                            missing: vec![flag]
                        },
                        "{key}"
                    ),
                }
            }
        }
    }

    #[derive(Default)]
    struct CountingEnv {
        values: HashMap<String, String>,
        reads: std::cell::RefCell<HashMap<String, usize>>,
    }

    impl EnvSource for CountingEnv {
        fn var(&self, key: &str) -> Option<String> {
            *self.reads.borrow_mut().entry(key.to_string()).or_default() += 1;
            self.values.var(key)
        }
    }

    #[test]
    fn logged_resolution_reads_each_variable_once() {
        let env = CountingEnv {
            values: full_env(),
            ..CountingEnv::default()
        };
        let logging = std::sync::Arc::new(crate::logging::LoggerContext::new(
            crate::logging::ExecutionMode::ProtocolEndpoint,
            crate::logging::LogLevel::Debug,
            io::sink(),
            io::sink(),
        ));

        resolve_with_logging(&ConfigOverrides::default(), &env, &logging.logger("config")).unwrap();

        let reads = env.reads.borrow();
        assert_eq!(reads.len(), 5);
        assert!(reads.values().all(|count| *count == 1), "{reads:?}");
    }

    #[test]
    fn empty_environment_value_counts_as_missing() {
        let env = env_of(&[
            (ENV_SITE_NAME, ""),
            (ENV_USER_EMAIL, "a@b.com"),
            (ENV_API_TOKEN, "tok"),
        ]);
        let err = resolve(&ConfigOverrides::default(), &env).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingCredentials {
                missing: vec!["--atlassian-site-name"]
            }
        );
    }

    #[test]
    fn empty_flag_falls_back_to_environment() {
        let overrides = ConfigOverrides {
            user_email: Some(String::new()),
            ..ConfigOverrides::default()
        };
        let config = resolve(&overrides, &full_env()).unwrap();
        assert_eq!(config.user_email(), "env@example.com");
    }

    #[test]
    fn lists_every_missing_credential_in_order() {
        let err = resolve(&ConfigOverrides::default(), &HashMap::<String, String>::new())
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingCredentials {
                missing: vec![
                    "--atlassian-site-name",
                    "--atlassian-user-email",
                    "--atlassian-api-token"
                ]
            }
        );
    }

    #[test]
    fn optional_fields_fall_back_to_defaults() {
        let overrides = ConfigOverrides {
            server_name: Some("custom".into()),
            ..ConfigOverrides::default()
        };
        let config = resolve(&overrides, &full_env()).unwrap();
        assert_eq!(config.server_name(), "custom");
        assert_eq!(config.server_version(), DEFAULT_SERVER_VERSION);
    }

    #[test]
    fn optional_fields_read_environment_before_default() {
        let mut env = full_env();
        env.insert(ENV_SERVER_NAME.into(), "from-env".into());
        env.insert(ENV_SERVER_VERSION.into(), "9.9.9".into());
        let config = resolve(&ConfigOverrides::default(), &env).unwrap();
        assert_eq!(config.server_name(), "from-env");
        assert_eq!(config.server_version(), "9.9.9");
    }

    #[test]
    fn report_names_all_credentials_in_both_forms() {
        let report = missing_credentials_report();
        for credential in &REQUIRED_CREDENTIALS {
            assert!(report.contains(credential.flag), "{report}");
            assert!(report.contains(credential.env), "{report}");
        }
        assert!(report.contains("  --atlassian-site-name <site>     Atlassian site name\n"));
        assert!(report.contains("  --atlassian-user-email <email>   Atlassian user email\n"));
        assert!(report.contains("  --atlassian-api-token <token>    Atlassian API token\n"));
        assert!(report.starts_with("Error: Missing required Atlassian credentials\n\n"));
    }

    #[test]
    fn debug_output_redacts_token() {
        let config = resolve(&ConfigOverrides::default(), &full_env()).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("env-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn base_url_adds_scheme_only_when_missing() {
        let config = resolve(&ConfigOverrides::default(), &full_env()).unwrap();
        assert_eq!(config.base_url(), "https://env.atlassian.net");

        let overrides = ConfigOverrides {
            site_name: Some("https://team.atlassian.net/".into()),
            ..ConfigOverrides::default()
        };
        let config = resolve(&overrides, &full_env()).unwrap();
        assert_eq!(config.base_url(), "https://team.atlassian.net");
    }
}
