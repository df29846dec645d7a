//! Configuration management

use std::{
    collections::{BTreeMap, HashSet},
    env,
    path::Path,
    time::Duration,
};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::engine::{DEFAULT_TIMEOUT, ToolOptions};
use crate::registry::SchemaSource;
use crate::{Error, Result};

/// Prefix of environment variables overriding file settings
pub const ENV_PREFIX: &str = "OPENAPI_TOOLKIT_";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// One entry per OpenAPI document
    pub clients: Vec<ClientConfig>,
    /// Execution switches shared by every client
    pub execution: ExecutionConfig,
    /// Pending-call expiry
    pub pending: PendingConfig,
}

/// One API client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Client name; defaults to the document title
    #[serde(default)]
    pub name: Option<String>,
    /// Where the document comes from: `url`, `file`, `text` or `inline`
    pub source: SchemaSource,
    /// Overrides the document's `servers[0].url`
    #[serde(default)]
    pub base_url: Option<String>,
    /// Headers sent with every request; `${VAR}` and `${VAR:-default}` expand
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Body fields merged under caller-supplied ones
    #[serde(default)]
    pub preset_body_fields: Map<String, Value>,
    /// Only expose these operation ids or `x-tool-name`s
    #[serde(default)]
    pub include: Option<Vec<String>>,
    /// Regexes over tool names or operation ids that pause for approval
    #[serde(default)]
    pub pause_patterns: Vec<String>,
}

/// Execution switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Outbound request timeout
    #[serde(with = "duration")]
    pub timeout: Duration,
    /// Validate arguments before executing
    pub validate_arguments: bool,
    /// Pause every call
    pub disable_all_executions: bool,
    /// Tool names or operation ids that always pause
    pub disabled_executions: Vec<String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            validate_arguments: true,
            disable_all_executions: false,
            disabled_executions: Vec::new(),
        }
    }
}

impl ExecutionConfig {
    /// Engine options for these switches
    #[must_use]
    pub fn tool_options(&self) -> ToolOptions {
        ToolOptions {
            validate_arguments: self.validate_arguments,
            disable_all_executions: self.disable_all_executions,
            disabled_executions: self.disabled_executions.iter().cloned().collect::<HashSet<_>>(),
            auth: None,
        }
    }
}

/// Pending-call expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PendingConfig {
    /// Drop paused calls older than this; unset keeps them until resumed
    #[serde(with = "duration::option")]
    pub ttl: Option<Duration>,
    /// How often expired calls are swept
    #[serde(with = "duration")]
    pub sweep_interval: Duration,
}

impl Default for PendingConfig {
    fn default() -> Self {
        Self {
            ttl: None,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.expand_env_vars()?;

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = match (path_str.strip_prefix('~'), dirs::home_dir()) {
                (Some(rest), Some(home)) => format!("{}{rest}", home.display()),
                _ => path_str.clone(),
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!(path = %expanded, "Loaded env file"),
                    Err(e) => tracing::warn!(path = %expanded, error = %e, "Failed to load env file"),
                }
            } else {
                tracing::debug!(path = %expanded, "Env file not found (skipped)");
            }
        }
    }

    /// Expand `${VAR}` and `${VAR:-default}` in client headers, base URLs and
    /// document URLs
    fn expand_env_vars(&mut self) -> Result<()> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Config(e.to_string()))?;

        for client in &mut self.clients {
            for value in client.headers.values_mut() {
                *value = expand_string(&re, value);
            }
            if let Some(base_url) = &mut client.base_url {
                *base_url = expand_string(&re, base_url);
            }
            if let SchemaSource::Url(url) = &mut client.source {
                *url = expand_string(&re, url);
            }
        }
        Ok(())
    }
}

fn expand_string(re: &Regex, value: &str) -> String {
    re.replace_all(value, |caps: &regex::Captures| {
        let default = caps.get(2).map_or("", |m| m.as_str());
        env::var(&caps[1]).unwrap_or_else(|_| default.to_string())
    })
    .into_owned()
}

/// Durations written as `30s`, `5m`, `2h` or `100ms`; bare numbers are seconds
pub mod duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as whole seconds, e.g. `"30s"`
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize from a string or a bare number of seconds
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the value is not a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => parse(&text).map_err(serde::de::Error::custom),
        }
    }

    pub(crate) fn parse(raw: &str) -> Result<Duration, String> {
        let raw = raw.trim();
        let number = |digits: &str| {
            digits
                .trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid duration '{raw}': {e}"))
        };
        // `ms` before `s`, otherwise "100ms" reads as "100m" + "s".
        if let Some(ms) = raw.strip_suffix("ms") {
            number(ms).map(Duration::from_millis)
        } else if let Some(secs) = raw.strip_suffix('s') {
            number(secs).map(Duration::from_secs)
        } else if let Some(mins) = raw.strip_suffix('m') {
            number(mins).map(|m| Duration::from_secs(m * 60))
        } else if let Some(hours) = raw.strip_suffix('h') {
            number(hours).map(|h| Duration::from_secs(h * 3600))
        } else {
            number(raw).map(Duration::from_secs)
        }
    }

    /// Same format for `Option<Duration>`
    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        /// Serialize `Some` like [`super::serialize`], `None` as null
        ///
        /// # Errors
        ///
        /// Returns a serialization error if the serializer fails.
        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        /// Deserialize null as `None`
        ///
        /// # Errors
        ///
        /// Returns a deserialization error if the value is not a duration.
        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            #[derive(Deserialize)]
            struct Wrapped(#[serde(deserialize_with = "super::deserialize")] Duration);

            Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|Wrapped(d)| d))
        }
    }
}
