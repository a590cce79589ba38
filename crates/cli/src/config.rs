//! `quarry.toml` loading and secret resolution.
//!
//! The file holds only non-secret settings. Every API key is named by an
//! environment variable (`*_env` fields) and resolved at startup; a missing
//! secret is a [`ConfigError`] before any job runs.
//!
//! ```toml
//! [llm]
//! base_url = "https://api.openai.com/v1"
//! model = "gpt-4o"
//! reformat_model = "gpt-4o-mini"
//!
//! [search]
//! api_keys_env = "TAVILY_API_KEYS"   # comma-separated rotation pool
//!
//! [research]
//! keyword_count = 5
//!
//! [telemetry]
//! format = "json"
//! otlp_endpoint = "http://localhost:4317"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pipeline::{Credential, ResearchError, ResearchSettings};
use serde::Deserialize;
use thiserror::Error;

/// Config file read when `--config` is not given. Its absence is not an error.
pub const DEFAULT_CONFIG_FILE: &str = "quarry.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("environment variable {var} is not set (required by {setting})")]
    MissingSecret { var: String, setting: &'static str },

    #[error(transparent)]
    Research(#[from] ResearchError),
}

// ---------------------------------------------------------------------------
// File sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub search: SearchSection,
    pub documents: DocumentsSection,
    pub reader: ReaderSection,
    pub conversion: ConversionSection,
    pub research: ResearchSettings,
    pub telemetry: TelemetrySection,
    pub server: ServerSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmSection {
    pub base_url: String,
    pub model: String,
    /// Model for reformat recovery; the primary model when unset.
    pub reformat_model: Option<String>,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o".into(),
            reformat_model: None,
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_secs: 120,
        }
    }
}

impl LlmSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchSection {
    pub endpoint: String,
    pub max_results: usize,
    /// Variable holding a comma-separated list of keys.
    pub api_keys_env: String,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            endpoint: providers::tavily::DEFAULT_ENDPOINT.into(),
            max_results: 5,
            api_keys_env: "TAVILY_API_KEYS".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocumentsSection {
    pub endpoint: String,
    pub api_key_env: String,
    pub engine_id_env: String,
}

impl Default for DocumentsSection {
    fn default() -> Self {
        Self {
            endpoint: providers::google::DEFAULT_ENDPOINT.into(),
            api_key_env: "GOOGLE_API_KEY".into(),
            engine_id_env: "GOOGLE_CSE_ID".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReaderSection {
    pub enabled: bool,
    pub endpoint: String,
    /// Optional; the reader is called anonymously when the variable is unset.
    pub api_key_env: String,
}

impl Default for ReaderSection {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: providers::reader::DEFAULT_ENDPOINT.into(),
            api_key_env: "JINA_API_KEY".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConversionSection {
    /// Timeout for document downloads and reader calls.
    pub timeout_secs: u64,
    /// Directory for temporary PDF files; the OS temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ConversionSection {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            scratch_dir: None,
        }
    }
}

impl ConversionSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetrySection {
    /// Used when `RUST_LOG` is unset.
    pub filter: String,
    pub format: LogFormat,
    /// OTLP gRPC collector; spans are not exported when unset.
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            format: LogFormat::Pretty,
            otlp_endpoint: None,
            service_name: "quarry".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub bind: SocketAddr,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Loads `path`, or [`DEFAULT_CONFIG_FILE`] if it exists, or the defaults.
    ///
    /// # Errors
    ///
    /// Fails if an explicitly named file is unreadable, if any file is not
    /// valid TOML for [`AppConfig`], or if the research settings are invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.research.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolves every secret the configured services need through `lookup`
    /// (normally [`std::env::var`]).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSecret`] for the first required variable
    /// that is unset or blank.
    pub fn resolve_secrets(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Secrets, ConfigError> {
        let require = |var: &str, setting: &'static str| {
            lookup(var)
                .and_then(Credential::new)
                .ok_or_else(|| ConfigError::MissingSecret {
                    var: var.to_string(),
                    setting,
                })
        };

        let search_keys = require(&self.search.api_keys_env, "search.api_keys_env")?
            .expose()
            .split(',')
            .filter_map(Credential::new)
            .collect();

        Ok(Secrets {
            llm_api_key: require(&self.llm.api_key_env, "llm.api_key_env")?,
            search_keys,
            documents_api_key: require(&self.documents.api_key_env, "documents.api_key_env")?,
            documents_engine_id: require(&self.documents.engine_id_env, "documents.engine_id_env")?
                .expose()
                .to_string(),
            reader_api_key: lookup(&self.reader.api_key_env).and_then(Credential::new),
        })
    }
}

/// Secrets resolved from the environment.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub llm_api_key: Credential,
    /// Rotation pool for the search provider, in configured order.
    pub search_keys: Vec<Credential>,
    pub documents_api_key: Credential,
    pub documents_engine_id: String,
    pub reader_api_key: Option<Credential>,
}
