use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::models::ticket::FieldOptions;

/// Environment variable the original deployment used for the client certificate.
const LEGACY_CERT_ENV: &str = "CT3CERTPATH";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub jira: JiraConfig,
    pub transport: TransportConfig,
    pub custom_fields: CustomFields,
    pub time: TimeOptions,
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JiraConfig {
    pub scheme: String,
    pub server: String,
    pub api_path: String,
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            server: "jira.example.com".to_string(),
            api_path: "/rest/api/2/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// PEM file holding both the client certificate and its private key
    pub cert_path: Option<PathBuf>,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            cert_path: None,
            user_agent: format!("commstool/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Jira custom field ids for the incident-only values.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CustomFields {
    pub incident_priority: String,
    pub incident_start_time: String,
    pub incident_end_time: String,
}

impl Default for CustomFields {
    fn default() -> Self {
        Self {
            incident_priority: "customfield_10351".to_string(),
            incident_start_time: "customfield_10052".to_string(),
            incident_end_time: "customfield_10053".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeOptions {
    pub jira_datetime_format: String,
}

impl Default for TimeOptions {
    fn default() -> Self {
        Self {
            jira_datetime_format: "%Y-%m-%dT%H:%M:%S%.f%z".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EmailConfig {
    pub default_sender: String,
    pub default_recipients: Vec<String>,
    pub template_path: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            default_sender: "operations@example.com".to_string(),
            default_recipients: Vec::new(),
            template_path: None,
            output_dir: PathBuf::from("."),
        }
    }
}

impl Settings {
    /// Loads built-in defaults, then `~/.commstool/config.toml` if present,
    /// then `COMMSTOOL_*` environment variables.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("COMMSTOOL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("email.default_recipients"),
            );

        let mut settings: Settings = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        if let Ok(cert) = std::env::var(LEGACY_CERT_ENV) {
            if !cert.is_empty() {
                settings.transport.cert_path = Some(PathBuf::from(cert));
            }
        }

        Ok(settings)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let config_str = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(config_path, config_str)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Base locator every ticket fetch is built from, e.g. `https://host/rest/api/2/`.
    pub fn api_base(&self) -> Result<Url> {
        let mut path = self.jira.api_path.clone();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        if !path.ends_with('/') {
            path.push('/');
        }

        let raw = format!("{}://{}{}", self.jira.scheme, self.jira.server, path);
        Url::parse(&raw).with_context(|| format!("Invalid Jira API base URL '{}'", raw))
    }

    pub fn field_options(&self) -> FieldOptions {
        FieldOptions {
            priority_field: self.custom_fields.incident_priority.clone(),
            start_time_field: self.custom_fields.incident_start_time.clone(),
            end_time_field: self.custom_fields.incident_end_time.clone(),
            datetime_format: self.time.jira_datetime_format.clone(),
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".commstool"))
    }
}
