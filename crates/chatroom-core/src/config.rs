//! Configuration management
//!
//! The gateway is configured from a single TOML file. Backend models are
//! declared as an ordered `[[model]]` array; the router scans models and
//! their word lists in exactly the order they appear in the file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// A single backend model: endpoint credentials plus the vocabulary that
/// selects it. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ModelSpec {
    /// Model name, used in switch confirmations and logs
    pub name: String,

    /// API key for the backend
    pub api_key: String,

    /// Backend base URL (e.g. `https://api.dify.ai/v1`)
    pub base_url: String,

    /// Trigger words: fallback keywords matched anywhere in the text
    #[serde(default)]
    pub trigger_words: Vec<String>,

    /// Wake words: prefix/standalone tokens that address the bot directly
    #[serde(default)]
    pub wakeup_words: Vec<String>,

    /// Point cost per request
    #[serde(default)]
    pub price: i64,
}

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Master switch
    #[serde(default = "default_enable")]
    pub enable: bool,

    /// Name of the model used when nothing in the text selects one
    pub default_model: String,

    /// Command prefixes that address the bot (e.g. "ai")
    #[serde(default)]
    pub commands: Vec<String>,

    /// Names the bot is @-mentioned by in group chats
    #[serde(default)]
    pub robot_names: Vec<String>,

    /// Remember a per-user sticky model across messages
    #[serde(default = "default_true")]
    pub remember_user_model: bool,

    /// Enable the chat-room session layer in group chats
    #[serde(default = "default_true")]
    pub chatroom_enable: bool,

    /// Admin user ids, exempt from the point check when `admin-ignore` is on
    #[serde(default)]
    pub admins: Vec<String>,

    /// Skip the point check for admins
    #[serde(default = "default_true")]
    pub admin_ignore: bool,

    /// Skip the point check for whitelisted users
    #[serde(default = "default_true")]
    pub whitelist_ignore: bool,

    /// Optional HTTP proxy for backend calls
    #[serde(default)]
    pub http_proxy: Option<String>,

    /// Backend models, in routing order
    #[serde(default, rename = "model")]
    pub models: Vec<ModelSpec>,
}

fn default_enable() -> bool {
    true
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(Error::Config("no [[model]] entries configured".to_string()));
        }
        if !self.models.iter().any(|m| m.name == self.default_model) {
            return Err(Error::Config(format!(
                "default-model '{}' is not a configured model",
                self.default_model
            )));
        }
        Ok(())
    }

    /// The configured default model
    pub fn default_model_spec(&self) -> &ModelSpec {
        // validate() guarantees the name resolves
        self.models
            .iter()
            .find(|m| m.name == self.default_model)
            .unwrap_or(&self.models[0])
    }

    /// Whether the user is an admin
    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admins.iter().any(|a| a == user_id)
    }
}
