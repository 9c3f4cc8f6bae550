//! Shadow client configuration, loadable from TOML or environment.

use std::fmt;

use rand::Rng;
use serde::Deserialize;

use crate::error::{MqttError, MqttResult};

/// Long-lived IAM credentials used to presign the connection URL.
///
/// Never persisted; the secret is redacted from `Debug` output.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    /// AWS region of the IoT endpoint (e.g., "us-east-1").
    pub region: String,
}

impl Credentials {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: region.into(),
        }
    }

    /// Read `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and `AWS_REGION`
    /// (falling back to `AWS_DEFAULT_REGION`).
    pub fn from_env() -> MqttResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> MqttResult<Self> {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| MqttError::Config(format!("missing environment variable {key}")))
        };

        let access_key = require("AWS_ACCESS_KEY_ID")?;
        let secret_key = require("AWS_SECRET_ACCESS_KEY")?;
        let region = require("AWS_REGION").or_else(|_| require("AWS_DEFAULT_REGION"))?;

        Ok(Self {
            access_key,
            secret_key,
            region,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

/// Everything needed to open one shadow session for one thing.
#[derive(Debug, Clone, Deserialize)]
pub struct ShadowConfig {
    /// AWS IoT data endpoint host (e.g., "a1b2c3-ats.iot.us-east-1.amazonaws.com").
    pub endpoint: String,
    /// Thing whose shadow is synchronized.
    pub thing_name: String,
    /// Prefix for the generated client ID.
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
    /// Explicit client ID; overrides the generated one.
    #[serde(default)]
    pub client_id: Option<String>,
    pub credentials: Credentials,
}

fn default_client_id_prefix() -> String {
    "nouser".to_string()
}

impl ShadowConfig {
    pub fn new(
        endpoint: impl Into<String>,
        thing_name: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            thing_name: thing_name.into(),
            client_id_prefix: default_client_id_prefix(),
            client_id: None,
            credentials,
        }
    }

    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> MqttResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| MqttError::Config(format!("failed to read '{path}': {e}")))?;
        toml::from_str(&contents).map_err(|e| MqttError::Config(format!("{path}: {e}")))
    }

    /// Client ID to connect with: the explicit one, or prefix + 1..=100000.
    ///
    /// The generated form is random on every call; resolve it once per
    /// connection.
    pub fn resolve_client_id(&self) -> String {
        match &self.client_id {
            Some(id) => id.clone(),
            None => {
                let suffix: u32 = rand::thread_rng().gen_range(1..=100_000);
                format!("{}{suffix}", self.client_id_prefix)
            }
        }
    }
}
