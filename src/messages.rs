//! Payloads exchanged over RabbitMQ and the pointer document read by edges.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployJob {
    pub deployment_id: i32,
    /// Webroot already published; only metadata and activation run.
    #[serde(default)]
    pub skip_webroot_upload: bool,
    #[serde(default)]
    pub skip_invalidation: bool,
    #[serde(default)]
    pub use_raw_bundle: bool,
}

impl DeployJob {
    pub fn new(deployment_id: i32) -> Self {
        Self {
            deployment_id,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildJob {
    pub deployment_id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationMessage {
    pub domains: Vec<String>,
}

/// Public-read `domains/<name>/meta.json`. Never put secrets here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainMeta {
    pub prefix: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force_https: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<String>,
}

/// Decodes a JSON payload, reporting the path of the first offending field.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, String> {
    let de = &mut serde_json::Deserializer::from_slice(payload);
    serde_path_to_error::deserialize(de).map_err(|err| {
        let path = err.path().to_string();
        format!("{} at {}", err.into_inner(), path)
    })
}
