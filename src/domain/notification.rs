use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Location resolved for a login IP.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geolocation {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub region_name: String,
    #[serde(default)]
    pub country: String,
}

impl Geolocation {
    pub fn local_network() -> Self {
        Self {
            status: Some("success".to_string()),
            message: None,
            city: "Local".to_string(),
            region_name: "Network".to_string(),
            country: "Local Network".to_string(),
        }
    }

    pub fn formatted(&self) -> String {
        [&self.city, &self.region_name, &self.country]
            .into_iter()
            .filter(|part| !part.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Failure of a best-effort collaborator (mail, geolocation).
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("geolocation lookup failed: {0}")]
    Lookup(String),
}
