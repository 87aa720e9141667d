use crate::domain::notification::{Geolocation, NotifyError};
use crate::domain::ports::Geolocator;
use async_trait::async_trait;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Resolves IPs against an ip-api compatible endpoint.
///
/// `url_template` must contain `{ip}`; a configured token is appended as the
/// `token` query parameter.
pub struct HttpGeolocator {
    client: reqwest::Client,
    url_template: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpGeolocator {
    pub fn new(url_template: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url_template: url_template.into(),
            token,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url_for(&self, ip: &str) -> String {
        self.url_template.replace("{ip}", ip)
    }
}

#[async_trait]
impl Geolocator for HttpGeolocator {
    async fn locate(&self, ip: &str) -> Result<Geolocation, NotifyError> {
        let mut request = self.client.get(self.url_for(ip)).timeout(self.timeout);
        if let Some(token) = &self.token {
            request = request.query(&[("token", token.trim())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::Lookup(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NotifyError::Lookup(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        let location: Geolocation = response
            .json()
            .await
            .map_err(|e| NotifyError::Lookup(e.to_string()))?;

        if location.status.as_deref() == Some("fail") {
            return Err(NotifyError::Lookup(
                location
                    .message
                    .unwrap_or_else(|| "lookup failed".to_string()),
            ));
        }
        Ok(location)
    }
}
