use crate::config::{ConfiguratorConfig, RuntimeConfig};
use thiserror::Error;
use tracing::info;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfiguratorError {
    #[error("url: {0}")]
    Url(#[from] url::ParseError),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
}

/// Fetches the runtime configuration blob from the configurator service.
#[derive(Debug, Clone)]
pub struct Configurator {
    client: reqwest::Client,
    endpoint: Url,
}

impl Configurator {
    pub fn new(config: &ConfiguratorConfig) -> Result<Self, ConfiguratorError> {
        let endpoint = Url::parse(&format!(
            "{}/{}/{}",
            config.base_url.trim_end_matches('/'),
            config.exchange_id,
            config.instance
        ))?;

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
        })
    }

    /// Fetch the full (not incremental) runtime configuration.
    pub async fn fetch(&self) -> Result<RuntimeConfig, ConfiguratorError> {
        info!(endpoint = %self.endpoint, "fetching runtime config");

        let config = self
            .client
            .get(self.endpoint.clone())
            .query(&[("only_new", "false")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_exchange_and_instance() {
        let configurator = Configurator::new(&ConfiguratorConfig {
            base_url: "http://configurator:8000/".to_owned(),
            exchange_id: "exmo".to_owned(),
            instance: "1".to_owned(),
        })
        .unwrap();

        assert_eq!(
            configurator.endpoint.as_str(),
            "http://configurator:8000/exmo/1"
        );
    }
}
