use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// HTTP endpoint a search server listens on and advertises to its peers.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct ServerEndpoint {
    host: String,
    port: u16,
}

impl ServerEndpoint {
    /// Builds an endpoint from its host and port.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or address advertised to peers.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Listening port handed to the server.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL under which the server exposes its cores.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{self}/solr/")
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "http://{}:{}", self.host, self.port)
    }
}

impl FromStr for ServerEndpoint {
    type Err = EndpointParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        if url.scheme() != "http" {
            return Err(EndpointParseError::UnsupportedScheme(
                url.scheme().to_owned(),
            ));
        }
        let host = url
            .host_str()
            .ok_or_else(|| EndpointParseError::MissingHost(input.to_owned()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| EndpointParseError::MissingPort(input.to_owned()))?;
        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for ServerEndpoint {
    type Error = EndpointParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServerEndpoint> for String {
    fn from(endpoint: ServerEndpoint) -> Self {
        endpoint.to_string()
    }
}

/// Errors encountered while parsing a [`ServerEndpoint`] from text.
#[derive(Debug, Error)]
pub enum EndpointParseError {
    /// Scheme was not `http`.
    #[error("unsupported endpoint scheme '{0}'")]
    UnsupportedScheme(String),
    /// Host name was missing.
    #[error("missing host in '{0}'")]
    MissingHost(String),
    /// Port was missing from the address.
    #[error("missing port in '{0}'")]
    MissingPort(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_http_url() {
        let endpoint = ServerEndpoint::new("10.0.0.4", 8080);
        assert_eq!(endpoint.to_string(), "http://10.0.0.4:8080");
        assert_eq!(endpoint.base_url(), "http://10.0.0.4:8080/solr/");
    }

    #[test]
    fn parse_http_endpoint() {
        let endpoint: ServerEndpoint = "http://replica.local:8983".parse().expect("parses");
        assert_eq!(endpoint.host(), "replica.local");
        assert_eq!(endpoint.port(), 8983);
    }

    #[test]
    fn parse_defaults_to_http_port() {
        let endpoint: ServerEndpoint = "http://replica.local".parse().expect("parses");
        assert_eq!(endpoint.port(), 80);
    }

    #[test]
    fn serde_round_trips_through_url_text() {
        let endpoint = ServerEndpoint::new("10.1.2.3", 9000);
        let text: String = endpoint.clone().into();
        assert_eq!(ServerEndpoint::try_from(text).expect("parses"), endpoint);
    }

    #[test]
    fn parse_rejects_other_schemes() {
        let error = "tcp://127.0.0.1:9000"
            .parse::<ServerEndpoint>()
            .expect_err("scheme must be http");
        assert!(matches!(error, EndpointParseError::UnsupportedScheme(_)));
    }
}
