use std::{fmt, str::FromStr};

use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A transport endpoint an edge node or host can connect to
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

impl Endpoint {
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: None,
        }
    }

    pub fn with_credentials<S: Into<String>, S1: Into<String>>(
        mut self,
        username: S,
        password: S1,
    ) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}:{}", self.host, self.port)
    }
}

/// Parses `tcp://host:port` or `host:port`
impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let address = s.strip_prefix("tcp://").unwrap_or(s);
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| format!("endpoint {s} has no port"))?;
        if host.is_empty() {
            return Err(format!("endpoint {s} has no host"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("endpoint {s} has an invalid port: {e}"))?;
        Ok(Endpoint::new(host, port))
    }
}

/// A round robin list of endpoints
#[derive(Clone, Debug)]
pub struct EndpointRing {
    endpoints: Vec<Endpoint>,
    cursor: usize,
}

impl EndpointRing {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints,
            cursor: 0,
        }
    }

    pub fn current(&self) -> Option<&Endpoint> {
        self.endpoints.get(self.cursor)
    }

    /// Move to the next endpoint, wrapping to the first after the last
    pub fn advance(&mut self) -> Option<&Endpoint> {
        if self.endpoints.is_empty() {
            return None;
        }
        self.cursor = (self.cursor + 1) % self.endpoints.len();
        self.current()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_endpoint() {
        assert_eq!(
            "tcp://localhost:1883".parse::<Endpoint>(),
            Ok(Endpoint::new("localhost", 1883))
        );
        assert_eq!("broker:8883".parse::<Endpoint>(), Ok(Endpoint::new("broker", 8883)));
        assert!("tcp://localhost".parse::<Endpoint>().is_err());
        assert!("tcp://:1883".parse::<Endpoint>().is_err());
        assert!("tcp://localhost:port".parse::<Endpoint>().is_err());
    }

    #[test]
    fn ring_round_robin() {
        let mut ring = EndpointRing::new(vec![Endpoint::new("a", 1), Endpoint::new("b", 2)]);
        assert_eq!(ring.current().map(|e| e.host.as_str()), Some("a"));
        assert_eq!(ring.advance().map(|e| e.host.as_str()), Some("b"));
        assert_eq!(ring.advance().map(|e| e.host.as_str()), Some("a"));
        assert!(EndpointRing::new(vec![]).advance().is_none());
    }
}
