use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 19932;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read node config {}: {source}", .path.display())]
    MissingFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("node config {} has no `{key}` entry", .path.display())]
    MissingKey { path: PathBuf, key: &'static str },

    #[error("invalid rpcport `{0}`")]
    InvalidPort(String),
}

/// Connection parameters for the node's RPC endpoint, read from `pastel.conf`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Every other `key=value` entry of the file, kept verbatim.
    pub other: HashMap<String, String>,
}

impl NodeSettings {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::MissingFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut host = DEFAULT_RPC_HOST.to_string();
        let mut port = None;
        let mut user = None;
        let mut password = None;
        let mut other = HashMap::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim().to_string());
            match key {
                "rpchost" => host = value,
                "rpcport" => port = Some(value),
                "rpcuser" => user = Some(value),
                "rpcpassword" => password = Some(value),
                _ => {
                    other.insert(key.to_string(), value);
                }
            }
        }

        let port = match port {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidPort(raw))?,
            None => DEFAULT_RPC_PORT,
        };
        let missing = |key: &'static str| ConfigError::MissingKey {
            path: path.to_path_buf(),
            key,
        };

        let settings = Self {
            host,
            port,
            user: user.ok_or_else(|| missing("rpcuser"))?,
            password: password.ok_or_else(|| missing("rpcpassword"))?,
            other,
        };
        debug!(
            "Node RPC at {}:{} ({} extra flags)",
            settings.host,
            settings.port,
            settings.other.len()
        );
        Ok(settings)
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<NodeSettings, ConfigError> {
        NodeSettings::parse(content, Path::new("pastel.conf"))
    }

    #[test]
    fn parses_credentials_and_keeps_other_flags() {
        let settings = parse(
            "# comment\n\
             rpcuser = alice \n\
             rpcpassword=s3cr=t\n\
             \n\
             txindex=1\n\
             testnet=1\n",
        )
        .unwrap();

        assert_eq!(settings.user, "alice");
        // only the first '=' separates key and value
        assert_eq!(settings.password, "s3cr=t");
        assert_eq!(settings.host, DEFAULT_RPC_HOST);
        assert_eq!(settings.port, DEFAULT_RPC_PORT);
        assert_eq!(settings.other.get("txindex").map(String::as_str), Some("1"));
        assert_eq!(settings.other.len(), 2);
        assert_eq!(settings.endpoint(), "http://127.0.0.1:19932/");
    }

    #[test]
    fn host_and_port_override_defaults() {
        let settings = parse("rpcuser=u\nrpcpassword=p\nrpchost=10.0.0.5\nrpcport=9932\n").unwrap();
        assert_eq!(settings.host, "10.0.0.5");
        assert_eq!(settings.port, 9932);
    }

    #[test]
    fn missing_password_is_rejected() {
        let err = parse("rpcuser=u\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { key: "rpcpassword", .. }));
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = parse("rpcuser=u\nrpcpassword=p\nrpcport=abc\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort(p) if p == "abc"));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = NodeSettings::from_file("/nonexistent/pastel.conf").unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile { .. }));
    }
}
