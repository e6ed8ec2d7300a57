use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Parser;
use config::{builder::DefaultState, ConfigBuilder, ConfigError, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

const DEFAULT_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_REQUEST_TIMEOUT_SECS: i64 = 10;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Path to the local configuration TOML file.
    #[arg(short, value_name = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Path to the certificate file.
    #[arg(long, value_name = "CERT_PATH", requires = "key")]
    pub cert: Option<PathBuf>,

    /// Path to the key file.
    #[arg(long, value_name = "KEY_PATH", requires = "cert")]
    pub key: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Web {
    #[serde(deserialize_with = "deserialize_socket_addr")]
    pub address: SocketAddr,
    /// Longest a request may spend in the store before it answers 503.
    pub request_timeout_secs: u64,
}

impl Web {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Store {
    pub path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Log {
    /// A `tracing` filter directive. `RUST_LOG` takes precedence.
    pub filter: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Settings {
    pub web: Web,
    pub database: Store,
    pub log: Log,
}

impl Settings {
    /// Loads settings from the optional TOML file, then from `ESTATE_*`
    /// environment variables such as `ESTATE_WEB__ADDRESS`, over built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::builder(path)?
            .add_source(
                Environment::with_prefix("ESTATE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    /// Load settings from the given TOML file, with sane defaults.
    #[cfg(test)]
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::builder(Some(path))?.build()?.try_deserialize()
    }

    fn builder(path: Option<&Path>) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let db_path = default_db_path();
        let builder = ConfigBuilder::<DefaultState>::default()
            .set_default("web.address", DEFAULT_ADDR)?
            .set_default("web.request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS)?
            .set_default("database.path", db_path.to_string_lossy().into_owned())?
            .set_default("log.filter", DEFAULT_LOG_FILTER)?;
        Ok(match path {
            Some(path) => builder.add_source(File::from(path)),
            None => builder,
        })
    }
}

fn default_db_path() -> PathBuf {
    ProjectDirs::from("", "", "estate-listing-server")
        .map_or_else(|| PathBuf::from("db"), |dirs| dirs.data_dir().join("db"))
}

fn deserialize_socket_addr<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let file = config_file("[web]\naddress = \"0.0.0.0:9000\"\n");
        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.web.address, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(settings.web.request_timeout(), Duration::from_secs(10));
        assert_eq!(settings.log.filter, "info");
        assert!(settings.database.path.ends_with("db"));
    }

    #[test]
    fn file_overrides_every_section() {
        let file = config_file(
            r#"
            [web]
            address = "127.0.0.1:8443"
            request_timeout_secs = 3

            [database]
            path = "/var/lib/estate/db"

            [log]
            filter = "estate_listing_server=debug,warp=info"
            "#,
        );
        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.web.address.port(), 8443);
        assert_eq!(settings.web.request_timeout_secs, 3);
        assert_eq!(settings.database.path, PathBuf::from("/var/lib/estate/db"));
        assert_eq!(settings.log.filter, "estate_listing_server=debug,warp=info");
    }

    #[test]
    fn bad_address_is_rejected() {
        let file = config_file("[web]\naddress = \"localhost\"\n");
        assert!(Settings::from_file(file.path()).is_err());
    }

    #[test]
    fn cert_and_key_come_together() {
        assert!(Args::try_parse_from(["server", "--cert", "cert.pem"]).is_err());
        let args =
            Args::try_parse_from(["server", "-c", "app.toml", "--cert", "c.pem", "--key", "k.pem"])
                .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("app.toml")));
        assert_eq!(args.key, Some(PathBuf::from("k.pem")));
    }
}
