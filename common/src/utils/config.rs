use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Memory,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

/// Which parts of the service a process runs.
#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Extract,
    Web,
    Both,
}

fn default_mode() -> Mode {
    Mode::Both
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    /// Path to the extraction plan, or a direct URL when prefixed with `@`.
    #[serde(default = "default_config_path")]
    pub config_path: String,
    /// GitHub repository whose default-branch `config.yaml` holds the plan.
    #[serde(default)]
    pub config_repo: Option<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Path prefix when serving behind a reverse proxy, e.g. `/extractor`.
    #[serde(default)]
    pub proxy_path: String,
    #[serde(default = "default_mode")]
    pub mode: Mode,
    /// Pass `--platform linux/amd64` to docker pull/create. Disable for
    /// daemons that reject the platform parameter.
    #[serde(default = "default_platform_support")]
    pub docker_platform_support: bool,
    #[serde(default = "default_docker_timeout")]
    pub docker_timeout_secs: u64,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
}

fn default_config_path() -> String {
    "config.yaml".to_string()
}

fn default_data_dir() -> String {
    "./extracted_binaries".to_string()
}

fn default_poll_interval() -> u64 {
    60
}

fn default_http_port() -> u16 {
    5050
}

fn default_platform_support() -> bool {
    true
}

fn default_docker_timeout() -> u64 {
    300
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("settings").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            config_repo: None,
            data_dir: default_data_dir(),
            poll_interval_secs: default_poll_interval(),
            http_port: default_http_port(),
            proxy_path: String::new(),
            mode: default_mode(),
            docker_platform_support: default_platform_support(),
            docker_timeout_secs: default_docker_timeout(),
            storage: default_storage_kind(),
        }
    }
}
