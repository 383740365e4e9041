use std::env;
use std::net::IpAddr;

use serde::Deserialize;

use super::ConfigError;
use super::probe_config::ProbeConfig;

/// Layout of the YAML configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Probe settings; unset fields take their defaults.
    pub download: ProbeConfig,

    /// Custom download URL. Replaces the default endpoint when present.
    pub url: Option<String>,

    /// IP literals to probe.
    pub targets: Vec<String>,
}

pub struct AppConfig {
    pub download: ProbeConfig,
    pub targets: Vec<IpAddr>,
}

/// Load the application configuration from a YAML file and environment variables.
///
/// The file is named by `CONFIG_FILE` (default `config.yml`); a missing default file is
/// treated as empty. `PROBE_URL` overrides the custom download URL and `PROBE_TARGETS`
/// (comma separated) overrides the target list.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let explicit = env::var("CONFIG_FILE").ok();
    let location = explicit.clone().unwrap_or_else(|| "config.yml".to_string());

    let file = match std::fs::read_to_string(&location) {
        Ok(contents) => serde_yaml::from_str(&contents)?,
        Err(e) if explicit.is_none() && e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {location} found, using defaults");
            FileConfig::default()
        }
        Err(source) => return Err(ConfigError::Read { path: location, source }),
    };

    let url = env::var("PROBE_URL").ok().or(file.url.clone());
    let targets = env::var("PROBE_TARGETS").ok();

    build_app_config(file, url.as_deref(), targets.as_deref())
}

/// Combine the parsed file with the environment overrides.
pub fn build_app_config(
    file: FileConfig,
    url: Option<&str>,
    targets: Option<&str>,
) -> Result<AppConfig, ConfigError> {
    let mut download = file.download;
    if let Some(url) = url {
        // The URL supplies path and port; explicitly configured names win over its host.
        let mut custom = ProbeConfig::from_custom_url(url)?;
        custom.timeout = download.timeout;
        custom.bytes = download.bytes;
        if !download.sni.is_empty() {
            custom.sni = download.sni;
        }
        if !download.host_name.is_empty() {
            custom.host_name = download.host_name;
        }
        download = custom;
    }

    let raw_targets: Vec<String> = match targets {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        None => file.targets,
    };

    let targets = raw_targets
        .iter()
        .map(|raw| {
            raw.parse::<IpAddr>().map_err(|source| ConfigError::Target {
                target: raw.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!("Probing {} target(s)", targets.len());

    Ok(AppConfig {
        download: download.normalized(),
        targets,
    })
}
