//! Registry credentials from the Docker client configuration.
//!
//! Reads `config.json` from `$DOCKER_CONFIG` (or `~/.docker`) and picks the
//! `auths` entry matching the image's registry. Credential helpers are not
//! consulted.

use crate::reference::{ImageReference, DEFAULT_REGISTRY, DOCKER_HUB_AUTH_SERVER};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bollard::auth::DockerCredentials;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_FILE: &str = "config.json";

/// Errors from reading registry credentials.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The config file exists but could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An `auth` field is not base64 `user:password`
    #[error("invalid auth entry for {server}: {reason}")]
    InvalidAuth { server: String, reason: String },
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    identitytoken: Option<String>,
    #[serde(default)]
    registrytoken: Option<String>,
}

/// Directory holding the Docker client configuration.
pub fn default_config_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("DOCKER_CONFIG").filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".docker"))
}

/// Look up credentials for `image` in `config_dir/config.json`.
///
/// A missing config file or a registry with no entry yields `Ok(None)`, an
/// anonymous pull.
pub fn resolve_credentials(
    config_dir: &Path,
    image: &ImageReference,
) -> Result<Option<DockerCredentials>, AuthError> {
    let path = config_dir.join(CONFIG_FILE);
    let raw = match std::fs::read(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(AuthError::Read { path, source }),
    };
    let config: ConfigFile =
        serde_json::from_slice(&raw).map_err(|source| AuthError::Parse { path, source })?;

    let server = image.auth_server();
    let Some((key, entry)) = find_entry(&config.auths, image.registry()) else {
        tracing::debug!(registry = %image.registry(), "No stored credentials for registry");
        return Ok(None);
    };
    tracing::debug!(registry = %image.registry(), entry = %key, "Using stored registry credentials");

    let (mut username, mut password) = (entry.username.clone(), entry.password.clone());
    if let Some(auth) = entry.auth.as_deref().filter(|a| !a.is_empty()) {
        let (user, pass) = decode_auth(auth).map_err(|reason| AuthError::InvalidAuth {
            server: key.to_string(),
            reason,
        })?;
        username = Some(user);
        password = Some(pass);
    }

    Ok(Some(DockerCredentials {
        username,
        password,
        identitytoken: entry.identitytoken.clone(),
        registrytoken: entry.registrytoken.clone(),
        serveraddress: Some(server.to_string()),
        ..Default::default()
    }))
}

/// Find the `auths` entry for a registry, tolerating scheme and path
/// variations in the stored keys.
fn find_entry<'a>(
    auths: &'a HashMap<String, AuthEntry>,
    registry: &str,
) -> Option<(&'a str, &'a AuthEntry)> {
    let wanted = if registry == DEFAULT_REGISTRY {
        "index.docker.io"
    } else {
        registry
    };
    if registry == DEFAULT_REGISTRY {
        if let Some((key, entry)) = auths.get_key_value(DOCKER_HUB_AUTH_SERVER) {
            return Some((key.as_str(), entry));
        }
    }
    auths
        .iter()
        .filter(|(key, _)| {
            let host = host_of(key);
            host == wanted || (registry == DEFAULT_REGISTRY && host == DEFAULT_REGISTRY)
        })
        .min_by_key(|(key, _)| key.as_str())
        .map(|(key, entry)| (key.as_str(), entry))
}

fn host_of(key: &str) -> &str {
    let key = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    key.split('/').next().unwrap_or(key)
}

fn decode_auth(auth: &str) -> Result<(String, String), String> {
    let decoded = STANDARD.decode(auth.trim()).map_err(|e| e.to_string())?;
    let decoded = String::from_utf8(decoded).map_err(|e| e.to_string())?;
    let (user, pass) = decoded
        .split_once(':')
        .ok_or_else(|| "expected user:password".to_string())?;
    Ok((user.to_string(), pass.trim_end_matches('\0').to_string()))
}
