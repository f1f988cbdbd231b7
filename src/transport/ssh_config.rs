//! SSH host alias resolution.
//!
//! Remote connection parameters come either from an alias in the user's OpenSSH client
//! configuration or from an explicit `user@host` plus key path. A missing `HostName` or
//! `IdentityFile` for an alias is an error; only the port (22) and the user (current OS user)
//! have defaults.

use async_trait::async_trait;
use std::path::PathBuf;

use super::SshEndpoint;

const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, thiserror::Error)]
pub enum ConfigResolutionError {
    #[error("cannot read ssh config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{field} not found for host alias '{alias}'")]
    MissingField { alias: String, field: &'static str },
    #[error("invalid port '{value}' for host alias '{alias}'")]
    InvalidPort { alias: String, value: String },
    #[error("invalid user@host '{0}'")]
    InvalidUserHost(String),
}

/// Raw settings for one alias, as found in the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshHostConfig {
    pub hostname: Option<String>,
    pub user: Option<String>,
    pub identity_file: Option<String>,
    pub port: Option<String>,
}

impl SshHostConfig {
    pub fn into_endpoint(self, alias: &str) -> Result<SshEndpoint, ConfigResolutionError> {
        let missing = |field| ConfigResolutionError::MissingField {
            alias: alias.to_string(),
            field,
        };
        let host = self
            .hostname
            .filter(|h| !h.is_empty())
            .map(|h| h.replace("%h", alias))
            .ok_or_else(|| missing("HostName"))?;
        let identity_file = self
            .identity_file
            .filter(|p| !p.is_empty())
            .map(|p| expand_path(&p))
            .ok_or_else(|| missing("IdentityFile"))?;
        let port = match self.port {
            None => DEFAULT_SSH_PORT,
            Some(value) => value
                .parse::<u16>()
                .ok()
                .filter(|p| *p > 0)
                .ok_or(ConfigResolutionError::InvalidPort {
                    alias: alias.to_string(),
                    value,
                })?,
        };
        let user = match self.user.filter(|u| !u.is_empty()) {
            Some(user) => user,
            None => current_os_user().ok_or_else(|| missing("User"))?,
        };
        Ok(SshEndpoint {
            host,
            port,
            user,
            identity_file,
        })
    }
}

/// Source of alias settings (the user's ssh config file in production).
#[async_trait]
pub trait SshConfigLookup: Send + Sync {
    async fn lookup(&self, alias: &str) -> Result<SshHostConfig, ConfigResolutionError>;
}

/// Resolve an alias to a ready-to-dial endpoint.
pub async fn resolve_alias(
    lookup: &dyn SshConfigLookup,
    alias: &str,
) -> Result<SshEndpoint, ConfigResolutionError> {
    let endpoint = lookup.lookup(alias).await?.into_endpoint(alias)?;
    tracing::debug!(alias, endpoint = %endpoint, "resolved ssh alias");
    Ok(endpoint)
}

/// Endpoint from an explicit `user@host` and key path.
pub fn parse_user_host(
    user_host: &str,
    key_path: &str,
) -> Result<SshEndpoint, ConfigResolutionError> {
    let invalid = || ConfigResolutionError::InvalidUserHost(user_host.to_string());
    let (user, host) = user_host.split_once('@').ok_or_else(invalid)?;
    if user.is_empty() || host.is_empty() || host.contains('@') {
        return Err(invalid());
    }
    Ok(SshEndpoint {
        host: host.to_string(),
        port: DEFAULT_SSH_PORT,
        user: user.to_string(),
        identity_file: expand_path(key_path),
    })
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn current_os_user() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .ok()
        .filter(|u| !u.is_empty())
}

/// OpenSSH client configuration file (`~/.ssh/config`).
pub struct SshConfigFile {
    path: String,
}

impl SshConfigFile {
    pub fn new(path: &str) -> Self {
        Self {
            path: shellexpand::tilde(path).into_owned(),
        }
    }
}

#[async_trait]
impl SshConfigLookup for SshConfigFile {
    async fn lookup(&self, alias: &str) -> Result<SshHostConfig, ConfigResolutionError> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|source| {
            ConfigResolutionError::Read {
                path: self.path.clone(),
                source,
            }
        })?;
        Ok(parse_host_config(&text, alias))
    }
}

/// Collect the settings that apply to `alias`. First obtained value wins, as in OpenSSH.
pub fn parse_host_config(text: &str, alias: &str) -> SshHostConfig {
    let mut out = SshHostConfig::default();
    // Settings before the first Host line apply to every host.
    let mut active = true;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((keyword, value)) = split_keyword(line) else {
            continue;
        };
        match keyword.to_ascii_lowercase().as_str() {
            "host" => active = host_patterns_match(value, alias),
            // Match criteria are not evaluated; their blocks never apply.
            "match" => active = false,
            "hostname" if active => set_once(&mut out.hostname, value),
            "user" if active => set_once(&mut out.user, value),
            "identityfile" if active => set_once(&mut out.identity_file, value),
            "port" if active => set_once(&mut out.port, value),
            _ => {}
        }
    }
    out
}

fn set_once(slot: &mut Option<String>, value: &str) {
    if slot.is_none() {
        *slot = Some(unquote(value).to_string());
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// "Keyword value", "Keyword=value" or "Keyword = value".
fn split_keyword(line: &str) -> Option<(&str, &str)> {
    let end = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let (keyword, rest) = line.split_at(end);
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest).trim();
    if keyword.is_empty() || rest.is_empty() {
        return None;
    }
    Some((keyword, rest))
}

fn host_patterns_match(patterns: &str, alias: &str) -> bool {
    let mut matched = false;
    for pattern in patterns.split_whitespace().map(unquote) {
        if let Some(negated) = pattern.strip_prefix('!') {
            if glob_match(negated.as_bytes(), alias.as_bytes()) {
                return false;
            }
        } else if glob_match(pattern.as_bytes(), alias.as_bytes()) {
            matched = true;
        }
    }
    matched
}

/// `*` and `?` wildcards, case-sensitive like OpenSSH host patterns.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == b'*')
}
