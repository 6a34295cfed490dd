//! OpenStack connection configuration
//!
//! Settings come from three layers: built-in defaults, an optional
//! `clouds.yaml` entry, and explicit overrides (CLI flags or `OS_*`
//! environment variables), applied in that order.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

// =============================================================================
// Endpoint Interface
// =============================================================================

/// Catalog endpoint interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interface {
    #[default]
    Public,
    Internal,
    Admin,
}

impl Interface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interface::Public => "public",
            Interface::Internal => "internal",
            Interface::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Interface {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().trim_end_matches("url") {
            "public" => Ok(Interface::Public),
            "internal" => Ok(Interface::Internal),
            "admin" => Ok(Interface::Admin),
            _ => Err(Error::Configuration(format!(
                "Invalid endpoint interface: {}. Use 'public', 'internal', or 'admin'",
                s
            ))),
        }
    }
}

// =============================================================================
// Authentication Method
// =============================================================================

/// How the provider authenticates against Keystone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Username and password, scoped to a project
    Password {
        username: String,
        password: String,
        user_domain_name: String,
        project_name: String,
        project_domain_name: String,
    },
    /// Existing token, rescoped to a project
    Token {
        token: String,
        project_name: String,
        project_domain_name: String,
    },
    /// Application credential (already project scoped)
    ApplicationCredential { id: String, secret: String },
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the OpenStack connection
#[derive(Debug, Clone)]
pub struct OpenStackConfig {
    /// Keystone auth URL
    pub auth_url: String,
    /// Username
    pub username: String,
    /// Password
    pub password: String,
    /// Project name
    pub project_name: String,
    /// User domain name
    pub user_domain_name: String,
    /// Project domain name
    pub project_domain_name: String,
    /// Default region name
    pub region: String,
    /// Pre-issued token
    pub token: Option<String>,
    /// Application credential id
    pub application_credential_id: Option<String>,
    /// Application credential secret
    pub application_credential_secret: Option<String>,
    /// Catalog interface to use
    pub interface: Interface,
    /// Endpoint URLs keyed by service type, bypassing the catalog
    pub endpoint_overrides: BTreeMap<String, String>,
    /// Skip TLS certificate verification
    pub insecure: bool,
    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for OpenStackConfig {
    fn default() -> Self {
        Self {
            auth_url: "http://keystone:5000/v3".to_string(),
            username: String::new(),
            password: String::new(),
            project_name: String::new(),
            user_domain_name: "Default".to_string(),
            project_domain_name: "Default".to_string(),
            region: "RegionOne".to_string(),
            token: None,
            application_credential_id: None,
            application_credential_secret: None,
            interface: Interface::Public,
            endpoint_overrides: BTreeMap::new(),
            insecure: false,
            request_timeout_secs: 60,
        }
    }
}

impl OpenStackConfig {
    /// Pick the authentication method from the populated fields
    ///
    /// Application credentials take precedence over a token, which takes
    /// precedence over a password.
    pub fn auth_method(&self) -> Result<AuthMethod> {
        if let Some(id) = non_empty(&self.application_credential_id) {
            let secret = non_empty(&self.application_credential_secret).ok_or_else(|| {
                Error::Configuration("application credential secret is required".into())
            })?;
            return Ok(AuthMethod::ApplicationCredential {
                id: id.to_string(),
                secret: secret.to_string(),
            });
        }

        if let Some(token) = non_empty(&self.token) {
            return Ok(AuthMethod::Token {
                token: token.to_string(),
                project_name: self.project_name.clone(),
                project_domain_name: self.project_domain_name.clone(),
            });
        }

        if self.username.is_empty() || self.password.is_empty() {
            return Err(Error::Configuration(
                "one of user name + password, token, or application credential must be set".into(),
            ));
        }

        Ok(AuthMethod::Password {
            username: self.username.clone(),
            password: self.password.clone(),
            user_domain_name: self.user_domain_name.clone(),
            project_name: self.project_name.clone(),
            project_domain_name: self.project_domain_name.clone(),
        })
    }

    /// Keystone token endpoint derived from the auth URL
    pub fn token_url(&self) -> String {
        let base = self.auth_url.trim_end_matches('/');
        if base.ends_with("/v3") {
            format!("{}/auth/tokens", base)
        } else {
            format!("{}/v3/auth/tokens", base)
        }
    }

    /// Apply a `clouds.yaml` entry on top of this configuration
    pub fn apply_cloud(&mut self, cloud: &CloudEntry) -> Result<()> {
        let auth = &cloud.auth;
        set_if(&mut self.auth_url, &auth.auth_url);
        set_if(&mut self.username, &auth.username);
        set_if(&mut self.password, &auth.password);
        set_if(&mut self.project_name, &auth.project_name);
        set_if(&mut self.user_domain_name, &auth.user_domain_name);
        set_if(&mut self.project_domain_name, &auth.project_domain_name);
        set_if(&mut self.region, &cloud.region_name);

        if auth.token.is_some() {
            self.token = auth.token.clone();
        }
        if auth.application_credential_id.is_some() {
            self.application_credential_id = auth.application_credential_id.clone();
            self.application_credential_secret = auth.application_credential_secret.clone();
        }
        if let Some(interface) = &cloud.interface {
            self.interface = interface.parse()?;
        }
        if let Some(verify) = cloud.verify {
            self.insecure = !verify;
        }
        Ok(())
    }

    /// Apply explicit overrides on top of this configuration
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> Result<()> {
        set_if(&mut self.auth_url, &overrides.auth_url);
        set_if(&mut self.username, &overrides.username);
        set_if(&mut self.password, &overrides.password);
        set_if(&mut self.project_name, &overrides.project_name);
        set_if(&mut self.user_domain_name, &overrides.user_domain_name);
        set_if(&mut self.project_domain_name, &overrides.project_domain_name);
        set_if(&mut self.region, &overrides.region);

        if overrides.token.is_some() {
            self.token = overrides.token.clone();
        }
        if overrides.application_credential_id.is_some() {
            self.application_credential_id = overrides.application_credential_id.clone();
        }
        if overrides.application_credential_secret.is_some() {
            self.application_credential_secret = overrides.application_credential_secret.clone();
        }
        if let Some(interface) = &overrides.interface {
            self.interface = interface.parse()?;
        }
        if let Some(insecure) = overrides.insecure {
            self.insecure = insecure;
        }
        for raw in &overrides.endpoint_overrides {
            let (service_type, url) = parse_endpoint_override(raw)?;
            self.endpoint_overrides.insert(service_type, url);
        }
        Ok(())
    }
}

/// Explicit settings that take precedence over `clouds.yaml`
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub auth_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub project_name: Option<String>,
    pub user_domain_name: Option<String>,
    pub project_domain_name: Option<String>,
    pub region: Option<String>,
    pub token: Option<String>,
    pub application_credential_id: Option<String>,
    pub application_credential_secret: Option<String>,
    pub interface: Option<String>,
    pub insecure: Option<bool>,
    /// Raw `service_type=url` pairs
    pub endpoint_overrides: Vec<String>,
}

/// Parse a `service_type=url` endpoint override
pub fn parse_endpoint_override(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((service_type, url)) if !service_type.is_empty() && !url.is_empty() => {
            Ok((service_type.trim().to_string(), url.trim().to_string()))
        }
        _ => Err(Error::Configuration(format!(
            "Invalid endpoint override: {}. Expected service_type=url",
            raw
        ))),
    }
}

fn set_if(target: &mut String, value: &Option<String>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

// =============================================================================
// clouds.yaml
// =============================================================================

/// Parsed `clouds.yaml`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudsFile {
    #[serde(default)]
    pub clouds: BTreeMap<String, CloudEntry>,
}

/// One named cloud in `clouds.yaml`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudEntry {
    #[serde(default)]
    pub auth: CloudAuth,
    pub region_name: Option<String>,
    pub interface: Option<String>,
    pub verify: Option<bool>,
}

/// The `auth` section of a cloud entry
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudAuth {
    pub auth_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub project_name: Option<String>,
    pub user_domain_name: Option<String>,
    pub project_domain_name: Option<String>,
    pub token: Option<String>,
    pub application_credential_id: Option<String>,
    pub application_credential_secret: Option<String>,
}

impl CloudsFile {
    /// Load and parse a `clouds.yaml` file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let parsed = serde_yaml::from_str(&raw)?;
        debug!("Loaded clouds file {}", path.display());
        Ok(parsed)
    }

    /// Look up a named cloud
    pub fn cloud(&self, name: &str) -> Result<&CloudEntry> {
        self.clouds.get(name).ok_or_else(|| {
            Error::Configuration(format!("cloud {} not found in clouds.yaml", name))
        })
    }

    /// Standard `clouds.yaml` locations, most specific first
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("clouds.yaml")];
        if let Some(home) = std::env::var_os("HOME") {
            paths.push(PathBuf::from(home).join(".config/openstack/clouds.yaml"));
        }
        paths.push(PathBuf::from("/etc/openstack/clouds.yaml"));
        paths
    }

    /// Find the first existing `clouds.yaml` among the given candidates
    pub fn locate(candidates: &[PathBuf]) -> Result<PathBuf> {
        candidates
            .iter()
            .find(|p| p.is_file())
            .cloned()
            .ok_or_else(|| Error::Configuration("no clouds.yaml found".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    const CLOUDS: &str = r#"
clouds:
  devstack:
    auth:
      auth_url: http://10.0.0.10/identity
      username: demo
      password: secret
      project_name: demo
      user_domain_name: Default
      project_domain_name: Default
    region_name: RegionTwo
    interface: internal
  appcred:
    auth:
      auth_url: https://keystone.example.com:5000/v3
      application_credential_id: abc
      application_credential_secret: xyz
    verify: false
"#;

    fn clouds_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CLOUDS.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = OpenStackConfig::default();
        assert_eq!(config.region, "RegionOne");
        assert_eq!(config.interface, Interface::Public);
        assert!(config.auth_method().is_err());
    }

    #[test]
    fn test_token_url() {
        let mut config = OpenStackConfig::default();
        config.auth_url = "http://keystone:5000/v3/".into();
        assert_eq!(config.token_url(), "http://keystone:5000/v3/auth/tokens");

        config.auth_url = "http://10.0.0.10/identity".into();
        assert_eq!(config.token_url(), "http://10.0.0.10/identity/v3/auth/tokens");
    }

    #[test]
    fn test_clouds_yaml_password_cloud() {
        let file = clouds_file();
        let clouds = CloudsFile::load(file.path()).unwrap();

        let mut config = OpenStackConfig::default();
        config.apply_cloud(clouds.cloud("devstack").unwrap()).unwrap();

        assert_eq!(config.region, "RegionTwo");
        assert_eq!(config.interface, Interface::Internal);
        assert_matches!(
            config.auth_method().unwrap(),
            AuthMethod::Password { ref username, .. } if username == "demo"
        );
    }

    #[test]
    fn test_clouds_yaml_application_credential() {
        let file = clouds_file();
        let clouds = CloudsFile::load(file.path()).unwrap();

        let mut config = OpenStackConfig::default();
        config.apply_cloud(clouds.cloud("appcred").unwrap()).unwrap();

        assert!(config.insecure);
        assert_eq!(
            config.auth_method().unwrap(),
            AuthMethod::ApplicationCredential {
                id: "abc".into(),
                secret: "xyz".into()
            }
        );
        assert!(clouds.cloud("missing").is_err());
    }

    #[test]
    fn test_overrides_win_over_cloud() {
        let file = clouds_file();
        let clouds = CloudsFile::load(file.path()).unwrap();

        let mut config = OpenStackConfig::default();
        config.apply_cloud(clouds.cloud("devstack").unwrap()).unwrap();
        config
            .apply_overrides(&ConfigOverrides {
                region: Some("RegionThree".into()),
                endpoint_overrides: vec!["volumev3=http://cinder:8776/v3/demo".into()],
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.region, "RegionThree");
        assert_eq!(config.username, "demo");
        assert_eq!(
            config.endpoint_overrides.get("volumev3").map(String::as_str),
            Some("http://cinder:8776/v3/demo")
        );
    }

    #[test]
    fn test_locate_clouds_file() {
        let file = clouds_file();
        let candidates = vec![PathBuf::from("/nonexistent/clouds.yaml"), file.path().to_path_buf()];
        assert_eq!(CloudsFile::locate(&candidates).unwrap(), file.path().to_path_buf());
        assert!(CloudsFile::locate(&candidates[..1]).is_err());
    }

    #[test]
    fn test_parse_interface_and_override() {
        assert_eq!("publicURL".parse::<Interface>().unwrap(), Interface::Public);
        assert_eq!("admin".parse::<Interface>().unwrap(), Interface::Admin);
        assert!("private".parse::<Interface>().is_err());

        assert!(parse_endpoint_override("volumev3").is_err());
        assert!(parse_endpoint_override("=http://x").is_err());
    }
}
