//! Provider-native configuration and credentials.
//!
//! Fills location gaps from the files each provider CLI maintains:
//!
//! | Provider | File                                               | Keys                                |
//! |----------|----------------------------------------------------|-------------------------------------|
//! | AWS      | `~/.aws/config`                                    | `[default]` / `[profile X]` `region`|
//! | Azure    | `~/.azure/config`                                  | `[defaults]` `group`, `location`    |
//! | GCP      | `~/.config/gcloud/configurations/config_default`   | `[core]` `project`, `[compute]` `region` |
//!
//! Explicit values always win over file defaults. Credentials are captured by
//! copying the provider's authentication file into `<home>/credentials/`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{LabError, LabResult};
use crate::provider::{Location, Provider};

type IniSections = BTreeMap<String, BTreeMap<String, String>>;

/// Captured (or capturable) credential material for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCredential {
    pub provider: Provider,
    /// The provider CLI's own file.
    pub source: PathBuf,
    /// Where kubelab keeps its copy.
    pub path: PathBuf,
    pub captured: bool,
}

#[derive(Debug, Clone)]
pub struct ConfigResolver {
    user_home: PathBuf,
    credentials_dir: PathBuf,
    aws_profile: Option<String>,
}

impl ConfigResolver {
    /// The AWS profile defaults to `$AWS_PROFILE`.
    pub fn new(user_home: &Path, credentials_dir: &Path) -> Self {
        Self {
            user_home: user_home.to_path_buf(),
            credentials_dir: credentials_dir.to_path_buf(),
            aws_profile: std::env::var("AWS_PROFILE").ok().filter(|p| !p.is_empty()),
        }
    }

    pub fn with_aws_profile(mut self, profile: Option<String>) -> Self {
        self.aws_profile = profile;
        self
    }

    pub fn credential_path(&self, provider: Provider) -> PathBuf {
        self.credentials_dir
            .join(format!("{}_kube_credential", provider.as_str()))
    }

    pub fn credential(&self, provider: Provider) -> ProviderCredential {
        let path = self.credential_path(provider);
        ProviderCredential {
            provider,
            source: provider.credential_file(&self.user_home),
            captured: path.is_file(),
            path,
        }
    }

    /// Copy the provider's authentication file into the credentials directory.
    pub fn capture_credentials(&self, provider: Provider) -> LabResult<ProviderCredential> {
        let mut credential = self.credential(provider);
        if !credential.source.is_file() {
            return Err(LabError::ToolUnavailable {
                tool: provider.cli().to_string(),
                reason: format!(
                    "{} credentials file {} not found. Configure the {} CLI before proceeding",
                    provider,
                    credential.source.display(),
                    provider.cli()
                ),
            });
        }
        fs::create_dir_all(&self.credentials_dir)
            .map_err(|e| LabError::io(&self.credentials_dir, e))?;
        fs::copy(&credential.source, &credential.path)
            .map_err(|e| LabError::io(&credential.path, e))?;
        credential.captured = true;
        tracing::debug!(%provider, path = %credential.path.display(), "credentials captured");
        Ok(credential)
    }

    /// Defaults from the provider's config file. A missing file yields an
    /// empty location.
    pub fn provider_defaults(&self, provider: Provider) -> LabResult<Location> {
        let path = provider.config_file(&self.user_home);
        if !path.is_file() {
            return Ok(Location::default());
        }
        let content = fs::read_to_string(&path).map_err(|e| LabError::io(&path, e))?;
        let ini = parse_ini(&content);
        let get = |section: &str, key: &str| ini.get(section).and_then(|s| s.get(key)).cloned();

        let location = match provider {
            Provider::Aws => {
                let section = match self.aws_profile.as_deref() {
                    None | Some("default") => "default".to_string(),
                    Some(profile) => format!("profile {}", profile),
                };
                Location::new(get(&section, "region"), None, None)
            }
            Provider::Azure => Location::new(
                get("defaults", "location"),
                get("defaults", "group"),
                None,
            ),
            Provider::Gcp => Location::new(get("compute", "region"), None, get("core", "project")),
        };
        Ok(location)
    }

    /// `explicit` with its blank fields filled from the provider defaults.
    pub fn resolve(&self, provider: Provider, explicit: &Location) -> LabResult<Location> {
        let defaults = self.provider_defaults(provider)?;
        let resolved = explicit.fill_from(&defaults);
        if resolved != *explicit {
            tracing::debug!(%provider, location = %resolved.summary(), "filled location from provider config");
        }
        Ok(resolved)
    }
}

/// Minimal INI reader: `[section]` headers, `key = value` pairs, `#` and `;`
/// comments. Keys outside any section are ignored.
pub fn parse_ini(content: &str) -> IniSections {
    let mut sections = IniSections::new();
    let mut current: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = header.trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        if let (Some(section), Some((key, value))) = (&current, line.split_once('=')) {
            sections
                .entry(section.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    sections
}
