//! Local registry of managed clusters.
//!
//! Each cluster is one YAML file under `<home>/clusters/<name>.yaml`:
//!
//! ```yaml
//! name: eks
//! provider: aws
//! region: eu-west-2
//! credential_reference: /home/me/.kubelab/credentials/aws_kube_credential
//! managed_by: tool
//! created_at: 2026-03-01T09:12:44Z
//! ```
//!
//! Records are written to a temporary sibling and renamed into place, so an
//! interrupted write never leaves a truncated descriptor behind. The registry
//! assumes a single writer; concurrent invocations are not locked against
//! each other.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{LabError, LabResult};
use crate::provider::{Location, Provider};

static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,99}$").unwrap());

const DESCRIPTOR_EXT: &str = "yaml";

/// Who is responsible for the cloud resources behind a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagedBy {
    /// Provisioned by kubelab; destroy tears it down.
    Tool,
    /// Adopted through `use`; destroy only forgets it.
    User,
}

impl std::fmt::Display for ManagedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagedBy::Tool => write!(f, "tool"),
            ManagedBy::User => write!(f, "user"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDescriptor {
    pub name: String,
    pub provider: Provider,
    #[serde(flatten)]
    pub location: Location,
    pub credential_reference: PathBuf,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub products: Vec<String>,
    pub managed_by: ManagedBy,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ClusterDescriptor {
    pub fn new(
        name: impl Into<String>,
        provider: Provider,
        location: Location,
        credential_reference: PathBuf,
        managed_by: ManagedBy,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            location,
            credential_reference,
            products: Vec::new(),
            managed_by,
            created_at: Utc::now(),
        }
    }

    pub fn region(&self) -> Option<&str> {
        self.location.region()
    }
}

/// Cluster names double as file names, so they are restricted to a safe set.
pub fn validate_name(name: &str) -> LabResult<()> {
    if NAME_REGEX.is_match(name) {
        return Ok(());
    }
    let reason = if name.is_empty() {
        "name must not be empty"
    } else if name.len() > 100 {
        "name must be at most 100 characters"
    } else {
        "use letters, digits, '-' and '_', starting with a letter or digit"
    };
    Err(LabError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct ClusterRegistry {
    clusters_dir: PathBuf,
}

impl ClusterRegistry {
    pub fn new(clusters_dir: &Path) -> Self {
        Self {
            clusters_dir: clusters_dir.to_path_buf(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.clusters_dir.join(format!("{}.{}", name, DESCRIPTOR_EXT))
    }

    pub fn contains(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.path(name).is_file()
    }

    /// Persist a new descriptor. Fails with `DuplicateName` if one exists.
    pub fn create(&self, descriptor: &ClusterDescriptor) -> LabResult<()> {
        validate_name(&descriptor.name)?;
        if self.contains(&descriptor.name) {
            return Err(LabError::DuplicateName {
                name: descriptor.name.clone(),
            });
        }
        self.write(descriptor)?;
        tracing::debug!(name = %descriptor.name, "descriptor saved");
        Ok(())
    }

    fn write(&self, descriptor: &ClusterDescriptor) -> LabResult<()> {
        fs::create_dir_all(&self.clusters_dir).map_err(|e| LabError::io(&self.clusters_dir, e))?;
        let path = self.path(&descriptor.name);
        let tmp = path.with_extension(format!("{}.tmp", DESCRIPTOR_EXT));
        let content = serde_yaml::to_string(descriptor)?;
        fs::write(&tmp, content).map_err(|e| LabError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| LabError::io(&path, e))
    }

    pub fn get(&self, name: &str) -> LabResult<ClusterDescriptor> {
        if !self.contains(name) {
            return Err(LabError::NotManaged {
                name: name.to_string(),
            });
        }
        self.read(&self.path(name))
    }

    fn read(&self, path: &Path) -> LabResult<ClusterDescriptor> {
        let content = fs::read_to_string(path).map_err(|e| LabError::io(path, e))?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Descriptors whose name matches the glob `name_pattern` and whose
    /// provider equals `provider`, sorted by name. `None` means no filter.
    pub fn find(
        &self,
        name_pattern: Option<&str>,
        provider: Option<Provider>,
    ) -> LabResult<Vec<ClusterDescriptor>> {
        let pattern = name_pattern
            .map(|p| {
                glob::Pattern::new(p)
                    .map_err(|e| LabError::Other(anyhow!("Invalid name pattern '{}': {}", p, e)))
            })
            .transpose()?;

        if !self.clusters_dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries =
            fs::read_dir(&self.clusters_dir).map_err(|e| LabError::io(&self.clusters_dir, e))?;

        let mut found = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DESCRIPTOR_EXT) {
                continue;
            }
            let descriptor = match self.read(&path) {
                Ok(d) => d,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable descriptor");
                    continue;
                }
            };
            if pattern.as_ref().is_some_and(|p| !p.matches(&descriptor.name)) {
                continue;
            }
            if provider.is_some_and(|p| p != descriptor.provider) {
                continue;
            }
            found.push(descriptor);
        }

        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    /// Apply `change` to a stored descriptor and rewrite it atomically.
    /// The name is the record's key and cannot be changed this way.
    pub fn update(
        &self,
        name: &str,
        change: impl FnOnce(&mut ClusterDescriptor),
    ) -> LabResult<ClusterDescriptor> {
        let mut descriptor = self.get(name)?;
        change(&mut descriptor);
        descriptor.name = name.to_string();
        self.write(&descriptor)?;
        tracing::debug!(name, "descriptor updated");
        Ok(descriptor)
    }

    /// Delete a descriptor. Fails with `NotManaged` if there is none.
    pub fn remove(&self, name: &str) -> LabResult<()> {
        if !self.contains(name) {
            return Err(LabError::NotManaged {
                name: name.to_string(),
            });
        }
        let path = self.path(name);
        fs::remove_file(&path).map_err(|e| LabError::io(path, e))?;
        tracing::debug!(name, "descriptor removed");
        Ok(())
    }
}
