//! Add-on products that can be installed on a registered cluster.
//!
//! The catalog knows which commands install or remove a product and which
//! files those commands need under `<home>/catalog/<product>/`. The commands
//! act on the cluster kubeconfig currently points at, so callers select the
//! cluster first.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::anyhow;

use crate::errors::{LabError, LabResult};
use crate::runner::ExternalCommand;

pub const NGINX_OPERATOR_REPO: &str = "https://github.com/nginxinc/nginx-ingress-helm-operator/";
pub const NGINX_OPERATOR_VERSION: &str = "1.4.2";
const NGINX_OPERATOR_CHECKOUT: &str = "nginx-ingress-helm-operator";
const NGINX_OPERATOR_NAMESPACE: &str = "nginx-ingress-operator-system";
const NGINX_IMAGE_TAG: &str = "latest";
const MANIFEST_FILE: &str = "deployment.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Product {
    Nginx,
}

impl Product {
    pub fn as_str(&self) -> &'static str {
        match self {
            Product::Nginx => "nginx",
        }
    }
}

impl std::fmt::Display for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Product {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nginx" => Ok(Product::Nginx),
            _ => Err(LabError::UnknownProduct(s.to_string())),
        }
    }
}

/// How a product is rolled out: a plain manifest or its operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstallMethod {
    #[default]
    Deployment,
    Operator,
}

impl InstallMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallMethod::Deployment => "deployment",
            InstallMethod::Operator => "operator",
        }
    }
}

impl std::fmt::Display for InstallMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InstallMethod {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deployment" => Ok(InstallMethod::Deployment),
            "operator" => Ok(InstallMethod::Operator),
            _ => Err(LabError::Other(anyhow!(
                "Unknown install type '{}' (use deployment or operator)",
                s
            ))),
        }
    }
}

/// A product plus how and which version to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSpec {
    pub product: Product,
    pub method: InstallMethod,
    /// Image tag for deployments, operator release otherwise.
    pub version: Option<String>,
}

impl ProductSpec {
    pub fn new(product: Product, method: InstallMethod) -> Self {
        Self {
            product,
            method,
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// The requested version, without a leading `v`, or the default.
    pub fn version(&self) -> &str {
        let default = match self.method {
            InstallMethod::Deployment => NGINX_IMAGE_TAG,
            InstallMethod::Operator => NGINX_OPERATOR_VERSION,
        };
        self.version
            .as_deref()
            .map(str::trim)
            .map(|v| v.trim_start_matches('v'))
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
    }

    fn validate(&self) -> LabResult<()> {
        let version = self.version();
        if version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        {
            return Ok(());
        }
        Err(LabError::missing(
            "version",
            format!("'{}' is not a valid {} version", version, self.product),
        ))
    }
}

/// Product files kept under one directory, one subdirectory per product.
#[derive(Debug, Clone)]
pub struct Catalog {
    dir: PathBuf,
}

impl Catalog {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn product_dir(&self, product: Product) -> PathBuf {
        self.dir.join(product.as_str())
    }

    pub fn manifest_path(&self, product: Product) -> PathBuf {
        self.product_dir(product).join(MANIFEST_FILE)
    }

    pub fn operator_checkout(&self, product: Product) -> PathBuf {
        self.product_dir(product).join(NGINX_OPERATOR_CHECKOUT)
    }

    /// Validate `spec` and write the files its commands read.
    pub fn prepare(&self, spec: &ProductSpec) -> LabResult<()> {
        spec.validate()?;
        let dir = self.product_dir(spec.product);
        fs::create_dir_all(&dir).map_err(|e| LabError::io(&dir, e))?;
        if spec.method == InstallMethod::Deployment {
            let path = self.manifest_path(spec.product);
            fs::write(&path, nginx_manifest(spec.version())).map_err(|e| LabError::io(&path, e))?;
        }
        Ok(())
    }

    /// Commands that install `spec`, in order.
    pub fn install_commands(&self, spec: &ProductSpec) -> Vec<ExternalCommand> {
        match spec.method {
            InstallMethod::Deployment => vec![kubectl_manifest("apply", &self.manifest_path(spec.product))],
            InstallMethod::Operator => {
                let mut commands = self.operator_checkout_commands(spec);
                let checkout = self.operator_checkout(spec.product);
                commands.push(
                    ExternalCommand::new("make")
                        .arg("deploy")
                        .arg(format!("IMG=nginx/nginx-ingress-operator:{}", spec.version()))
                        .current_dir(&checkout),
                );
                commands.push(ExternalCommand::new("kubectl").args([
                    "get",
                    "deployments",
                    "-n",
                    NGINX_OPERATOR_NAMESPACE,
                ]));
                commands
            }
        }
    }

    /// Commands that remove `spec`, in order.
    pub fn uninstall_commands(&self, spec: &ProductSpec) -> Vec<ExternalCommand> {
        match spec.method {
            InstallMethod::Deployment => vec![
                kubectl_manifest("delete", &self.manifest_path(spec.product)).arg("--ignore-not-found"),
            ],
            InstallMethod::Operator => {
                let mut commands = self.operator_checkout_commands(spec);
                commands.push(
                    ExternalCommand::new("make")
                        .arg("undeploy")
                        .current_dir(self.operator_checkout(spec.product)),
                );
                commands
            }
        }
    }

    // Clone once, then pin the checkout to the requested release.
    fn operator_checkout_commands(&self, spec: &ProductSpec) -> Vec<ExternalCommand> {
        let checkout = self.operator_checkout(spec.product);
        let tag = format!("v{}", spec.version());
        let mut commands = Vec::new();
        if !checkout.is_dir() {
            commands.push(
                ExternalCommand::new("git")
                    .args(["clone", "--branch", tag.as_str(), NGINX_OPERATOR_REPO])
                    .arg(checkout.to_string_lossy()),
            );
        }
        commands.push(
            ExternalCommand::new("git")
                .args(["checkout", tag.as_str()])
                .current_dir(&checkout),
        );
        commands
    }
}

fn kubectl_manifest(verb: &str, manifest: &Path) -> ExternalCommand {
    ExternalCommand::new("kubectl")
        .args([verb, "-f"])
        .arg(manifest.to_string_lossy())
}

fn nginx_manifest(tag: &str) -> String {
    format!(
        r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: nginx-deployment
  labels:
    app: nginx
    app.kubernetes.io/managed-by: kubelab
spec:
  replicas: 2
  selector:
    matchLabels:
      app: nginx
  template:
    metadata:
      labels:
        app: nginx
    spec:
      containers:
        - name: nginx
          image: nginx:{tag}
          ports:
            - containerPort: 80
---
apiVersion: v1
kind: Service
metadata:
  name: nginx-service
  labels:
    app.kubernetes.io/managed-by: kubelab
spec:
  type: LoadBalancer
  selector:
    app: nginx
  ports:
    - port: 80
      targetPort: 80
"#
    )
}
