//! Integration tests for the kubelab binary.
//!
//! Every case here is rejected or completed before a provider CLI or
//! Terraform would be spawned, so none of them need cloud access.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A kubelab command isolated in `dir`: both the user's home and the
/// kubelab home live inside it.
fn kubelab(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("kubelab");
    cmd.env("HOME", dir.path())
        .env("KUBELAB_HOME", lab_home(dir))
        .env_remove("AWS_PROFILE")
        .env_remove("RUST_LOG")
        .env_remove("KUBELAB_TERRAFORM")
        .env_remove("KUBELAB_POLL_INTERVAL");
    cmd
}

fn lab_home(dir: &TempDir) -> PathBuf {
    dir.path().join(".kubelab")
}

/// Write a descriptor straight into the registry directory.
fn seed_cluster(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let clusters = lab_home(dir).join("clusters");
    fs::create_dir_all(&clusters).unwrap();
    let path = clusters.join(format!("{}.yaml", name));
    fs::write(&path, body).unwrap();
    path
}

fn aws_cluster(name: &str, region: &str, managed_by: &str) -> String {
    format!(
        "name: {name}\nprovider: aws\nregion: {region}\ncredential_reference: /tmp/aws\nmanaged_by: {managed_by}\ncreated_at: 2026-01-05T10:00:00Z\n"
    )
}

fn exists(path: &Path) -> bool {
    path.try_exists().unwrap()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        let dir = TempDir::new().unwrap();
        kubelab(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("create"))
            .stdout(predicate::str::contains("destroy"));
    }

    #[test]
    fn test_version() {
        let dir = TempDir::new().unwrap();
        kubelab(&dir)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("kubelab"));
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let dir = TempDir::new().unwrap();
        kubelab(&dir)
            .args(["create", "cluster", "-n", "dev", "-p", "openstack"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unsupported provider"));
    }

    #[test]
    fn test_destroy_requires_name_or_interactive() {
        let dir = TempDir::new().unwrap();
        kubelab(&dir)
            .args(["destroy", "cluster"])
            .assert()
            .failure();
    }
}

// =============================================================================
// Listing
// =============================================================================

mod list {
    use super::*;

    #[test]
    fn test_empty_registry() {
        let dir = TempDir::new().unwrap();
        kubelab(&dir)
            .args(["list", "cluster"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No clusters registered"));
    }

    #[test]
    fn test_lists_seeded_clusters() {
        let dir = TempDir::new().unwrap();
        seed_cluster(&dir, "dev-a", &aws_cluster("dev-a", "us-east-1", "tool"));
        seed_cluster(&dir, "prod", &aws_cluster("prod", "eu-west-1", "user"));

        kubelab(&dir)
            .args(["list", "cluster"])
            .assert()
            .success()
            .stdout(predicate::str::contains("NAME"))
            .stdout(predicate::str::contains("dev-a"))
            .stdout(predicate::str::contains("prod"))
            .stdout(predicate::str::contains("region eu-west-1"));
    }

    #[test]
    fn test_name_pattern_filters() {
        let dir = TempDir::new().unwrap();
        seed_cluster(&dir, "dev-a", &aws_cluster("dev-a", "us-east-1", "tool"));
        seed_cluster(&dir, "prod", &aws_cluster("prod", "eu-west-1", "tool"));

        kubelab(&dir)
            .args(["list", "cluster", "--name-pattern", "dev-*"])
            .assert()
            .success()
            .stdout(predicate::str::contains("dev-a"))
            .stdout(predicate::str::contains("prod").not());
    }

    #[test]
    fn test_provider_filter() {
        let dir = TempDir::new().unwrap();
        seed_cluster(&dir, "dev-a", &aws_cluster("dev-a", "us-east-1", "tool"));

        kubelab(&dir)
            .args(["list", "cluster", "--provider", "gcp"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No clusters registered"));
    }

    #[test]
    fn test_corrupt_descriptor_is_skipped() {
        let dir = TempDir::new().unwrap();
        seed_cluster(&dir, "dev-a", &aws_cluster("dev-a", "us-east-1", "tool"));
        seed_cluster(&dir, "broken", "name: [unterminated");

        kubelab(&dir)
            .args(["list", "cluster"])
            .assert()
            .success()
            .stdout(predicate::str::contains("dev-a"));
    }
}

// =============================================================================
// Create
// =============================================================================

mod create {
    use super::*;

    #[test]
    fn test_missing_region_fails_before_any_call() {
        let dir = TempDir::new().unwrap();
        kubelab(&dir)
            .args(["create", "cluster", "-n", "dev", "-p", "aws"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("region"));

        assert!(!exists(&lab_home(&dir).join("clusters").join("dev.yaml")));
    }

    #[test]
    fn test_gcp_needs_project() {
        let dir = TempDir::new().unwrap();
        kubelab(&dir)
            .args(["create", "cluster", "-n", "dev", "-p", "gcp", "-r", "europe-west1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("project"));
    }

    #[test]
    fn test_azure_needs_resource_group() {
        let dir = TempDir::new().unwrap();
        kubelab(&dir)
            .args(["create", "cluster", "-n", "dev", "-p", "azure"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("resource-group"));
    }

    #[test]
    fn test_duplicate_name() {
        let dir = TempDir::new().unwrap();
        let path = seed_cluster(&dir, "dev", &aws_cluster("dev", "us-east-1", "tool"));
        let before = fs::read_to_string(&path).unwrap();

        kubelab(&dir)
            .args(["create", "cluster", "-n", "dev", "-p", "aws", "-r", "us-east-1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));

        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_invalid_name() {
        let dir = TempDir::new().unwrap();
        kubelab(&dir)
            .args(["create", "cluster", "-n", "../escape", "-p", "aws", "-r", "us-east-1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid cluster name"));
    }
}

// =============================================================================
// Use
// =============================================================================

mod use_cluster {
    use super::*;

    #[test]
    fn test_unknown_cluster_needs_provider() {
        let dir = TempDir::new().unwrap();
        kubelab(&dir)
            .args(["use", "cluster", "--name", "someone-elses"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("provider"));

        assert!(!exists(
            &lab_home(&dir).join("clusters").join("someone-elses.yaml")
        ));
    }
}

// =============================================================================
// Destroy
// =============================================================================

mod destroy {
    use super::*;

    #[test]
    fn test_unknown_cluster_is_a_notice() {
        let dir = TempDir::new().unwrap();
        kubelab(&dir)
            .args(["--yes", "destroy", "cluster", "--name", "ghost", "-r", "us-east-1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("not managed by kubelab"));
    }

    #[test]
    fn test_region_mismatch_leaves_descriptor() {
        let dir = TempDir::new().unwrap();
        let path = seed_cluster(&dir, "dev", &aws_cluster("dev", "us-east-1", "tool"));

        kubelab(&dir)
            .args(["--yes", "destroy", "cluster", "--name", "dev", "-r", "eu-west-1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("us-east-1"))
            .stderr(predicate::str::contains("eu-west-1"));

        assert!(exists(&path));
        let log = fs::read_to_string(lab_home(&dir).join("logs/kubelab-aws.log")).unwrap();
        assert!(log.contains("ERROR Cluster 'dev' is registered in us-east-1"));
    }

    #[test]
    fn test_aws_destroy_needs_region() {
        let dir = TempDir::new().unwrap();
        let path = seed_cluster(&dir, "dev", &aws_cluster("dev", "us-east-1", "tool"));

        kubelab(&dir)
            .args(["--yes", "destroy", "cluster", "--name", "dev"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--region us-east-1"));

        assert!(exists(&path));
    }

    #[test]
    fn test_user_managed_cluster_is_only_forgotten() {
        let dir = TempDir::new().unwrap();
        let path = seed_cluster(&dir, "theirs", &aws_cluster("theirs", "us-east-1", "user"));

        kubelab(&dir)
            .args(["--yes", "destroy", "cluster", "--name", "theirs", "-r", "us-east-1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Forgot user-managed cluster"));

        assert!(!exists(&path));
    }

    #[test]
    fn test_interactive_with_empty_registry() {
        let dir = TempDir::new().unwrap();
        kubelab(&dir)
            .args(["destroy", "cluster", "-i"])
            .assert()
            .success()
            .stdout(predicate::str::contains("nothing to destroy"));
    }
}

// =============================================================================
// Products
// =============================================================================

mod products {
    use super::*;

    #[test]
    fn test_add_to_unknown_cluster_fails() {
        let dir = TempDir::new().unwrap();
        kubelab(&dir)
            .args(["add", "product", "nginx", "--cluster", "ghost"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not managed by kubelab"));
    }

    #[test]
    fn test_add_already_installed_product_fails() {
        let dir = TempDir::new().unwrap();
        let body = format!("{}products:\n- nginx\n", aws_cluster("dev", "us-east-1", "tool"));
        let path = seed_cluster(&dir, "dev", &body);

        kubelab(&dir)
            .args(["add", "product", "nginx", "-c", "dev"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already installed"));

        assert!(fs::read_to_string(path).unwrap().contains("- nginx"));
    }

    #[test]
    fn test_delete_product_that_is_not_installed_fails() {
        let dir = TempDir::new().unwrap();
        seed_cluster(&dir, "dev", &aws_cluster("dev", "us-east-1", "tool"));

        kubelab(&dir)
            .args(["delete", "product", "nginx", "-c", "dev", "--type", "operator"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not installed"));
    }

    #[test]
    fn test_unknown_product_is_rejected() {
        let dir = TempDir::new().unwrap();
        kubelab(&dir)
            .args(["add", "product", "karpenter", "-c", "dev"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("karpenter"));
    }
}

// =============================================================================
// Config
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_show_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        kubelab(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No kubelab.toml found"))
            .stdout(predicate::str::contains("poll_interval_secs = 30"));
    }

    #[test]
    fn test_init_writes_file_once() {
        let dir = TempDir::new().unwrap();
        let config_path = lab_home(&dir).join("kubelab.toml");

        kubelab(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created kubelab.toml"));
        assert!(exists(&config_path));

        kubelab(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_validate_reports_warnings() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(lab_home(&dir)).unwrap();
        fs::write(
            lab_home(&dir).join("kubelab.toml"),
            "[defaults]\npoll_interval_secs = 0\n",
        )
        .unwrap();

        kubelab(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("poll_interval_secs is 0"));
    }

    #[test]
    fn test_validate_clean_config() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(lab_home(&dir).join("providers")).unwrap();

        kubelab(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid"));
    }

    #[test]
    fn test_broken_config_fails() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(lab_home(&dir)).unwrap();
        fs::write(lab_home(&dir).join("kubelab.toml"), "[defaults\n").unwrap();

        kubelab(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("kubelab.toml"));
    }

    #[test]
    fn test_home_flag_overrides_env() {
        let dir = TempDir::new().unwrap();
        let other = dir.path().join("elsewhere");

        kubelab(&dir)
            .arg("--home")
            .arg(&other)
            .args(["config", "init"])
            .assert()
            .success();
        assert!(exists(&other.join("kubelab.toml")));
        assert!(!exists(&lab_home(&dir).join("kubelab.toml")));
    }
}
