//! Executor configuration.
//!
//! A typed, serde-deserializable configuration struct injected at
//! construction time rather than read ad hoc from global state.

use crate::types::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_namespace() -> String {
    "default".to_string()
}

fn default_dags_folder() -> String {
    "/usr/local/airflow/dags".to_string()
}

fn default_parallelism() -> u32 {
    32
}

fn default_true() -> bool {
    true
}

/// Cluster/executor configuration.
#[derive(Clone, Deserialize, Serialize)]
pub struct ExecutorConfig {
    /// Cap on in-flight pods. Enforced by the scheduler's admission gate,
    /// not by this core; carried through for completeness.
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,

    /// Default image for worker pods.
    pub container_image: String,

    /// Target namespace for pod create/watch/delete.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Whether to delete worker pods once they reach a terminal phase.
    #[serde(default = "default_true")]
    pub delete_worker_pods: bool,

    /// Mount path for DAGs inside the worker pod.
    #[serde(default = "default_dags_folder")]
    pub dags_folder: String,

    /// PVC name. Mutually exclusive with `git_repo`/`git_branch`.
    #[serde(default)]
    pub dags_volume_claim: Option<String>,

    /// Subpath within the PVC (or within the git-sync volume) to mount.
    #[serde(default)]
    pub dags_volume_subpath: Option<String>,

    /// Git-sync source repository. Must be paired with `git_branch`.
    #[serde(default)]
    pub git_repo: Option<String>,

    /// Git-sync branch to check out.
    #[serde(default)]
    pub git_branch: Option<String>,

    /// Subdirectory within the git repository containing the DAGs.
    #[serde(default)]
    pub git_subpath: Option<String>,

    #[serde(default)]
    pub git_user: Option<String>,

    #[serde(default)]
    pub git_password: Option<String>,

    /// The scheduler's own core configuration, flattened into
    /// `AIRFLOW__<SECTION>__<KEY>` environment variables on the worker pod.
    #[serde(default)]
    pub scheduler_core_config: BTreeMap<String, BTreeMap<String, String>>,
}

impl std::fmt::Debug for ExecutorConfig {
    /// `git_password` is redacted even at debug level; everything else is a
    /// cluster/image/volume setting, not a credential.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorConfig")
            .field("parallelism", &self.parallelism)
            .field("container_image", &self.container_image)
            .field("namespace", &self.namespace)
            .field("delete_worker_pods", &self.delete_worker_pods)
            .field("dags_folder", &self.dags_folder)
            .field("dags_volume_claim", &self.dags_volume_claim)
            .field("dags_volume_subpath", &self.dags_volume_subpath)
            .field("git_repo", &self.git_repo)
            .field("git_branch", &self.git_branch)
            .field("git_subpath", &self.git_subpath)
            .field("git_user", &self.git_user)
            .field("git_password", &self.git_password.as_ref().map(|_| "<redacted>"))
            .field("scheduler_core_config", &self.scheduler_core_config)
            .finish()
    }
}

impl ExecutorConfig {
    fn has_pvc_source(&self) -> bool {
        self.dags_volume_claim.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    fn has_git_source(&self) -> bool {
        let repo = self.git_repo.as_deref().is_some_and(|s| !s.trim().is_empty());
        let branch = self.git_branch.as_deref().is_some_and(|s| !s.trim().is_empty());
        repo && branch
    }

    /// Exactly one of `{dags_volume_claim, (git_repo ∧ git_branch)}` must be
    /// set. Fails fast with a configuration error otherwise.
    pub fn validate(&self) -> Result<()> {
        match (self.has_pvc_source(), self.has_git_source()) {
            (true, false) | (false, true) => Ok(()),
            (false, false) => Err(Error::Config(
                "in kubernetes mode you must set either `dags_volume_claim` or both `git_repo` and `git_branch`"
                    .to_string(),
            )),
            (true, true) => Err(Error::Config(
                "`dags_volume_claim` and `git_repo`/`git_branch` are mutually exclusive".to_string(),
            )),
        }
    }

    /// Load configuration from a mounted YAML file (a `ConfigMap` in
    /// practice), validating it before returning.
    pub fn from_mounted_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {path}: {e}")))?;
        let config: Self = serde_yaml::from_str(&raw)
            .map_err(|e| Error::Config(format!("failed to parse executor config YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            container_image: "apache/airflow:worker".to_string(),
            namespace: default_namespace(),
            delete_worker_pods: true,
            dags_folder: default_dags_folder(),
            dags_volume_claim: Some("airflow-dags".to_string()),
            dags_volume_subpath: None,
            git_repo: None,
            git_branch: None,
            git_subpath: None,
            git_user: None,
            git_password: None,
            scheduler_core_config: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ExecutorConfig::default().validate().is_ok());
    }

    #[test]
    fn neither_source_fails_validation() {
        let mut config = ExecutorConfig::default();
        config.dags_volume_claim = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn both_sources_fails_validation() {
        let mut config = ExecutorConfig::default();
        config.git_repo = Some("https://example.com/dags.git".to_string());
        config.git_branch = Some("main".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn git_sync_pair_is_accepted() {
        let mut config = ExecutorConfig::default();
        config.dags_volume_claim = None;
        config.git_repo = Some("https://example.com/dags.git".to_string());
        config.git_branch = Some("main".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn git_repo_without_branch_fails_validation() {
        let mut config = ExecutorConfig::default();
        config.dags_volume_claim = None;
        config.git_repo = Some("https://example.com/dags.git".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_format_redacts_git_password() {
        let mut config = ExecutorConfig::default();
        config.git_password = Some("hunter2".to_string());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn deserializes_from_yaml() {
        let yaml = r"
container_image: ghcr.io/airflow/worker:2.9
namespace: airflow
dags_volume_claim: airflow-dags-pvc
dags_volume_subpath: dags
";
        let config: ExecutorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.namespace, "airflow");
        assert!(config.validate().is_ok());
        assert_eq!(config.dags_volume_claim.as_deref(), Some("airflow-dags-pvc"));
    }
}
