//! Render a task invocation into a concrete Kubernetes pod spec.

use crate::config::ExecutorConfig;
use crate::identity::IdentityCodec;
use crate::types::{Error, Result, TaskCommand, TaskKey};
use k8s_openapi::api::core::v1::Pod;
use serde_json::json;

const GIT_SYNC_IMAGE: &str = "gcr.io/google-containers/git-sync-amd64:v2.0.5";
const GIT_SYNC_VOLUME_NAME: &str = "airflow-dags";
const IN_PROCESS_EXECUTOR: &str = "LocalExecutor";

pub struct PodSpecBuilder;

impl PodSpecBuilder {
    /// Materialize the scheduler's core configuration as
    /// `AIRFLOW__<SECTION>__<KEY>` environment variables, overriding
    /// `core.executor` so the pod cannot recursively spawn more pods, and
    /// rewriting `core.dags_folder` when DAGs live under a git subpath.
    fn build_environment(config: &ExecutorConfig) -> Vec<(String, String)> {
        let mut sections = config.scheduler_core_config.clone();
        let core = sections.entry("core".to_string()).or_default();
        core.insert("executor".to_string(), IN_PROCESS_EXECUTOR.to_string());
        core.insert("dags_folder".to_string(), Self::effective_dags_folder(config));

        let mut env = Vec::new();
        for (section, values) in &sections {
            let section_upper = section.to_uppercase();
            for (key, value) in values {
                env.push((format!("AIRFLOW__{section_upper}__{}", key.to_uppercase()), value.clone()));
            }
        }
        env.sort();
        env
    }

    fn effective_dags_folder(config: &ExecutorConfig) -> String {
        match &config.git_subpath {
            Some(subpath) if !subpath.is_empty() => {
                format!("{}/{}", config.dags_folder.trim_end_matches('/'), subpath.trim_start_matches('/'))
            }
            _ => config.dags_folder.clone(),
        }
    }

    fn volumes_and_mounts(config: &ExecutorConfig) -> (serde_json::Value, serde_json::Value, serde_json::Value) {
        if let Some(claim) = config.dags_volume_claim.as_deref().filter(|s| !s.is_empty()) {
            let mut mount = json!({
                "name": GIT_SYNC_VOLUME_NAME,
                "mountPath": config.dags_folder,
                "readOnly": true,
            });
            if let Some(subpath) = &config.dags_volume_subpath {
                mount["subPath"] = json!(subpath);
            }
            let volume = json!({
                "name": GIT_SYNC_VOLUME_NAME,
                "persistentVolumeClaim": { "claimName": claim },
            });
            (json!([volume]), json!([mount]), json!([]))
        } else {
            let volume = json!({ "name": GIT_SYNC_VOLUME_NAME, "emptyDir": {} });
            let worker_mount = json!({
                "name": GIT_SYNC_VOLUME_NAME,
                "mountPath": config.dags_folder,
                "readOnly": true,
            });
            let init_mount = json!({
                "name": GIT_SYNC_VOLUME_NAME,
                "mountPath": config.dags_folder,
                "readOnly": false,
            });
            let init_containers = json!([Self::git_sync_init_container(config, init_mount)]);
            (json!([volume]), json!([worker_mount]), init_containers)
        }
    }

    fn git_sync_init_container(config: &ExecutorConfig, mount: serde_json::Value) -> serde_json::Value {
        let mut env = vec![
            json!({ "name": "GIT_SYNC_REPO", "value": config.git_repo.clone().unwrap_or_default() }),
            json!({ "name": "GIT_SYNC_BRANCH", "value": config.git_branch.clone().unwrap_or_default() }),
            json!({ "name": "GIT_SYNC_ROOT", "value": config.dags_folder }),
            json!({ "name": "GIT_SYNC_DEST", "value": "" }),
            json!({ "name": "GIT_SYNC_ONE_TIME", "value": "true" }),
        ];
        if let Some(user) = &config.git_user {
            env.push(json!({ "name": "GIT_SYNC_USERNAME", "value": user }));
        }
        if let Some(password) = &config.git_password {
            env.push(json!({ "name": "GIT_SYNC_PASSWORD", "value": password }));
        }

        json!({
            "name": "git-sync-clone",
            "image": GIT_SYNC_IMAGE,
            "securityContext": { "runAsUser": 0 },
            "env": env,
            "volumeMounts": [mount],
        })
    }

    /// Build the pod spec for one task invocation.
    pub fn build(
        namespace: &str,
        pod_name: &str,
        key: &TaskKey,
        command: &TaskCommand,
        config: &ExecutorConfig,
    ) -> Result<Pod> {
        let labels = IdentityCodec::encode_labels(key);
        let env: Vec<serde_json::Value> = Self::build_environment(config)
            .into_iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect();
        let (volumes, volume_mounts, init_containers) = Self::volumes_and_mounts(config);

        let pod_json = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": pod_name,
                "namespace": namespace,
                "labels": labels,
            },
            "spec": {
                "restartPolicy": "Never",
                "initContainers": init_containers,
                "containers": [{
                    "name": "base",
                    "image": config.container_image,
                    "command": ["bash", "-cx", "--"],
                    "args": [command],
                    "env": env,
                    "volumeMounts": volume_mounts,
                }],
                "volumes": volumes,
            },
        });

        serde_json::from_value(pod_json).map_err(|e| Error::Config(format!("failed to build pod spec: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn key() -> TaskKey {
        TaskKey::new("dag1", "task1", Utc::now())
    }

    #[test]
    fn pvc_mode_has_no_init_containers_and_readonly_mount() {
        let config = ExecutorConfig::default();
        let pod = PodSpecBuilder::build("airflow", "pod-1", &key(), &"echo hi".to_string(), &config).unwrap();
        let spec = pod.spec.unwrap();
        assert!(spec.init_containers.unwrap_or_default().is_empty());
        let mount = &spec.containers[0].volume_mounts.as_ref().unwrap()[0];
        assert_eq!(mount.read_only, Some(true));
    }

    #[test]
    fn git_sync_mode_adds_init_container_with_readwrite_mount() {
        let mut config = ExecutorConfig::default();
        config.dags_volume_claim = None;
        config.git_repo = Some("https://example.com/dags.git".to_string());
        config.git_branch = Some("main".to_string());

        let pod = PodSpecBuilder::build("airflow", "pod-1", &key(), &"echo hi".to_string(), &config).unwrap();
        let spec = pod.spec.unwrap();
        let init_containers = spec.init_containers.unwrap();
        assert_eq!(init_containers.len(), 1);
        assert_eq!(init_containers[0].image.as_deref(), Some("gcr.io/google-containers/git-sync-amd64:v2.0.5"));
        let init_mount = &init_containers[0].volume_mounts.as_ref().unwrap()[0];
        assert_ne!(init_mount.read_only, Some(true));

        let worker_mount = &spec.containers[0].volume_mounts.as_ref().unwrap()[0];
        assert_eq!(worker_mount.read_only, Some(true));
    }

    #[test]
    fn labels_carry_airflow_slave_and_decode_back_to_the_key() {
        let config = ExecutorConfig::default();
        let k = key();
        let pod = PodSpecBuilder::build("airflow", "pod-1", &k, &"echo hi".to_string(), &config).unwrap();
        let labels = pod.metadata.labels.unwrap();
        assert_eq!(labels.get("airflow-slave").map(String::as_str), Some(""));

        let mut decoded_labels = std::collections::BTreeMap::new();
        for (label_key, label_value) in &labels {
            decoded_labels.insert(label_key.clone(), label_value.clone());
        }
        let decoded = IdentityCodec::decode_labels(&decoded_labels).unwrap();
        assert_eq!(decoded.dag_id, k.dag_id);
        assert_eq!(decoded.task_id, k.task_id);
    }

    #[test]
    fn environment_overrides_core_executor_to_in_process() {
        let mut config = ExecutorConfig::default();
        config
            .scheduler_core_config
            .entry("core".to_string())
            .or_default()
            .insert("executor".to_string(), "KubernetesExecutor".to_string());

        let pod = PodSpecBuilder::build("airflow", "pod-1", &key(), &"echo hi".to_string(), &config).unwrap();
        let env = pod.spec.unwrap().containers[0].env.clone().unwrap();
        let executor_var = env.iter().find(|e| e.name == "AIRFLOW__CORE__EXECUTOR").unwrap();
        assert_eq!(executor_var.value.as_deref(), Some("LocalExecutor"));
    }

    #[test]
    fn git_subpath_rewrites_dags_folder_env_var() {
        let mut config = ExecutorConfig::default();
        config.dags_volume_claim = None;
        config.git_repo = Some("https://example.com/dags.git".to_string());
        config.git_branch = Some("main".to_string());
        config.git_subpath = Some("dags".to_string());

        let pod = PodSpecBuilder::build("airflow", "pod-1", &key(), &"echo hi".to_string(), &config).unwrap();
        let env = pod.spec.unwrap().containers[0].env.clone().unwrap();
        let dags_folder_var = env.iter().find(|e| e.name == "AIRFLOW__CORE__DAGS_FOLDER").unwrap();
        assert_eq!(dags_folder_var.value.as_deref(), Some("/usr/local/airflow/dags/dags"));
    }
}
