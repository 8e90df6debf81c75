//! Core data model: task identity, pod events, and the crate's error type.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Errors surfaced by the executor core.
///
/// Every variant is either a startup-fatal configuration problem or a
/// cluster-API failure that the caller decides how to handle. The core
/// never panics on these.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("executor configuration error: {0}")]
    Config(String),

    #[error("scheduler reporting error: {0}")]
    Scheduler(String),

    #[error("general error: {0}")]
    Generic(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Identity of a single task attempt: `(dag_id, task_id, execution_time)`.
///
/// Opaque to the core beyond encoding/decoding it into pod labels and
/// passing it through to the scheduler on result.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskKey {
    pub dag_id: String,
    pub task_id: String,
    pub execution_time: DateTime<Utc>,
}

impl TaskKey {
    #[must_use]
    pub fn new(dag_id: impl Into<String>, task_id: impl Into<String>, execution_time: DateTime<Utc>) -> Self {
        Self {
            dag_id: dag_id.into(),
            task_id: task_id.into(),
            execution_time,
        }
    }
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.dag_id, self.task_id, self.execution_time.to_rfc3339())
    }
}

/// The opaque shell command a worker pod executes.
pub type TaskCommand = String;

/// A mapping of label key to label value, as attached to a launched pod.
pub type LabelSet = BTreeMap<String, String>;

/// Terminal outcome of a pod, as observed by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Succeeded,
    Failed,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// A terminal-phase observation emitted by the watcher onto the watch queue.
#[derive(Debug, Clone)]
pub struct PodEvent {
    pub pod_name: String,
    pub outcome: TaskState,
    pub labels: LabelSet,
}

/// An outcome ready to be reported to the scheduler, enqueued onto the
/// result queue once the watch event's labels have been decoded to a
/// `TaskKey`.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub key: TaskKey,
    pub state: TaskState,
    pub pod_name: String,
}

pub(crate) const AIRFLOW_SLAVE_LABEL: &str = "airflow-slave";
pub(crate) const DAG_ID_LABEL: &str = "dag_id";
pub(crate) const TASK_ID_LABEL: &str = "task_id";
pub(crate) const EXECUTION_DATE_LABEL: &str = "execution_date";
