//! Encode/decode task identity to and from pod names and label sets.
//!
//! A pod name is display-lossy but collision-proof (UUID suffix); a label
//! set is the lossless, round-trippable carrier of identity.

use crate::types::{LabelSet, TaskKey, AIRFLOW_SLAVE_LABEL, DAG_ID_LABEL, EXECUTION_DATE_LABEL, TASK_ID_LABEL};
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

/// Kubernetes pod names must be DNS-1123 subdomains: lowercase alphanumerics
/// and `-`/`.`, at most 253 characters.
const MAX_POD_NAME_LEN: usize = 253;

pub struct IdentityCodec;

impl IdentityCodec {
    /// Strip everything but lowercase alphanumerics, per the Kubernetes
    /// object-naming rules: punctuation in `dag_id`/`task_id` is display-only
    /// and does not survive into the pod name.
    fn strip_unsafe(input: &str) -> String {
        input
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect()
    }

    /// Build a DNS-1123-safe, collision-proof pod name for a task.
    ///
    /// The dag/task prefix is truncated to make room for a 32-character hex
    /// UUID suffix; truncation is lossy for display only since identity
    /// lives in labels, not the pod name.
    #[must_use]
    pub fn encode_pod_name(dag_id: &str, task_id: &str) -> String {
        let safe_dag = Self::strip_unsafe(dag_id);
        let safe_task = Self::strip_unsafe(task_id);
        let safe_uuid = Self::strip_unsafe(&Uuid::new_v4().simple().to_string());

        let safe_key = format!("{safe_dag}{safe_task}");
        let prefix_budget = MAX_POD_NAME_LEN.saturating_sub(safe_uuid.len() + 1);
        let prefix: String = safe_key.chars().take(prefix_budget).collect();

        format!("{prefix}-{safe_uuid}")
    }

    /// Kubernetes rejects `:` in label values; ISO-8601 never otherwise uses
    /// `_`, so the substitution is injective and reversible.
    #[must_use]
    pub fn encode_execution_date(execution_time: &DateTime<Utc>) -> String {
        execution_time.to_rfc3339().replace(':', "_")
    }

    fn decode_execution_date(label_value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        let restored = label_value.replace('_', ":");
        DateTime::parse_from_rfc3339(&restored).map(|dt| dt.with_timezone(&Utc))
    }

    /// Build the label set a launched pod must carry.
    #[must_use]
    pub fn encode_labels(key: &TaskKey) -> LabelSet {
        let mut labels = LabelSet::new();
        labels.insert(AIRFLOW_SLAVE_LABEL.to_string(), String::new());
        labels.insert(DAG_ID_LABEL.to_string(), key.dag_id.clone());
        labels.insert(TASK_ID_LABEL.to_string(), key.task_id.clone());
        labels.insert(EXECUTION_DATE_LABEL.to_string(), Self::encode_execution_date(&key.execution_time));
        labels
    }

    /// Reverse [`Self::encode_labels`]. Returns `None` (logging a warning)
    /// rather than erroring: a terminal event with undecodable labels must
    /// be dropped, never crash the caller's loop.
    #[must_use]
    pub fn decode_labels(labels: &LabelSet) -> Option<TaskKey> {
        let dag_id = labels.get(DAG_ID_LABEL)?;
        let task_id = labels.get(TASK_ID_LABEL)?;
        let execution_date = labels.get(EXECUTION_DATE_LABEL)?;

        match Self::decode_execution_date(execution_date) {
            Ok(execution_time) => Some(TaskKey::new(dag_id.clone(), task_id.clone(), execution_time)),
            Err(err) => {
                warn!(
                    dag_id, task_id, execution_date, error = %err,
                    "failed to parse execution_date label back into a timestamp"
                );
                None
            }
        }
    }
}
