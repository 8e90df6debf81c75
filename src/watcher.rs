//! Long-lived subscriber to the cluster's pod event stream.
//!
//! Isolation here comes from a supervised, abortable `tokio` task rather
//! than a separate OS process: Rust's async streams are cancellable by
//! simply dropping the future driving them, so a watch loop that hangs or
//! errors out can be aborted and respawned in place. The queue feeding
//! terminal events back to the caller is an in-process MPSC channel with
//! single-writer/single-reader ordering.

use crate::types::{PodEvent, TaskState, AIRFLOW_SLAVE_LABEL};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use kube::runtime::watcher::{self, Config};
use kube::runtime::WatchStreamExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{info, warn};

fn process_pod(pod: &Pod, tx: &UnboundedSender<PodEvent>) {
    let pod_name = pod.metadata.name.clone().unwrap_or_default();
    let labels = pod
        .metadata
        .labels
        .clone()
        .unwrap_or_default()
        .into_iter()
        .collect::<crate::types::LabelSet>();
    let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref()).unwrap_or("");

    match phase {
        "Pending" => info!(pod_name, "pod pending"),
        "Running" => info!(pod_name, "pod running"),
        "Succeeded" => {
            info!(pod_name, "pod succeeded");
            let _ = tx.send(PodEvent { pod_name, outcome: TaskState::Succeeded, labels });
        }
        "Failed" => {
            info!(pod_name, "pod failed");
            let _ = tx.send(PodEvent { pod_name, outcome: TaskState::Failed, labels });
        }
        other => warn!(pod_name, phase = other, "invalid pod phase observed; ignoring"),
    }
}

/// Run the watch loop until cancelled. When the stream ends cleanly (server
/// closed, no more values) it is restarted; pod events are infinite in
/// principle. Any stream error is logged and also triggers a restart after
/// a short backoff, so transient disconnects self-heal without needing a
/// second layer of supervision.
async fn watch_loop(pods: Api<Pod>, tx: UnboundedSender<PodEvent>) {
    loop {
        info!("pod watcher: and now my watch begins");
        let config = Config::default().labels(AIRFLOW_SLAVE_LABEL);
        let mut stream = Box::pin(watcher::watcher(pods.clone(), config).applied_objects());

        loop {
            match stream.next().await {
                Some(Ok(pod)) => process_pod(&pod, &tx),
                Some(Err(err)) => {
                    warn!(error = %err, "pod watch stream error; restarting watch");
                    break;
                }
                None => {
                    warn!("pod watch stream ended cleanly; restarting watch");
                    break;
                }
            }
        }

        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }
}

/// Supervises the watch task and exposes the receiving end of the watch
/// queue to the executor loop.
pub struct PodWatcher {
    pods: Api<Pod>,
    handle: JoinHandle<()>,
    tx: UnboundedSender<PodEvent>,
}

impl PodWatcher {
    /// Spawn the watcher task and return it along with the receiving end of
    /// its output queue.
    #[must_use]
    pub fn spawn(pods: Api<Pod>) -> (Self, UnboundedReceiver<PodEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(watch_loop(pods.clone(), tx.clone()));
        (Self { pods, handle, tx }, rx)
    }

    /// True unless the task has panicked or otherwise finished (a clean
    /// stream restart never finishes the task, only its inner loop).
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Abort the current task (if still running) and spawn a fresh one.
    /// After a respawn, re-watching the same label selector rediscovers
    /// pods still in flight — the watcher holds no state of its own.
    pub fn respawn(&mut self) {
        if !self.handle.is_finished() {
            self.handle.abort();
        }
        self.handle = tokio::spawn(watch_loop(self.pods.clone(), self.tx.clone()));
    }
}
