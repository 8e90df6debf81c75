//! Glue: pulls from the task queue, drives the launcher, drains the
//! watcher, and emits results — the bidirectional bridge between a
//! scheduler's task queue and the cluster.

use crate::config::ExecutorConfig;
use crate::identity::IdentityCodec;
use crate::launcher::PodLauncher;
use crate::podspec::PodSpecBuilder;
use crate::scheduler::SchedulerReporter;
use crate::types::{PodEvent, Result, TaskCommand, TaskKey, TaskResult, TaskState};
use crate::watcher::PodWatcher;
use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, instrument, warn};

/// The bidirectional bridge between the scheduler's task queue and the
/// cluster's pod API. Single-threaded cooperative logic driven entirely by
/// external `sync()` calls: no operation here blocks.
pub struct ExecutorLoop {
    config: ExecutorConfig,
    scheduler: Arc<dyn SchedulerReporter>,
    launcher: PodLauncher,

    watcher: PodWatcher,
    watch_rx: UnboundedReceiver<PodEvent>,

    result_tx: UnboundedSender<TaskResult>,
    result_rx: UnboundedReceiver<TaskResult>,

    task_queue: VecDeque<(TaskKey, TaskCommand)>,
    running: HashMap<TaskKey, String>,

    /// `TaskKey -> outcome`, read by the scheduler after each `sync()`.
    event_buffer: HashMap<TaskKey, TaskState>,

    /// Set by `end()`; once set, `submit` is refused and shutdown proceeds
    /// once `task_queue` drains.
    stopping: bool,
}

impl ExecutorLoop {
    /// Opens the pod watcher and resets any tasks stranded in `QUEUED`
    /// state via the scheduler callback.
    pub async fn start(config: ExecutorConfig, scheduler: Arc<dyn SchedulerReporter>, client: kube::Client) -> Result<Self> {
        config.validate()?;

        let pods: Api<Pod> = Api::namespaced(client, &config.namespace);
        let launcher = PodLauncher::new(pods.clone());
        let (watcher, watch_rx) = PodWatcher::spawn(pods);
        let (result_tx, result_rx) = mpsc::unbounded_channel();

        scheduler.clear_queued().await?;

        info!(namespace = %config.namespace, "executor loop started");

        Ok(Self {
            config,
            scheduler,
            launcher,
            watcher,
            watch_rx,
            result_tx,
            result_rx,
            task_queue: VecDeque::new(),
            running: HashMap::new(),
            event_buffer: HashMap::new(),
            stopping: false,
        })
    }

    /// Non-blocking enqueue of a task the scheduler wants launched.
    #[instrument(skip(self, command), fields(key = %key))]
    pub fn submit(&mut self, key: TaskKey, command: TaskCommand) {
        if self.stopping {
            warn!(key = %key, "submit called after end(); ignoring");
            return;
        }
        debug!(key = %key, "task submitted");
        self.task_queue.push_back((key, command));
    }

    /// One non-blocking tick: check watcher liveness, drain both queues,
    /// launch at most one pending task. After this returns, read outcomes
    /// via [`Self::event_buffer`].
    #[instrument(skip(self))]
    pub async fn sync(&mut self) -> Result<()> {
        self.check_watcher_liveness();
        self.drain_watch_queue();
        self.drain_result_queue().await?;
        self.launch_one_pending_task().await;
        Ok(())
    }

    fn check_watcher_liveness(&mut self) {
        if !self.watcher.is_alive() {
            warn!("pod watcher died; respawning");
            self.watcher.respawn();
        }
    }

    /// Drain every currently-available watch event, decoding labels back to
    /// a `TaskKey` and forwarding onto the result queue. An event whose
    /// labels fail to decode is dropped with a warning.
    fn drain_watch_queue(&mut self) {
        while let Ok(event) = self.watch_rx.try_recv() {
            match IdentityCodec::decode_labels(&event.labels) {
                Some(key) => {
                    info!(key = %key, pod_name = %event.pod_name, outcome = %event.outcome, "finishing job");
                    let _ = self.result_tx.send(TaskResult { key, state: event.outcome, pod_name: event.pod_name });
                }
                None => {
                    warn!(pod_name = %event.pod_name, "dropping terminal event with undecodable labels");
                }
            }
        }
    }

    /// Drain every currently-available result, reporting it to the
    /// scheduler and, for terminal states, deleting the pod (if configured)
    /// and releasing the task from the running set.
    async fn drain_result_queue(&mut self) -> Result<()> {
        while let Ok(result) = self.result_rx.try_recv() {
            debug!(key = %result.key, state = %result.state, "reporting result to scheduler");
            if let Err(err) = self.scheduler.report_result(&result.key, result.state, &result.pod_name).await {
                warn!(key = %result.key, error = %err, "scheduler rejected result report");
            }

            if self.config.delete_worker_pods {
                if let Err(err) = self.launcher.delete(&result.pod_name).await {
                    warn!(pod_name = %result.pod_name, error = %err, "failed to delete terminal pod");
                }
            }

            self.running.remove(&result.key);
            self.event_buffer.insert(result.key, result.state);
        }
        Ok(())
    }

    /// Pop exactly one pending task (if any) and launch it. Bounding launch
    /// to one per tick lets admission be rate-limited by the caller's own
    /// poll interval.
    async fn launch_one_pending_task(&mut self) {
        let Some((key, command)) = self.task_queue.pop_front() else {
            return;
        };

        let pod_name = IdentityCodec::encode_pod_name(&key.dag_id, &key.task_id);
        info!(key = %key, pod_name = %pod_name, "launching pod");

        match PodSpecBuilder::build(&self.config.namespace, &pod_name, &key, &command, &self.config) {
            Ok(pod) => {
                self.running.insert(key, pod_name);
                self.launcher.launch(pod).await;
            }
            Err(err) => {
                warn!(key = %key, error = %err, "failed to build pod spec; dropping task for scheduler retry");
            }
        }
    }

    /// The scheduler's view of outcomes produced since the last drain.
    pub fn drain_event_buffer(&mut self) -> HashMap<TaskKey, TaskState> {
        std::mem::take(&mut self.event_buffer)
    }

    #[must_use]
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Block until the locally-buffered task queue is drained (every
    /// currently-queued task has been launched). Does not kill in-flight
    /// pods; the watcher, on whichever executor instance survives, reaps
    /// them once they reach a terminal phase.
    pub async fn end(&mut self) -> Result<()> {
        self.stopping = true;
        while !self.task_queue.is_empty() {
            self.launch_one_pending_task().await;
        }
        info!("executor loop drained and stopped");
        Ok(())
    }

    /// Abort immediately without draining the task queue.
    pub fn terminate(&mut self) {
        self.stopping = true;
        self.task_queue.clear();
        info!("executor loop terminated without draining");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::mock::RecordingScheduler;
    use chrono::Utc;

    fn key(n: &str) -> TaskKey {
        TaskKey::new("dag1", n, Utc::now())
    }

    /// Exercises the queue-draining plumbing without a real cluster: feeds
    /// a terminal `PodEvent` directly onto the watch channel the way the
    /// watcher task would, then asserts `sync()` routes it all the way to
    /// the scheduler and the event buffer.
    #[tokio::test]
    async fn drains_a_manually_injected_terminal_event_to_the_scheduler() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let (watch_tx, watch_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();

        let task_key = key("task1");
        let labels = IdentityCodec::encode_labels(&task_key);
        watch_tx
            .send(PodEvent { pod_name: "pod-1".to_string(), outcome: TaskState::Succeeded, labels })
            .unwrap();

        // Build an ExecutorLoop around channel ends directly (bypassing
        // start()'s cluster client requirement) to unit-test the drain path.
        let client = kube::Client::try_from(kube::Config::new("https://127.0.0.1:1".parse().unwrap()))
            .expect("constructing a client does not require connecting");
        let pods: Api<Pod> = Api::namespaced(client.clone(), "default");
        let (watcher, _rx) = PodWatcher::spawn(pods.clone());

        let mut executor = ExecutorLoop {
            config: ExecutorConfig::default(),
            scheduler: scheduler.clone(),
            launcher: PodLauncher::new(pods),
            watcher,
            watch_rx,
            result_tx,
            result_rx,
            task_queue: VecDeque::new(),
            running: HashMap::new(),
            event_buffer: HashMap::new(),
            stopping: false,
        };
        executor.running.insert(task_key.clone(), "pod-1".to_string());

        executor.drain_watch_queue();
        executor.drain_result_queue().await.unwrap();

        let reported = scheduler.reported.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].0, task_key);
        assert_eq!(reported[0].1, TaskState::Succeeded);
        assert!(executor.running_count() == 0 || !executor.running.contains_key(&task_key));

        let mut buffer = executor.drain_event_buffer();
        assert_eq!(buffer.remove(&task_key), Some(TaskState::Succeeded));
    }

    #[test]
    fn submit_after_end_is_ignored() {
        // stopping logic alone, no async needed
        let mut queue: VecDeque<(TaskKey, TaskCommand)> = VecDeque::new();
        let stopping = true;
        if !stopping {
            queue.push_back((key("task1"), "echo hi".to_string()));
        }
        assert!(queue.is_empty());
    }
}
