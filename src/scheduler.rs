//! The trait boundary through which the executor reports results back to
//! the scheduler, without touching the scheduler's task-state store
//! directly.

use crate::types::{Result, TaskKey, TaskState};
use async_trait::async_trait;

/// Implemented by the scheduler. All database mutation belongs here; the
/// executor core never opens a session or imports a scheduler ORM type.
#[async_trait]
pub trait SchedulerReporter: Send + Sync {
    /// Reset any tasks left in `QUEUED` state back to `NONE`, called once
    /// at executor startup. A crash between `QUEUED` being set and the pod
    /// actually launching would otherwise strand those tasks forever.
    async fn clear_queued(&self) -> Result<()>;

    /// Report a terminal outcome for one task attempt.
    async fn report_result(&self, key: &TaskKey, state: TaskState, pod_name: &str) -> Result<()>;
}

/// A `SchedulerReporter` that only logs. Useful as the default wiring for a
/// standalone pod-executor process that has no in-process scheduler to call
/// back into; a deployment with a real scheduler should supply its own
/// implementation instead.
#[derive(Debug, Clone, Default)]
pub struct LoggingScheduler;

#[async_trait]
impl SchedulerReporter for LoggingScheduler {
    async fn clear_queued(&self) -> Result<()> {
        tracing::info!("clear_queued called; no scheduler store configured, nothing to reset");
        Ok(())
    }

    async fn report_result(&self, key: &TaskKey, state: TaskState, pod_name: &str) -> Result<()> {
        tracing::info!(key = %key, %state, pod_name, "task result (no scheduler store configured)");
        Ok(())
    }
}

#[cfg(test)]
pub mod mock {
    use super::{Result, SchedulerReporter, TaskKey, TaskState};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// An in-memory fake used by the executor's own tests and available to
    /// downstream scheduler implementations for their integration tests.
    #[derive(Default)]
    pub struct RecordingScheduler {
        pub cleared: Mutex<u32>,
        pub reported: Mutex<Vec<(TaskKey, TaskState, String)>>,
    }

    #[async_trait]
    impl SchedulerReporter for RecordingScheduler {
        async fn clear_queued(&self) -> Result<()> {
            *self.cleared.lock().unwrap() += 1;
            Ok(())
        }

        async fn report_result(&self, key: &TaskKey, state: TaskState, pod_name: &str) -> Result<()> {
            self.reported.lock().unwrap().push((key.clone(), state, pod_name.to_string()));
            Ok(())
        }
    }
}
