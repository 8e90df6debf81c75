//! Fire-and-forget pod creation; best-effort pod deletion.

use crate::types::Result;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, PostParams};
use tracing::{error, instrument};

/// Thin wrapper around the cluster's pod API.
///
/// Launch failures are common (quota, scheduling) and non-fatal to the
/// executor: a pod that never gets created simply never produces a
/// terminal event, and the scheduler's own retry policy eventually
/// reissues the task. Delete failures other than 404 are the caller's
/// problem to log and move past.
pub struct PodLauncher {
    pods: Api<Pod>,
}

impl PodLauncher {
    #[must_use]
    pub fn new(pods: Api<Pod>) -> Self {
        Self { pods }
    }

    /// Issue a create-pod call and return immediately; do not wait for the
    /// pod to reach `Running`. Errors are logged, never propagated.
    #[instrument(skip(self, pod), fields(pod_name = pod.metadata.name.as_deref().unwrap_or("")))]
    pub async fn launch(&self, pod: Pod) {
        let pod_name = pod.metadata.name.clone().unwrap_or_default();
        match self.pods.create(&PostParams::default(), &pod).await {
            Ok(_) => tracing::info!(pod_name, "pod created"),
            Err(err) => error!(pod_name, error = %err, "failed to create pod; task will be reissued by the scheduler on timeout"),
        }
    }

    /// Best-effort delete: a 404 means the pod is already gone, which is
    /// success from the caller's perspective. Any other error propagates.
    #[instrument(skip(self))]
    pub async fn delete(&self, pod_name: &str) -> Result<()> {
        match self.pods.delete(pod_name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(err) if is_pod_already_gone(&err) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// A delete racing a pod's own natural disappearance (reaped by the
/// watcher's cleanup, or removed out-of-band) surfaces as a 404; that is
/// success from the caller's perspective, not a failure to propagate.
fn is_pod_already_gone(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("mock error {code}"),
            reason: "MockReason".to_string(),
            code,
        })
    }

    #[test]
    fn not_found_is_treated_as_already_gone() {
        assert!(is_pod_already_gone(&api_error(404)));
    }

    #[test]
    fn other_api_errors_are_not_already_gone() {
        assert!(!is_pod_already_gone(&api_error(500)));
        assert!(!is_pod_already_gone(&api_error(403)));
    }
}
