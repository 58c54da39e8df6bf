//! # Sync Coordinator
//!
//! Turns one [`SyncRequest`] into exactly one [`TerraformStatus`].
//!
//! ## Stages
//!
//! 1. Select the deploy or destroy script
//! 2. Derive the run environment from `spec.variables`
//! 3. Set up the remote-state backend (skipped without a provider)
//! 4. Render the Dockerfile into its ConfigMap
//! 5. Materialize the registry credential Secret
//! 6. Build and push the image
//! 7. Run the script, retrying with a fixed delay
//!
//! The first failing stage before 7 ends the sync with `state: error`.
//! Exhausting the retries of stage 7 ends it with `state: Failed`.
//! Every outcome is written through the [`StatusReporter`], and a failed
//! write never changes the returned status.

use crate::controller::backend::BackendRegistry;
use crate::controller::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::controller::status::StatusReporter;
use crate::controller::workload::{manifests, PodLifecycleManager, ResourceRef};
use crate::crd::{SyncRequest, TerraformStatus};
use crate::observability::metrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, Instrument};
use zeroize::Zeroizing;

mod stage;

pub use stage::{ScriptAction, StageFailure, SyncError, SyncStage};

/// Everything stage 7 needs, produced by stages 1-6
struct Prepared<'a> {
    action: ScriptAction,
    script: &'a str,
    environment: Vec<(String, String)>,
    image: String,
}

/// Drives one resource through the sync stages
#[derive(Clone)]
pub struct SyncCoordinator {
    backends: Arc<BackendRegistry>,
    workloads: PodLifecycleManager,
    status: Arc<dyn StatusReporter>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    registry_credential: Arc<Zeroizing<String>>,
}

impl SyncCoordinator {
    #[must_use]
    pub fn new(
        backends: Arc<BackendRegistry>,
        workloads: PodLifecycleManager,
        status: Arc<dyn StatusReporter>,
        retry: RetryPolicy,
        registry_credential: Zeroizing<String>,
    ) -> Self {
        Self {
            backends,
            workloads,
            status,
            retry,
            sleeper: Arc::new(TokioSleeper),
            registry_credential: Arc::new(registry_credential),
        }
    }

    /// Replace the sleeper used between apply/destroy attempts
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Run every stage for `request` and report the outcome
    pub async fn sync(&self, request: &SyncRequest) -> TerraformStatus {
        let target = ResourceRef::from_request(request);
        let span = info_span!(
            "terraform.sync",
            resource.name = %target.name,
            resource.namespace = %target.namespace,
            finalizing = request.finalizing
        );

        async {
            let start = Instant::now();
            info!("Starting sync");

            let status = match self.prepare(&target, request).await {
                Ok(prepared) => self.execute(&target, prepared).await,
                Err(failure) => {
                    error!(stage = failure.stage.name(), "{failure}");
                    TerraformStatus::error(failure.stage.action(), &failure.source)
                }
            };

            metrics::record_sync(status.state.as_str(), start.elapsed().as_secs_f64());
            info!(state = %status.state, "Sync finished: {}", status.message);

            if let Err(err) = self.status.report(&target, &status).await {
                error!("Failed to write status: {err:#}");
            }
            status
        }
        .instrument(span)
        .await
    }

    /// Stages 1-6
    async fn prepare<'r>(
        &self,
        target: &ResourceRef,
        request: &'r SyncRequest,
    ) -> Result<Prepared<'r>, StageFailure> {
        let spec = request.spec();

        let action = ScriptAction::for_request(request);
        let script = action
            .select(&spec.scripts)
            .map_err(StageFailure::at(SyncStage::Script(action)))?;
        debug!(stage = "script", "Selected {action} script");

        let environment = manifests::environment(&spec.variables);

        let backend = self
            .backends
            .setup(&spec.backend)
            .await
            .map_err(StageFailure::at(SyncStage::Backend))?;

        let dockerfile = crate::controller::workload::dockerfile::render(
            &self.workloads.settings().terraform_base_image,
            &backend.dockerfile_additions,
            backend.provider_exists,
        );
        self.workloads
            .apply_dockerfile(target, &dockerfile)
            .await
            .map_err(StageFailure::at(SyncStage::Dockerfile))?;

        self.workloads
            .apply_registry_secret(target, &self.registry_credential)
            .await
            .map_err(StageFailure::at(SyncStage::RegistrySecret))?;

        let image = self
            .workloads
            .build_image(
                target,
                &spec.git_repo,
                &spec.container_registry.image_name,
                &dockerfile,
            )
            .await
            .map_err(StageFailure::at(SyncStage::Build))?;

        Ok(Prepared {
            action,
            script,
            environment,
            image,
        })
    }

    /// Stage 7
    async fn execute(&self, target: &ResourceRef, prepared: Prepared<'_>) -> TerraformStatus {
        let Prepared {
            action,
            script,
            environment,
            image,
        } = prepared;

        let outcome = self
            .retry
            .retry(self.sleeper.as_ref(), |attempt| {
                let environment = environment.as_slice();
                let image = image.as_str();
                async move {
                    metrics::increment_run_attempts();
                    debug!(attempt, "Running {action} script");
                    self.workloads
                        .run_script(target, image, script, environment)
                        .await
                }
            })
            .await;

        match outcome {
            Ok(()) => TerraformStatus::success(),
            Err(exhausted) => {
                error!(
                    attempts = exhausted.attempts,
                    "error {}: {}",
                    SyncStage::Script(action).action(),
                    exhausted.last_error
                );
                TerraformStatus::failed(&exhausted.last_error)
            }
        }
    }
}
