//! Stages of a sync and their failures

use crate::controller::backend::BackendError;
use crate::controller::workload::WorkloadError;
use crate::crd::{Scripts, SyncRequest};
use std::fmt;
use thiserror::Error;

/// Which script a sync runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptAction {
    Deploy,
    Destroy,
}

impl ScriptAction {
    /// Deploy unless the resource is finalizing
    #[must_use]
    pub fn for_request(request: &SyncRequest) -> Self {
        if request.finalizing {
            ScriptAction::Destroy
        } else {
            ScriptAction::Deploy
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ScriptAction::Deploy => "deploy",
            ScriptAction::Destroy => "destroy",
        }
    }

    /// The script for this action; an empty script disables the action
    pub fn select(self, scripts: &Scripts) -> Result<&str, SyncError> {
        let script = match self {
            ScriptAction::Deploy => scripts.deploy.as_str(),
            ScriptAction::Destroy => scripts.destroy.as_str(),
        };
        if script.trim().is_empty() {
            Err(SyncError::MissingScript(self))
        } else {
            Ok(script)
        }
    }
}

impl fmt::Display for ScriptAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage at which a sync stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Script(ScriptAction),
    Backend,
    Dockerfile,
    RegistrySecret,
    Build,
}

impl SyncStage {
    /// What the sync was doing, as it appears in the status message
    #[must_use]
    pub fn action(self) -> &'static str {
        match self {
            SyncStage::Script(ScriptAction::Deploy) => "executing deploy script",
            SyncStage::Script(ScriptAction::Destroy) => "executing destroy script",
            SyncStage::Backend => "setting up backend",
            SyncStage::Dockerfile => "creating Dockerfile ConfigMap",
            SyncStage::RegistrySecret => "creating Docker config secret",
            SyncStage::Build => "creating build job",
        }
    }

    /// Short name used in logs
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            SyncStage::Script(_) => "script",
            SyncStage::Backend => "backend",
            SyncStage::Dockerfile => "dockerfile",
            SyncStage::RegistrySecret => "registry_secret",
            SyncStage::Build => "build",
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{0} script is missing")]
    MissingScript(ScriptAction),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Workload(#[from] WorkloadError),
}

/// A sync that stopped before the apply/destroy stage
#[derive(Debug, Error)]
#[error("error {}: {}", .stage.action(), .source)]
pub struct StageFailure {
    pub stage: SyncStage,
    #[source]
    pub source: SyncError,
}

impl StageFailure {
    /// Attach a stage to any error convertible into [`SyncError`]
    pub fn at<E: Into<SyncError>>(stage: SyncStage) -> impl FnOnce(E) -> StageFailure {
        move |err| StageFailure {
            stage,
            source: err.into(),
        }
    }
}
