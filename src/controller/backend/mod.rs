//! # Backend Providers
//!
//! Remote-state backends a Terraform resource can select through
//! `spec.backend.provider`.
//!
//! Each backend implements [`BackendProvider`]. The [`BackendRegistry`] is
//! built once at startup and is the only place that maps provider names to
//! implementations; adding a backend means registering it here, nothing in
//! the sync pipeline changes.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub mod aws;

pub use aws::AwsBackend;

/// Key in `spec.backend` that selects the provider
pub const PROVIDER_KEY: &str = "provider";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("unknown backend provider: {0}")]
    UnknownProvider(String),
    #[error("missing required backend key '{key}' for {provider} provider")]
    MissingKey { provider: String, key: String },
    #[error("invalid backend value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("error setting up {provider} backend: {message}")]
    Setup { provider: String, message: String },
}

/// Capability for one remote-state backend
#[async_trait]
pub trait BackendProvider: Send + Sync {
    /// Name matched against `spec.backend.provider`
    fn name(&self) -> &'static str;

    /// Validate the backend keys and initialize whatever remote state the backend needs
    ///
    /// Missing or malformed keys must be reported before any remote call is made.
    async fn setup_backend(&self, config: &BTreeMap<String, String>) -> Result<(), BackendError>;

    /// Dockerfile fragment the image needs for this backend (empty when none)
    fn dockerfile_additions(&self) -> String;
}

/// Result of the backend stage of a sync
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendSetup {
    pub dockerfile_additions: String,
    pub provider_exists: bool,
}

/// Name → provider lookup, fixed after startup
#[derive(Clone, Default)]
pub struct BackendRegistry {
    providers: HashMap<&'static str, Arc<dyn BackendProvider>>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.providers.keys().collect();
        names.sort();
        f.debug_struct("BackendRegistry")
            .field("providers", &names)
            .finish()
    }
}

impl BackendRegistry {
    /// Empty registry; every provider name is unknown
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in backend
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AwsBackend::new()));
        registry
    }

    /// Add a provider, replacing any previous one with the same name
    pub fn register(&mut self, provider: Arc<dyn BackendProvider>) {
        self.providers.insert(provider.name(), provider);
    }

    /// Resolve a provider by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn BackendProvider>, BackendError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::UnknownProvider(name.to_string()))
    }

    /// Run the backend stage for `spec.backend`
    ///
    /// A missing map or a missing/empty `provider` key is not an error: the
    /// sync continues without a backend and without Dockerfile additions.
    pub async fn setup(
        &self,
        backend: &BTreeMap<String, String>,
    ) -> Result<BackendSetup, BackendError> {
        if backend.is_empty() {
            info!("No backend provided, continuing without backend setup");
            return Ok(BackendSetup::default());
        }

        let Some(provider_name) = backend
            .get(PROVIDER_KEY)
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
        else {
            info!("Backend provided without specifying provider, continuing without backend setup");
            return Ok(BackendSetup::default());
        };

        let provider = self.get(provider_name)?;
        debug!(backend.provider = provider_name, "Setting up backend");
        provider.setup_backend(backend).await?;
        crate::observability::metrics::increment_backend_setups(provider.name());

        Ok(BackendSetup {
            dockerfile_additions: provider.dockerfile_additions(),
            provider_exists: true,
        })
    }
}

/// Fetch a required, non-empty backend key
pub(crate) fn required_key<'a>(
    config: &'a BTreeMap<String, String>,
    provider: &str,
    key: &str,
) -> Result<&'a str, BackendError> {
    config
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BackendError::MissingKey {
            provider: provider.to_string(),
            key: key.to_string(),
        })
}
