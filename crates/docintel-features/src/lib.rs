//! # Docintel Features
//!
//! Feature host and the features that ship with docintel.
//!
//! ## What is a Feature?
//!
//! A feature is constructed with exactly one argument, an `Rc<CoreApi>`,
//! and reaches the rest of the system only through it. Features never
//! reference each other; they publish and observe events.
//!
//! ## Learning: Trait Objects for Features
//!
//! By defining a trait, the host can:
//! - Hold different feature implementations uniformly
//! - Use dynamic dispatch for lifecycle calls
//! - Reject features built against an incompatible core

mod upload;

pub use upload::{RejectReason, UPLOAD_CONTAINER, UploadFeature, UploadOutcome};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Feature system errors.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("Feature not found: {0}")]
    NotFound(String),

    #[error("Feature already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Container not found: {0}")]
    ContainerMissing(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Incompatible feature version: expected {expected}, got {got}")]
    IncompatibleVersion { expected: String, got: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Core API version for compatibility checking.
pub const API_VERSION: &str = "0.1.0";

/// Feature manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureManifest {
    /// Feature identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Version string
    pub version: String,

    /// Feature description
    #[serde(default)]
    pub description: String,

    /// Required core API version
    pub api_version: String,
}

impl FeatureManifest {
    /// Parses a manifest from TOML.
    pub fn from_toml(source: &str) -> Result<Self, FeatureError> {
        toml::from_str(source).map_err(|e| FeatureError::InvalidManifest(e.to_string()))
    }
}

/// Feature state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureState {
    /// Registered but not activated
    Installed,
    /// Activated
    Active,
    /// Activation failed
    Error,
    /// Turned off by the host
    Disabled,
}

/// A unit of behavior plugged into the host.
pub trait Feature {
    /// Returns the feature manifest.
    fn manifest(&self) -> &FeatureManifest;

    /// Called when the feature is activated.
    fn activate(&mut self) -> Result<(), FeatureError>;

    /// Called when the feature is deactivated.
    fn deactivate(&mut self) -> Result<(), FeatureError>;
}

/// Information about a registered feature.
pub struct FeatureInfo {
    feature: Box<dyn Feature>,
    /// Current state
    pub state: FeatureState,
    /// Error message (if state is Error)
    pub error: Option<String>,
}

impl FeatureInfo {
    pub fn manifest(&self) -> &FeatureManifest {
        self.feature.manifest()
    }
}

/// Feature manager.
#[derive(Default)]
pub struct FeatureManager {
    /// Registered features
    features: HashMap<String, FeatureInfo>,

    /// Registration order (activation order)
    order: Vec<String>,
}

impl FeatureManager {
    /// Creates a new feature manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a feature. Returns its ID.
    pub fn register(&mut self, feature: Box<dyn Feature>) -> Result<String, FeatureError> {
        let manifest = feature.manifest();
        let id = manifest.id.clone();

        if self.features.contains_key(&id) {
            return Err(FeatureError::AlreadyRegistered(id));
        }

        // Version compatibility check
        if !Self::is_compatible(&manifest.api_version) {
            return Err(FeatureError::IncompatibleVersion {
                expected: API_VERSION.to_string(),
                got: manifest.api_version.clone(),
            });
        }

        tracing::debug!("Registered feature: {}", id);
        self.features.insert(
            id.clone(),
            FeatureInfo {
                feature,
                state: FeatureState::Installed,
                error: None,
            },
        );
        self.order.push(id.clone());
        Ok(id)
    }

    /// Checks if an API version is compatible.
    fn is_compatible(version: &str) -> bool {
        // Simple major version check
        let current_major = API_VERSION.split('.').next().unwrap_or("0");
        let feature_major = version.split('.').next().unwrap_or("0");
        current_major == feature_major
    }

    /// Activates a feature.
    ///
    /// A failing feature is parked in [`FeatureState::Error`].
    pub fn activate(&mut self, id: &str) -> Result<(), FeatureError> {
        let info = self
            .features
            .get_mut(id)
            .ok_or_else(|| FeatureError::NotFound(id.to_string()))?;

        match info.state {
            FeatureState::Active => return Ok(()),
            FeatureState::Disabled => {
                tracing::debug!("Skipping disabled feature: {}", id);
                return Ok(());
            }
            FeatureState::Installed | FeatureState::Error => {}
        }

        match info.feature.activate() {
            Ok(()) => {
                info.state = FeatureState::Active;
                info.error = None;
                tracing::info!("Activated feature: {}", id);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to activate feature {}: {}", id, e);
                info.state = FeatureState::Error;
                info.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Activates every registered feature in registration order.
    ///
    /// Returns the features that failed.
    pub fn activate_all(&mut self) -> Vec<(String, FeatureError)> {
        let mut failures = Vec::new();
        for id in self.order.clone() {
            if let Err(e) = self.activate(&id) {
                failures.push((id, e));
            }
        }
        failures
    }

    /// Deactivates a feature.
    pub fn deactivate(&mut self, id: &str) -> Result<(), FeatureError> {
        let info = self
            .features
            .get_mut(id)
            .ok_or_else(|| FeatureError::NotFound(id.to_string()))?;

        if info.state != FeatureState::Active {
            return Ok(());
        }

        info.feature.deactivate()?;
        info.state = FeatureState::Installed;
        tracing::info!("Deactivated feature: {}", id);

        Ok(())
    }

    /// Deactivates a feature and keeps it from being activated.
    pub fn disable(&mut self, id: &str) -> Result<(), FeatureError> {
        self.deactivate(id)?;
        if let Some(info) = self.features.get_mut(id) {
            info.state = FeatureState::Disabled;
        }
        Ok(())
    }

    /// Returns information about a feature.
    pub fn get(&self, id: &str) -> Option<&FeatureInfo> {
        self.features.get(id)
    }

    /// Returns the state of a feature.
    pub fn state(&self, id: &str) -> Option<FeatureState> {
        self.features.get(id).map(|info| info.state)
    }

    /// Returns all features in registration order.
    pub fn list(&self) -> impl Iterator<Item = &FeatureInfo> {
        self.order.iter().filter_map(|id| self.features.get(id))
    }

    /// Returns active features.
    pub fn active(&self) -> impl Iterator<Item = &FeatureInfo> {
        self.list().filter(|info| info.state == FeatureState::Active)
    }
}
