use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use thiserror::Error;
use tracing::{error, info};

pub const FAILURE_DIAGNOSTIC: &str = "Injected deployment failure: fail_deploy marker present";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeployGateError {
    #[error("{diagnostic} ({marker})", diagnostic = FAILURE_DIAGNOSTIC)]
    MarkerPresent { marker: String },
}

/// An external on/off switch the gate can look at.
pub trait MarkerProbe: Send + Sync {
    fn describe(&self) -> String;
    fn is_present(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMarker {
    path: PathBuf,
}

impl FileMarker {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl MarkerProbe for FileMarker {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn is_present(&self) -> bool {
        self.path.exists()
    }
}

/// Reads a boolean environment flag (`1`, `true`, `yes`, `on`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFlagMarker {
    key: String,
}

impl EnvFlagMarker {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
        }
    }
}

impl MarkerProbe for EnvFlagMarker {
    fn describe(&self) -> String {
        format!("env {}", self.key)
    }

    fn is_present(&self) -> bool {
        std::env::var(&self.key)
            .map(|value| {
                matches!(
                    value.trim().to_ascii_lowercase().as_str(),
                    "1" | "true" | "yes" | "on"
                )
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
    Pass,
    Fail { marker: String },
}

/// Startup check evaluated at most once. The first call to `verdict` or
/// `check` probes the markers; every later call returns the same answer.
pub struct DeployGate {
    probes: Vec<Box<dyn MarkerProbe>>,
    verdict: OnceLock<GateVerdict>,
}

impl DeployGate {
    pub fn new(probes: Vec<Box<dyn MarkerProbe>>) -> Self {
        Self {
            probes,
            verdict: OnceLock::new(),
        }
    }

    pub fn is_evaluated(&self) -> bool {
        self.verdict.get().is_some()
    }

    pub fn verdict(&self) -> &GateVerdict {
        self.verdict.get_or_init(|| {
            let verdict = self
                .probes
                .iter()
                .find(|probe| probe.is_present())
                .map(|probe| GateVerdict::Fail {
                    marker: probe.describe(),
                })
                .unwrap_or(GateVerdict::Pass);
            match &verdict {
                GateVerdict::Pass => info!(probes = self.probes.len(), "deploy gate passed"),
                GateVerdict::Fail { marker } => {
                    error!(marker = %marker, "{}", FAILURE_DIAGNOSTIC)
                }
            }
            verdict
        })
    }

    pub fn check(&self) -> Result<(), DeployGateError> {
        match self.verdict() {
            GateVerdict::Pass => Ok(()),
            GateVerdict::Fail { marker } => Err(DeployGateError::MarkerPresent {
                marker: marker.clone(),
            }),
        }
    }
}
