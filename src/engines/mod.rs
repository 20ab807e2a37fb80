//! Speech synthesis backends.
//!
//! This module contains the concrete [`SynthesisBackend`](crate::SynthesisBackend)
//! adapters and the factory the registry uses to build them.
//!
//! # Available Backends
//!
//! - [`local`] - local neural voices (VITS/Piper ONNX). The ONNX session needs the `vits` feature.
//! - [`cloud`] - cloud voices. The Azure REST client needs the `azure` feature.

pub mod cloud;
pub mod local;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::SynthesisBackend;

use cloud::{CloudAdapter, CloudClientFactory};
use local::{LocalNeuralAdapter, SessionFactory};

/// The closed set of backend kinds a configuration entry can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    LocalNeural,
    Cloud,
}

impl BackendKind {
    /// Canonical name used in configuration documents and helper messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::LocalNeural => "sherpaonnx",
            BackendKind::Cloud => "azure",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sherpaonnx" | "sherpa" | "sherpa-onnx" | "vits" | "piper" | "local" => {
                Ok(BackendKind::LocalNeural)
            }
            "azure" | "azuretts" | "cloud" => Ok(BackendKind::Cloud),
            _ => Err(ConfigError::UnknownEngineKind(s.to_string())),
        }
    }
}

/// Builds unconfigured backends for the registry.
pub trait BackendFactory: Send + Sync {
    fn create(&self, kind: BackendKind) -> Box<dyn SynthesisBackend>;
}

/// Factory wiring each kind to its adapter and native session/client factory.
#[derive(Clone)]
pub struct DefaultBackendFactory {
    sessions: Arc<dyn SessionFactory>,
    clients: Arc<dyn CloudClientFactory>,
}

impl Default for DefaultBackendFactory {
    fn default() -> Self {
        Self {
            sessions: Arc::new(local::VitsSessionFactory),
            clients: Arc::new(cloud::AzureClientFactory),
        }
    }
}

impl DefaultBackendFactory {
    /// Use custom native factories, e.g. in-process fakes.
    pub fn with_factories(
        sessions: Arc<dyn SessionFactory>,
        clients: Arc<dyn CloudClientFactory>,
    ) -> Self {
        Self { sessions, clients }
    }
}

impl BackendFactory for DefaultBackendFactory {
    fn create(&self, kind: BackendKind) -> Box<dyn SynthesisBackend> {
        match kind {
            BackendKind::LocalNeural => {
                Box::new(LocalNeuralAdapter::with_session_factory(self.sessions.clone()))
            }
            BackendKind::Cloud => Box::new(CloudAdapter::with_client_factory(self.clients.clone())),
        }
    }
}
