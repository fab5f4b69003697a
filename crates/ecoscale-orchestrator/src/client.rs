//! Orchestrator trait and the dry-run wrapper.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use ecoscale_core::{ReadError, ScaleError};

pub type ReadFuture<'a> = Pin<Box<dyn Future<Output = Result<u32, ReadError>> + Send + 'a>>;
pub type ScaleFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ScaleError>> + Send + 'a>>;
pub type HpaFuture<'a> =
    Pin<Box<dyn Future<Output = anyhow::Result<BTreeMap<String, HpaStatus>>> + Send + 'a>>;

/// Replica status reported by a HorizontalPodAutoscaler targeting a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HpaStatus {
    pub target_replicas: u32,
    pub current_replicas: u32,
    pub current_cpu_utilization: Option<u32>,
}

/// Read and mutate per-service replica counts.
pub trait Orchestrator: Send + Sync {
    /// Current desired replica count of the service's deployment.
    fn get_replicas<'a>(&'a self, service: &'a str) -> ReadFuture<'a>;

    /// Set the service's replica count.
    fn set_replicas<'a>(&'a self, service: &'a str, replicas: u32) -> ScaleFuture<'a>;

    /// HPA status keyed by target service. Orchestrators without HPAs
    /// report none.
    fn hpa_status(&self) -> HpaFuture<'_> {
        Box::pin(async { Ok(BTreeMap::new()) })
    }

    /// Whether a successful `set_replicas` changes anything.
    fn applies_writes(&self) -> bool {
        true
    }
}

impl<O: Orchestrator + ?Sized> Orchestrator for Arc<O> {
    fn get_replicas<'a>(&'a self, service: &'a str) -> ReadFuture<'a> {
        (**self).get_replicas(service)
    }

    fn set_replicas<'a>(&'a self, service: &'a str, replicas: u32) -> ScaleFuture<'a> {
        (**self).set_replicas(service, replicas)
    }

    fn hpa_status(&self) -> HpaFuture<'_> {
        (**self).hpa_status()
    }

    fn applies_writes(&self) -> bool {
        (**self).applies_writes()
    }
}

impl<O: Orchestrator + ?Sized> Orchestrator for Box<O> {
    fn get_replicas<'a>(&'a self, service: &'a str) -> ReadFuture<'a> {
        (**self).get_replicas(service)
    }

    fn set_replicas<'a>(&'a self, service: &'a str, replicas: u32) -> ScaleFuture<'a> {
        (**self).set_replicas(service, replicas)
    }

    fn hpa_status(&self) -> HpaFuture<'_> {
        (**self).hpa_status()
    }

    fn applies_writes(&self) -> bool {
        (**self).applies_writes()
    }
}

/// Passes reads through to `inner` and only logs writes.
pub struct DryRunOrchestrator<O> {
    inner: O,
}

impl<O: Orchestrator> DryRunOrchestrator<O> {
    pub fn new(inner: O) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }
}

impl<O: Orchestrator> Orchestrator for DryRunOrchestrator<O> {
    fn get_replicas<'a>(&'a self, service: &'a str) -> ReadFuture<'a> {
        self.inner.get_replicas(service)
    }

    fn set_replicas<'a>(&'a self, service: &'a str, replicas: u32) -> ScaleFuture<'a> {
        Box::pin(async move {
            info!(%service, replicas, "dry run: scale not applied");
            Ok(())
        })
    }

    fn hpa_status(&self) -> HpaFuture<'_> {
        self.inner.hpa_status()
    }

    fn applies_writes(&self) -> bool {
        false
    }
}
