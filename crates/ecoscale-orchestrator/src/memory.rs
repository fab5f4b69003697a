//! Process-local orchestrator backed by a replica table.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use ecoscale_core::{ReadError, ScaleError};

use crate::client::{HpaFuture, HpaStatus, Orchestrator, ReadFuture, ScaleFuture};

/// Replica counts held in memory. Services can be marked as failing
/// reads or writes to exercise the loop's error paths.
#[derive(Debug, Default)]
pub struct InMemoryOrchestrator {
    replicas: Mutex<BTreeMap<String, u32>>,
    hpas: Mutex<BTreeMap<String, HpaStatus>>,
    failing_reads: Mutex<HashSet<String>>,
    failing_writes: Mutex<HashSet<String>>,
    writes: AtomicUsize,
}

impl InMemoryOrchestrator {
    pub fn new<'a>(deployments: impl IntoIterator<Item = (&'a str, u32)>) -> Self {
        let table = deployments
            .into_iter()
            .map(|(id, n)| (id.to_string(), n))
            .collect();
        Self {
            replicas: Mutex::new(table),
            ..Self::default()
        }
    }

    /// Reads of `service` fail as if the orchestrator were unreachable.
    pub fn fail_reads(&self, service: &str) {
        lock(&self.failing_reads).insert(service.to_string());
    }

    /// Writes to `service` are rejected.
    pub fn fail_writes(&self, service: &str) {
        lock(&self.failing_writes).insert(service.to_string());
    }

    pub fn set_hpa(&self, service: &str, status: HpaStatus) {
        lock(&self.hpas).insert(service.to_string(), status);
    }

    /// Current replica count, bypassing failure injection.
    pub fn replicas(&self, service: &str) -> Option<u32> {
        lock(&self.replicas).get(service).copied()
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    fn read(&self, service: &str) -> Result<u32, ReadError> {
        if lock(&self.failing_reads).contains(service) {
            return Err(ReadError::Unreachable {
                service: service.to_string(),
                reason: "injected read failure".to_string(),
            });
        }
        self.replicas(service).ok_or_else(|| ReadError::NotFound {
            service: service.to_string(),
            reason: "no such deployment".to_string(),
        })
    }

    fn write(&self, service: &str, replicas: u32) -> Result<(), ScaleError> {
        if lock(&self.failing_writes).contains(service) {
            return Err(ScaleError::Rejected {
                service: service.to_string(),
                target: replicas,
                reason: "injected write failure".to_string(),
            });
        }
        let mut table = lock(&self.replicas);
        match table.get_mut(service) {
            Some(current) => {
                *current = replicas;
                self.writes.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None => Err(ScaleError::Rejected {
                service: service.to_string(),
                target: replicas,
                reason: "no such deployment".to_string(),
            }),
        }
    }
}

impl Orchestrator for InMemoryOrchestrator {
    fn get_replicas<'a>(&'a self, service: &'a str) -> ReadFuture<'a> {
        let result = self.read(service);
        Box::pin(async move { result })
    }

    fn set_replicas<'a>(&'a self, service: &'a str, replicas: u32) -> ScaleFuture<'a> {
        let result = self.write(service, replicas);
        Box::pin(async move { result })
    }

    fn hpa_status(&self) -> HpaFuture<'_> {
        let hpas = lock(&self.hpas).clone();
        Box::pin(async move { Ok(hpas) })
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
