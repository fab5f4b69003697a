//! kubectl-backed orchestrator.
//!
//! ```text
//! get_replicas  → kubectl get deployment <svc> -n <ns> -o jsonpath={.spec.replicas}
//! set_replicas  → kubectl scale deployment <svc> --replicas=<n> -n <ns>
//! hpa_status    → kubectl get hpa -n <ns> -o json
//! ```
//!
//! Every invocation is bounded by the configured timeout; the child is
//! killed when the timeout fires.

use std::collections::BTreeMap;
use std::process::Output;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use ecoscale_core::{ClusterConfig, ReadError, ScaleError};

use crate::client::{HpaFuture, HpaStatus, Orchestrator, ReadFuture, ScaleFuture};

/// Why a kubectl invocation produced no usable output.
#[derive(Debug)]
enum RunFailure {
    Spawn(std::io::Error),
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct Kubectl {
    binary: String,
    namespace: String,
    timeout: Duration,
}

impl Kubectl {
    pub fn new(binary: &str, namespace: &str, timeout: Duration) -> Self {
        Self {
            binary: binary.to_string(),
            namespace: namespace.to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &ClusterConfig) -> Self {
        Self::new(&config.kubectl, &config.namespace, config.timeout())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn run(&self, args: &[&str]) -> Result<Output, RunFailure> {
        debug!(binary = %self.binary, ?args, "invoking kubectl");
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).kill_on_drop(true);
        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(RunFailure::Spawn),
            Err(_) => Err(RunFailure::TimedOut),
        }
    }

    async fn read_replicas(&self, service: &str) -> Result<u32, ReadError> {
        let output = self
            .run(&[
                "get",
                "deployment",
                service,
                "-n",
                self.namespace.as_str(),
                "-o",
                "jsonpath={.spec.replicas}",
            ])
            .await
            .map_err(|f| match f {
                RunFailure::Spawn(e) => ReadError::Unreachable {
                    service: service.to_string(),
                    reason: e.to_string(),
                },
                RunFailure::TimedOut => ReadError::Timeout {
                    service: service.to_string(),
                    timeout: self.timeout,
                },
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(if stderr.contains("NotFound") || stderr.contains("not found") {
                ReadError::NotFound {
                    service: service.to_string(),
                    reason: stderr,
                }
            } else {
                ReadError::Unreachable {
                    service: service.to_string(),
                    reason: exit_reason(&output, stderr),
                }
            });
        }

        parse_replicas(service, &String::from_utf8_lossy(&output.stdout))
    }

    async fn scale(&self, service: &str, replicas: u32) -> Result<(), ScaleError> {
        let flag = format!("--replicas={replicas}");
        let output = self
            .run(&[
                "scale",
                "deployment",
                service,
                flag.as_str(),
                "-n",
                self.namespace.as_str(),
            ])
            .await
            .map_err(|f| match f {
                RunFailure::Spawn(e) => ScaleError::Unreachable {
                    service: service.to_string(),
                    reason: e.to_string(),
                },
                RunFailure::TimedOut => ScaleError::Timeout {
                    service: service.to_string(),
                    timeout: self.timeout,
                },
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ScaleError::Rejected {
                service: service.to_string(),
                target: replicas,
                reason: exit_reason(&output, stderr),
            });
        }
        Ok(())
    }

    async fn list_hpas(&self) -> anyhow::Result<BTreeMap<String, HpaStatus>> {
        let output = match self
            .run(&["get", "hpa", "-n", self.namespace.as_str(), "-o", "json"])
            .await
        {
            Ok(o) => o,
            Err(RunFailure::Spawn(e)) => return Err(e).context("spawning kubectl"),
            Err(RunFailure::TimedOut) => {
                anyhow::bail!("kubectl get hpa timed out after {:?}", self.timeout)
            }
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            anyhow::bail!("kubectl get hpa failed: {}", exit_reason(&output, stderr));
        }
        parse_hpa_list(&output.stdout)
    }
}

impl Orchestrator for Kubectl {
    fn get_replicas<'a>(&'a self, service: &'a str) -> ReadFuture<'a> {
        Box::pin(self.read_replicas(service))
    }

    fn set_replicas<'a>(&'a self, service: &'a str, replicas: u32) -> ScaleFuture<'a> {
        Box::pin(self.scale(service, replicas))
    }

    fn hpa_status(&self) -> HpaFuture<'_> {
        Box::pin(self.list_hpas())
    }
}

fn exit_reason(output: &Output, stderr: String) -> String {
    if stderr.is_empty() {
        format!("kubectl exited with {}", output.status)
    } else {
        stderr
    }
}

/// Parse the jsonpath output of `kubectl get deployment`.
pub fn parse_replicas(service: &str, stdout: &str) -> Result<u32, ReadError> {
    let trimmed = stdout.trim();
    trimmed.parse::<u32>().map_err(|_| ReadError::Parse {
        service: service.to_string(),
        output: trimmed.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct HpaList {
    #[serde(default)]
    items: Vec<HpaItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HpaItem {
    spec: HpaSpec,
    status: HpaItemStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct HpaSpec {
    scale_target_ref: ScaleTargetRef,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScaleTargetRef {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct HpaItemStatus {
    desired_replicas: u32,
    current_replicas: u32,
    #[serde(rename = "currentCPUUtilizationPercentage")]
    current_cpu_utilization_percentage: Option<u32>,
}

/// Parse `kubectl get hpa -o json` into status keyed by target deployment.
pub fn parse_hpa_list(json: &[u8]) -> anyhow::Result<BTreeMap<String, HpaStatus>> {
    let list: HpaList = serde_json::from_slice(json).context("decoding hpa list")?;
    Ok(list
        .items
        .into_iter()
        .filter(|item| !item.spec.scale_target_ref.name.is_empty())
        .map(|item| {
            (
                item.spec.scale_target_ref.name,
                HpaStatus {
                    target_replicas: item.status.desired_replicas,
                    current_replicas: item.status.current_replicas,
                    current_cpu_utilization: item.status.current_cpu_utilization_percentage,
                },
            )
        })
        .collect())
}
