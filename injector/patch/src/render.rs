//! Renders container and volume fragments.
//!
//! Every fragment is built as a typed Kubernetes object and then encoded as a
//! JSON value, so optional environment variables and mounts never need
//! hand-placed separators.

use k8s_openapi::{
    api::core::v1::{EnvVar, ResourceRequirements, SecurityContext, VolumeMount},
    apimachinery::pkg::api::resource::Quantity,
};
use std::{collections::BTreeMap, fmt, num::ParseIntError};
use thiserror::Error;

mod init;
mod sidecar;
mod tracers;

pub use self::{
    init::render_proxy_init,
    sidecar::render_sidecars,
    tracers::{render_tracing_init, render_tracing_volume},
};

/// A single JSON value destined for a patch operation: one container, volume,
/// or secret reference.
pub type Fragment = serde_json::Value;

/// The volume shared by the tracing init containers and the proxy.
pub const TRACING_CONFIG_VOLUME: &str = "envoy-tracing-config";
pub const TRACING_CONFIG_DIR: &str = "/tmp/envoy";
pub const TRACING_CONFIG_FILE: &str = "/tmp/envoy/envoyconf.yaml";

/// Describes the proxy sidecar (and its optional X-Ray daemon).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SidecarConfig {
    pub image: String,
    pub mesh_name: String,
    pub virtual_node_name: String,
    pub preview: bool,
    pub log_level: String,
    pub region: String,
    pub cpu_requests: String,
    pub memory_requests: String,

    /// When set, the proxy is configured to emit Jaeger (zipkin) traces.
    pub jaeger: Option<Collector>,

    /// When set, the proxy is configured to emit Datadog traces.
    pub datadog: Option<Collector>,

    pub inject_xray_sidecar: bool,
    pub enable_stats_tags: bool,
    pub enable_stats_d: bool,

    /// The application's service-account mount, shared with the sidecars so
    /// that they can assume the pod's IAM role.
    pub service_account_mount: Option<VolumeMount>,
}

/// Describes the init container that installs the traffic redirect rules.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProxyInitConfig {
    pub image: String,

    /// Comma-separated application ports whose inbound traffic is redirected.
    pub ports: String,
    pub egress_ignored_ips: String,
    pub egress_ignored_ports: String,
    pub cpu_requests: String,
    pub memory_requests: String,
}

/// The address of an external trace collector.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Collector {
    pub address: String,
    pub port: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Tracer {
    Datadog,
    Jaeger,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{container} container requires a non-empty {field}")]
    MissingField {
        container: &'static str,
        field: &'static str,
    },

    #[error("{tracer} tracing is enabled but no collector address is set")]
    MissingCollectorAddress { tracer: Tracer },

    #[error("{tracer} collector port {port:?} is invalid: {source}")]
    InvalidCollectorPort {
        tracer: Tracer,
        port: String,
        #[source]
        source: ParseIntError,
    },

    #[error("failed to encode {name} fragment: {source}")]
    Json {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {tracer} proxy configuration: {source}")]
    Yaml {
        tracer: Tracer,
        #[source]
        source: serde_yaml::Error,
    },
}

// === impl SidecarConfig ===

impl SidecarConfig {
    pub fn tracing_enabled(&self) -> bool {
        self.jaeger.is_some() || self.datadog.is_some()
    }

    /// Enabled tracers, Datadog first.
    pub fn tracers(&self) -> impl Iterator<Item = (Tracer, &Collector)> + '_ {
        let datadog = self.datadog.as_ref().map(|c| (Tracer::Datadog, c));
        let jaeger = self.jaeger.as_ref().map(|c| (Tracer::Jaeger, c));
        datadog.into_iter().chain(jaeger)
    }
}

// === impl Tracer ===

impl fmt::Display for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Datadog => f.write_str("datadog"),
            Self::Jaeger => f.write_str("jaeger"),
        }
    }
}

// === helpers ===

fn require(container: &'static str, field: &'static str, value: &str) -> Result<(), RenderError> {
    if value.trim().is_empty() {
        return Err(RenderError::MissingField { container, field });
    }
    Ok(())
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

/// Empty quantities are left out rather than rendered as `""`, which the API
/// server would reject.
fn requests(cpu: &str, memory: &str) -> Option<ResourceRequirements> {
    let requests = [("cpu", cpu), ("memory", memory)]
        .into_iter()
        .filter(|(_, q)| !q.is_empty())
        .map(|(k, q)| (k.to_string(), Quantity(q.to_string())))
        .collect::<BTreeMap<_, _>>();
    if requests.is_empty() {
        return None;
    }
    Some(ResourceRequirements {
        requests: Some(requests),
        ..Default::default()
    })
}

fn run_as_proxy() -> SecurityContext {
    SecurityContext {
        run_as_user: Some(crate::PROXY_UID),
        ..Default::default()
    }
}

fn tracing_config_mount() -> VolumeMount {
    VolumeMount {
        name: TRACING_CONFIG_VOLUME.to_string(),
        mount_path: TRACING_CONFIG_DIR.to_string(),
        ..Default::default()
    }
}

fn to_fragment<T: serde::Serialize>(name: &'static str, obj: &T) -> Result<Fragment, RenderError> {
    serde_json::to_value(obj).map_err(|source| RenderError::Json { name, source })
}
