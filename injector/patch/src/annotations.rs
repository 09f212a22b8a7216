//! Pod annotations read and written by the injector.
//!
//! In CNI mode the traffic redirect is installed by the node's CNI plugin
//! rather than by an init container, so the injector instead publishes the
//! redirect settings as pod annotations.

use crate::{
    pointer::{self, InvalidPointer},
    ProxyInitConfig, PROXY_UID,
};
use json_patch::{AddOperation, PatchOperation, ReplaceOperation};
use std::collections::BTreeMap;

pub type Map = BTreeMap<String, String>;

/// Enables CNI mode when set to `enabled`.
pub const APPMESH_CNI: &str = "appmesh.k8s.aws/appmeshCNI";

/// Disables injection when set to `disabled`.
pub const SIDECAR_INJECTOR_WEBHOOK: &str = "appmesh.k8s.aws/sidecarInjectorWebhook";

pub const EGRESS_IGNORED_IPS: &str = "appmesh.k8s.aws/egressIgnoredIPs";
pub const EGRESS_IGNORED_PORTS: &str = "appmesh.k8s.aws/egressIgnoredPorts";
pub const PORTS: &str = "appmesh.k8s.aws/ports";
pub const IGNORED_UID: &str = "appmesh.k8s.aws/ignoredUID";
pub const PROXY_EGRESS_PORT: &str = "appmesh.k8s.aws/proxyEgressPort";
pub const PROXY_INGRESS_PORT: &str = "appmesh.k8s.aws/proxyIngressPort";

pub const VIRTUAL_NODE: &str = "appmesh.k8s.aws/virtualNode";
pub const CPU_REQUESTS: &str = "appmesh.k8s.aws/cpuRequests";
pub const MEMORY_REQUESTS: &str = "appmesh.k8s.aws/memoryRequests";

const ANNOTATIONS_PATH: &str = "/metadata/annotations";

/// Values fixed by the mesh runtime: the UID whose traffic bypasses the proxy
/// and the ports the proxy listens on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshRuntime {
    pub ignored_uid: String,
    pub proxy_egress_port: String,
    pub proxy_ingress_port: String,
}

// === impl MeshRuntime ===

impl Default for MeshRuntime {
    fn default() -> Self {
        Self {
            ignored_uid: PROXY_UID.to_string(),
            proxy_egress_port: "15001".to_string(),
            proxy_ingress_port: "15000".to_string(),
        }
    }
}

pub fn cni_enabled(annotations: Option<&Map>) -> bool {
    annotations
        .and_then(|a| a.get(APPMESH_CNI))
        .is_some_and(|v| v == "enabled")
}

/// The annotations describing the redirect for the CNI plugin, ordered by
/// key.
pub fn cni_annotations(init: &ProxyInitConfig, runtime: &MeshRuntime) -> Map {
    [
        (EGRESS_IGNORED_IPS, init.egress_ignored_ips.as_str()),
        (EGRESS_IGNORED_PORTS, init.egress_ignored_ports.as_str()),
        (PORTS, init.ports.as_str()),
        (SIDECAR_INJECTOR_WEBHOOK, "enabled"),
        (IGNORED_UID, runtime.ignored_uid.as_str()),
        (PROXY_EGRESS_PORT, runtime.proxy_egress_port.as_str()),
        (PROXY_INGRESS_PORT, runtime.proxy_ingress_port.as_str()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Builds the operations that set `desired` on a pod whose current
/// annotations are `existing`.
///
/// When the pod has no annotations at all, the first key creates the map and
/// the remaining keys are added to it. Otherwise each key is added when it is
/// missing or empty and replaced when it has a value, even if that value is
/// already the desired one.
pub fn merge(
    existing: Option<&Map>,
    desired: &Map,
) -> Result<Vec<PatchOperation>, InvalidPointer> {
    let create_map = existing.is_none();

    let mut ops = Vec::with_capacity(desired.len());
    for (i, (key, value)) in desired.iter().enumerate() {
        if create_map && i == 0 {
            let mut map = serde_json::Map::new();
            map.insert(key.clone(), value.clone().into());
            ops.push(PatchOperation::Add(AddOperation {
                path: pointer::parse(ANNOTATIONS_PATH.to_string())?,
                value: map.into(),
            }));
            continue;
        }

        let path = pointer::parse(format!("{ANNOTATIONS_PATH}/{}", pointer::escape(key)))?;
        let value = serde_json::Value::from(value.as_str());
        let has_value = existing
            .and_then(|a| a.get(key))
            .is_some_and(|v| !v.is_empty());
        ops.push(if has_value {
            PatchOperation::Replace(ReplaceOperation { path, value })
        } else {
            PatchOperation::Add(AddOperation { path, value })
        });
    }

    Ok(ops)
}
