use crate::{
    patch::{
        annotations::{
            cni_enabled, CPU_REQUESTS, EGRESS_IGNORED_PORTS, MEMORY_REQUESTS, PORTS,
            SIDECAR_INJECTOR_WEBHOOK, VIRTUAL_NODE,
        },
        MutationRequest, ProxyInitConfig, SidecarConfig, PROXY_CONTAINER_NAME,
    },
    Injector,
};
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{Container, Pod, VolumeMount};
use std::collections::BTreeMap;
use tracing::{debug, info};

const SERVICE_ACCOUNT_MOUNT_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

// === impl Injector ===

impl Injector {
    /// Describes the mutation for `pod`, or `None` when the pod opts out or
    /// already runs the proxy.
    pub fn mutation_request(&self, pod: &Pod) -> Result<Option<MutationRequest>> {
        let annotations = pod.metadata.annotations.as_ref();
        let name = workload_name(pod);

        if annotation(annotations, SIDECAR_INJECTOR_WEBHOOK) == Some("disabled") {
            info!(pod = ?name, "Injection disabled by annotation");
            return Ok(None);
        }

        let spec = pod.spec.as_ref().context("pod has no spec")?;
        if spec.containers.iter().any(|c| c.name == PROXY_CONTAINER_NAME) {
            info!(pod = ?name, "Pod already has a proxy container");
            return Ok(None);
        }

        let virtual_node_name = annotation(annotations, VIRTUAL_NODE)
            .map(str::to_string)
            .or(name)
            .context("cannot determine the virtual node name of an unnamed pod")?;

        let ports = match annotation(annotations, PORTS) {
            Some(ports) => ports.to_string(),
            None => container_ports(&spec.containers),
        };

        let init = ProxyInitConfig {
            ports,
            egress_ignored_ports: annotation(annotations, EGRESS_IGNORED_PORTS)
                .map(str::to_string)
                .unwrap_or_else(|| self.init.egress_ignored_ports.clone()),
            ..self.init.clone()
        };

        let sidecar = SidecarConfig {
            virtual_node_name,
            cpu_requests: annotation(annotations, CPU_REQUESTS)
                .map(str::to_string)
                .unwrap_or_else(|| self.sidecar.cpu_requests.clone()),
            memory_requests: annotation(annotations, MEMORY_REQUESTS)
                .map(str::to_string)
                .unwrap_or_else(|| self.sidecar.memory_requests.clone()),
            service_account_mount: service_account_mount(&spec.containers),
            ..self.sidecar.clone()
        };

        let req = MutationRequest {
            cni_annotation_mode: cni_enabled(annotations),
            append_init_containers: is_populated(spec.init_containers.as_deref()),
            append_sidecar_containers: !spec.containers.is_empty(),
            append_image_pull_secret: is_populated(spec.image_pull_secrets.as_deref()),
            has_image_pull_secret: self.image_pull_secret,
            existing_annotations: pod.metadata.annotations.clone(),
            init,
            sidecar,
        };
        debug!(?req);
        Ok(Some(req))
    }
}

fn annotation<'a>(
    annotations: Option<&'a BTreeMap<String, String>>,
    key: &str,
) -> Option<&'a str> {
    annotations.and_then(|a| a.get(key)).map(String::as_str)
}

fn is_populated<T>(items: Option<&[T]>) -> bool {
    items.is_some_and(|items| !items.is_empty())
}

/// The pod's name, or the prefix of its generated name.
fn workload_name(pod: &Pod) -> Option<String> {
    if let Some(name) = pod.metadata.name.as_deref().filter(|n| !n.is_empty()) {
        return Some(name.to_string());
    }
    pod.metadata
        .generate_name
        .as_deref()
        .map(|n| n.trim_end_matches('-'))
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

fn container_ports(containers: &[Container]) -> String {
    containers
        .iter()
        .flat_map(|c| c.ports.iter().flatten())
        .map(|p| p.container_port.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn service_account_mount(containers: &[Container]) -> Option<VolumeMount> {
    containers
        .iter()
        .flat_map(|c| c.volume_mounts.iter().flatten())
        .find(|m| m.mount_path == SERVICE_ACCOUNT_MOUNT_PATH)
        .cloned()
}
