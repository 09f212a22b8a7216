use super::{
    requests, to_fragment, tracing_config_mount, Collector, Fragment, RenderError, Tracer,
    TRACING_CONFIG_FILE, TRACING_CONFIG_VOLUME,
};
use k8s_openapi::api::core::v1::{Container, EmptyDirVolumeSource, Volume};
use serde_json::json;
use std::num::NonZeroU16;

const CONFIG_WRITER_IMAGE: &str = "busybox";

// === impl Tracer ===

impl Tracer {
    fn init_container_name(self) -> &'static str {
        match self {
            Self::Datadog => "inject-datadog-config",
            Self::Jaeger => "inject-jaeger-config",
        }
    }

    fn cluster_name(self) -> &'static str {
        match self {
            Self::Datadog => "datadog_agent",
            Self::Jaeger => "jaeger",
        }
    }

    fn http_tracer(self) -> serde_json::Value {
        match self {
            Self::Datadog => json!({
                "name": "envoy.tracers.datadog",
                "config": {
                    "collector_cluster": self.cluster_name(),
                    "service_name": "envoy",
                },
            }),
            Self::Jaeger => json!({
                "name": "envoy.tracers.zipkin",
                "config": {
                    "collector_cluster": self.cluster_name(),
                    "collector_endpoint": "/api/v1/spans",
                    "shared_span_context": false,
                },
            }),
        }
    }

    /// The Envoy static configuration pointing the tracer at its collector.
    fn envoy_config(self, address: &str, port: NonZeroU16) -> serde_json::Value {
        let cluster = self.cluster_name();
        json!({
            "tracing": { "http": self.http_tracer() },
            "static_resources": {
                "clusters": [{
                    "name": cluster,
                    "connect_timeout": "1s",
                    "type": "strict_dns",
                    "lb_policy": "round_robin",
                    "load_assignment": {
                        "cluster_name": cluster,
                        "endpoints": [{
                            "lb_endpoints": [{
                                "endpoint": {
                                    "address": {
                                        "socket_address": {
                                            "address": address,
                                            "port_value": port.get(),
                                        }
                                    }
                                }
                            }]
                        }]
                    }
                }]
            }
        })
    }
}

/// Renders the empty-dir volume that holds the generated proxy configuration.
pub fn render_tracing_volume(tracer: Tracer) -> Result<Fragment, RenderError> {
    tracing::trace!(%tracer, "Rendering tracing config volume");
    let volume = Volume {
        name: TRACING_CONFIG_VOLUME.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    };
    to_fragment(TRACING_CONFIG_VOLUME, &volume)
}

/// Renders an init container that writes the tracer's proxy configuration
/// into the tracing config volume.
pub fn render_tracing_init(tracer: Tracer, collector: &Collector) -> Result<Fragment, RenderError> {
    let address = collector.address.trim();
    if address.is_empty() {
        return Err(RenderError::MissingCollectorAddress { tracer });
    }
    let port = collector
        .port
        .trim()
        .parse::<NonZeroU16>()
        .map_err(|source| RenderError::InvalidCollectorPort {
            tracer,
            port: collector.port.clone(),
            source,
        })?;

    let config = serde_yaml::to_string(&tracer.envoy_config(address, port))
        .map_err(|source| RenderError::Yaml { tracer, source })?;
    // The delimiter is quoted so the shell writes the document verbatim.
    let script = format!(
        "cat <<'EOF' >> {TRACING_CONFIG_FILE}\n{config}EOF\n\ncat {TRACING_CONFIG_FILE}\n"
    );

    let init = Container {
        name: tracer.init_container_name().to_string(),
        image: Some(CONFIG_WRITER_IMAGE.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        command: Some(vec!["sh".to_string(), "-c".to_string(), script]),
        volume_mounts: Some(vec![tracing_config_mount()]),
        resources: requests("10m", "32Mi"),
        ..Default::default()
    };
    to_fragment(tracer.init_container_name(), &init)
}
