use crate::{
    patch::{Collector, Composer, MeshRuntime, ProxyInitConfig, SidecarConfig},
    Injector,
};

/// Cluster-wide injection settings.
#[derive(Clone, Debug, clap::Args)]
pub struct InjectorArgs {
    #[clap(flatten)]
    pub sidecar: SidecarArgs,

    #[clap(flatten)]
    pub tracing: TracingArgs,

    #[clap(flatten)]
    pub runtime: RuntimeArgs,

    /// Proxy-init (route manager) image.
    #[clap(long, env = "APPMESH_INIT_IMAGE")]
    pub init_image: String,

    /// Egress destinations that bypass the proxy.
    #[clap(long, env = "APPMESH_IGNORED_IPS", default_value = "169.254.169.254")]
    pub ignored_ips: String,

    /// Egress ports that bypass the proxy unless a pod overrides them.
    #[clap(long, default_value = "22")]
    pub egress_ignored_ports: String,

    /// Adds the ECR image-pull secret to injected pods.
    #[clap(long, env = "APPMESH_ECR_SECRET")]
    pub ecr_secret: bool,
}

#[derive(Clone, Debug, clap::Args)]
pub struct SidecarArgs {
    #[clap(long, env = "APPMESH_SIDECAR_IMAGE")]
    pub sidecar_image: String,

    #[clap(long, env = "APPMESH_MESH_NAME")]
    pub mesh_name: String,

    #[clap(long, env = "APPMESH_REGION")]
    pub region: String,

    #[clap(long, env = "APPMESH_PREVIEW")]
    pub preview: bool,

    #[clap(long, env = "APPMESH_LOG_LEVEL", default_value = "info")]
    pub sidecar_log_level: String,

    #[clap(long, default_value = "10m")]
    pub sidecar_cpu_requests: String,

    #[clap(long, default_value = "32Mi")]
    pub sidecar_memory_requests: String,

    #[clap(long)]
    pub enable_stats_tags: bool,

    #[clap(long)]
    pub enable_statsd: bool,
}

#[derive(Clone, Debug, clap::Args)]
pub struct TracingArgs {
    /// Runs the X-Ray daemon next to the proxy.
    #[clap(long)]
    pub inject_xray_sidecar: bool,

    #[clap(long)]
    pub enable_jaeger_tracing: bool,

    #[clap(long, default_value = "appmesh-jaeger.appmesh-system")]
    pub jaeger_address: String,

    #[clap(long, default_value = "9411")]
    pub jaeger_port: String,

    #[clap(long)]
    pub enable_datadog_tracing: bool,

    #[clap(long, default_value = "datadog.appmesh-system")]
    pub datadog_address: String,

    #[clap(long, default_value = "8126")]
    pub datadog_port: String,
}

/// Constants of the mesh runtime. These only change with the proxy image.
#[derive(Clone, Debug, clap::Args)]
pub struct RuntimeArgs {
    #[clap(long, default_value = "1337")]
    pub ignored_uid: String,

    #[clap(long, default_value = "15001")]
    pub proxy_egress_port: String,

    #[clap(long, default_value = "15000")]
    pub proxy_ingress_port: String,
}

// === impl InjectorArgs ===

impl InjectorArgs {
    pub fn build(self) -> Injector {
        let Self {
            sidecar,
            tracing,
            runtime,
            init_image,
            ignored_ips,
            egress_ignored_ports,
            ecr_secret,
        } = self;

        let collector = |enabled: bool, address: String, port: String| {
            enabled.then_some(Collector { address, port })
        };

        let sidecar = SidecarConfig {
            image: sidecar.sidecar_image,
            mesh_name: sidecar.mesh_name,
            virtual_node_name: String::new(),
            preview: sidecar.preview,
            log_level: sidecar.sidecar_log_level,
            region: sidecar.region,
            cpu_requests: sidecar.sidecar_cpu_requests,
            memory_requests: sidecar.sidecar_memory_requests,
            jaeger: collector(
                tracing.enable_jaeger_tracing,
                tracing.jaeger_address,
                tracing.jaeger_port,
            ),
            datadog: collector(
                tracing.enable_datadog_tracing,
                tracing.datadog_address,
                tracing.datadog_port,
            ),
            inject_xray_sidecar: tracing.inject_xray_sidecar,
            enable_stats_tags: sidecar.enable_stats_tags,
            enable_stats_d: sidecar.enable_statsd,
            service_account_mount: None,
        };

        let init = ProxyInitConfig {
            image: init_image,
            ports: String::new(),
            egress_ignored_ips: ignored_ips,
            egress_ignored_ports,
            cpu_requests: sidecar.cpu_requests.clone(),
            memory_requests: sidecar.memory_requests.clone(),
        };

        let composer = Composer::new(MeshRuntime {
            ignored_uid: runtime.ignored_uid,
            proxy_egress_port: runtime.proxy_egress_port,
            proxy_ingress_port: runtime.proxy_ingress_port,
        });

        Injector::new(sidecar, init, ecr_secret, composer)
    }
}
