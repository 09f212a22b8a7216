use super::{env, require, requests, to_fragment, Fragment, ProxyInitConfig, RenderError};
use crate::MeshRuntime;
use k8s_openapi::api::core::v1::{Capabilities, Container, SecurityContext};

const PROXY_INIT_NAME: &str = "proxyinit";

/// Renders the init container that redirects the pod's traffic through the
/// proxy.
pub fn render_proxy_init(
    config: &ProxyInitConfig,
    runtime: &MeshRuntime,
) -> Result<Fragment, RenderError> {
    require(PROXY_INIT_NAME, "image", &config.image)?;

    let init = Container {
        name: PROXY_INIT_NAME.to_string(),
        image: Some(config.image.clone()),
        security_context: Some(SecurityContext {
            capabilities: Some(Capabilities {
                add: Some(vec!["NET_ADMIN".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        }),
        env: Some(vec![
            env("APPMESH_START_ENABLED", "1"),
            env("APPMESH_IGNORE_UID", runtime.ignored_uid.as_str()),
            env(
                "APPMESH_ENVOY_INGRESS_PORT",
                runtime.proxy_ingress_port.as_str(),
            ),
            env(
                "APPMESH_ENVOY_EGRESS_PORT",
                runtime.proxy_egress_port.as_str(),
            ),
            env("APPMESH_APP_PORTS", config.ports.as_str()),
            env("APPMESH_EGRESS_IGNORED_IP", config.egress_ignored_ips.as_str()),
            env(
                "APPMESH_EGRESS_IGNORED_PORTS",
                config.egress_ignored_ports.as_str(),
            ),
        ]),
        resources: requests(&config.cpu_requests, &config.memory_requests),
        ..Default::default()
    };
    to_fragment(PROXY_INIT_NAME, &init)
}
