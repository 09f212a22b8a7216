use super::{
    env, require, requests, run_as_proxy, to_fragment, tracing_config_mount, Fragment,
    RenderError, SidecarConfig, TRACING_CONFIG_FILE,
};
use crate::PROXY_CONTAINER_NAME;
use k8s_openapi::api::core::v1::{Container, ContainerPort};

const XRAY_DAEMON_NAME: &str = "xray-daemon";
const XRAY_DAEMON_IMAGE: &str = "amazon/aws-xray-daemon";

/// Renders the proxy container, followed by the X-Ray daemon when it is
/// enabled.
pub fn render_sidecars(config: &SidecarConfig) -> Result<Vec<Fragment>, RenderError> {
    let mut sidecars = vec![render_proxy(config)?];
    if config.inject_xray_sidecar {
        sidecars.push(render_xray_daemon(config)?);
    }
    Ok(sidecars)
}

fn render_proxy(config: &SidecarConfig) -> Result<Fragment, RenderError> {
    require(PROXY_CONTAINER_NAME, "image", &config.image)?;
    require(PROXY_CONTAINER_NAME, "mesh name", &config.mesh_name)?;
    require(
        PROXY_CONTAINER_NAME,
        "virtual node name",
        &config.virtual_node_name,
    )?;

    let tracing = config.tracing_enabled();

    let mut vars = vec![
        env(
            "APPMESH_VIRTUAL_NODE_NAME",
            format!(
                "mesh/{}/virtualNode/{}",
                config.mesh_name, config.virtual_node_name
            ),
        ),
        env("APPMESH_PREVIEW", if config.preview { "1" } else { "0" }),
        env("ENVOY_LOG_LEVEL", config.log_level.as_str()),
    ];
    if tracing {
        vars.push(env("ENVOY_STATS_CONFIG_FILE", TRACING_CONFIG_FILE));
    }
    vars.push(env("AWS_ROLE_SESSION_NAME", config.virtual_node_name.as_str()));
    vars.push(env("AWS_REGION", config.region.as_str()));
    if config.inject_xray_sidecar {
        vars.push(env("ENABLE_ENVOY_XRAY_TRACING", "1"));
    }
    if config.enable_stats_tags {
        vars.push(env("ENABLE_ENVOY_STATS_TAGS", "1"));
    }
    if config.enable_stats_d {
        vars.push(env("ENABLE_ENVOY_DOG_STATSD", "1"));
    }

    let mut mounts = config.service_account_mount.iter().cloned().collect::<Vec<_>>();
    if tracing {
        mounts.push(tracing_config_mount());
    }

    let proxy = Container {
        name: PROXY_CONTAINER_NAME.to_string(),
        image: Some(config.image.clone()),
        security_context: Some(run_as_proxy()),
        ports: Some(vec![ContainerPort {
            container_port: 9901,
            name: Some("stats".to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(vars),
        volume_mounts: Some(mounts),
        resources: requests(&config.cpu_requests, &config.memory_requests),
        ..Default::default()
    };
    to_fragment(PROXY_CONTAINER_NAME, &proxy)
}

fn render_xray_daemon(config: &SidecarConfig) -> Result<Fragment, RenderError> {
    let daemon = Container {
        name: XRAY_DAEMON_NAME.to_string(),
        image: Some(XRAY_DAEMON_IMAGE.to_string()),
        security_context: Some(run_as_proxy()),
        ports: Some(vec![ContainerPort {
            container_port: 2000,
            name: Some("xray".to_string()),
            protocol: Some("UDP".to_string()),
            ..Default::default()
        }]),
        env: Some(vec![env(
            "AWS_ROLE_SESSION_NAME",
            config.virtual_node_name.as_str(),
        )]),
        volume_mounts: Some(config.service_account_mount.iter().cloned().collect()),
        resources: requests(&config.cpu_requests, &config.memory_requests),
        ..Default::default()
    };
    to_fragment(XRAY_DAEMON_NAME, &daemon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{Collector, TRACING_CONFIG_DIR, TRACING_CONFIG_VOLUME};
    use k8s_openapi::api::core::v1::VolumeMount;
    use rstest::rstest;
    use serde_json::Value;
    use std::collections::BTreeMap;

    const SERVICE_ACCOUNT_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

    fn podinfo() -> SidecarConfig {
        SidecarConfig {
            image: "111345817488.dkr.ecr.us-west-2.amazonaws.com/aws-appmesh-envoy:latest"
                .to_string(),
            mesh_name: "global".to_string(),
            virtual_node_name: "podinfo".to_string(),
            preview: false,
            log_level: "debug".to_string(),
            region: "us-west-2".to_string(),
            cpu_requests: "100m".to_string(),
            memory_requests: "128Mi".to_string(),
            ..Default::default()
        }
    }

    fn datadog() -> Option<Collector> {
        Some(Collector {
            address: "datadog.appmesh-system".to_string(),
            port: "8126".to_string(),
        })
    }

    fn jaeger() -> Option<Collector> {
        Some(Collector {
            address: "appmesh-jaeger.appmesh-system".to_string(),
            port: "9411".to_string(),
        })
    }

    fn service_account() -> Option<VolumeMount> {
        Some(VolumeMount {
            name: "pod-sa".to_string(),
            mount_path: SERVICE_ACCOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        })
    }

    fn by_name(sidecars: &[Fragment], name: &str) -> Option<Container> {
        sidecars
            .iter()
            .map(|s| serde_json::from_value::<Container>(s.clone()).expect("must be a container"))
            .find(|c| c.name == name)
    }

    fn envs(container: &Container) -> BTreeMap<String, String> {
        container
            .env
            .iter()
            .flatten()
            .map(|e| (e.name.clone(), e.value.clone().unwrap_or_default()))
            .collect()
    }

    fn mount<'c>(container: &'c Container, name: &str) -> Option<&'c VolumeMount> {
        container.volume_mounts.iter().flatten().find(|m| m.name == name)
    }

    #[rstest]
    #[case::plain(podinfo())]
    #[case::xray(SidecarConfig { inject_xray_sidecar: true, ..podinfo() })]
    #[case::stats_tags(SidecarConfig { enable_stats_tags: true, ..podinfo() })]
    #[case::stats_d(SidecarConfig { enable_stats_tags: true, enable_stats_d: true, ..podinfo() })]
    #[case::datadog(SidecarConfig { datadog: datadog(), ..podinfo() })]
    #[case::jaeger(SidecarConfig { jaeger: jaeger(), ..podinfo() })]
    #[case::both_tracers(SidecarConfig { jaeger: jaeger(), datadog: datadog(), ..podinfo() })]
    #[case::service_account(SidecarConfig { service_account_mount: service_account(), ..podinfo() })]
    #[case::everything(SidecarConfig {
        inject_xray_sidecar: true,
        enable_stats_tags: true,
        enable_stats_d: true,
        datadog: datadog(),
        service_account_mount: service_account(),
        preview: true,
        ..podinfo()
    })]
    fn renders_proxy(#[case] config: SidecarConfig) {
        let sidecars = render_sidecars(&config).expect("must render");
        assert_eq!(
            sidecars.len(),
            if config.inject_xray_sidecar { 2 } else { 1 }
        );
        assert_eq!(sidecars[0]["name"], Value::from(PROXY_CONTAINER_NAME));

        let proxy = by_name(&sidecars, PROXY_CONTAINER_NAME).expect("proxy must be rendered");
        assert_eq!(proxy.image.as_deref(), Some(config.image.as_str()));
        assert_eq!(
            proxy.security_context.as_ref().and_then(|sc| sc.run_as_user),
            Some(crate::PROXY_UID)
        );

        let mut expected = BTreeMap::new();
        expected.insert(
            "APPMESH_VIRTUAL_NODE_NAME".to_string(),
            "mesh/global/virtualNode/podinfo".to_string(),
        );
        expected.insert(
            "APPMESH_PREVIEW".to_string(),
            if config.preview { "1" } else { "0" }.to_string(),
        );
        expected.insert("ENVOY_LOG_LEVEL".to_string(), "debug".to_string());
        expected.insert("AWS_ROLE_SESSION_NAME".to_string(), "podinfo".to_string());
        expected.insert("AWS_REGION".to_string(), "us-west-2".to_string());
        if config.tracing_enabled() {
            expected.insert(
                "ENVOY_STATS_CONFIG_FILE".to_string(),
                TRACING_CONFIG_FILE.to_string(),
            );
        }
        if config.inject_xray_sidecar {
            expected.insert("ENABLE_ENVOY_XRAY_TRACING".to_string(), "1".to_string());
        }
        if config.enable_stats_tags {
            expected.insert("ENABLE_ENVOY_STATS_TAGS".to_string(), "1".to_string());
        }
        if config.enable_stats_d {
            expected.insert("ENABLE_ENVOY_DOG_STATSD".to_string(), "1".to_string());
        }
        assert_eq!(envs(&proxy), expected);

        match mount(&proxy, TRACING_CONFIG_VOLUME) {
            Some(m) => {
                assert!(config.tracing_enabled());
                assert_eq!(m.mount_path, TRACING_CONFIG_DIR);
            }
            None => assert!(!config.tracing_enabled()),
        }
        match mount(&proxy, "pod-sa") {
            Some(m) => {
                assert_eq!(m.mount_path, SERVICE_ACCOUNT_PATH);
                assert_eq!(m.read_only, Some(true));
            }
            None => assert!(config.service_account_mount.is_none()),
        }
        let expected_mounts = config.service_account_mount.iter().count()
            + usize::from(config.tracing_enabled());
        assert_eq!(proxy.volume_mounts.unwrap_or_default().len(), expected_mounts);

        let requests = proxy
            .resources
            .and_then(|r| r.requests)
            .expect("requests must be set");
        assert_eq!(requests["cpu"].0, "100m");
        assert_eq!(requests["memory"].0, "128Mi");
    }

    #[test]
    fn renders_xray_daemon() {
        let config = SidecarConfig {
            inject_xray_sidecar: true,
            service_account_mount: service_account(),
            ..podinfo()
        };
        let sidecars = render_sidecars(&config).expect("must render");
        assert_eq!(sidecars[1]["name"], Value::from(XRAY_DAEMON_NAME));

        let daemon = by_name(&sidecars, XRAY_DAEMON_NAME).expect("daemon must be rendered");
        assert_eq!(daemon.image.as_deref(), Some(XRAY_DAEMON_IMAGE));
        assert_eq!(
            envs(&daemon),
            BTreeMap::from([("AWS_ROLE_SESSION_NAME".to_string(), "podinfo".to_string())])
        );
        assert!(mount(&daemon, "pod-sa").is_some());
        let ports = daemon.ports.unwrap_or_default();
        assert_eq!(ports[0].container_port, 2000);
        assert_eq!(ports[0].protocol.as_deref(), Some("UDP"));
    }

    #[test]
    fn omits_xray_daemon() {
        let sidecars = render_sidecars(&podinfo()).expect("must render");
        assert!(by_name(&sidecars, XRAY_DAEMON_NAME).is_none());
        assert!(!envs(&by_name(&sidecars, PROXY_CONTAINER_NAME).unwrap())
            .contains_key("ENABLE_ENVOY_XRAY_TRACING"));
    }

    #[test]
    fn omits_empty_requests() {
        let config = SidecarConfig {
            cpu_requests: String::new(),
            ..podinfo()
        };
        let sidecars = render_sidecars(&config).expect("must render");
        assert_eq!(
            sidecars[0]["resources"],
            serde_json::json!({ "requests": { "memory": "128Mi" } })
        );

        let config = SidecarConfig {
            cpu_requests: String::new(),
            memory_requests: String::new(),
            ..podinfo()
        };
        let sidecars = render_sidecars(&config).expect("must render");
        assert!(sidecars[0].get("resources").is_none());
    }

    #[rstest]
    #[case::image(SidecarConfig { image: String::new(), ..podinfo() }, "image")]
    #[case::mesh(SidecarConfig { mesh_name: " ".to_string(), ..podinfo() }, "mesh name")]
    #[case::virtual_node(SidecarConfig { virtual_node_name: String::new(), ..podinfo() }, "virtual node name")]
    fn rejects_missing_fields(#[case] config: SidecarConfig, #[case] missing: &str) {
        match render_sidecars(&config) {
            Err(RenderError::MissingField { container, field }) => {
                assert_eq!(container, PROXY_CONTAINER_NAME);
                assert_eq!(field, missing);
            }
            res => panic!("unexpected result: {res:?}"),
        }
    }
}
