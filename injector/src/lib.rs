#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod admission;
mod args;
mod pod;

pub use self::args::{InjectorArgs, RuntimeArgs, SidecarArgs, TracingArgs};
pub use appmesh_inject_patch as patch;

use anyhow::Result;
use k8s_openapi::api::core::v1::Pod;
use patch::{Composer, Patch, ProxyInitConfig, SidecarConfig};
use tracing::debug;

/// Decides how a pod is injected and builds its patch.
///
/// The sidecar and init configurations are cluster-wide defaults; fields that
/// depend on the pod (virtual node, application ports, service-account mount)
/// are filled in per pod.
#[derive(Clone, Debug)]
pub struct Injector {
    sidecar: SidecarConfig,
    init: ProxyInitConfig,
    image_pull_secret: bool,
    composer: Composer,
}

// === impl Injector ===

impl Injector {
    pub fn new(
        sidecar: SidecarConfig,
        init: ProxyInitConfig,
        image_pull_secret: bool,
        composer: Composer,
    ) -> Self {
        Self {
            sidecar,
            init,
            image_pull_secret,
            composer,
        }
    }

    /// Returns the patch for `pod`, or `None` when the pod should be admitted
    /// unchanged.
    pub fn patch(&self, pod: &Pod) -> Result<Option<Patch>> {
        let Some(req) = self.mutation_request(pod)? else {
            return Ok(None);
        };
        let patch = self.composer.compose(&req)?;
        debug!(ops = patch.0.len(), "Built injection patch");
        Ok(Some(patch))
    }
}
