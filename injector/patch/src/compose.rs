use crate::{
    annotations::{self, MeshRuntime},
    pointer::{self, InvalidPointer},
    render::{self, Fragment, ProxyInitConfig, RenderError, SidecarConfig},
};
use json_patch::{AddOperation, Patch, PatchOperation};
use std::{collections::BTreeMap, fmt};
use thiserror::Error;
use tracing::debug;

const ECR_SECRET: &str = "appmesh-ecr-secret";

/// Everything needed to compute one pod's patch.
///
/// The `append_*` flags describe the pod as it is: `true` when the target
/// array already exists, so that new elements are appended to it rather than
/// creating it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MutationRequest {
    pub cni_annotation_mode: bool,
    pub append_init_containers: bool,
    pub append_sidecar_containers: bool,
    pub append_image_pull_secret: bool,
    pub has_image_pull_secret: bool,

    /// `None` when the pod has no annotations map at all, which is distinct
    /// from an empty map.
    pub existing_annotations: Option<BTreeMap<String, String>>,
    pub init: ProxyInitConfig,
    pub sidecar: SidecarConfig,
}

/// A pod spec array that the patch adds elements to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Target {
    InitContainers,
    Containers,
    ImagePullSecrets,
    Volumes,
}

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Pointer(#[from] InvalidPointer),

    #[error("failed to encode patch: {0}")]
    Json(#[from] serde_json::Error),
}

/// Assembles the injection patch for a pod.
#[derive(Clone, Debug, Default)]
pub struct Composer {
    runtime: MeshRuntime,
}

// === impl Composer ===

impl Composer {
    pub fn new(runtime: MeshRuntime) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &MeshRuntime {
        &self.runtime
    }

    /// Builds the full patch. Any rendering failure aborts the whole patch.
    pub fn compose(&self, req: &MutationRequest) -> Result<Patch, ComposeError> {
        let mut ops = Vec::new();

        if req.cni_annotation_mode {
            let desired = annotations::cni_annotations(&req.init, &self.runtime);
            ops.extend(annotations::merge(
                req.existing_annotations.as_ref(),
                &desired,
            )?);
        } else {
            let init = render::render_proxy_init(&req.init, &self.runtime)?;
            ops.extend(array_patch(
                Target::InitContainers,
                req.append_init_containers,
                vec![init],
            )?);
        }

        let sidecars = render::render_sidecars(&req.sidecar)?;
        ops.extend(array_patch(
            Target::Containers,
            req.append_sidecar_containers,
            sidecars,
        )?);

        if req.has_image_pull_secret {
            ops.extend(array_patch(
                Target::ImagePullSecrets,
                req.append_image_pull_secret,
                vec![serde_json::json!({ "name": ECR_SECRET })],
            )?);
        }

        // The volumes and init containers arrays are always appended to here:
        // the pod may already have volumes, and the proxy init container (if
        // any) was added above.
        for (tracer, collector) in req.sidecar.tracers() {
            let volume = render::render_tracing_volume(tracer)?;
            ops.push(append(Target::Volumes, volume)?);

            let init = render::render_tracing_init(tracer, collector)?;
            ops.push(append(Target::InitContainers, init)?);
        }

        debug!(ops = ops.len(), "Composed patch");
        Ok(Patch(ops))
    }

    /// Builds the patch and encodes it as a JSON array.
    pub fn generate(&self, req: &MutationRequest) -> Result<Vec<u8>, ComposeError> {
        let patch = self.compose(req)?;
        let bytes = serde_json::to_vec(&patch)?;
        tracing::trace!(patch = %String::from_utf8_lossy(&bytes));
        Ok(bytes)
    }
}

// === impl Target ===

impl Target {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitContainers => "initContainers",
            Self::Containers => "containers",
            Self::ImagePullSecrets => "imagePullSecrets",
            Self::Volumes => "volumes",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Either creates `target` holding all fragments, or appends each fragment to
/// the existing array in order.
fn array_patch(
    target: Target,
    append_to_existing: bool,
    fragments: Vec<Fragment>,
) -> Result<Vec<PatchOperation>, ComposeError> {
    if append_to_existing {
        return fragments
            .into_iter()
            .map(|fragment| append(target, fragment))
            .collect();
    }

    Ok(vec![PatchOperation::Add(AddOperation {
        path: pointer::parse(format!("/spec/{target}"))?,
        value: serde_json::Value::Array(fragments),
    })])
}

fn append(target: Target, fragment: Fragment) -> Result<PatchOperation, ComposeError> {
    Ok(PatchOperation::Add(AddOperation {
        path: pointer::parse(format!("/spec/{target}/-"))?,
        value: fragment,
    }))
}
