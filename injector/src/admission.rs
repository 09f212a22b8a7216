//! Wraps an injection patch in an admission response.
//!
//! Serving the webhook (TLS, routing) is left to the embedding server.

use crate::Injector;
use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, info, warn};

pub type AdmissionRequest = kube::core::admission::AdmissionRequest<Pod>;
pub type AdmissionResponse = kube::core::admission::AdmissionResponse;

/// Admits `req`, attaching the injection patch when the pod is selected.
///
/// A pod that cannot be patched is denied rather than admitted without its
/// proxy.
pub fn admit(injector: &Injector, req: &AdmissionRequest) -> AdmissionResponse {
    let rsp = AdmissionResponse::from(req);

    let Some(pod) = req.object.as_ref() else {
        debug!(uid = %req.uid, "No pod in request, allowing unchanged");
        return rsp;
    };

    let patch = match injector.patch(pod) {
        Ok(Some(patch)) => patch,
        Ok(None) => return rsp,
        Err(error) => {
            info!(%error, uid = %req.uid, name = %req.name, "Denied");
            return rsp.deny(error);
        }
    };

    match rsp.with_patch(patch) {
        Ok(rsp) => rsp,
        Err(error) => {
            warn!(%error, uid = %req.uid, "Failed to encode patch");
            AdmissionResponse::from(req).deny(error)
        }
    }
}
