#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Builds the JSON patch that injects the App Mesh proxy into a pod.
//!
//! The [`Composer`] turns a [`MutationRequest`] into an RFC 6902 document.
//! Container and volume fragments come from the [`render`] module; the
//! mesh-routing annotations used in CNI mode come from [`annotations`].

pub mod annotations;
mod compose;
pub mod pointer;
pub mod render;


pub use self::{
    annotations::MeshRuntime,
    compose::{ComposeError, Composer, MutationRequest, Target},
    render::{Collector, Fragment, ProxyInitConfig, RenderError, SidecarConfig, Tracer},
};
pub use json_patch::{Patch, PatchOperation};

/// The name of the injected proxy container.
pub const PROXY_CONTAINER_NAME: &str = "envoy";

/// The UID the injected containers run as. Traffic from this UID bypasses
/// the proxy's redirect rules.
pub const PROXY_UID: i64 = 1337;
