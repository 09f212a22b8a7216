#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use appmesh_inject::InjectorArgs;
use clap::Parser;
use k8s_openapi::api::core::v1::Pod;
use std::{
    io::Read,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// Render the App Mesh injection patch for a pod manifest
///
/// The patch is written to stdout as a JSON array of RFC 6902 operations.
#[derive(Parser)]
#[clap(version, about)]
struct Args {
    #[clap(
        long,
        env = "APPMESH_INJECT_LOG",
        default_value = "appmesh_inject=info,warn"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    /// Pod manifest (YAML or JSON); `-` reads from stdin
    #[clap(long, default_value = "-")]
    pod: PathBuf,

    #[clap(flatten)]
    injector: InjectorArgs,
}

fn main() -> Result<()> {
    let Args {
        log_level,
        log_format,
        pod,
        injector,
    } = Args::parse();

    log_format.try_init(log_level)?;

    let manifest = read_manifest(&pod)?;
    let pod = serde_yaml::from_str::<Pod>(&manifest).context("parsing pod manifest")?;
    debug!(name = ?pod.metadata.name, "Read pod");

    match injector.build().patch(&pod)? {
        Some(patch) => println!("{}", serde_json::to_string_pretty(&patch)?),
        None => info!("Pod is not selected for injection"),
    }
    Ok(())
}

fn read_manifest(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut manifest = String::new();
        std::io::stdin()
            .read_to_string(&mut manifest)
            .context("reading pod manifest from stdin")?;
        return Ok(manifest);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}
