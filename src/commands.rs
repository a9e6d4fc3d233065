//! CLI command implementations

use std::path::Path;

use anyhow::Context;
use codehash::Manifest;

pub fn hash(manifest: &Path, target: &str) -> anyhow::Result<()> {
    let manifest = Manifest::load(manifest)?;
    let function = manifest.function(target)?;
    let identity = manifest
        .engine()
        .hash_function(&function, None)
        .with_context(|| format!("Failed to hash {target}"))?;
    println!("{identity}");
    Ok(())
}

pub fn shape(manifest: &Path, target: &str) -> anyhow::Result<()> {
    let manifest = Manifest::load(manifest)?;
    let function = manifest.function(target)?;
    let shape = manifest
        .engine()
        .code_shape(&function)
        .with_context(|| format!("Failed to normalize {target}"))?;
    println!("{shape}");
    Ok(())
}

pub fn explain(manifest: &Path, target: &str) -> anyhow::Result<()> {
    let manifest = Manifest::load(manifest)?;
    let function = manifest.function(target)?;
    let explanation = manifest
        .engine()
        .explain(&function, None)
        .with_context(|| format!("Failed to hash {target}"))?;
    tracing::info!("{} has {} dependencies", target, explanation.dependencies.len());
    println!("{}", serde_json::to_string_pretty(&explanation)?);
    Ok(())
}
