//! Toolchain command

use std::path::Path;

use anyhow::{Context, Result};
use apkpipe_core::Toolchain;

/// Print what the build would run with.
pub fn toolchain(config: &Path, json: bool) -> Result<()> {
    let config = crate::load_config(config)?;
    let toolchain = Toolchain::discover(&config).context("Failed to locate the Android toolchain")?;
    let sdk = &toolchain.sdk;
    let ndk = toolchain.ndk.as_ref().map(|n| n.root().display().to_string());

    if json {
        let value = serde_json::json!({
            "sdk": sdk.root().display().to_string(),
            "platform": sdk.platform(),
            "api_level": sdk.api_level(),
            "build_tools": sdk.build_tools_dir().display().to_string(),
            "dialect": sdk.dialect(),
            "java": toolchain.java.display().to_string(),
            "ndk": ndk,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("sdk          {}", sdk.root().display());
    println!("platform     {}", sdk.platform());
    println!("build-tools  {}", sdk.build_tools_dir().display());
    println!("dialect      {:?}", sdk.dialect());
    println!("java         {}", toolchain.java.display());
    println!("ndk          {}", ndk.as_deref().unwrap_or("not found"));
    Ok(())
}
