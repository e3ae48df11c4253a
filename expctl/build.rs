//! Parses cargo's metadata and exposes the absolute path of the workspace root
//! as `EXPCTL_ROOT_DIR`, so that `expctl` resolves its default templates and
//! result directories the same way whether it is built from the workspace or
//! as an individual package.

use serde::Deserialize;
use std::{env, process::Command};

// Only the `workspace_root` field is needed
#[derive(Deserialize)]
struct Metadata {
    workspace_root: String,
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let cargo = env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());

    let output = Command::new(cargo)
        .arg("metadata")
        .arg("--format-version=1")
        .arg("--no-deps")
        .output()
        .expect("expctl(build): failed to run cargo metadata");

    if !output.status.success() {
        panic!(
            "expctl(build): cargo metadata failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let metadata: Metadata = serde_json::from_slice(&output.stdout)
        .expect("expctl(build): failed to parse cargo metadata");

    println!(
        "cargo:rustc-env=EXPCTL_ROOT_DIR={}",
        metadata.workspace_root
    );
}
