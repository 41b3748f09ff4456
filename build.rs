//! Stamps the binaries with a build id
//!
//! `JUNCTION_BUILD_ID` from the environment wins (packaged builds without a
//! checkout); otherwise `git describe --always --dirty`, else "unknown".

use std::env;
use std::process::Command;

fn git_describe() -> Option<String> {
    let output = Command::new("git").args(["describe", "--always", "--dirty"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!id.is_empty()).then_some(id)
}

fn main() {
    let build_id = env::var("JUNCTION_BUILD_ID")
        .ok()
        .filter(|id| !id.trim().is_empty())
        .or_else(git_describe)
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=JUNCTION_BUILD_ID={build_id}");
    println!("cargo:rerun-if-env-changed=JUNCTION_BUILD_ID");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
}
