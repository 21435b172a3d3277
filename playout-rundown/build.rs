//! Build script for playout-rundown
//!
//! Stamps the binary with the commit, build time and profile it was built
//! from, logged once at startup.

use std::process::Command;

fn main() {
    let commit = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let built_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=PLAYOUT_GIT_HASH={}", commit);
    println!("cargo:rustc-env=PLAYOUT_BUILD_TIMESTAMP={}", built_at);
    println!("cargo:rustc-env=PLAYOUT_BUILD_PROFILE={}", profile);
}
