use std::process::Command;

fn main() {
    // Git SHA for --version, "dev" outside a checkout
    let git_sha = std::env::var("GIT_SHA")
        .or_else(|_| {
            Command::new("git")
                .args(["rev-parse", "--short", "HEAD"])
                .output()
                .ok()
                .filter(|output| output.status.success())
                .and_then(|output| String::from_utf8(output.stdout).ok())
                .map(|s| s.trim().to_string())
                .ok_or(std::env::VarError::NotPresent)
        })
        .unwrap_or_else(|_| "dev".to_string());

    println!("cargo:rustc-env=SHA={}", git_sha);
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-env-changed=GIT_SHA");
}
