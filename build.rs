use std::env;
use std::fs;
use std::path::Path;
use std::process::Command;

fn git_hash() -> String {
    if let Ok(hash) = env::var("GIT_HASH") {
        return hash;
    }
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .filter(|hash| !hash.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=GIT_HASH");

    let out_dir = env::var_os("OUT_DIR").expect("OUT_DIR is set by cargo");
    let build_time = chrono::Utc::now().to_rfc3339();
    fs::write(Path::new(&out_dir).join("build_time.txt"), &build_time)
        .expect("failed to write build_time.txt");

    println!("cargo:rustc-env=BUILD_TIME={}", build_time);
    println!("cargo:rustc-env=GIT_HASH={}", git_hash());
}
