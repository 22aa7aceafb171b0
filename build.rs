use std::process::Command;

fn main() {
    let mut version = env!("CARGO_PKG_VERSION").to_string();

    if nightly_requested() {
        version.push_str("-nightly");
        if let Some(sha) = git_short_sha() {
            version.push('+');
            version.push_str(&sha);
        }
    }

    println!("cargo:rustc-env=APP_VERSION={}", version);

    println!("cargo:rerun-if-env-changed=HYPERION_NIGHTLY");
    println!("cargo:rerun-if-env-changed=GIT_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
}

fn nightly_requested() -> bool {
    std::env::var("HYPERION_NIGHTLY")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

// Short commit hash from git, or GIT_SHA when building without a checkout
fn git_short_sha() -> Option<String> {
    let from_git = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|sha| !sha.is_empty());

    from_git.or_else(|| std::env::var("GIT_SHA").ok().filter(|sha| !sha.is_empty()))
}
