use std::{
    process::Command,
    time::{SystemTime, UNIX_EPOCH},
};

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output();

    let pkg_version = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();

    let build = match output {
        Ok(o) if o.status.success() => {
            let git_output = String::from_utf8(o.stdout)
                .unwrap_or_default()
                .trim()
                .to_string();

            if git_output.ends_with("-dirty") || git_output.is_empty() {
                format!("{}-{}", git_output, timestamp())
            } else {
                git_output
            }
        }
        // Not built from a git checkout (e.g. from a source tarball)
        _ => "unknown".to_string(),
    };

    println!(
        "cargo:rustc-env=TOOLCHAIN_BUILD_VERSION={} ({})",
        pkg_version, build
    );
}

fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
