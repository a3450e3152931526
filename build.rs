//! Build script for lamco-display-manager
//!
//! Stamps the binary with when and from which commit it was built, for the
//! startup banner.

use std::process::Command;

/// Trimmed stdout of a command that ran successfully
fn capture(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn main() {
    // Reproducible builds pin the clock
    let epoch = std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .map(|secs| format!("@{}", secs.trim()));
    let mut date_args = vec!["-u"];
    if let Some(epoch) = &epoch {
        date_args.extend(["-d", epoch.as_str()]);
    }

    let stamp = date_args
        .iter()
        .copied()
        .chain(["+%Y-%m-%d %H:%M:%SZ"])
        .collect::<Vec<_>>();
    let (date, time) = capture("date", &stamp)
        .and_then(|s| {
            s.split_once(' ')
                .map(|(d, t)| (d.to_string(), t.to_string()))
        })
        .unwrap_or_else(|| ("unknown".to_string(), String::new()));

    let commit = capture("git", &["describe", "--always", "--dirty", "--abbrev=10"])
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=BUILD_DATE={}", date);
    println!("cargo:rustc-env=BUILD_TIME={}", time);
    println!("cargo:rustc-env=GIT_HASH={}", commit);

    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
}
