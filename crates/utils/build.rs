use std::env;

use vergen_git2::Emitter;
use vergen_git2::Git2Builder;

const IMAGE_VERSION_VAR: &str = "VERSION";
const DEFAULT_IMAGE_VERSION: &str = "latest";

/// Emits the variables read by `build_info` and `version`.
///
/// Only branch, sha and dirty state are consumed; outside a git checkout
/// they stay unset and the version falls back to "unknown".
fn main() {
    let image_version =
        env::var(IMAGE_VERSION_VAR).unwrap_or_else(|_| DEFAULT_IMAGE_VERSION.to_string());
    println!("cargo:rustc-env=IMAGE_VERSION={image_version}");
    println!("cargo:rerun-if-env-changed={IMAGE_VERSION_VAR}");

    if let Err(err) = emit_git_info() {
        println!("cargo:warning=git build info unavailable: {err}");
    }
}

fn emit_git_info() -> anyhow::Result<()> {
    let git = Git2Builder::default()
        .branch(true)
        .sha(true)
        .dirty(true)
        .build()?;

    Emitter::default()
        .fail_on_error()
        .add_instructions(&git)?
        .emit()
}
