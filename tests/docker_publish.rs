//! Integration test: build a minimal image through the real
//! `docker` CLI engine.
//!
//! Requires Docker. Skipped in normal `cargo test` runs unless
//! the `integration` feature is enabled.

#![cfg(feature = "integration")]

use gantry::App;
use gantry::publish::{ContainerEngine, DockerCli};

#[test]
fn build_scratch_image() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("Dockerfile"),
        "FROM busybox\nCMD [\"true\"]\n",
    )
    .expect("write Dockerfile");

    let app = App::new("gantry-engine-test")
        .context(dir.path().to_str().expect("utf-8 path"))
        .dockerfile(dir.path().join("Dockerfile").to_str().expect("utf-8 path"));

    DockerCli
        .build(&app, &["gantry-engine-test:it".to_string()])
        .expect("docker build failed");
}
