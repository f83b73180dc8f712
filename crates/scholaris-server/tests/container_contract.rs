// SPDX-License-Identifier: Apache-2.0
//! The image recipe must keep serving the one endpoint operators depend
//! on: the server binary at /app, listening on 8050.

use std::path::PathBuf;

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

#[test]
fn dockerfile_keeps_the_runtime_contract() {
    let dockerfile =
        std::fs::read_to_string(workspace_root().join("Dockerfile")).expect("read Dockerfile");

    assert!(dockerfile.contains("EXPOSE 8050"), "port declaration changed");
    assert!(dockerfile.contains("WORKDIR /app"), "working directory changed");
    assert!(
        dockerfile.contains("ENTRYPOINT [\"/app/scholaris-server\"]"),
        "entry command changed"
    );
    assert!(
        dockerfile.contains("--bin scholaris-server"),
        "builder stage no longer builds the server binary"
    );
}

#[test]
fn locked_builds_require_a_committed_lockfile() {
    let root = workspace_root();
    let dockerfile = std::fs::read_to_string(root.join("Dockerfile")).expect("read Dockerfile");
    if dockerfile.contains("--locked") {
        assert!(
            root.join("Cargo.lock").exists(),
            "--locked aborts the image build when no Cargo.lock is committed"
        );
    }
}
