//! Integration tests for grove
//!
//! These tests drive a session over a real directory tree, the way the
//! binary does.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use grove_analyzer::DirectoryAnalyzer;
use grove_cache::{Cache, CacheError, Session};
use grove_core::{Action, DiskFs, DocumentUri, Folder, Modification, Options, ViewKind};
use tempfile::TempDir;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn workspace() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "grove.work", "members = [\"app\", \"lib\"]");
    write(root, "app/grove.mod", "module = \"app\"");
    write(root, "app/main.gv", "package main\nimport \"lib\"\nfn Main() {}\n");
    write(root, "lib/grove.mod", "module = \"lib\"");
    write(root, "lib/lib.gv", "package lib\nfn Helper() {}\n");
    temp
}

fn disk_session() -> Arc<Session> {
    Arc::new(Session::new(Cache::new(), Arc::new(DirectoryAnalyzer::new()), Arc::new(DiskFs::new())))
}

fn folder(path: &Path) -> Folder {
    Folder::new(DocumentUri::from_path(path), Options::default())
}

/// Test that the CLI can be invoked
#[test]
fn test_cli_invocation() {
    let output = Command::new(env!("CARGO_BIN_EXE_grove"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("grove"));
    assert!(stdout.contains("Workspace state cache"));
}

#[test]
fn test_views_command_lists_workspace() {
    let temp = workspace();
    let output = Command::new(env!("CARGO_BIN_EXE_grove"))
        .args(["--root", temp.path().to_str().unwrap(), "views"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("workspace-file"));
}

#[tokio::test]
async fn test_workspace_on_disk() {
    let temp = workspace();
    let session = disk_session();
    assert_ok!(session.initialize(vec![folder(temp.path())]).await);

    let views = session.views().await;
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].definition().kind, ViewKind::WorkspaceFile);

    let cancel = CancellationToken::new();
    let snapshot = views[0].snapshot().unwrap();
    let graph = snapshot.metadata_graph(&cancel).await.unwrap();
    assert_eq!(graph.len(), 2);
    assert!(snapshot.diagnose(&cancel).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_editor_buffer_shadows_disk() {
    let temp = workspace();
    let session = disk_session();
    session.initialize(vec![folder(temp.path())]).await.unwrap();
    let cancel = CancellationToken::new();
    let main = DocumentUri::from_path(temp.path().join("app/main.gv"));

    let broken = "package main\nimport \"nowhere\"\nfn Main() {}\n";
    let result = session
        .modify_files(&[Modification::open(main.clone(), 1, broken.as_bytes().to_vec(), "grove")])
        .await
        .unwrap();
    assert_eq!(result.diagnose.len(), 1);

    let snapshot = session.snapshot_of(&main, &cancel).await.unwrap();
    let diagnostics = snapshot.diagnose(&cancel).await.unwrap();
    assert!(diagnostics.iter().any(|d| d.message.contains("could not import nowhere")));

    // Disk still holds the original.
    let on_disk = std::fs::read_to_string(main.path()).unwrap();
    assert!(on_disk.contains("import \"lib\""));

    session.modify_files(&[Modification::close(main.clone())]).await.unwrap();
    let snapshot = session.snapshot_of(&main, &cancel).await.unwrap();
    assert!(snapshot.diagnose(&cancel).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_new_member_on_disk_replaces_workspace_view() {
    let temp = workspace();
    let session = disk_session();
    session.initialize(vec![folder(temp.path())]).await.unwrap();
    let before = session.views().await[0].id();

    write(temp.path(), "tools/grove.mod", "module = \"tools\"");
    write(temp.path(), "grove.work", "members = [\"app\", \"lib\", \"tools\"]");
    let work = DocumentUri::from_path(temp.path().join("grove.work"));
    let result = session
        .modify_files(&[Modification::on_disk(work, Action::Change)])
        .await
        .unwrap();

    assert!(result.views_changed);
    let views = session.views().await;
    assert_eq!(views.len(), 1);
    assert_ne!(views[0].id(), before);
    assert_eq!(views[0].definition().workspace_modules.len(), 3);
}

#[tokio::test]
async fn test_file_watcher_service() {
    use grove_watcher::WatcherService;

    let temp = workspace();
    let session = disk_session();
    session.initialize(vec![folder(temp.path())]).await.unwrap();

    let watcher = WatcherService::new(session.clone());
    assert!(watcher.is_ok());
    assert_ok!(watcher.unwrap().start_watching().await);
}

#[tokio::test]
async fn test_shutdown_session() {
    let temp = workspace();
    let session = disk_session();
    session.initialize(vec![folder(temp.path())]).await.unwrap();
    session.shutdown().await;

    let result = session.initialize(vec![folder(temp.path())]).await;
    assert!(matches!(result, Err(CacheError::SessionShutdown)));
}
