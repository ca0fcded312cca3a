mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use treewatch::engine::{LocalUpdateChannel, WorkspaceManager};
use treewatch::fs::mock::MockFileSystem;
use treewatch::register::{FileRegister, any_path, extension, not};
use treewatch::types::{File, FileInfos};
use treewatch::watch::{ManualWatchBackend, RawChange};
use treewatch::TreewatchError;

use common::{Gate, GatedFileSystem, MockTreeBuilder, init_tracing, text_register, wait_for, with_timeout};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Toto {
    toto: String,
}

fn toto_register() -> Arc<FileRegister<Toto>> {
    Arc::new(FileRegister::new(|content: &str| {
        Some(Toto {
            toto: content.to_string(),
        })
    }))
}

fn manager(fs: &MockFileSystem, backend: &ManualWatchBackend) -> WorkspaceManager {
    init_tracing();
    WorkspaceManager::new("/ws")
        .with_file_system(Arc::new(fs.clone()))
        .with_watch_backend(Arc::new(backend.clone()))
}

fn infos_of<T: Clone>(register: &FileRegister<T>, path: &str) -> Option<T> {
    register.get_file(Path::new(path)).and_then(|f| f.infos)
}

fn sorted<T: Clone>(register: &FileRegister<T>) -> Vec<FileInfos<T>> {
    let mut files = register.files();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}

#[tokio::test]
async fn registers_follow_scan_and_live_changes() {
    let fs = MockTreeBuilder::new("/ws").file("a.aml", "X").file("b.txt", "Y").build();
    let backend = ManualWatchBackend::new();
    let workspace = manager(&fs, &backend);

    let amls = workspace.register_file_type(extension("aml"), toto_register());
    let others = workspace.register_file_type(not(extension("aml")), text_register());

    with_timeout(workspace.init()).await.unwrap();

    assert_eq!(
        amls.files(),
        vec![FileInfos {
            path: PathBuf::from("/ws/a.aml"),
            infos: Some(Toto { toto: "X".into() }),
        }]
    );
    assert_eq!(
        others.files(),
        vec![FileInfos {
            path: PathBuf::from("/ws/b.txt"),
            infos: Some("Y".to_string()),
        }]
    );

    fs.remove("/ws/b.txt");
    backend.fire("/ws/b.txt");
    wait_for("b.txt removal", || others.is_empty()).await;

    fs.add_file("/ws/c.aml", "Z");
    backend.fire("/ws/c.aml");
    wait_for("c.aml registration", || amls.len() == 2).await;
    assert_eq!(
        amls.get_file("/ws/c.aml").and_then(|f| f.infos),
        Some(Toto { toto: "Z".into() })
    );
    assert_eq!(
        workspace.files(),
        vec![File::new("/ws/a.aml", "X"), File::new("/ws/c.aml", "Z")]
    );
}

#[tokio::test]
async fn modifications_replace_register_infos() {
    let fs = MockTreeBuilder::new("/ws").file("b.txt", "Y").build();
    let backend = ManualWatchBackend::new();
    let workspace = manager(&fs, &backend);
    let texts = text_register();
    workspace.register_file_type(any_path(), texts.clone());
    with_timeout(workspace.init()).await.unwrap();

    fs.add_file("/ws/b.txt", "Y2");
    backend.fire_change("/ws/b.txt", RawChange::Change);

    wait_for("modified content", || infos_of(&texts, "/ws/b.txt").as_deref() == Some("Y2")).await;
    assert_eq!(texts.len(), 1);
}

#[tokio::test]
async fn late_registration_is_backfilled_from_cache() {
    let fs = MockTreeBuilder::new("/ws")
        .file("a.aml", "X")
        .file("b.txt", "Y")
        .file("sub/c.aml", "Z")
        .build();
    let backend = ManualWatchBackend::new();
    let workspace = manager(&fs, &backend);
    with_timeout(workspace.init()).await.unwrap();

    let amls = workspace.register_file_type(extension("aml"), toto_register());

    let paths: Vec<PathBuf> = amls.files().into_iter().map(|f| f.path).collect();
    assert_eq!(paths, vec![PathBuf::from("/ws/a.aml"), PathBuf::from("/ws/sub/c.aml")]);
}

#[tokio::test]
async fn scan_fans_out_while_live_changes_go_to_first_match() {
    let fs = MockTreeBuilder::new("/ws").file("a.aml", "X").build();
    let backend = ManualWatchBackend::new();
    let workspace = manager(&fs, &backend);
    let first = text_register();
    let second = text_register();
    workspace.register_file_type(extension("aml"), first.clone());
    workspace.register_file_type(any_path(), second.clone());
    with_timeout(workspace.init()).await.unwrap();

    assert!(first.contains(Path::new("/ws/a.aml")));
    assert!(second.contains(Path::new("/ws/a.aml")));

    fs.add_file("/ws/c.aml", "Z");
    backend.fire("/ws/c.aml");
    wait_for("c.aml in first register", || first.contains(Path::new("/ws/c.aml"))).await;
    assert!(!second.contains(Path::new("/ws/c.aml")));
}

#[tokio::test]
async fn unmatched_files_are_cached_but_not_routed() {
    let fs = MockTreeBuilder::new("/ws").build();
    let backend = ManualWatchBackend::new();
    let workspace = manager(&fs, &backend);
    let amls = workspace.register_file_type(extension("aml"), toto_register());
    with_timeout(workspace.init()).await.unwrap();

    fs.add_file("/ws/notes.md", "hello");
    backend.fire("/ws/notes.md");

    wait_for("notes.md cached", || workspace.file("/ws/notes.md").is_some()).await;
    assert!(amls.is_empty());
}

#[tokio::test]
async fn deleting_a_directory_purges_its_files() {
    let fs = MockTreeBuilder::new("/ws")
        .file("sub/d.txt", "D")
        .file("sub/e/f.txt", "F")
        .file("subway.txt", "S")
        .build();
    let backend = ManualWatchBackend::new();
    let workspace = manager(&fs, &backend);
    let texts = text_register();
    workspace.register_file_type(any_path(), texts.clone());
    with_timeout(workspace.init()).await.unwrap();
    assert_eq!(texts.len(), 3);

    fs.remove("/ws/sub");
    backend.fire("/ws/sub");

    wait_for("subtree purge", || texts.len() == 1).await;
    assert_eq!(workspace.files(), vec![File::new("/ws/subway.txt", "S")]);
    assert_eq!(workspace.watched_dirs(), vec![PathBuf::from("/ws")]);
}

#[tokio::test]
async fn pushed_updates_behave_like_modifications() {
    let fs = MockTreeBuilder::new("/ws").file("a.aml", "X").build();
    let backend = ManualWatchBackend::new();
    let channel = LocalUpdateChannel::new();
    let workspace = manager(&fs, &backend).with_update_channel(Arc::new(channel.clone()));
    let amls = workspace.register_file_type(extension("aml"), toto_register());
    with_timeout(workspace.init()).await.unwrap();

    assert_eq!(channel.publish("/ws/a.aml", "unsaved"), 1);
    wait_for("pushed content", || {
        amls.get_file("/ws/a.aml").and_then(|f| f.infos) == Some(Toto { toto: "unsaved".into() })
    })
    .await;
    assert_eq!(workspace.file("/ws/a.aml"), Some(File::new("/ws/a.aml", "unsaved")));

    // Content that never hit the disk is accepted too.
    channel.publish("/ws/draft.aml", "D");
    wait_for("draft registered", || amls.len() == 2).await;

    workspace.dispose();
    assert_eq!(channel.subscriber_count(), 0);
}

#[tokio::test]
async fn live_read_failures_are_skipped() {
    let fs = MockTreeBuilder::new("/ws").build();
    let backend = ManualWatchBackend::new();
    let workspace = manager(&fs, &backend);
    with_timeout(workspace.init()).await.unwrap();

    fs.add_file("/ws/locked.txt", "secret");
    fs.fail_reads("/ws/locked.txt");
    backend.fire("/ws/locked.txt");
    fs.add_file("/ws/open.txt", "ok");
    backend.fire("/ws/open.txt");

    wait_for("open.txt cached", || workspace.file("/ws/open.txt").is_some()).await;
    assert!(workspace.file("/ws/locked.txt").is_none());
}

#[tokio::test]
async fn failed_scan_rejects_init_but_keeps_watching() {
    let fs = MockTreeBuilder::new("/ws").file("a.txt", "A").file("b.txt", "B").build();
    fs.fail_reads("/ws/b.txt");
    let backend = ManualWatchBackend::new();
    let workspace = manager(&fs, &backend);

    let err = with_timeout(workspace.init()).await.unwrap_err();
    match err {
        TreewatchError::ReadError { path, .. } => assert_eq!(path, PathBuf::from("/ws/b.txt")),
        other => panic!("expected ReadError, got {other:?}"),
    }
    assert_eq!(workspace.watched_dirs(), vec![PathBuf::from("/ws")]);

    let again = with_timeout(workspace.init()).await;
    assert!(matches!(again, Err(TreewatchError::AlreadyInitialised)));

    fs.add_file("/ws/c.txt", "C");
    backend.fire("/ws/c.txt");
    wait_for("live event after failed scan", || workspace.file("/ws/c.txt").is_some()).await;
}

#[tokio::test]
async fn init_twice_is_rejected() {
    let fs = MockTreeBuilder::new("/ws").build();
    let backend = ManualWatchBackend::new();
    let workspace = manager(&fs, &backend);

    with_timeout(workspace.init()).await.unwrap();
    let again = with_timeout(workspace.init()).await;

    assert!(matches!(again, Err(TreewatchError::AlreadyInitialised)));
    assert_eq!(backend.attach_count("/ws"), 1);
}

#[tokio::test]
async fn dispose_is_idempotent_and_stops_updates() {
    let fs = MockTreeBuilder::new("/ws").dir("sub").build();
    let backend = ManualWatchBackend::new();
    let workspace = manager(&fs, &backend);
    let texts = text_register();
    workspace.register_file_type(any_path(), texts.clone());
    with_timeout(workspace.init()).await.unwrap();
    wait_for("sub watched", || workspace.watched_dirs().len() == 2).await;

    workspace.dispose();
    workspace.dispose();

    assert!(workspace.is_disposed());
    assert!(backend.open_watches().is_empty());
    assert!(workspace.watched_dirs().is_empty());

    fs.add_file("/ws/late.txt", "late");
    backend.fire("/ws/late.txt");
    common::settle().await;
    assert!(texts.is_empty());
}

#[tokio::test]
async fn init_after_dispose_fails() {
    let fs = MockTreeBuilder::new("/ws").build();
    let backend = ManualWatchBackend::new();
    let workspace = manager(&fs, &backend);

    workspace.dispose();

    assert!(matches!(with_timeout(workspace.init()).await, Err(TreewatchError::Disposed)));
    assert!(backend.open_watches().is_empty());
}

#[tokio::test]
async fn binding_during_a_pending_scan_matches_binding_after_it() {
    init_tracing();
    let fs = MockTreeBuilder::new("/ws")
        .file("a.aml", "X")
        .file("b.txt", "Y")
        .file("slow.txt", "S")
        .build();
    let gate = Arc::new(Gate::default());
    let gated = GatedFileSystem::reads(fs.clone(), "/ws/slow.txt", Arc::clone(&gate));
    let backend = ManualWatchBackend::new();
    let workspace = Arc::new(
        WorkspaceManager::new("/ws")
            .with_file_system(Arc::new(gated))
            .with_watch_backend(Arc::new(backend.clone())),
    );

    let init = {
        let workspace = Arc::clone(&workspace);
        tokio::spawn(async move { workspace.init().await })
    };
    wait_for("scan to block", || gate.is_waiting()).await;

    // Live changes while the scan is still running.
    fs.add_file("/ws/c.aml", "Z");
    backend.fire("/ws/c.aml");
    wait_for("c.aml cached", || workspace.file("/ws/c.aml").is_some()).await;

    let during = text_register();
    workspace.register_file_type(any_path(), during.clone());

    fs.add_file("/ws/a.aml", "X2");
    backend.fire_change("/ws/a.aml", RawChange::Change);
    wait_for("a.aml updated", || {
        workspace.file("/ws/a.aml").map(|f| f.content) == Some("X2".to_string())
    })
    .await;

    gate.open();
    with_timeout(init).await.unwrap().unwrap();

    let after = text_register();
    workspace.register_file_type(any_path(), after.clone());

    let expected = vec![
        FileInfos {
            path: PathBuf::from("/ws/a.aml"),
            infos: Some("X2".to_string()),
        },
        FileInfos {
            path: PathBuf::from("/ws/b.txt"),
            infos: Some("Y".to_string()),
        },
        FileInfos {
            path: PathBuf::from("/ws/c.aml"),
            infos: Some("Z".to_string()),
        },
        FileInfos {
            path: PathBuf::from("/ws/slow.txt"),
            infos: Some("S".to_string()),
        },
    ];
    assert_eq!(sorted(&during), expected);
    assert_eq!(sorted(&after), expected);
    assert_eq!(workspace.file("/ws/a.aml"), Some(File::new("/ws/a.aml", "X2")));
}
