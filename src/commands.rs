//! CLI command implementations

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use grove_analyzer::DirectoryAnalyzer;
use grove_cache::{Cache, Session};
use grove_core::{DiskFs, DocumentUri, Folder, Options, Severity};
use grove_server::ServerState;
use grove_watcher::WatcherService;
use tokio_util::sync::CancellationToken;

/// Build a session over the local filesystem with one folder per root.
async fn open_session(roots: Vec<PathBuf>) -> anyhow::Result<Arc<Session>> {
    let mut folders = Vec::with_capacity(roots.len());
    for root in roots {
        let dir = std::fs::canonicalize(&root).with_context(|| format!("cannot resolve {}", root.display()))?;
        let options = Options::load(&dir)?;
        folders.push(Folder::new(DocumentUri::from_path(&dir), options));
    }

    let session = Arc::new(Session::new(Cache::new(), Arc::new(DirectoryAnalyzer::new()), Arc::new(DiskFs::new())));
    session.initialize(folders).await?;
    Ok(session)
}

pub async fn serve(roots: Vec<PathBuf>, host: String, port: u16, watch: bool) -> anyhow::Result<()> {
    let session = open_session(roots).await?;
    let shutdown = CancellationToken::new();

    if watch {
        let watcher = WatcherService::new(session.clone())?;
        watcher.start_watching().await?;
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = watcher.process_events(&cancel).await {
                tracing::error!("File watcher error: {}", e);
            }
        });
    }

    let stop = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down");
            stop.cancel();
        }
    });

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse().with_context(|| format!("invalid address {}:{}", host, port))?;
    let state = Arc::new(ServerState::new(session.clone()));
    let served = grove_server::serve(state, addr, shutdown.clone()).await;
    shutdown.cancel();
    session.shutdown().await;
    served
}

pub async fn views(roots: Vec<PathBuf>) -> anyhow::Result<()> {
    let session = open_session(roots).await?;
    for view in session.views().await {
        let definition = view.definition();
        println!("{}\t{}\t{}", view.id(), definition.kind, definition.root.path().display());
        for diagnostic in &definition.diagnostics {
            println!("\t{:?}: {}", diagnostic.severity, diagnostic.message);
        }
    }
    session.shutdown().await;
    Ok(())
}

pub async fn check(roots: Vec<PathBuf>) -> anyhow::Result<()> {
    let session = open_session(roots).await?;
    let cancel = CancellationToken::new();
    let mut errors = 0;

    for view in session.views().await {
        let snapshot = view.snapshot()?;
        let diagnostics = snapshot.diagnose(&cancel).await?;
        tracing::info!("{}: {} diagnostics", view.definition(), diagnostics.len());
        for diagnostic in diagnostics {
            if diagnostic.severity == Severity::Error {
                errors += 1;
            }
            let line = diagnostic.line.map(|l| format!(":{}", l + 1)).unwrap_or_default();
            println!(
                "{}{}: {:?}: {}",
                diagnostic.uri.path().display(),
                line,
                diagnostic.severity,
                diagnostic.message
            );
        }
    }
    session.shutdown().await;

    if errors > 0 {
        bail!("{} errors", errors);
    }
    Ok(())
}
