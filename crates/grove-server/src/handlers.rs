//! REST API handlers for the grove server

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use grove_cache::{CacheError, ViewId, ViewState};
use grove_core::{Diagnostic, DocumentUri, FileHandle, FileKind, ViewKind};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::ServerState;

/// A [`CacheError`] rendered as a JSON error body.
#[derive(Debug)]
pub struct ApiError(pub CacheError);

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CacheError::UnknownView(_) | CacheError::NoPackage(_) => StatusCode::NOT_FOUND,
            CacheError::NoViews => StatusCode::NOT_FOUND,
            CacheError::SessionShutdown | CacheError::ViewShutdown(_) | CacheError::Cancelled => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CacheError::ViewExists(_) => StatusCode::CONFLICT,
            CacheError::Overlay(_) => StatusCode::BAD_REQUEST,
            CacheError::Analysis(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub session: u64,
}

#[derive(Debug, Serialize)]
pub struct ViewResponse {
    pub id: ViewId,
    pub kind: ViewKind,
    pub root: DocumentUri,
    pub folder: DocumentUri,
    pub state: ViewState,
    /// Sequence number of the current snapshot, absent after shutdown.
    pub sequence: Option<u64>,
    /// Package count, once the view has loaded.
    pub packages: Option<usize>,
    pub definition_diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Serialize)]
pub struct DiagnosticsResponse {
    pub view: ViewId,
    pub sequence: u64,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Serialize)]
pub struct OverlayResponse {
    pub uri: DocumentUri,
    pub version: i32,
    pub kind: FileKind,
    pub saved: bool,
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        session: state.session.id(),
    })
}

/// Every view of the session, in creation order.
pub async fn get_views(State(state): State<Arc<ServerState>>) -> Json<Vec<ViewResponse>> {
    let views = state.session.views().await;
    let response = views
        .iter()
        .map(|view| {
            let snapshot = view.snapshot().ok();
            let definition = view.definition();
            ViewResponse {
                id: view.id(),
                kind: definition.kind,
                root: definition.root.clone(),
                folder: definition.folder.dir.clone(),
                state: view.state(),
                sequence: snapshot.as_ref().map(|s| s.sequence_id()),
                packages: snapshot.as_ref().and_then(|s| s.metadata_if_loaded()).map(|graph| graph.len()),
                definition_diagnostics: definition.diagnostics.clone(),
            }
        })
        .collect();
    Json(response)
}

/// Full diagnostics of one view's current snapshot.
pub async fn get_view_diagnostics(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<ViewId>,
) -> Result<Json<DiagnosticsResponse>, ApiError> {
    let view = state.session.view(id).await?;
    let snapshot = view.snapshot()?;
    let diagnostics = snapshot.diagnose(&CancellationToken::new()).await?;
    Ok(Json(DiagnosticsResponse {
        view: id,
        sequence: snapshot.sequence_id(),
        diagnostics,
    }))
}

pub async fn get_overlays(State(state): State<Arc<ServerState>>) -> Json<Vec<OverlayResponse>> {
    let overlays = state
        .session
        .overlays()
        .iter()
        .map(|overlay| OverlayResponse {
            uri: overlay.uri().clone(),
            version: overlay.version(),
            kind: overlay.kind(),
            saved: overlay.saved(),
        })
        .collect();
    Json(overlays)
}

pub async fn get_watch_patterns(State(state): State<Arc<ServerState>>) -> Json<Vec<String>> {
    Json(state.session.file_watch_glob_patterns().await.into_iter().collect())
}

/// Diagnostics for open files that no view builds, keyed by path.
pub async fn get_orphans(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<BTreeMap<String, Vec<Diagnostic>>>, ApiError> {
    let orphans = state.session.orphaned_file_diagnostics(&CancellationToken::new()).await?;
    Ok(Json(
        orphans
            .into_iter()
            .map(|(uri, diagnostics)| (uri.path().display().to_string(), diagnostics))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use grove_analyzer::DirectoryAnalyzer;
    use grove_cache::{Cache, Session};
    use grove_core::{Folder, MemFs, Modification, Options};

    use super::*;

    async fn state() -> Arc<ServerState> {
        let fs = MemFs::with_files(&[
            ("/w/grove.mod", "module = \"w\""),
            ("/w/a.gv", "package w\nimport \"missing\"\nfn A() {}\n"),
        ]);
        let session = Session::new(Cache::new(), Arc::new(DirectoryAnalyzer::new()), Arc::new(fs));
        session
            .initialize(vec![Folder::new(DocumentUri::from_path("/w"), Options::default())])
            .await
            .unwrap();
        Arc::new(ServerState::new(Arc::new(session)))
    }

    fn open(path: &str, text: &str) -> Modification {
        Modification::open(DocumentUri::from_path(path), 1, text.as_bytes().to_vec(), "grove")
    }

    #[tokio::test]
    async fn test_health_check() {
        let state = state().await;
        let Json(health) = health_check(State(state.clone())).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.session, state.session.id());
    }

    #[tokio::test]
    async fn test_views_and_diagnostics() {
        let state = state().await;
        let Json(views) = get_views(State(state.clone())).await;
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].kind, ViewKind::ModuleFile);

        let Json(report) = get_view_diagnostics(State(state.clone()), Path(views[0].id)).await.unwrap();
        assert_eq!(report.diagnostics.len(), 1);
        assert!(report.diagnostics[0].message.contains("could not import missing"));

        let unknown: ViewId = "9999999".parse().unwrap();
        let missing = get_view_diagnostics(State(state), Path(unknown)).await;
        assert!(matches!(missing, Err(ApiError(CacheError::UnknownView(_)))));
    }

    #[tokio::test]
    async fn test_overlays_patterns_and_orphans() {
        let state = state().await;
        let result = state
            .session
            .modify_files(&[open("/w/a.gv", "package w\n"), open("/outside/b.gv", "package b\n")])
            .await
            .unwrap();
        assert!(result.views_changed);

        let Json(overlays) = get_overlays(State(state.clone())).await;
        assert_eq!(overlays.len(), 2);
        assert!(overlays.iter().all(|o| o.version == 1 && o.kind == FileKind::Source));

        let Json(patterns) = get_watch_patterns(State(state.clone())).await;
        assert!(patterns.iter().any(|p| p.starts_with("/outside/")));

        let Json(orphans) = get_orphans(State(state)).await.unwrap();
        assert!(orphans.is_empty());
    }
}
