use crate::assessor::{Assessor, QueueAssessor};
use crate::catalog::SqliteCatalog;
use crate::db;
use crate::gradebook::Gradebook;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request, Workspace};
use crate::store;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn handle_health(state: &AppState, req: &Request) -> serde_json::Value {
    let ws = state.workspace();
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": ws.as_ref().map(|w| w.path.to_string_lossy().to_string()),
            "pendingJobs": ws.as_ref().map(|w| w.queue.len()).unwrap_or(0)
        }),
    )
}

fn handle_workspace_select(state: &AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match open_workspace(state, &path) {
        Ok(pending) => ok(
            &req.id,
            json!({ "workspacePath": path.to_string_lossy(), "pendingJobs": pending }),
        ),
        Err(e) => {
            tracing::error!(path = %path.to_string_lossy(), error = ?e, "workspace open failed");
            err(&req.id, "db_open_failed", format!("{e:?}"), None)
        }
    }
}

/// Opens (creating if needed) the workspace database and makes it current.
/// Opens (or re-opens) a workspace. Unmarked responses are queued again,
/// since the previous queue lived only in memory. Returns the queued count.
pub fn open_workspace(state: &AppState, path: &Path) -> anyhow::Result<usize> {
    let pool = db::open_pool(path, &state.config)?;
    let queue = Arc::new(QueueAssessor::new());
    let assessor: Arc<dyn Assessor> = queue.clone();
    let gradebook = Arc::new(Gradebook::new(
        pool.clone(),
        Arc::new(SqliteCatalog::new(pool)),
        assessor,
    ));
    let requeued = store::requeue_unmarked(&gradebook)?;
    state.set_workspace(Workspace {
        path: path.to_path_buf(),
        gradebook,
        queue,
    });
    tracing::info!(path = %path.to_string_lossy(), requeued, "workspace opened");
    Ok(requeued)
}

pub fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
