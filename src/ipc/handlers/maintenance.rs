use crate::ipc::helpers::{reply, workspace};
use crate::ipc::types::{AppState, Request};
use crate::store;

fn handle_recalc_aggregates(state: &AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let summary = store::recalc_all(&ws.gradebook);
    if let Ok(s) = &summary {
        tracing::info!(scanned = s.scanned, changed = s.changed, "aggregates recalculated");
    }
    reply(req, summary)
}

pub fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "maintenance.recalcAggregates" => Some(handle_recalc_aggregates(state, req)),
        _ => None,
    }
}
