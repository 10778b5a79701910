mod aggregate;
mod assessor;
mod catalog;
mod config;
mod db;
mod error;
mod gradebook;
mod ipc;
mod locks;
mod model;
mod negotiation;
mod revision;
mod stats;
mod store;
#[cfg(test)]
mod test_support;
mod workers;

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

fn init_tracing(cfg: &config::Config) {
    let filter = cfg
        .log_filter
        .as_deref()
        .and_then(|f| EnvFilter::try_new(f).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    // stdout carries replies; logs go to stderr only.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn write_line(out: &Mutex<io::Stdout>, line: &str) {
    let mut stdout = match out.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    let _ = writeln!(stdout, "{}", line);
    let _ = stdout.flush();
}

fn write_reply(out: &Mutex<io::Stdout>, resp: &serde_json::Value) {
    let line = serde_json::to_string(resp).unwrap_or_else(|_| "{\"ok\":false}".to_string());
    write_line(out, &line);
}

fn main() -> anyhow::Result<()> {
    let cfg = config::Config::from_env()?;
    init_tracing(&cfg);

    let state = Arc::new(ipc::AppState::new(cfg.clone()));
    if let Some(path) = cfg.workspace.as_deref() {
        ipc::open_workspace(&state, path)?;
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gradebookd ready");

    let stdin = io::stdin();
    let stdout = Arc::new(Mutex::new(io::stdout()));
    // At most one request per pooled connection runs at a time.
    let workers = {
        let state = Arc::clone(&state);
        let stdout = Arc::clone(&stdout);
        workers::WorkerPool::new(cfg.pool_size as usize, move |req: ipc::Request| {
            let resp = ipc::handle_request(&state, req);
            write_reply(&stdout, &resp);
        })?
    };

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                tracing::warn!(error = %e, "unparseable request line");
                let reply = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                write_reply(&stdout, &reply);
                continue;
            }
        };
        tracing::debug!(id = %req.id, method = %req.method, "request");

        if ipc::runs_inline(&req.method) {
            let resp = ipc::handle_request(&state, req);
            write_reply(&stdout, &resp);
            continue;
        }

        if let Err(req) = workers.execute(req) {
            tracing::error!(id = %req.id, method = %req.method, "no worker left to run request");
            let reply = serde_json::json!({
                "id": req.id,
                "ok": false,
                "error": { "code": "internal", "message": "request workers stopped" }
            });
            write_reply(&stdout, &reply);
        }
    }

    // Let queued and in-flight requests answer before exiting on EOF.
    workers.join();
    Ok(())
}
