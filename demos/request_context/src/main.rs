//! Request Context Demo
//!
//! Simulates a web server whose handler threads each enter a request context
//! before emitting events, the way request middleware would.
//!
//! Every event carries the context of the request that emitted it and never
//! that of a request handled concurrently on another thread.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package request-context-demo -- --config demos/request_context/eventrack.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use eventrack::prelude::*;
use eventrack::runtime::ConfigLoader;
use serde_json::{Map, json};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "request-context-demo")]
#[command(about = "Emit request-scoped events from concurrent handler threads")]
struct Cli {
    /// Configuration file; searched in the usual locations when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of concurrent handler threads
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Requests handled by each thread
    #[arg(short, long, default_value_t = 3)]
    requests: usize,
}

// ============================================================================
// Request Handling
// ============================================================================

/// Handles one simulated request on the current thread.
fn handle_request(tracker: &Tracker, requests: &RequestTracking, worker: usize, request: usize) {
    let user = format!("user{worker}");
    let path = if request % 3 == 2 {
        "/health".to_string()
    } else {
        format!("/courses/{request}/enroll")
    };

    let context = RequestContext::new()
        .with_session(format!("session-{worker}-{request}"))
        .with_user(worker as u64, user.as_str())
        .with_ip(format!("10.0.0.{worker}"))
        .with_host("learn.example.com")
        .with_agent("demo/1.0")
        .with_path(path.as_str());
    let _request = context.enter(tracker);

    if path == "/health" {
        tracker.emit_name("health.check");
    } else {
        let mut data = Map::new();
        data.insert("course_id".into(), json!(format!("course-{request}")));
        data.insert("mode".into(), json!("audit"));
        tracker.emit("course.enrolled", data);
    }

    let mut body = Map::new();
    body.insert("username".into(), json!(user));
    body.insert("password".into(), json!("hunter2"));
    requests.track(tracker, "POST", &path, &Map::new(), &body);
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.file(path);
    }
    let config = loader.load().context("failed to load configuration")?;
    init_from_config(&config.logging);

    let runtime = TrackingRuntime::start(config)?;
    let Some(tracker) = runtime.tracker().cloned() else {
        warn!("Tracking is disabled in the configuration, nothing to do");
        return Ok(());
    };
    let requests = Arc::new(RequestTracking::new(["/health$", "/static/"])?);

    info!(workers = cli.workers, requests = cli.requests, "Handling requests");
    let handlers: Vec<_> = (0..cli.workers)
        .map(|worker| {
            let tracker = Arc::clone(&tracker);
            let requests = Arc::clone(&requests);
            let count = cli.requests;
            tokio::task::spawn_blocking(move || {
                for request in 0..count {
                    handle_request(&tracker, &requests, worker, request);
                }
            })
        })
        .collect();
    for handler in handlers {
        handler.await?;
    }

    // Give the offload worker a moment to drain.
    tokio::time::sleep(Duration::from_millis(200)).await;
    runtime.shutdown().await;
    Ok(())
}
