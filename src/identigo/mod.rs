//! Identity and account management core.
//!
//! The pipeline turns an already-decoded command into a policy-checked,
//! transactionally-executed result: the transport resolves a session and
//! opens a transaction, builds a [`context::Context`], and hands the typed
//! command to [`executor::execute`]. Sessions, authorization, and rate
//! limiting live in their own leaf modules; storage, mail, clock, and
//! telemetry sit behind collaborator traits.

pub mod clock;
pub mod commands;
pub mod config;
pub mod context;
pub mod email;
pub mod executor;
pub mod failure;
pub mod handlers;
pub mod limit;
pub mod messages;
pub mod policy;
pub mod session;
pub mod storage;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testkit;

use anyhow::Result;
use axum::{extract::Extension, routing::get, Router};
use context::Services;
use session::SessionStore;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Run the server: background session sweepers plus the health endpoint.
pub async fn new(port: u16, services: Arc<Services>) -> Result<()> {
    let sweep = services.config.session_sweep_interval();
    let user_sweeper = SessionStore::spawn_sweeper(&services.user_sessions, sweep);
    let admin_sweeper = SessionStore::spawn_sweeper(&services.admin_sessions, sweep);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;
    tracing::info!(port, "listening");

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .layer(Extension(Arc::clone(&services)));

    let served = axum::serve(listener, app.into_make_service()).await;

    user_sweeper.abort();
    admin_sweeper.abort();
    served?;
    Ok(())
}
