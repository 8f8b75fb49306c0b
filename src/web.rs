use std::net::SocketAddr;
use std::sync::Arc;

use miette::IntoDiagnostic;

use crate::policy::polling::VersionPollingService;
use crate::policy::web::router;
use crate::settings::Server;

/// Serve the admin API until the process is stopped.
pub async fn serve(server: &Server, polling: Arc<VersionPollingService>) -> miette::Result<()> {
    let addr: SocketAddr = format!("{}:{}", server.host, server.port)
        .parse()
        .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    tracing::info!(%addr, "Policy admin API listening");

    axum::serve(listener, router(polling))
        .await
        .into_diagnostic()?;
    Ok(())
}
