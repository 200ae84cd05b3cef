//! Preview server command.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::{ServeDir, ServeFile};

/// Static routes for a built site. Paths with no file behind them get
/// `index.html`, the same routing the generated `_redirects` asks of a host.
fn preview_router(dir: &Path) -> Router {
    let index = ServeFile::new(dir.join("index.html"));
    Router::new().fallback_service(ServeDir::new(dir).fallback(index))
}

/// Run the serve command.
pub async fn run(port: u16, dir: PathBuf) -> Result<()> {
    if !dir.join("index.html").is_file() {
        anyhow::bail!(
            "No built site in {}. Run 'gazette build' first.",
            dir.display()
        );
    }

    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port)))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    let url = format!("http://{}", listener.local_addr()?);
    tracing::info!("Previewing {} at {}", dir.display(), url);

    if let Err(e) = open::that(&url) {
        tracing::debug!("Could not open browser: {}", e);
    }

    axum::serve(listener, preview_router(&dir)).await?;
    Ok(())
}
