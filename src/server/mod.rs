/// HTTP API Server module
/// Exposes the backup service over REST for the admin UI

#[cfg(feature = "server")]
pub mod routes;

#[cfg(feature = "server")]
pub mod handlers;

#[cfg(feature = "server")]
pub mod auth;

#[cfg(feature = "server")]
pub use routes::create_router;

#[cfg(feature = "server")]
use std::sync::Arc;

#[cfg(feature = "server")]
use crate::core::BackupService;

/// Shared handler state
#[cfg(feature = "server")]
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BackupService>,
    /// Expected bearer token; `None` disables authentication
    pub token: Option<String>,
}

#[cfg(feature = "server")]
impl AppState {
    pub fn new(service: Arc<BackupService>) -> Self {
        let token = service.settings().admin_token().map(str::to_string);
        Self { service, token }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }
}

#[cfg(feature = "server")]
pub async fn run(service: Arc<BackupService>, host: String, port: u16, enable_cors: bool) -> anyhow::Result<()> {
    use anyhow::Context;
    use colored::Colorize;
    use std::net::SocketAddr;

    let mut state = AppState::new(service);
    if state.token.is_none() {
        let token = auth::generate_token();
        println!("{}", "⚠️  VTC_ADMIN_TOKEN not set, generated a token for this session:".yellow());
        println!("    {}", token.bold());
        println!("    To persist, add to your environment: export VTC_ADMIN_TOKEN=\"{}\"", token);
        println!();
        state = state.with_token(Some(token));
    }

    let environment = state.service.environment();
    let app = create_router(state, enable_cors);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    println!("{}", "🚀 VTC Backup Server".bold());
    println!("   🔌 API:         http://{}/api", addr);
    println!("   🌍 Environment: {:?}", environment);
    println!("   🔒 Auth:        Enabled (token required)");
    println!();
    println!("📚 API Endpoints:");
    println!("   GET    /api/backups          - List backups");
    println!("   POST   /api/backups          - Create backup (?format=json for a JSON file)");
    println!("   GET    /api/backups/export   - Download a JSON snapshot");
    println!("   DELETE /api/backups/:name    - Delete a native backup");
    println!("   POST   /api/backups/restore  - Restore from {{filename}} or {{backup}}");
    println!("   GET    /api/backups/status   - Operation status");
    println!("   GET    /api/environment      - Runtime classification");
    println!("   GET    /api/health           - Health check");
    println!();

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
