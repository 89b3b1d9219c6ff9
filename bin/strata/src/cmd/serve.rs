//! Dynamic mode - composes pages per request, nothing is written to disk

use color_eyre::eyre::{Result, WrapErr};
use strata_core::Config;
use strata_generator::OnDemand;
use tokio::net::TcpListener;

use super::build::builder;
use crate::server::create_router;

/// Serve the source tree until Ctrl-C.
pub async fn run(config: &Config) -> Result<()> {
    let on_demand = OnDemand::new(builder(config)?);
    let app = create_router(on_demand);

    let addr = format!("{}:{}", config.serve.host, config.serve.port);
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind to {addr}"))?;

    println!("  Serving at http://{addr}");
    println!("  Press Ctrl+C to stop");
    println!();
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl+C");
            }
        })
        .await
        .wrap_err("Server error")?;

    println!("  Stopped");
    Ok(())
}
