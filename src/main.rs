use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &opnlaas::config::CONFIG;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        db_file = %cfg.db_file,
        db_queue_size = cfg.db_queue_size,
        db_queue_policy = ?cfg.db_queue_policy,
        smtp_host = %cfg.smtp_host.as_deref().unwrap_or("<none>"),
        lab = %cfg.lab_name,
        loglevel = %cfg.loglevel
    );
    if cfg.db_salt.is_empty() {
        warn!("db_salt is empty; password hashes are unsalted");
    }

    let mailer = opnlaas::service::mailer::from_config(cfg)?;
    let state = match opnlaas::LaasState::from_config(cfg, mailer).await {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "startup failed");
            return Err(e.into());
        }
    };
    let app = opnlaas::laas_router(state.clone());

    let addr = cfg.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    state.shutdown();
    Ok(())
}
