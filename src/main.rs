use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use hotelbook::config::AppConfig;
use hotelbook::db;
use hotelbook::handlers;
use hotelbook::services::auth::bootstrap_admin;
use hotelbook::services::booking::run_expiry_sweep;
use hotelbook::services::payments::momo::MomoGateway;
use hotelbook::services::payments::vnpay::VnpayGateway;
use hotelbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;
    bootstrap_admin(&conn, &config)?;

    if config.momo.secret_key.is_empty() {
        tracing::warn!("MOMO_SECRET_KEY is not set, MoMo payments are not configured");
    }
    if config.vnpay.hash_secret.is_empty() {
        tracing::warn!("VNPAY_HASH_SECRET is not set, VNPay payments are not configured");
    }

    let (booking_tx, _) = broadcast::channel(256);

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        momo: Box::new(MomoGateway::new(config.momo.clone())),
        vnpay: Box::new(VnpayGateway::new(
            config.vnpay.clone(),
            config.payment_window_minutes,
        )),
        booking_tx,
    });

    let sweep_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(sweep_state.config.expiry_sweep_secs.max(1)));
        loop {
            interval.tick().await;
            if let Err(e) = run_expiry_sweep(&sweep_state) {
                tracing::error!(error = %e, "expiry sweep failed");
            }
        }
    });

    let app = handlers::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
