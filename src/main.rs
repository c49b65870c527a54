use anyhow::Context;
use axum::http::{header, HeaderName, HeaderValue, Method};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use psych_eval::api::{self, SESSION_HEADER};
use psych_eval::config::Config;
use psych_eval::inference::InferenceGateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------
    // Environment + logging
    // -----------------------------
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(err) = dotenv {
        if !err.not_found() {
            warn!(error = %err, "failed to load .env file");
        }
    }

    let config = Config::from_env().context("invalid configuration")?;
    info!(?config, "configuration loaded");

    // -----------------------------
    // Shared state
    // -----------------------------
    let gateway = InferenceGateway::from_config(&config.inference);
    let state = psych_eval::build_state(&config, gateway);

    // -----------------------------
    // Routers
    // -----------------------------
    let app = api::router(state).layer(cors_layer(&config.cors_origins));

    let listener = TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;
    info!(addr = %config.bind_address, "psych-eval listening");

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(SESSION_HEADER),
        ])
        .allow_credentials(true)
}
