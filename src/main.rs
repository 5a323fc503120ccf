use axum::{extract::DefaultBodyLimit, http::Method};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use workshop_crm::{pages::pages_router, AppState, Config};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let _ = dotenv::dotenv();
    let setting = Config::read()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},tower_http=info", setting.log_level()).into()),
        )
        .init();

    let port = setting.port();
    let body_limit = setting.body_limit();
    let state = AppState::new(setting)?;
    state.gateway.create_tables()?;
    if let Err(e) = state.scratch.purge_expired() {
        tracing::warn!("scratch purge failed: {e}");
    }

    let router = pages_router()
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit));

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("workshop-crm listening on {addr}");
    axum::serve(listener, router).await?;
    Ok(())
}
