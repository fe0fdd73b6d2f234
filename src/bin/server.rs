use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber, filter::LevelFilter};
use unique_filter_rs::api::create_router;
use unique_filter_rs::{AppState, ServerConfig, open_store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();

    // load configuration from environment variables
    let config = ServerConfig::from_env()?;
    let filter_config = config.filter_config();
    filter_config.validate()?;

    let store = open_store(config.store)?;
    let state = Arc::new(AppState::new(store, filter_config.clone()));

    // Create router with logging middleware
    let app = create_router(state).layer(
        tower_http::trace::TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    tracing::info!(
                        status = %response.status(),
                        latency = ?latency,
                        "response generated"
                    );
                },
            ),
    );

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        r#"
    Unique Filter Server Starting

    Default Filter Configuration:
       • Property: {:>20}
       • Lookback: {:>20}
       • Expected update period: {:>6} days
       • Store: {:?}

    Server Information:
       • Listening on:  http://{}
       • Swagger UI:    http://{}/swagger-ui/
       • Health Check:  http://{}/health

    API Endpoints:
       • PUT    /filters/:id           - Configure filter
       • POST   /filters/:id/records   - Process record
       • GET    /filters/:id/memory    - Inspect remembered fingerprints
       • DELETE /filters/:id/memory    - Reset filter state
       • GET    /filters/:id/working   - Filter health
    "#,
        &filter_config.property,
        filter_config.lookback(),
        config.expected_update_period_in_days,
        config.store,
        addr,
        addr,
        addr,
    );

    axum::serve(listener, app).await?;
    Ok(())
}
