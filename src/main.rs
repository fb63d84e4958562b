use std::sync::Arc;

use moviedeck::{
    AppState,
    catalog::{CatalogClient, RateLimitGate},
    config::Config,
    db,
    local::StoreMovieLocalDataSource,
    preferences::AppPreferences,
    refresh::RefreshController,
    remote::CatalogRemoteDataSource,
    repository::{MovieDataRepository, MovieRepository},
    routes,
    store::MovieStore,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,moviedeck=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Config::from_env()?;

    let http = reqwest::Client::builder()
        .user_agent("moviedeck/0.1")
        .timeout(config.http_timeout)
        .build()?;

    let db = db::connect_and_migrate(&config.database_url).await?;
    let store = MovieStore::new(db.clone());

    let gate = Arc::new(RateLimitGate::new(config.rate_limit_cooldown));
    let catalog = CatalogClient::new(http, config.catalog_url.clone(), config.catalog_rps, gate);

    let repository: Arc<dyn MovieRepository> = Arc::new(MovieDataRepository::new(
        Arc::new(CatalogRemoteDataSource::new(Arc::new(catalog))),
        Arc::new(StoreMovieLocalDataSource::new(store)),
        config.paging,
    ));

    let refresh = Arc::new(RefreshController::new(repository.clone(), AppPreferences::new(db)));
    if refresh.decide().await {
        refresh.start();
    }

    let state = Arc::new(AppState { repository, refresh });

    let app = routes::router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any)),
    );

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
