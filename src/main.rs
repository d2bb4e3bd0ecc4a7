use std::{process, sync::Arc};

use ledgerdesk::{
    application::{
        auth::SessionAuthService,
        error::AppError,
        repos::{HealthRepo, TravelDataRepo, UploadSessionsRepo, UserSessionsRepo},
        travel_data::TravelDataService,
        upload_sessions::UploadSessionService,
    },
    cache::{self, CacheConfig, CacheState, CacheStore},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState, RouterState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    init_repositories(&settings).await?;
    info!(target = "ledgerdesk::migrate", "migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;

    let cache_config = CacheConfig::from(&settings.cache);
    let store = cache::connect_store(&cache_config).await?;
    let router_state = build_router_state(repositories, cache_config, store.clone(), &settings);

    let result = serve_http(&settings, router_state).await;
    store.close().await;
    result
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::Migration(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_router_state(
    repositories: Arc<PostgresRepositories>,
    cache_config: CacheConfig,
    store: Arc<dyn CacheStore>,
    settings: &config::Settings,
) -> RouterState {
    let travel_data_repo: Arc<dyn TravelDataRepo> = repositories.clone();
    let upload_sessions_repo: Arc<dyn UploadSessionsRepo> = repositories.clone();
    let user_sessions_repo: Arc<dyn UserSessionsRepo> = repositories.clone();
    let health_repo: Arc<dyn HealthRepo> = repositories;

    let api = ApiState {
        auth: Arc::new(SessionAuthService::new(user_sessions_repo)),
        travel_data: Arc::new(TravelDataService::new(travel_data_repo)),
        upload_sessions: Arc::new(UploadSessionService::new(upload_sessions_repo)),
    };

    RouterState {
        api,
        cache: CacheState::new(cache_config, store),
        health: health_repo,
        request_body_limit: settings.server.request_body_limit_bytes,
    }
}

async fn serve_http(settings: &config::Settings, state: RouterState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "ledgerdesk::serve",
        addr = %settings.server.addr,
        "listening"
    );

    let grace = settings.server.graceful_shutdown;
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(grace))
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

/// Resolves on Ctrl-C. In-flight requests then get `grace` to finish before
/// the process exits regardless.
async fn shutdown_signal(grace: std::time::Duration) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(
        target = "ledgerdesk::serve",
        grace_seconds = grace.as_secs(),
        "shutdown requested"
    );
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        warn!(
            target = "ledgerdesk::serve",
            "graceful shutdown window elapsed"
        );
        process::exit(0);
    });
}
