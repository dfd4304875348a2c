use std::{process, sync::Arc, time::Duration};

use planity::{
    application::{auth::AuthService, error::AppError, tasks::TaskService, users::UserService},
    cache::{CacheConfig, CacheInvalidator, CacheState, CacheStore, spawn_reconnect_supervisor},
    config,
    infra::{db::MemoryRepositories, error::InfraError, http, telemetry},
};
use tracing::{Dispatch, Level, debug, dispatcher, error, info, warn};
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
    // A missing .env file is the normal case outside development.
    let _ = dotenvy::dotenv();

    let (cli_args, settings) = config::load_with_cli()?;
    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let store = Arc::new(CacheStore::from_config(&settings.cache)?);
    let supervisor = connect_cache(&store, &settings.cache).await?;

    let repositories = Arc::new(MemoryRepositories::new());
    let auth = Arc::new(AuthService::new(repositories.clone(), repositories.clone()));
    bootstrap_admin(&auth, &settings.auth).await?;

    let invalidator = Arc::new(CacheInvalidator::new(store.clone(), &settings.cache));
    let tasks = TaskService::new(
        repositories.clone(),
        repositories.clone(),
        repositories.clone(),
    )
    .with_cache_invalidator(invalidator.clone());
    let users = UserService::new(repositories.clone(), repositories.clone(), auth.clone())
        .with_cache_invalidator(invalidator);

    let cache = CacheState::new(store.clone(), &settings.cache);
    let dashboard_cache = cache.with_ttl(settings.cache.dashboard_ttl);
    let state = http::ApiState {
        auth,
        tasks: Arc::new(tasks),
        users: Arc::new(users),
        cache,
        dashboard_cache,
    };

    let result = serve_http(&settings.server, state).await;

    if let Some(handle) = supervisor {
        handle.abort();
        let _ = handle.await;
    }
    if !store.quit().await.is_success() {
        debug!(target = "planity::cache", "Shutting down with the cache connection unclosed");
    }

    result
}

/// Connect at startup. Unreachable is fatal only for a required cache;
/// otherwise the API starts uncached and a supervisor keeps retrying.
async fn connect_cache(
    store: &Arc<CacheStore>,
    cache: &CacheConfig,
) -> Result<Option<tokio::task::JoinHandle<()>>, AppError> {
    if !cache.is_enabled() {
        info!(target = "planity::cache", "Response cache disabled");
        return Ok(None);
    }

    match store.connect().await {
        Ok(()) => Ok(None),
        Err(err) if cache.required => Err(AppError::from(err)),
        Err(err) => {
            warn!(
                target = "planity::cache",
                error = %err,
                retry_seconds = cache.reconnect_interval.as_secs(),
                "Cache unreachable; serving uncached until it recovers"
            );
            Ok(Some(spawn_reconnect_supervisor(
                store.clone(),
                cache.reconnect_interval,
            )))
        }
    }
}

async fn bootstrap_admin(
    auth: &AuthService,
    settings: &config::AuthSettings,
) -> Result<(), AppError> {
    let outcome = auth.bootstrap_admin(&settings.bootstrap_admin).await?;
    match outcome.generated_token {
        Some(token) => info!(
            target = "planity::auth",
            user_id = %outcome.user.id,
            email = %outcome.user.email,
            token = %token,
            "Generated administrator token; it is shown only once"
        ),
        None => info!(
            target = "planity::auth",
            user_id = %outcome.user.id,
            email = %outcome.user.email,
            "Administrator token installed from configuration"
        ),
    }
    Ok(())
}

async fn serve_http(
    server: &config::ServerSettings,
    state: http::ApiState,
) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(target = "planity::http", addr = %server.addr, "Listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(server.graceful_shutdown))
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    info!(target = "planity::http", "Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM, then arms a hard deadline for in-flight
/// requests.
async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target = "planity::http", error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(target = "planity::http", error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(
        target = "planity::http",
        grace_seconds = grace.as_secs(),
        "Shutdown requested; draining connections"
    );
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        warn!(target = "planity::http", "Graceful shutdown timed out; exiting");
        process::exit(0);
    });
}
