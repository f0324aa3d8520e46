use std::{process, sync::Arc, time::Duration};

use mercato::{
    application::{
        AppError, CachePolicy, DocumentStore, PageLimits, ResourceRegistry, ResourceService,
    },
    cache::{CacheStore, MemoryCache, RedisCache},
    config,
    infra::{
        db::{MemoryDocumentStore, PgDocumentStore},
        error::InfraError,
        http::{self, AppState},
        telemetry,
    },
};
use tokio::signal;
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
    let (cli_args, settings) =
        config::load_with_cli().map_err(|err| AppError::config(err.to_string()))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let registry = Arc::new(ResourceRegistry::marketplace());
    let schemas = registry.schemas();

    let store: Arc<dyn DocumentStore> = match settings.database.url.as_deref() {
        Some(url) => {
            let pool = PgDocumentStore::connect(url, settings.database.max_connections.get())
                .await
                .map_err(|err| InfraError::database(err.to_string()))?;
            PgDocumentStore::run_migrations(&pool)
                .await
                .map_err(|err| InfraError::database(err.to_string()))?;
            info!(
                target = "mercato::startup",
                "Connected to Postgres document store"
            );
            Arc::new(PgDocumentStore::new(pool, schemas))
        }
        None => {
            warn!(
                target = "mercato::startup",
                "No database URL configured; documents are kept in process memory"
            );
            Arc::new(MemoryDocumentStore::new(schemas))
        }
    };

    let cache: Arc<dyn CacheStore> = if !settings.cache.enabled {
        info!(target = "mercato::startup", "Response cache disabled");
        Arc::new(MemoryCache::new(settings.cache.capacity))
    } else {
        match settings.cache.url.as_deref() {
            Some(url) => {
                let redis = RedisCache::connect(url)
                    .await
                    .map_err(|err| InfraError::cache(err.to_string()))?;
                info!(target = "mercato::startup", "Connected to Redis cache");
                Arc::new(redis)
            }
            None => {
                info!(
                    target = "mercato::startup",
                    capacity = settings.cache.capacity.get(),
                    "No cache URL configured; using the in-process cache"
                );
                Arc::new(MemoryCache::new(settings.cache.capacity))
            }
        }
    };

    let policy = CachePolicy {
        enabled: settings.cache.enabled,
        ttl: settings.cache.ttl,
    };
    let limits = PageLimits {
        default_limit: settings.pagination.default_limit.get(),
        max_limit: settings.pagination.max_limit.get(),
    };

    let resources = Arc::new(ResourceService::new(
        Arc::clone(&store),
        cache,
        policy,
        limits,
    ));

    let state = AppState {
        resources,
        registry,
        store,
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "mercato::startup",
        addr = %settings.server.addr,
        "Listening for API requests"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(settings.server.graceful_shutdown))
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    Ok(())
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| AppError::usage("migrate requires a database URL"))?;

    let pool = PgDocumentStore::connect(url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;
    PgDocumentStore::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    info!(target = "mercato::migrate", "Migrations applied");
    Ok(())
}

/// Resolves once a shutdown signal arrives, then arms a timer that
/// force-exits if connection draining outlasts the grace period.
async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!(
        target = "mercato::startup",
        grace_seconds = grace.as_secs(),
        "Shutdown signal received; draining connections"
    );

    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        warn!(
            target = "mercato::startup",
            "Grace period elapsed before connections drained; exiting"
        );
        process::exit(0);
    });
}
