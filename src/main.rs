use std::{process, sync::Arc, time::Duration};

use brume::{
    application::{
        error::AppError,
        feed::FeedService,
        follow::FollowService,
        posts::PostService,
        repos::{AuthorsRepo, CommentsRepo, FollowsRepo, GroupsRepo, PostsRepo, PostsWriteRepo},
    },
    config,
    infra::{
        cache::{FeedCache, FeedCacheState},
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
        uploads::ImageStore,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
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

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let state = build_http_state(repositories, &settings)?;
    let cache_state = build_cache_state(&settings);

    serve_http(&settings, state, cache_state).await
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    repositories
        .health_check()
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    info!(target = "brume::migrate", "migrations applied");
    Ok(())
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
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_http_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<HttpState, AppError> {
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let posts_write_repo: Arc<dyn PostsWriteRepo> = repositories.clone();
    let groups_repo: Arc<dyn GroupsRepo> = repositories.clone();
    let authors_repo: Arc<dyn AuthorsRepo> = repositories.clone();
    let comments_repo: Arc<dyn CommentsRepo> = repositories.clone();
    let follows_repo: Arc<dyn FollowsRepo> = repositories.clone();

    let feed = Arc::new(FeedService::new(
        posts_repo.clone(),
        groups_repo.clone(),
        authors_repo.clone(),
        follows_repo.clone(),
    ));
    let posts = Arc::new(PostService::new(
        posts_repo,
        posts_write_repo,
        groups_repo,
        authors_repo.clone(),
        comments_repo,
    ));
    let follows = Arc::new(FollowService::new(authors_repo, follows_repo));

    let image_store = Arc::new(
        ImageStore::new(settings.uploads.directory.clone())
            .map_err(|err| AppError::from(InfraError::io("create uploads directory", err)))?,
    );

    Ok(HttpState {
        feed,
        posts,
        follows,
        image_store,
        db: Some(repositories),
        max_upload_bytes: settings.uploads.max_request_bytes.get() as usize,
    })
}

fn build_cache_state(settings: &config::Settings) -> Option<FeedCacheState> {
    if !settings.feed_cache.enabled {
        return None;
    }

    let cache = Arc::new(FeedCache::new(
        settings.feed_cache.window,
        settings.feed_cache.max_entries,
    ));
    Some(FeedCacheState {
        enabled: true,
        cache,
    })
}

async fn serve_http(
    settings: &config::Settings,
    state: HttpState,
    cache_state: Option<FeedCacheState>,
) -> Result<(), AppError> {
    let router = http::build_router(state, cache_state);

    let listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::io("bind public listener", err)))?;

    info!(
        target = "brume::serve",
        addr = %settings.server.public_addr,
        "listening"
    );

    let grace = settings.server.graceful_shutdown;
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                info!(target = "brume::serve", "shutdown requested");
                let _ = shutdown_tx.send(());
            })
            .await
    };

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = deadline_after(shutdown_rx, grace) => {
            error!(
                target = "brume::serve",
                grace_secs = grace.as_secs(),
                "graceful shutdown deadline exceeded, aborting"
            );
        }
    }

    Ok(())
}

async fn deadline_after(shutdown_rx: tokio::sync::oneshot::Receiver<()>, grace: Duration) {
    if shutdown_rx.await.is_err() {
        // Sender dropped without signalling means the server exited on its own.
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(grace).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => error!(error = %err, "failed to install sigterm handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
