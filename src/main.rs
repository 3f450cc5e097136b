use std::{future::IntoFuture, process, sync::Arc};

use feedgate::{
    application::{
        content::ContentService, error::AppError, feed::FeedService, rewrite::LinkRewriter,
        upstream::Upstream,
    },
    cache::{AllowlistRegistry, CacheConfig, FeedCache, KvStore, MemoryKv},
    config,
    infra::{
        error::InfraError,
        http::{self, Compressor, HttpState},
        telemetry,
        upstream::HttpUpstream,
    },
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const SOURCE: &str = "feedgate::serve";

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
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let state = build_http_state(&settings)?;
    serve_http(&settings, state).await
}

fn build_http_state(settings: &config::Settings) -> Result<HttpState, AppError> {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let cache = Arc::new(FeedCache::new(
        kv.clone(),
        CacheConfig::from(&settings.cache),
    ));
    let allowlist = Arc::new(AllowlistRegistry::new(kv));
    let upstream: Arc<dyn Upstream> =
        Arc::new(HttpUpstream::from_settings(&settings.upstream).map_err(AppError::from)?);
    let rewriter = LinkRewriter::new(settings.gateway.public_base_url.clone());

    let feed = Arc::new(FeedService::new(
        cache.clone(),
        allowlist.clone(),
        upstream.clone(),
        rewriter,
    ));
    let content = Arc::new(ContentService::new(allowlist.clone(), upstream));

    Ok(HttpState {
        feed,
        content,
        cache,
        allowlist,
        compressor: Compressor::default(),
        content_csp: settings.gateway.content_csp,
    })
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = SOURCE,
        addr = %settings.server.addr,
        public_base_url = %settings.gateway.public_base_url,
        "Listening"
    );

    let drain = Arc::new(Notify::new());
    let drain_signal = drain.clone();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move { drain_signal.notified().await })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            return result.map_err(|err| AppError::unexpected(format!("server error: {err}")));
        }
        _ = shutdown_signal() => {
            info!(target = SOURCE, "Shutdown signal received; draining connections");
            drain.notify_one();
        }
    }

    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(result) => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
            info!(target = SOURCE, "Server stopped");
        }
        Err(_) => warn!(
            target = SOURCE,
            grace_secs = settings.server.graceful_shutdown.as_secs(),
            "Graceful shutdown timed out; dropping open connections"
        ),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target = SOURCE, error = %err, "failed to install Ctrl+C handler");
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
                error!(target = SOURCE, error = %err, "failed to install SIGTERM handler");
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
}
