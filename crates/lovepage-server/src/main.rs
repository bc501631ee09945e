use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lovepage::draft_store::{DraftStore, SqliteDraftStore};
use lovepage::finalize::Finalizer;
use lovepage::object_store::{LocalObjectStore, ObjectStore};
use lovepage::page_store::{PageStore, SqlitePageStore};
use lovepage::paypal::PaypalAdapter;
use lovepage::pix::PixAdapter;
use lovepage::profile::{ProfileStore, SqliteProfileStore};
use lovepage::stripe::StripeAdapter;

use lovepage_server::config::ServerConfig;
use lovepage_server::state::AppState;
use lovepage_server::{maintenance, routes};

fn build_cors(origins: &[String]) -> Cors {
    if origins.is_empty() {
        // Default: allow localhost on any port
        Cors::default()
            .allowed_origin_fn(|origin, _| {
                origin
                    .to_str()
                    .map(|o| o == "http://localhost" || o.starts_with("http://localhost:"))
                    .unwrap_or(false)
            })
            .allow_any_method()
            .allowed_headers(vec!["content-type", "authorization", "x-user-id"])
            .max_age(3600)
    } else {
        let mut cors = Cors::default();
        for origin in origins {
            cors = cors.allowed_origin(origin);
        }
        cors.allow_any_method()
            .allowed_headers(vec!["content-type", "authorization", "x-user-id"])
            .max_age(3600)
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    tracing::debug!(?config, "configuration loaded");

    let drafts: Arc<dyn DraftStore> = match SqliteDraftStore::open(&config.db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("failed to open draft store at {}: {e}", config.db_path);
            std::process::exit(1);
        }
    };
    let pages: Arc<dyn PageStore> = match SqlitePageStore::open(&config.db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("failed to open page store at {}: {e}", config.db_path);
            std::process::exit(1);
        }
    };
    let profiles: Arc<dyn ProfileStore> = match SqliteProfileStore::open(&config.db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("failed to open profile store at {}: {e}", config.db_path);
            std::process::exit(1);
        }
    };

    if let Err(e) = std::fs::create_dir_all(&config.media_root) {
        tracing::error!("failed to create media root {}: {e}", config.media_root);
        std::process::exit(1);
    }
    let objects: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(
        &config.media_root,
        &config.media_base_url,
    ));

    let finalizer = Finalizer::new(
        drafts.clone(),
        pages.clone(),
        objects.clone(),
        profiles.clone(),
    );

    let http_client = reqwest::Client::new();
    let stripe = StripeAdapter::new(
        http_client.clone(),
        &config.stripe_secret_key,
        &config.return_origin,
    );
    let paypal = PaypalAdapter::new(
        http_client.clone(),
        &config.paypal_client_id,
        &config.paypal_client_secret,
    );
    let pix = PixAdapter::new(http_client, &config.pix_access_token);

    maintenance::start_media_sweep(drafts.clone(), objects.clone(), config.draft_retention_days);

    let state = web::Data::new(AppState {
        drafts,
        pages,
        finalizer,
        stripe,
        paypal,
        pix,
        pix_webhook_secret: config.pix_webhook_secret.clone(),
        stripe_webhook_secret: config.stripe_webhook_secret.clone(),
        metrics_token: config.metrics_token.clone(),
    });

    let governor_conf = GovernorConfigBuilder::default()
        .requests_per_minute(config.rate_limit_rpm)
        .finish()
        .expect("failed to build rate limiter config");

    let cors_origins = config.allowed_origins.clone();
    let port = config.port;

    tracing::info!("lovepage server listening on port {port}");
    tracing::info!("Rate limit: {} req/min per IP", config.rate_limit_rpm);
    tracing::info!("  POST http://localhost:{port}/drafts");
    tracing::info!("  POST http://localhost:{port}/webhooks/pix");
    tracing::info!("  POST http://localhost:{port}/payments/status");

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_origins))
            .wrap(Governor::new(&governor_conf))
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(262_144))
            .configure(routes::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
