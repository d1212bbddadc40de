use std::sync::Arc;

use counsel_server::{
    auth::hash_password,
    clock::SystemClock,
    config::Config,
    db::{self, MemoryStore, PgStore, Store},
    engine::LifecycleEngine,
    events::{spawn_commit_writer, spawn_expiry_sweep},
    models::{AccountRow, AppState},
    routes,
};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;

    let store: Arc<dyn Store> = match &cfg.database_url {
        Some(url) => Arc::new(PgStore::new(db::connect_pg(url).await?)),
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store");
            let mem = MemoryStore::new();
            for seed in &cfg.seed_accounts {
                let password_hash = hash_password(&seed.password).map_err(anyhow::Error::msg)?;
                mem.insert_account(AccountRow {
                    account_id: Uuid::new_v4(),
                    email: seed.email.clone(),
                    display_name: seed.email.clone(),
                    password_hash,
                    role: seed.role,
                    is_active: true,
                });
            }
            Arc::new(mem)
        }
    };

    let books = store.load_all().await?;
    tracing::info!(
        appointments = books.appointments.len(),
        cases = books.cases.len(),
        payments = books.payments.len(),
        "loaded lifecycle state"
    );

    let engine = Arc::new(LifecycleEngine::with_collections(
        Arc::new(SystemClock),
        cfg.lifecycle,
        books,
    ));

    spawn_commit_writer(Arc::clone(&engine), Arc::clone(&store));
    spawn_expiry_sweep(Arc::clone(&engine), cfg.sweep_interval);

    let state = AppState {
        engine,
        store,
        session_ttl_hours: cfg.session_ttl_hours,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
