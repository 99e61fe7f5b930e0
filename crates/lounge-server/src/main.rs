mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use lounge_api::AppStateInner;
use lounge_db::Database;
use lounge_gateway::Dispatcher;
use lounge_gateway::connection;

use crate::config::Config;

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    db: Arc<Database>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lounge=debug,lounge_api=debug,lounge_db=debug,lounge_gateway=debug,tower_http=debug"
                    .into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database. Nobody is connected yet, so any stored occupancy is stale.
    let db = Database::open(&config.db_path)?;
    let cleared = db.rooms.reset_occupancy()?;
    if cleared > 0 {
        info!("Reset occupancy of {} rooms left over from the last run", cleared);
    }

    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let state = ServerState {
        dispatcher: Dispatcher::new(),
        db: Arc::new(db),
    };

    // Routes
    let ws_routes = Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/socket", get(ws_upgrade))
        .with_state(state);

    let upload_routes = lounge_api::routes(AppStateInner::new(&config.upload_dir, &config.public_url));

    let mut app = Router::new().merge(ws_routes).merge(upload_routes);
    if let Some(static_dir) = &config.static_dir {
        info!("Serving static files from {}", static_dir.display());
        app = app.fallback_service(ServeDir::new(static_dir));
    }

    let app = app
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.bind_addr()?;
    info!("Lounge server listening on {}", addr);
    info!("Uploads in {}, served as {}/uploads", config.upload_dir.display(), config.public_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, state.dispatcher, state.db))
}
