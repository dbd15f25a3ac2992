use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod db;
mod domain;
mod mqtt;
mod publish;
mod rest;
mod scheduler;
mod storage;

use domain::{ChildService, ResetService, TaskService};
use mqtt::{HomeAssistantPublisher, MqttConfig, MqttSink, NoopSink, PublishSink};
use publish::PublishHandle;
use scheduler::Scheduler;
use storage::{ChildRepository, TaskRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Setting up database");
    let db = db::DbConnection::init().await?;
    let children = ChildRepository::new(db.clone());
    let tasks = TaskRepository::new(db);

    // Publication is fire-and-forget: mutations enqueue events, the worker
    // publishes them in order
    let (publish, publish_rx) = PublishHandle::channel();

    let sink: Arc<dyn PublishSink> = match MqttConfig::from_env() {
        Some(config) => Arc::new(MqttSink::connect(&config, publish.clone())),
        None => {
            info!("MQTT: No broker configured, skipping MQTT integration");
            Arc::new(NoopSink)
        }
    };
    let publisher = HomeAssistantPublisher::new(children.clone(), tasks.clone(), sink);
    publish::spawn_publish_worker(publisher.clone(), publish_rx);

    // Hourly reset sweep
    let scheduler = Scheduler::new(ResetService::new(tasks.clone()), publish.clone());
    scheduler.clone().spawn();

    let state = rest::AppState {
        child_service: ChildService::new(children.clone(), publish.clone()),
        task_service: TaskService::new(tasks, children, publish),
        scheduler,
        publisher,
    };

    // CORS setup to allow the board frontend to make requests
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = rest::router(state).layer(cors);

    let port: u16 = std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(3000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API available at http://localhost:{}/api", port);

    axum::serve(listener, app).await?;

    Ok(())
}
