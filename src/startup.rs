//! Application Startup
//!
//! Application building and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;

use crate::application::services::ChatServiceImpl;
use crate::config::Settings;
use crate::infrastructure::database;
use crate::infrastructure::repositories::{
    PgMessageRepository, PgProjectRepository, PgRoomRepository, PgUserRepository,
};
use crate::presentation::http::routes;
use crate::presentation::middleware::{cors, logging};
use crate::presentation::websocket::{ChatGateway, ConnectionRegistry};
use crate::shared::snowflake::SnowflakeGenerator;

/// Chat service wired to the PostgreSQL repositories
pub type PgChatService = ChatServiceImpl<
    PgRoomRepository,
    PgMessageRepository,
    PgUserRepository,
    PgProjectRepository,
>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub snowflake: Arc<SnowflakeGenerator>,
    pub gateway: Arc<ChatGateway>,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Build a chat service over this state's pool. Repositories are thin
    /// handles around the shared pool, so per-request construction is cheap.
    pub fn chat_service(&self) -> PgChatService {
        ChatServiceImpl::new(
            Arc::new(PgRoomRepository::new(self.db.clone())),
            Arc::new(PgMessageRepository::new(self.db.clone())),
            Arc::new(PgUserRepository::new(self.db.clone())),
            Arc::new(PgProjectRepository::new(self.db.clone())),
            self.snowflake.clone(),
        )
    }
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        let db = database::create_pool(&settings.database).await?;
        tracing::info!("Database connection pool created");

        database::run_migrations(&db).await?;
        tracing::info!("Database migrations applied");

        let snowflake = Arc::new(SnowflakeGenerator::new(
            settings.snowflake.machine_id as u64,
            0u64,
        ));

        let registry = Arc::new(ConnectionRegistry::new());
        let gateway = Arc::new(ChatGateway::new(registry));

        let state = AppState {
            db,
            snowflake,
            gateway,
            settings: Arc::new(settings.clone()),
        };

        crate::presentation::http::handlers::health::init_server_start();

        let router = routes::create_router(state)
            .layer(logging::create_trace_layer())
            .layer(cors::create_cors_layer(&settings.cors));

        let addr: SocketAddr = settings.server_addr().parse()?;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Listening on {}", addr);

        Ok(Self { listener, router })
    }

    /// Run the server until stopped
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}
