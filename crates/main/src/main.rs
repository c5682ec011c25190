//! 服务入口
//!
//! 组装各层依赖并启动HTTP/WebSocket服务。

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use application::{
    BroadcastRouter, MemoryPresenceRegistry, MessageService, NoopAttachmentResolver,
    NoopNotificationSender, NotificationSender, RoomService,
};
use config::AppConfig;
use infrastructure::{
    create_pg_pool, HttpNotificationSender, PostgresMessageRepository, PostgresRoomRepository,
    PostgresUserRepository,
};
use web_api::{AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();

    let pool = Arc::new(
        create_pg_pool(&config.database.url, config.database.max_connections)
            .await
            .context("数据库连接失败")?,
    );
    sqlx::migrate!("../../migrations")
        .run(pool.as_ref())
        .await
        .context("数据库迁移失败")?;
    info!("数据库连接就绪");

    let users = Arc::new(PostgresUserRepository::new(pool.clone()));
    let rooms = Arc::new(PostgresRoomRepository::new(pool.clone()));
    let messages = Arc::new(PostgresMessageRepository::new(pool.clone()));

    let presence = Arc::new(MemoryPresenceRegistry::new());
    let notifier: Arc<dyn NotificationSender> = match &config.push.endpoint {
        Some(endpoint) => Arc::new(HttpNotificationSender::new(
            endpoint.clone(),
            config.push.api_key.clone(),
        )),
        None => {
            info!("未配置推送端点，推送通知为no-op");
            Arc::new(NoopNotificationSender)
        }
    };
    let attachments = Arc::new(NoopAttachmentResolver);

    let broadcast = Arc::new(BroadcastRouter::new(
        presence.clone(),
        users.clone(),
        rooms.clone(),
        notifier,
    ));
    let room_service = Arc::new(RoomService::new(
        rooms.clone(),
        users.clone(),
        messages.clone(),
        presence.clone(),
        broadcast.clone(),
    ));
    let message_service = Arc::new(MessageService::new(
        messages,
        rooms,
        users.clone(),
        attachments,
    ));
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    let state = AppState::new(
        room_service,
        message_service,
        users,
        presence,
        broadcast,
        jwt_service,
    );
    let app = web_api::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("监听地址失败: {addr}"))?;
    info!(address = %addr, "服务启动");

    axum::serve(listener, app).await.context("服务运行失败")?;
    Ok(())
}
