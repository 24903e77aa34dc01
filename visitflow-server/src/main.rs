//! VisitFlow服务器主程序

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use visitflow_store::{InMemoryVisitStore, SharedVisitStore};
use visitflow_web::WebServer;
use visitflow_workflow::VisitCoordinator;

use crate::config::{StorageBackend, StorageConfig, VisitFlowConfig};

/// VisitFlow服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "visitflow-server")]
#[command(about = "医院就诊排队与分诊服务")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 监听地址
    #[arg(long)]
    host: Option<String>,

    /// 服务器端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 日志级别
    #[arg(short, long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, mut config: VisitFlowConfig) -> VisitFlowConfig {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let args_config = args.config.clone();
    let config = VisitFlowConfig::load(args_config.as_deref())?;
    let config = args.apply(config);

    // 初始化日志
    let filter = EnvFilter::try_new(&config.logging.level)
        .with_context(|| format!("Invalid log level: {}", config.logging.level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    config.validate()?;

    info!("启动VisitFlow服务器...");
    info!("VisitFlow服务器配置:");
    info!("  配置文件: {}", args_config.as_deref().unwrap_or("<none>"));
    info!("  监听地址: {}:{}", config.server.host, config.server.port);
    info!("  存储后端: {:?}", config.storage.backend);

    let store = build_store(&config.storage).await?;
    let coordinator = Arc::new(VisitCoordinator::new(store));

    let server = WebServer::new(config.socket_addr()?, coordinator);

    if let Err(e) = server.run().await {
        error!("服务器启动失败: {}", e);
        return Err(e.into());
    }

    Ok(())
}

async fn build_store(config: &StorageConfig) -> Result<SharedVisitStore> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryVisitStore::new())),
        StorageBackend::Postgres => connect_postgres(config).await,
    }
}

#[cfg(feature = "postgres")]
async fn connect_postgres(config: &StorageConfig) -> Result<SharedVisitStore> {
    let url = config
        .database_url
        .as_deref()
        .context("storage.database_url is required for the postgres backend")?;

    let store = visitflow_store::PgVisitStore::connect(url, config.max_connections).await?;
    store.create_tables().await?;
    info!("Connected to PostgreSQL");

    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn connect_postgres(_config: &StorageConfig) -> Result<SharedVisitStore> {
    anyhow::bail!("visitflow-server was built without the `postgres` feature")
}
