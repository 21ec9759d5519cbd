use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::info;

use crate::errors::{Result, TrackerError};
use migration::{Migrator, MigratorTrait};

/// 数据库类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    MySql,
    Postgres,
}

/// 从数据库 URL 推断数据库类型，裸文件名视为 SQLite
pub fn infer_backend(database_url: &str) -> Result<Backend> {
    let url = database_url.trim();
    if url.starts_with("mysql://") || url.starts_with("mariadb://") {
        Ok(Backend::MySql)
    } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Ok(Backend::Postgres)
    } else if url.starts_with("sqlite:") || !url.contains("://") {
        Ok(Backend::Sqlite)
    } else {
        Err(TrackerError::database_config(format!(
            "Unsupported database URL: {}. Use sqlite://, mysql://, mariadb:// or postgres://",
            database_url
        )))
    }
}

/// 把裸路径转成 sqlx 可识别的 URL
fn sqlite_url(database_url: &str) -> String {
    if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite://{}?mode=rwc", database_url)
    }
}

/// 连接 SQLite 数据库（WAL，自动创建）
pub async fn connect_sqlite(database_url: &str) -> Result<DatabaseConnection> {
    use sea_orm::SqlxSqliteConnector;
    use sea_orm::sqlx::SqlitePool;
    use sea_orm::sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
    use std::str::FromStr;

    let opt = SqliteConnectOptions::from_str(&sqlite_url(database_url))
        .map_err(|e| TrackerError::database_config(format!("Invalid SQLite URL: {}", e)))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePool::connect_with(opt).await.map_err(|e| {
        TrackerError::database_connection(format!("Cannot open SQLite database: {}", e))
    })?;

    Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}

/// 连接 MySQL / PostgreSQL
pub async fn connect_pooled(database_url: &str, pool_size: u32) -> Result<DatabaseConnection> {
    let mut opt = ConnectOptions::new(database_url.to_owned());
    opt.max_connections(pool_size)
        .min_connections(pool_size.min(2))
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(false);

    Database::connect(opt).await.map_err(|e| {
        TrackerError::database_connection(format!("Cannot connect to database: {}", e))
    })
}

/// 按 URL 连接并执行迁移
pub async fn connect(database_url: &str, pool_size: u32) -> Result<DatabaseConnection> {
    let backend = infer_backend(database_url)?;
    let db = match backend {
        Backend::Sqlite => connect_sqlite(database_url).await?,
        Backend::MySql | Backend::Postgres => connect_pooled(database_url, pool_size).await?,
    };
    info!("Connected to {:?} staging database", backend);

    run_migrations(&db).await?;
    Ok(db)
}

/// 运行数据库迁移
pub async fn run_migrations(db: &DatabaseConnection) -> Result<()> {
    Migrator::up(db, None)
        .await
        .map_err(|e| TrackerError::database_operation(format!("Migration failed: {}", e)))?;

    info!("Database migrations completed");
    Ok(())
}
