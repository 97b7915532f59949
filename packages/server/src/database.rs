use std::time::Duration;

use sea_orm::sea_query::{
    Index, IndexCreateStatement, MysqlQueryBuilder, PostgresQueryBuilder, SqliteQueryBuilder,
};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr};
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::entity::logical_file;

pub async fn init_db(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(config.url.to_owned());

    // Set connection pool options
    opt.max_connections(config.max_connections)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(false);

    // SQLite has a single writer; without row locks, per-fingerprint
    // serialization comes from funnelling every transaction through one
    // connection.
    if config.url.starts_with("sqlite:") {
        opt.max_connections(1);
    }

    let db = Database::connect(opt).await?;
    prepare_schema(&db).await?;

    Ok(db)
}

/// Create missing tables and secondary indexes.
pub async fn prepare_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    db.get_schema_registry("filevault::entity::*").sync(db).await?;
    ensure_indexes(db).await
}

/// Ensure the `logical_file` lookup indexes exist.
///
/// Schema sync only creates primary keys and foreign keys, so the indexes
/// used by fingerprint lookups and list filters are created here.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    let indexes = [
        (
            "idx_logical_file_fingerprint_created",
            vec![logical_file::Column::Fingerprint, logical_file::Column::CreatedAt],
        ),
        ("idx_logical_file_media_type", vec![logical_file::Column::MediaType]),
        ("idx_logical_file_byte_size", vec![logical_file::Column::ByteSize]),
        ("idx_logical_file_created_at", vec![logical_file::Column::CreatedAt]),
        ("idx_logical_file_display_name", vec![logical_file::Column::DisplayName]),
    ];

    for (name, columns) in indexes {
        let mut stmt = Index::create();
        stmt.if_not_exists().name(name).table(logical_file::Entity);
        for column in columns {
            stmt.col(column);
        }

        let sql = build_index(db.get_database_backend(), &stmt);
        match db.execute_unprepared(&sql).await {
            Ok(_) => info!("Ensured index {name} exists"),
            Err(e) => warn!("Failed to create index {name}: {e}"),
        }
    }

    Ok(())
}

fn build_index(backend: DbBackend, stmt: &IndexCreateStatement) -> String {
    match backend {
        DbBackend::Postgres => stmt.to_string(PostgresQueryBuilder),
        DbBackend::Sqlite => stmt.to_string(SqliteQueryBuilder),
        _ => stmt.to_string(MysqlQueryBuilder),
    }
}
