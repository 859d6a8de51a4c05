pub mod migrations;
pub mod models;
pub mod queries;
pub mod schema;

use diesel::sqlite::SqliteConnection;
use diesel::{ConnectionError, ConnectionResult};
use diesel_async::pooled_connection::{AsyncDieselConnectionManager, ManagerConfig};
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, SimpleAsyncConnection};
use futures::future::{BoxFuture, FutureExt};

pub type DbConnection = SyncConnectionWrapper<SqliteConnection>;
pub type DbPool = deadpool::managed::Pool<AsyncDieselConnectionManager<DbConnection>>;

// Per-connection settings; SQLite does not persist foreign_keys.
const CONNECTION_PRAGMAS: &str = "
    PRAGMA foreign_keys = ON;
    PRAGMA busy_timeout = 5000;
    PRAGMA journal_mode = WAL;
";

fn establish(database_url: &str) -> BoxFuture<'_, ConnectionResult<DbConnection>> {
    async move {
        let mut conn = DbConnection::establish(database_url).await?;
        conn.batch_execute(CONNECTION_PRAGMAS)
            .await
            .map_err(ConnectionError::CouldntSetupConfiguration)?;
        Ok(conn)
    }
    .boxed()
}

/// Builds the pool and brings the schema up to date.
pub async fn create_pool(database_url: &str, max_connections: usize) -> anyhow::Result<DbPool> {
    let mut manager_config = ManagerConfig::default();
    manager_config.custom_setup = Box::new(establish);
    let manager =
        AsyncDieselConnectionManager::<DbConnection>::new_with_config(database_url, manager_config);

    let pool: DbPool = deadpool::managed::Pool::builder(manager)
        .max_size(max_connections.max(1))
        .build()?;

    let mut conn = pool
        .get()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open database {}: {}", database_url, e))?;
    migrations::run(&mut *conn).await?;

    Ok(pool)
}
