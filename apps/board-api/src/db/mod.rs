pub mod loads;
pub mod pool;
pub mod schema;
pub mod users;

use diesel_async::pooled_connection::deadpool::PoolError;

/// Failure talking to the backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] PoolError),
}
