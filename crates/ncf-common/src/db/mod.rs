pub mod pool;

pub use pool::{DbPoolError, PgPool, create_pool_from_url, create_pool_from_url_checked};
