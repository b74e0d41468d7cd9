mod pool;

pub use pool::PostgresPool;
