//! Store backend selection.

use std::sync::Arc;

use crate::config::StoreConfig;
use crate::infrastructure::postgres::PostgresPool;

use super::{MemoryStore, NotificationStore, PostgresStore, PreferenceStore, StoreResult};

/// Both store handles, backed by the same backend.
#[derive(Clone)]
pub struct Stores {
    pub notifications: Arc<dyn NotificationStore>,
    pub preferences: Arc<dyn PreferenceStore>,
}

impl Stores {
    /// Fresh in-memory stores.
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            notifications: store.clone(),
            preferences: store,
        }
    }
}

/// Create the stores selected by `config.backend`:
/// - `"postgres"`: `PostgresStore` if a pool is provided (schema is ensured)
/// - `"memory"` (default): `MemoryStore`
pub async fn create_stores(
    config: &StoreConfig,
    postgres_pool: Option<&PostgresPool>,
) -> StoreResult<Stores> {
    match config.backend.as_str() {
        "postgres" => {
            if let Some(pool) = postgres_pool {
                tracing::info!(backend = "postgres", "Creating PostgreSQL store");
                let store = Arc::new(PostgresStore::new(pool.pool().clone()));
                store.ensure_schema().await?;
                Ok(Stores {
                    notifications: store.clone(),
                    preferences: store,
                })
            } else {
                tracing::warn!("PostgreSQL store requested but no pool provided, falling back to memory");
                Ok(Stores::in_memory())
            }
        }
        "memory" => {
            tracing::info!(backend = "memory", "Creating memory store");
            Ok(Stores::in_memory())
        }
        other => {
            tracing::warn!(backend = %other, "Unknown store backend, falling back to memory");
            Ok(Stores::in_memory())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preference::PreferenceProfile;

    #[tokio::test]
    async fn test_postgres_without_pool_falls_back_to_memory() {
        let config = StoreConfig {
            backend: "postgres".to_string(),
        };
        let stores = create_stores(&config, None).await.unwrap();

        stores
            .preferences
            .insert_profile_if_absent(PreferenceProfile::default_for("u1", None))
            .await
            .unwrap();
        assert!(stores.preferences.get_profile("u1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memory_stores_share_backend() {
        let stores = create_stores(&StoreConfig::default(), None).await.unwrap();
        let inserted = stores
            .preferences
            .insert_profile_if_absent(PreferenceProfile::default_for("u2", Some("x@y.io")))
            .await
            .unwrap();
        assert!(inserted.created);
    }
}
