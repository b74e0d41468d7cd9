use std::sync::Arc;
use std::time::Instant;

use crate::auth::JwtValidator;
use crate::config::Settings;
use crate::consumer::ConsumerStatus;
use crate::infrastructure::postgres::PostgresPool;
use crate::service::NotificationService;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub jwt_validator: Arc<JwtValidator>,
    pub service: NotificationService,
    /// Present when the broker consumer is running
    pub consumer_status: Option<Arc<ConsumerStatus>>,
    pub postgres_pool: Option<PostgresPool>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings, service: NotificationService) -> Self {
        let jwt_validator = Arc::new(JwtValidator::new(&settings.jwt));

        Self {
            settings: Arc::new(settings),
            jwt_validator,
            service,
            consumer_status: None,
            postgres_pool: None,
            start_time: Instant::now(),
        }
    }

    pub fn with_consumer_status(mut self, status: Arc<ConsumerStatus>) -> Self {
        self.consumer_status = Some(status);
        self
    }

    pub fn with_postgres_pool(mut self, pool: PostgresPool) -> Self {
        self.postgres_pool = Some(pool);
        self
    }
}
