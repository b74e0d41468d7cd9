mod settings;

pub use settings::{
    ApiConfig, BrokerConfig, ContentConfig, DatabaseConfig, EmailConfig, JwtConfig, OtelConfig,
    ProvidersConfig, PushConfig, ServerConfig, Settings, SmsConfig, StoreConfig,
};
