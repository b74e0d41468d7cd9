// Shared infrastructure
pub mod auth;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod metrics;
pub mod telemetry;

// Domain
pub mod message;
pub mod notification;
pub mod preference;
pub mod providers;
pub mod store;

// Processing
pub mod consumer;
pub mod dispatch;
pub mod service;

// HTTP surface
pub mod api;
pub mod server;
