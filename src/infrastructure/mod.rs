// Infrastructure layer - External dependencies and adapters
pub mod chunked_json;
pub mod config;
pub mod http_response;
pub mod http_values_repository;
pub mod websocket_notifier;
