// Application layer - Fetch coordination, chart sessions and ports
pub mod chart_session;
pub mod fetch_coordinator;
pub mod live_updates;
pub mod render_state;
pub mod session_registry;
pub mod values_repository;
