// Application state for HTTP handlers
use crate::application::session_registry::SessionRegistry;

pub struct AppState {
    pub registry: SessionRegistry,
    /// Tooltip search radius when the request does not give one.
    pub pointer_radius_px: f64,
}
