pub mod config;
pub mod error;
pub mod event;
pub mod route;
pub mod state;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{CanvasError, Result, RoutingError};
pub use event::EventBus;
pub use route::{NodeId, RouteTarget};
pub use state::{GenerationSettings, SessionInputs, SessionRequest, SessionState, StateUpdate};
pub use traits::GraphNode;
pub use types::*;
