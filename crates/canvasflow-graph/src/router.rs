use tracing::debug;

use canvasflow_core::error::RoutingError;
use canvasflow_core::route::RouteTarget;
use canvasflow_core::state::SessionState;

/// One dispatch instruction produced by the router.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub target: RouteTarget,
    /// Full copy of the state the target's sub-path starts from.
    pub payload: SessionState,
}

/// Reads the routing field and turns it into dispatch instructions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Router;

impl Router {
    /// Route the state. An unset `next` is fatal.
    pub fn route(&self, state: &SessionState) -> Result<Vec<Dispatch>, RoutingError> {
        let target = state.next.ok_or(RoutingError::Unset)?;
        debug!(target = %target, "Routing");
        Ok(vec![Dispatch {
            target,
            payload: state.clone(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvasflow_core::types::ChatMessage;

    #[test]
    fn test_route_unset_is_fatal() {
        let err = Router.route(&SessionState::default()).unwrap_err();
        assert_eq!(err, RoutingError::Unset);
    }

    #[test]
    fn test_route_carries_full_state() {
        let state = SessionState::routed(RouteTarget::UpdateArtifact)
            .with_message(ChatMessage::user("make it blue"));
        let dispatches = Router.route(&state).unwrap();

        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].target, RouteTarget::UpdateArtifact);
        assert_eq!(dispatches[0].payload, state);
    }
}
