//! The open canvas graph: a fixed node topology entered through a router.
//!
//! Every traversal starts at `generatePath`, dispatches on the state's
//! routing field to one of eight route targets, follows static edges and
//! always ends at `cleanState`.

pub mod edge;
pub mod executor;
pub mod node;
pub mod registry;
pub mod router;
pub mod run_log;

pub use edge::{Edge, EdgeCondition, EdgeTable, Endpoint, Successor};
pub use executor::{ExecutionResult, GraphExecutor, NodeResult};
pub use node::{FnNode, PassThroughNode, ResetNode};
pub use registry::NodeRegistry;
pub use router::{Dispatch, Router};
pub use run_log::RunLogger;
