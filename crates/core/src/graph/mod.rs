//! Event graph and dispatcher.
//!
//! The graph is a static, inspectable table of named steps. Each step
//! binds a unit of work and names the event raised on its successful
//! completion, or nothing, ending the path. The dispatcher is the only
//! component that controls ordering and continuation: it drains the
//! queue, runs the bound work, and emits the declared successor.

mod dispatcher;
mod queue;
mod table;

pub use dispatcher::Dispatcher;
pub use queue::{EventQueue, QueuedEvent};
pub use table::{default_graph, EventGraph, GraphError, Step};
