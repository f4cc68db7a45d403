//! Tool registry: descriptors offered to the model and the dispatcher that
//! executes its calls.

pub mod descriptor;
pub mod registry;

pub use descriptor::ToolDescriptor;
pub use registry::{is_agent_tool, ToolRegistry};
