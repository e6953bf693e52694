pub mod registry;
pub mod source;

pub use registry::{ToolHandler, ToolRegistry};
pub use source::ToolSource;
