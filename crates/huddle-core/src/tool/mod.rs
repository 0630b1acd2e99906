//! Tool system
//!
//! Tools are the leaf capabilities specialists call to fetch data.

pub mod definition;
pub mod manager;
pub mod traits;

pub use definition::ToolDefinition;
pub use manager::ToolManager;
pub use traits::{Tool, ToolResult};
