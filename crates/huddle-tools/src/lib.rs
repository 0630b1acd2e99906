//! huddle-tools: Built-in tools for huddle specialists
//!
//! Provides the web search tool and HTTP endpoint tools declared in
//! domain files.

use huddle_core::ToolManager;
use huddle_core::config::ToolsConfig;
use huddle_core::domain::DomainDefinition;

pub mod http_endpoint;
pub mod web_search;

pub use http_endpoint::{HttpEndpointTool, register_endpoint_tools};
pub use web_search::WebSearchTool;

use std::sync::Arc;

/// Register all default built-in tools with the tool manager
pub fn register_default_tools(manager: &mut ToolManager, config: &ToolsConfig) {
    manager.register(Arc::new(WebSearchTool::new(config)));
}

/// Tool manager holding the built-in tools plus a domain's endpoint tools
pub fn tools_for_domain(definition: &DomainDefinition, config: &ToolsConfig) -> ToolManager {
    let mut manager = ToolManager::new();
    register_default_tools(&mut manager, config);
    let endpoints = register_endpoint_tools(&mut manager, &definition.tools);

    tracing::debug!(
        domain = %definition.domain.name,
        endpoints = endpoints.len(),
        "Registered domain tools"
    );

    manager
}
