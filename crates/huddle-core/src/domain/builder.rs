//! Builds a frozen handler tree from a domain definition

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::definition::DomainDefinition;
use crate::config::OrchestrationConfig;
use crate::orchestration::{Classifier, Handler, HandlerRegistry, Specialist, Supervisor};
use crate::tool::ToolManager;
use crate::{Error, Result};

/// A ready-to-serve domain
pub struct Domain {
    pub name: String,
    pub description: String,
    pub persona: Option<String>,
    /// Entry handlers the decomposer may target
    pub registry: Arc<HandlerRegistry>,
    /// Orchestration bounds with per-domain overrides applied
    pub orchestration: OrchestrationConfig,
    /// Total handlers in the tree, entry handlers included
    pub handler_count: usize,
}

pub struct DomainBuilder<'a> {
    definition: &'a DomainDefinition,
    tools: &'a ToolManager,
    classifier: Arc<dyn Classifier>,
    orchestration: OrchestrationConfig,
}

impl<'a> DomainBuilder<'a> {
    pub fn new(
        definition: &'a DomainDefinition,
        tools: &'a ToolManager,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            definition,
            tools,
            classifier,
            orchestration: OrchestrationConfig::default(),
        }
    }

    pub fn orchestration(mut self, config: OrchestrationConfig) -> Self {
        self.orchestration = config;
        self
    }

    /// Construct every handler bottom-up and freeze the entry registry
    pub fn build(self) -> Result<Domain> {
        self.definition.validate()?;

        for tool in self.definition.required_tools() {
            if !self.tools.contains(tool) {
                return Err(Error::Domain(format!(
                    "Tool '{}' is not registered (available: {})",
                    tool,
                    self.tools.tool_names().join(", ")
                )));
            }
        }

        let mut built: HashMap<String, Arc<dyn Handler>> = HashMap::new();
        let entry = self.definition.entry_points();

        let mut registry = HandlerRegistry::builder();
        for name in &entry {
            registry = registry.register(self.handler(name, &mut built)?)?;
        }

        let mut orchestration = self.orchestration.clone();
        if let Some(max) = self.definition.domain.max_subqueries {
            orchestration.max_subqueries = max;
        }

        info!(
            domain = %self.definition.domain.name,
            entry = entry.len(),
            handlers = built.len(),
            "Domain built"
        );

        Ok(Domain {
            name: self.definition.domain.name.clone(),
            description: self.definition.domain.description.clone(),
            persona: self.definition.domain.persona.clone(),
            registry: Arc::new(registry.build()?),
            orchestration,
            handler_count: built.len(),
        })
    }

    fn handler(&self, name: &str, built: &mut HashMap<String, Arc<dyn Handler>>) -> Result<Arc<dyn Handler>> {
        if let Some(handler) = built.get(name) {
            return Ok(Arc::clone(handler));
        }

        let handler: Arc<dyn Handler> = if let Some(def) = self.definition.supervisor(name) {
            let mut builder = Supervisor::builder(&def.name, Arc::clone(&self.classifier))
                .description(&def.description)
                .max_hops(def.max_hops.unwrap_or(self.orchestration.max_hops))
                .on_exhausted(self.orchestration.on_exhausted);
            if let Some(instructions) = &def.instructions {
                builder = builder.instructions(instructions);
            }
            for child in &def.children {
                builder = builder.child(self.handler(child, built)?);
            }
            Arc::new(builder.build()?)
        } else if let Some(def) = self.definition.specialist(name) {
            let tool = self
                .tools
                .get(&def.tool)
                .ok_or_else(|| Error::Domain(format!("Tool '{}' is not registered", def.tool)))?;
            let mut specialist = Specialist::new(&def.name, &def.description, tool, Arc::clone(&self.classifier));
            if let Some(instructions) = &def.instructions {
                specialist = specialist.with_instructions(instructions);
            }
            Arc::new(specialist)
        } else {
            return Err(Error::Domain(format!("Unknown handler '{}'", name)));
        };

        built.insert(name.to_string(), Arc::clone(&handler));
        Ok(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::testing::{FlakyTool, ScriptedClassifier};

    const DOMAIN: &str = r#"
[domain]
name = "mlb"
description = "Baseball"
max_subqueries = 3

[[supervisors]]
name = "team_supervisor"
description = "Teams"
children = ["standings_agent", "roster_agent"]
max_hops = 2

[[specialists]]
name = "standings_agent"
description = "Standings"
tool = "standings"

[[specialists]]
name = "roster_agent"
description = "Rosters"
tool = "web_search"

[[specialists]]
name = "schedule_agent"
description = "Schedules"
tool = "web_search"
"#;

    fn tools() -> ToolManager {
        let mut tools = ToolManager::new();
        tools.register(Arc::new(FlakyTool::new("standings", 0, "AL East: NYY 94-68")));
        tools.register(Arc::new(FlakyTool::new("web_search", 0, "results")));
        tools
    }

    #[test]
    fn test_build_domain() {
        let def = DomainDefinition::from_toml_str(DOMAIN).unwrap();
        let tools = tools();
        let domain = DomainBuilder::new(&def, &tools, Arc::new(ScriptedClassifier::new()))
            .build()
            .unwrap();

        assert_eq!(domain.name, "mlb");
        assert_eq!(domain.registry.names(), vec!["schedule_agent", "team_supervisor"]);
        assert_eq!(domain.handler_count, 4);
        assert_eq!(domain.orchestration.max_subqueries, 3);
    }

    #[test]
    fn test_missing_tool_rejected() {
        let def = DomainDefinition::from_toml_str(DOMAIN).unwrap();
        let mut tools = ToolManager::new();
        tools.register(Arc::new(FlakyTool::new("web_search", 0, "results")));

        let err = DomainBuilder::new(&def, &tools, Arc::new(ScriptedClassifier::new()))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("Tool 'standings' is not registered"));
    }
}
