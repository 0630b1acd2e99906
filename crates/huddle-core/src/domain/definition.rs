//! Domain definition file format
//!
//! A domain file describes one handler tree:
//!
//! ```toml
//! [domain]
//! name = "nba"
//! description = "NBA games, players and teams"
//!
//! [[supervisors]]
//! name = "player_supervisor"
//! description = "Player information and statistics"
//! children = ["player_info_agent", "player_stats_agent"]
//!
//! [[specialists]]
//! name = "player_stats_agent"
//! description = "Season and career statistics"
//! tool = "player_stats"
//!
//! [[tools]]
//! name = "player_stats"
//! description = "Look up player statistics"
//! url = "https://stats.example.com/players/{player_id}/stats"
//!
//! [tools.parameters.player_id]
//! type = "integer"
//! required = true
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::{Error, Result};

/// Parsed domain file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainDefinition {
    pub domain: DomainInfo,

    #[serde(default)]
    pub supervisors: Vec<SupervisorDef>,

    #[serde(default)]
    pub specialists: Vec<SpecialistDef>,

    /// HTTP endpoints exposed as tools to this domain's specialists
    #[serde(default)]
    pub tools: Vec<EndpointConfig>,
}

/// Domain metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainInfo {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Framing prepended to classifier prompts
    #[serde(default)]
    pub persona: Option<String>,

    /// Overrides `orchestration.max_subqueries` for this domain
    #[serde(default)]
    pub max_subqueries: Option<usize>,

    /// Handlers the decomposer may target; defaults to every unreferenced handler
    #[serde(default)]
    pub entry: Vec<String>,
}

/// A routing node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorDef {
    pub name: String,
    pub description: String,
    pub children: Vec<String>,

    #[serde(default)]
    pub instructions: Option<String>,

    /// Overrides `orchestration.max_hops` for this supervisor
    #[serde(default)]
    pub max_hops: Option<usize>,
}

/// A leaf bound to one tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistDef {
    pub name: String,
    pub description: String,
    pub tool: String,

    #[serde(default)]
    pub instructions: Option<String>,
}

/// HTTP endpoint tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub description: String,

    /// HTTP method (GET, POST, PUT, DELETE)
    #[serde(default)]
    pub method: Option<String>,

    /// URL template (supports {param} substitution)
    pub url: String,

    /// Headers to include; values support `${VAR}` expansion at load time
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Query string parameters (supports {param} substitution)
    #[serde(default)]
    pub query: BTreeMap<String, String>,

    /// Request body template (for POST/PUT)
    #[serde(default)]
    pub body: Option<JsonValue>,

    /// Path to extract from the response (e.g. "response.0.statistics")
    #[serde(default)]
    pub extract: Option<String>,

    /// Timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterDef>,
}

fn default_timeout() -> u64 {
    30
}

/// Parameter of an endpoint tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDef {
    #[serde(rename = "type", default = "default_param_type")]
    pub param_type: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<String>>,
}

fn default_param_type() -> String {
    "string".to_string()
}

impl EndpointConfig {
    /// JSON schema built from the declared parameters
    pub fn input_schema(&self) -> JsonValue {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for (name, param) in &self.parameters {
            let mut prop = json!({ "type": param.param_type });
            if let Some(desc) = &param.description {
                prop["description"] = json!(desc);
            }
            if let Some(values) = &param.enum_values {
                prop["enum"] = json!(values);
            }
            properties.insert(name.clone(), prop);

            if param.required {
                required.push(name.clone());
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required
        })
    }
}

impl DomainDefinition {
    /// Parse and validate a TOML domain definition
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let definition: DomainDefinition = toml::from_str(content)
            .map_err(|e| Error::Domain(format!("Failed to parse domain file: {}", e)))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Check the handler graph is a well-formed tree
    ///
    /// Rejects duplicate names, dangling children, supervisors without
    /// children, cycles and an empty entry set. Tool references are checked
    /// when the domain is built, against the tools actually registered.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for name in self.handler_names() {
            if !names.insert(name) {
                return Err(Error::Domain(format!(
                    "Duplicate handler '{}' in domain '{}'",
                    name, self.domain.name
                )));
            }
        }

        let mut tool_names = HashSet::new();
        for tool in &self.tools {
            if !tool_names.insert(tool.name.as_str()) {
                return Err(Error::Domain(format!("Duplicate tool '{}'", tool.name)));
            }
        }

        for supervisor in &self.supervisors {
            if supervisor.children.is_empty() {
                return Err(Error::Domain(format!(
                    "Supervisor '{}' has no children",
                    supervisor.name
                )));
            }
            if supervisor.max_hops == Some(0) {
                return Err(Error::Domain(format!(
                    "Supervisor '{}' needs max_hops >= 1",
                    supervisor.name
                )));
            }
            for child in &supervisor.children {
                if !names.contains(child.as_str()) {
                    return Err(Error::Domain(format!(
                        "Supervisor '{}' references unknown handler '{}'",
                        supervisor.name, child
                    )));
                }
            }
        }

        self.check_acyclic()?;

        let entry = self.entry_points();
        if entry.is_empty() {
            return Err(Error::Domain(format!(
                "Domain '{}' has no entry handlers",
                self.domain.name
            )));
        }
        for name in &entry {
            if !names.contains(name.as_str()) {
                return Err(Error::Domain(format!("Unknown entry handler '{}'", name)));
            }
        }

        if self.domain.max_subqueries == Some(0) {
            return Err(Error::Domain("max_subqueries must be at least 1".to_string()));
        }

        Ok(())
    }

    /// Handlers the decomposer may target
    pub fn entry_points(&self) -> Vec<String> {
        if !self.domain.entry.is_empty() {
            return self.domain.entry.clone();
        }

        let referenced: HashSet<&str> = self
            .supervisors
            .iter()
            .flat_map(|s| s.children.iter().map(String::as_str))
            .collect();

        self.handler_names()
            .filter(|name| !referenced.contains(name))
            .map(str::to_string)
            .collect()
    }

    pub fn supervisor(&self, name: &str) -> Option<&SupervisorDef> {
        self.supervisors.iter().find(|s| s.name == name)
    }

    pub fn specialist(&self, name: &str) -> Option<&SpecialistDef> {
        self.specialists.iter().find(|s| s.name == name)
    }

    /// Tool names referenced by specialists
    pub fn required_tools(&self) -> BTreeSet<&str> {
        self.specialists.iter().map(|s| s.tool.as_str()).collect()
    }

    fn handler_names(&self) -> impl Iterator<Item = &str> {
        self.supervisors
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.specialists.iter().map(|s| s.name.as_str()))
    }

    fn check_acyclic(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            def: &'a DomainDefinition,
            name: &'a str,
            marks: &mut HashMap<&'a str, Mark>,
            path: &mut Vec<&'a str>,
        ) -> Result<()> {
            match marks.get(name) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    path.push(name);
                    return Err(Error::Domain(format!(
                        "Cycle in handler graph: {}",
                        path.join(" -> ")
                    )));
                }
                None => {}
            }

            let Some(supervisor) = def.supervisor(name) else {
                marks.insert(name, Mark::Done);
                return Ok(());
            };

            marks.insert(name, Mark::Visiting);
            path.push(name);
            for child in &supervisor.children {
                visit(def, child, marks, path)?;
            }
            path.pop();
            marks.insert(name, Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        for supervisor in &self.supervisors {
            visit(self, &supervisor.name, &mut marks, &mut Vec::new())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NBA: &str = r#"
[domain]
name = "nba"
description = "NBA"

[[supervisors]]
name = "player_supervisor"
description = "Players"
children = ["player_info_agent", "player_stats_agent"]

[[supervisors]]
name = "game_supervisor"
description = "Games"
children = ["live_game_agent"]

[[specialists]]
name = "player_info_agent"
description = "Bio"
tool = "player_info"

[[specialists]]
name = "player_stats_agent"
description = "Stats"
tool = "player_stats"

[[specialists]]
name = "live_game_agent"
description = "Scores"
tool = "web_search"

[[tools]]
name = "player_stats"
description = "Stats endpoint"
url = "https://stats.example.com/players/{player_id}"
extract = "response.0"

[tools.query]
season = "{season}"

[tools.parameters.player_id]
type = "integer"
description = "Player id"
required = true

[tools.parameters.season]
description = "Season year"
"#;

    #[test]
    fn test_parse_and_entry_points() {
        let def = DomainDefinition::from_toml_str(NBA).unwrap();
        assert_eq!(def.domain.name, "nba");
        assert_eq!(def.entry_points(), vec!["player_supervisor", "game_supervisor"]);
        assert_eq!(
            def.required_tools().into_iter().collect::<Vec<_>>(),
            vec!["player_info", "player_stats", "web_search"]
        );
    }

    #[test]
    fn test_endpoint_schema() {
        let def = DomainDefinition::from_toml_str(NBA).unwrap();
        let schema = def.tools[0].input_schema();
        assert_eq!(schema["properties"]["player_id"]["type"], "integer");
        assert_eq!(schema["properties"]["season"]["type"], "string");
        assert_eq!(schema["required"], json!(["player_id"]));
        assert_eq!(def.tools[0].timeout, 30);
    }

    #[test]
    fn test_rejects_unknown_child() {
        let content = NBA.replace("[\"live_game_agent\"]", "[\"box_score_agent\"]");
        let err = DomainDefinition::from_toml_str(&content).unwrap_err();
        assert!(err.to_string().contains("box_score_agent"));
    }

    #[test]
    fn test_rejects_duplicate_handler() {
        let content = format!(
            "{}\n[[specialists]]\nname = \"live_game_agent\"\ndescription = \"dup\"\ntool = \"x\"\n",
            NBA
        );
        let err = DomainDefinition::from_toml_str(&content).unwrap_err();
        assert!(err.to_string().contains("Duplicate handler 'live_game_agent'"));
    }

    #[test]
    fn test_rejects_cycle() {
        let content = NBA.replace("[\"live_game_agent\"]", "[\"live_game_agent\", \"player_supervisor\"]")
            .replace(
                "[\"player_info_agent\", \"player_stats_agent\"]",
                "[\"player_info_agent\", \"game_supervisor\"]",
            );
        let err = DomainDefinition::from_toml_str(&content).unwrap_err();
        assert!(err.to_string().contains("Cycle"));
    }

    #[test]
    fn test_rejects_childless_supervisor() {
        let content = NBA.replace("[\"live_game_agent\"]", "[]");
        assert!(DomainDefinition::from_toml_str(&content).is_err());
    }

    #[test]
    fn test_explicit_entry() {
        let content = NBA.replace("description = \"NBA\"", "description = \"NBA\"\nentry = [\"game_supervisor\"]");
        let def = DomainDefinition::from_toml_str(&content).unwrap();
        assert_eq!(def.entry_points(), vec!["game_supervisor"]);

        let bad = NBA.replace("description = \"NBA\"", "description = \"NBA\"\nentry = [\"nope\"]");
        assert!(DomainDefinition::from_toml_str(&bad).is_err());
    }
}
