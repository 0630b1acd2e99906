//! HTTP endpoint tool
//!
//! Exposes a stats API endpoint declared in a domain file as a [`Tool`].
//! `{param}` placeholders in the URL, query string and body are filled from
//! the tool input; an optional `extract` path selects part of the JSON reply.

use async_trait::async_trait;
use huddle_core::domain::EndpointConfig;
use huddle_core::{Error, Result, Tool, ToolManager, ToolResult};
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

/// Largest response body handed back to the classifier, in bytes
const MAX_OUTPUT_BYTES: usize = 16 * 1024;

pub struct HttpEndpointTool {
    config: EndpointConfig,
    client: Client,
}

impl HttpEndpointTool {
    pub fn new(config: EndpointConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { config, client }
    }

    async fn call(&self, input: &JsonValue) -> Result<String> {
        let url = substitute_template(&self.config.url, input);
        let method = self
            .config
            .method
            .as_deref()
            .unwrap_or("GET")
            .to_ascii_uppercase();

        let mut request = match method.as_str() {
            "POST" => self.client.post(&url),
            "PUT" => self.client.put(&url),
            "DELETE" => self.client.delete(&url),
            _ => self.client.get(&url),
        };

        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let query: Vec<(&str, String)> = self
            .config
            .query
            .iter()
            .map(|(key, template)| (key.as_str(), substitute_template(template, input)))
            .filter(|(_, value)| !value.is_empty() && !has_placeholder(value))
            .collect();
        if !query.is_empty() {
            request = request.query(&query);
        }

        if let Some(body) = &self.config.body {
            request = request
                .header("content-type", "application/json")
                .body(substitute_template(&body.to_string(), input));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::ToolExecution(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ToolExecution(format!("HTTP error: {}", status)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| Error::ToolExecution(format!("Failed to read response: {}", e)))?;

        let output = match &self.config.extract {
            Some(path) => extract_json_value(&text, path)?,
            None => text,
        };

        Ok(truncate(output))
    }
}

#[async_trait]
impl Tool for HttpEndpointTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn input_schema(&self) -> JsonValue {
        self.config.input_schema()
    }

    async fn execute(&self, input: JsonValue) -> Result<ToolResult> {
        tracing::info!(tool = %self.config.name, input = %input, "Calling endpoint");

        if let Some(missing) = self
            .config
            .parameters
            .iter()
            .find(|(name, param)| param.required && input.get(name.as_str()).is_none_or(JsonValue::is_null))
            .map(|(name, _)| name)
        {
            return Ok(ToolResult::error(format!("Missing required parameter '{}'", missing)));
        }

        match self.call(&input).await {
            Ok(output) => Ok(ToolResult::success(output)),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}

/// Register one tool per endpoint declared in a domain
pub fn register_endpoint_tools(manager: &mut ToolManager, endpoints: &[EndpointConfig]) -> Vec<String> {
    endpoints
        .iter()
        .map(|endpoint| {
            manager.register(Arc::new(HttpEndpointTool::new(endpoint.clone())));
            endpoint.name.clone()
        })
        .collect()
}

/// Substitute `{key}` placeholders with input values
fn substitute_template(template: &str, input: &JsonValue) -> String {
    let mut result = template.to_string();

    if let Some(obj) = input.as_object() {
        for (key, value) in obj {
            let placeholder = format!("{{{}}}", key);
            let replacement = match value {
                JsonValue::String(s) => s.clone(),
                JsonValue::Number(n) => n.to_string(),
                JsonValue::Bool(b) => b.to_string(),
                JsonValue::Null => String::new(),
                _ => value.to_string(),
            };
            result = result.replace(&placeholder, &replacement);
        }
    }

    result
}

/// Whether a `{name}` placeholder survived substitution
fn has_placeholder(value: &str) -> bool {
    value.starts_with('{') && value.ends_with('}') && !value.contains(' ')
}

/// Extract a value from JSON using a dotted path (e.g. "response.0.statistics")
fn extract_json_value(json_str: &str, path: &str) -> Result<String> {
    let value: JsonValue = serde_json::from_str(json_str)
        .map_err(|e| Error::ToolExecution(format!("Failed to parse JSON response: {}", e)))?;

    let mut current = &value;

    for part in path.split('.').filter(|p| !p.is_empty()) {
        current = if part.chars().all(|c| c.is_ascii_digit()) {
            let index: usize = part
                .parse()
                .map_err(|_| Error::ToolExecution(format!("Invalid array index in path: {}", part)))?;
            current
                .get(index)
                .ok_or_else(|| Error::ToolExecution(format!("Array index {} out of bounds", index)))?
        } else {
            current
                .get(part)
                .ok_or_else(|| Error::ToolExecution(format!("Key '{}' not found in JSON", part)))?
        };
    }

    Ok(match current {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn truncate(mut output: String) -> String {
    if output.len() > MAX_OUTPUT_BYTES {
        let mut end = MAX_OUTPUT_BYTES;
        while !output.is_char_boundary(end) {
            end -= 1;
        }
        output.truncate(end);
        output.push_str("\n... [truncated]");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_core::domain::DomainDefinition;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint(base_url: &str) -> EndpointConfig {
        let content = format!(
            r#"
[domain]
name = "nba"

[[specialists]]
name = "player_stats_agent"
description = "Stats"
tool = "player_stats"

[[tools]]
name = "player_stats"
description = "Career statistics"
url = "{base_url}/players/{{player_id}}/stats"
extract = "response.0"

[tools.headers]
x-api-key = "secret"

[tools.query]
season = "{{season}}"

[tools.parameters.player_id]
type = "integer"
required = true

[tools.parameters.season]
description = "Season year"
"#
        );
        DomainDefinition::from_toml_str(&content).unwrap().tools.remove(0)
    }

    #[test]
    fn test_substitute_template() {
        let input = json!({ "player_id": 237, "season": "2024" });
        assert_eq!(
            substitute_template("/players/{player_id}/stats?season={season}", &input),
            "/players/237/stats?season=2024"
        );
    }

    #[test]
    fn test_extract_json_value() {
        let body = r#"{"response": [{"points": 27.1, "team": {"name": "Lakers"}}]}"#;
        assert_eq!(extract_json_value(body, "response.0.team.name").unwrap(), "Lakers");
        assert_eq!(extract_json_value(body, "response.0.points").unwrap(), "27.1");
        assert!(extract_json_value(body, "response.3").is_err());
    }

    #[test]
    fn test_truncate_long_output() {
        let long = "x".repeat(MAX_OUTPUT_BYTES + 10);
        let out = truncate(long);
        assert!(out.ends_with("[truncated]"));
    }

    #[tokio::test]
    async fn test_execute_against_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/players/237/stats"))
            .and(query_param("season", "2024"))
            .and(header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": [{"player": "LeBron James", "ppg": 27.1}]
            })))
            .mount(&server)
            .await;

        let tool = HttpEndpointTool::new(endpoint(&server.uri()));
        let result = tool
            .execute(json!({ "player_id": 237, "season": "2024" }))
            .await
            .unwrap();

        assert!(!result.is_error, "{}", result.output);
        assert!(result.output.contains("LeBron James"));
        assert!(result.output.contains("27.1"));
    }

    #[tokio::test]
    async fn test_unfilled_query_parameter_is_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/players/237/stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": ["ok"] })))
            .mount(&server)
            .await;

        let tool = HttpEndpointTool::new(endpoint(&server.uri()));
        let result = tool.execute(json!({ "player_id": 237 })).await.unwrap();

        assert!(!result.is_error);
        assert_eq!(result.output, "ok");
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests[0].url.query(), None);
    }

    #[tokio::test]
    async fn test_http_error_is_tool_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let tool = HttpEndpointTool::new(endpoint(&server.uri()));
        let result = tool.execute(json!({ "player_id": 237 })).await.unwrap();

        assert!(result.is_error);
        assert!(result.output.contains("503"));
    }

    #[tokio::test]
    async fn test_missing_required_parameter() {
        let tool = HttpEndpointTool::new(endpoint("http://127.0.0.1:9"));
        let result = tool.execute(json!({ "season": "2024" })).await.unwrap();

        assert!(result.is_error);
        assert!(result.output.contains("player_id"));
    }

    #[test]
    fn test_register_endpoint_tools() {
        let mut manager = ToolManager::new();
        let names = register_endpoint_tools(&mut manager, &[endpoint("http://localhost")]);

        assert_eq!(names, vec!["player_stats"]);
        assert!(manager.contains("player_stats"));
    }
}
