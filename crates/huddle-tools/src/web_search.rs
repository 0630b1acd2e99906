//! WebSearch tool for searching the web via the Tavily API or DuckDuckGo

use async_trait::async_trait;
use huddle_core::config::ToolsConfig;
use huddle_core::{Error, Result, Tool, ToolResult};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

/// WebSearch tool for searching the web
pub struct WebSearchTool {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    duckduckgo_url: String,
}

impl WebSearchTool {
    /// Create from the `[tools]` configuration
    pub fn new(config: &ToolsConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key: config.search_api_key.clone().filter(|k| !k.is_empty()),
            base_url: config.search_base_url.trim_end_matches('/').to_string(),
            duckduckgo_url: "https://api.duckduckgo.com".to_string(),
        }
    }

    /// Override the fallback endpoint
    pub fn with_duckduckgo_url(mut self, url: impl Into<String>) -> Self {
        self.duckduckgo_url = url.into();
        self
    }
}

/// Search input parameters
#[derive(Debug, Deserialize)]
struct SearchInput {
    /// The search query
    query: String,
    /// Maximum number of results (default: 5)
    #[serde(default = "default_limit")]
    limit: usize,
    /// "general" or "news"
    #[serde(default)]
    topic: Option<String>,
}

fn default_limit() -> usize {
    5
}

/// Tavily API response structure
#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: Option<String>,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    published_date: Option<String>,
}

/// DuckDuckGo Instant Answer API response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DuckDuckGoResponse {
    #[serde(default)]
    related_topics: Vec<DuckDuckGoTopic>,
    #[serde(default)]
    abstract_text: Option<String>,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: Option<String>,
    #[serde(default)]
    abstract_source: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DuckDuckGoTopic {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "FirstURL")]
    first_url: Option<String>,
}

impl WebSearchTool {
    /// Search using the Tavily API
    async fn search_tavily(&self, input: &SearchInput, limit: usize) -> Result<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::ToolExecution("TAVILY_API_KEY not configured".to_string()))?;

        let body = json!({
            "query": input.query,
            "max_results": limit,
            "topic": input.topic.as_deref().unwrap_or("general"),
            "include_answer": true
        });

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ToolExecution(format!("Tavily API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ToolExecution(format!(
                "Tavily API error ({}): {}",
                status, body
            )));
        }

        let tavily: TavilyResponse = response
            .json()
            .await
            .map_err(|e| Error::ToolExecution(format!("Failed to parse Tavily response: {}", e)))?;

        let mut results: Vec<SearchResult> = Vec::new();
        if let Some(answer) = tavily.answer.filter(|a| !a.is_empty()) {
            results.push(SearchResult {
                title: "Answer".to_string(),
                url: String::new(),
                snippet: answer,
                published_date: None,
            });
        }
        results.extend(tavily.results.into_iter().map(|r| SearchResult {
            title: r.title.unwrap_or_else(|| "No title".to_string()),
            url: r.url,
            snippet: r.content,
            published_date: r.published_date,
        }));

        if results.is_empty() {
            return Ok(no_results(&input.query));
        }

        Ok(format_results(&results, &input.query))
    }

    /// Search using DuckDuckGo Instant Answer API
    async fn search_duckduckgo(&self, query: &str, limit: usize) -> Result<String> {
        let response = self
            .client
            .get(&self.duckduckgo_url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| Error::ToolExecution(format!("DuckDuckGo API request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::ToolExecution(format!(
                "DuckDuckGo API error: {}",
                response.status()
            )));
        }

        let ddg: DuckDuckGoResponse = response.json().await.map_err(|e| {
            Error::ToolExecution(format!("Failed to parse DuckDuckGo response: {}", e))
        })?;

        let mut results = Vec::new();

        if let Some(abstract_text) = ddg.abstract_text.filter(|t| !t.is_empty()) {
            results.push(SearchResult {
                title: ddg.abstract_source.unwrap_or_else(|| "Summary".to_string()),
                url: ddg.abstract_url.unwrap_or_default(),
                snippet: abstract_text,
                published_date: None,
            });
        }

        for topic in &ddg.related_topics {
            if results.len() >= limit {
                break;
            }
            if let (Some(text), Some(url)) = (&topic.text, &topic.first_url) {
                if !text.is_empty() {
                    results.push(SearchResult {
                        title: extract_title_from_text(text),
                        url: url.clone(),
                        snippet: text.clone(),
                        published_date: None,
                    });
                }
            }
        }

        if results.is_empty() {
            return Ok(no_results(query));
        }

        Ok(format_results(&results, query))
    }
}

/// Internal search result structure
struct SearchResult {
    title: String,
    url: String,
    snippet: String,
    published_date: Option<String>,
}

fn no_results(query: &str) -> String {
    format!("No results found for '{}'. Try a different query.", query)
}

/// Format search results for output
fn format_results(results: &[SearchResult], query: &str) -> String {
    let mut output = format!("Search results for: \"{}\"\n\n", query);

    for (i, result) in results.iter().enumerate() {
        output.push_str(&format!("## [{}] {}\n", i + 1, result.title));
        if !result.url.is_empty() {
            output.push_str(&format!("URL: {}\n", result.url));
        }
        if let Some(date) = &result.published_date {
            output.push_str(&format!("Published: {}\n", date));
        }
        output.push_str(&format!("{}\n\n", result.snippet));
    }

    output.push_str(&format!("Found {} results.\n", results.len()));

    output
}

/// Extract title from DuckDuckGo topic text (usually in format "Title - Description")
fn extract_title_from_text(text: &str) -> String {
    text.split(" - ").next().unwrap_or("Result").to_string()
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current sports news, scores and facts. Uses Tavily when configured, \
         DuckDuckGo otherwise. Returns titles, URLs and snippets."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to look up"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default: 5, max: 10)",
                    "minimum": 1,
                    "maximum": 10
                },
                "topic": {
                    "type": "string",
                    "description": "Search category",
                    "enum": ["general", "news"]
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let search_input: SearchInput = serde_json::from_value(input)
            .map_err(|e| Error::ToolExecution(format!("Invalid input parameters: {}", e)))?;

        if search_input.query.trim().is_empty() {
            return Ok(ToolResult::error("Query cannot be empty"));
        }

        let limit = search_input.limit.clamp(1, 10);

        tracing::info!(
            query = %search_input.query,
            limit = limit,
            tavily = self.api_key.is_some(),
            "Executing web search"
        );

        if self.api_key.is_some() {
            match self.search_tavily(&search_input, limit).await {
                Ok(result) => return Ok(ToolResult::success(result)),
                Err(e) => {
                    tracing::warn!(error = %e, "Tavily search failed, falling back to DuckDuckGo");
                }
            }
        }

        match self.search_duckduckgo(&search_input.query, limit).await {
            Ok(result) => Ok(ToolResult::success(result)),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str, api_key: Option<&str>) -> ToolsConfig {
        ToolsConfig {
            search_api_key: api_key.map(str::to_string),
            search_base_url: base_url.to_string(),
            ..ToolsConfig::default()
        }
    }

    #[test]
    fn test_extract_title_from_text() {
        let text = "Los Angeles Lakers - American professional basketball team";
        assert_eq!(extract_title_from_text(text), "Los Angeles Lakers");
    }

    #[test]
    fn test_format_results() {
        let results = vec![SearchResult {
            title: "Lakers beat Celtics".to_string(),
            url: "https://example.com/recap".to_string(),
            snippet: "LeBron scored 30.".to_string(),
            published_date: Some("2026-01-15".to_string()),
        }];

        let output = format_results(&results, "lakers score");
        assert!(output.contains("Lakers beat Celtics"));
        assert!(output.contains("https://example.com/recap"));
        assert!(output.contains("2026-01-15"));
    }

    #[test]
    fn test_search_input_parsing() {
        let parsed: SearchInput = serde_json::from_value(json!({ "query": "lakers score" })).unwrap();
        assert_eq!(parsed.query, "lakers score");
        assert_eq!(parsed.limit, 5);
        assert!(parsed.topic.is_none());
    }

    #[tokio::test]
    async fn test_tavily_search() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("authorization", "Bearer tvly-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "answer": "The Lakers won 112-104.",
                "results": [{"title": "Recap", "url": "https://nba.example/recap", "content": "LAL 112 BOS 104"}]
            })))
            .mount(&server)
            .await;

        let tool = WebSearchTool::new(&config(&server.uri(), Some("tvly-test")));
        let result = tool.execute(json!({ "query": "lakers score" })).await.unwrap();

        assert!(!result.is_error);
        assert!(result.output.contains("The Lakers won 112-104."));
        assert!(result.output.contains("https://nba.example/recap"));
        assert!(result.output.contains("Found 2 results."));
    }

    #[tokio::test]
    async fn test_duckduckgo_without_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "lebron james"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "AbstractText": "LeBron James is an American basketball player.",
                "AbstractSource": "Wikipedia",
                "AbstractURL": "https://en.wikipedia.org/wiki/LeBron_James",
                "RelatedTopics": []
            })))
            .mount(&server)
            .await;

        let tool = WebSearchTool::new(&config("http://127.0.0.1:9", None)).with_duckduckgo_url(server.uri());
        let result = tool.execute(json!({ "query": "lebron james" })).await.unwrap();

        assert!(!result.is_error);
        assert!(result.output.contains("## [1] Wikipedia"));
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let tool = WebSearchTool::new(&config("http://127.0.0.1:9", None));
        let result = tool.execute(json!({ "query": "  " })).await.unwrap();
        assert!(result.is_error);
    }
}
