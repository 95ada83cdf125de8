use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::info;

use crate::llm::{FunctionDefinition, ToolDefinition};
use crate::search::{WebSearch, QUERY_MISSING};

pub const WEB_SEARCH: &str = "web_search";

pub fn builtin_tool_definitions() -> Vec<ToolDefinition> {
    vec![ToolDefinition {
        tool_type: "function".to_string(),
        function: FunctionDefinition {
            name: WEB_SEARCH.to_string(),
            description: "Search the web for up-to-date information. Use this for news, \
                          recent events or facts you are not sure about."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    }
                },
                "required": ["query"]
            }),
        },
    }]
}

pub async fn execute_builtin_tool(
    tool_name: &str,
    arguments: &Value,
    search: Option<&WebSearch>,
) -> Result<String> {
    match tool_name {
        WEB_SEARCH => {
            let search = search.context("Web search is not configured")?;
            let Some(query) = arguments["query"]
                .as_str()
                .map(str::trim)
                .filter(|q| !q.is_empty())
            else {
                return Ok(QUERY_MISSING.to_string());
            };
            info!("Running web search for the model");
            Ok(search.search(query).await)
        }
        _ => anyhow::bail!("Unknown tool: {}", tool_name),
    }
}
