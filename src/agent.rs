use anyhow::Result;
use tracing::{info, warn};

use crate::config::Config;
use crate::llm::{ChatMessage, CompletionError, LlmClient, ToolDefinition};
use crate::search::WebSearch;
use crate::tools;

/// Sent when the model answers without any usable text.
pub const EMPTY_REPLY_FALLBACK: &str = "Sorry, I couldn't come up with an answer.";

/// Turns one user message into one reply through the completion API.
///
/// No state survives between calls: every message starts a fresh history of
/// system prompt plus user text. When the model asks for a tool, the tools
/// run once and a single follow-up completion produces the answer; tool calls
/// in that follow-up are ignored.
pub struct Agent {
    llm: LlmClient,
    search: Option<WebSearch>,
    system_prompt: String,
}

impl Agent {
    pub fn new(config: &Config) -> Result<Self> {
        let llm = LlmClient::new(config.llm.clone())?;
        let search = if config.search.is_enabled() {
            Some(WebSearch::new(config.search.clone())?)
        } else {
            None
        };
        Ok(Self {
            llm,
            search,
            system_prompt: config.llm.system_prompt.clone(),
        })
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        if self.search.is_some() {
            tools::builtin_tool_definitions()
        } else {
            Vec::new()
        }
    }

    pub async fn complete(&self, text: &str) -> Result<String, CompletionError> {
        let mut messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(text.trim()),
        ];
        let tools = self.tool_definitions();

        let response = self.llm.chat(&messages, &tools).await?;
        let tool_calls = match &response.tool_calls {
            Some(calls) if !calls.is_empty() => calls.clone(),
            _ => return Ok(reply_or_fallback(&response)),
        };

        info!(
            "{} requested {} tool call(s)",
            self.llm.model(),
            tool_calls.len()
        );
        messages.push(response);

        for tool_call in &tool_calls {
            let arguments: serde_json::Value = serde_json::from_str(&tool_call.function.arguments)
                .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

            let tool_result = match tools::execute_builtin_tool(
                &tool_call.function.name,
                &arguments,
                self.search.as_ref(),
            )
            .await
            {
                Ok(result) => result,
                Err(e) => format!("Tool error: {}", e),
            };

            info!(
                "Tool '{}' result length: {} chars",
                tool_call.function.name,
                tool_result.chars().count()
            );

            messages.push(ChatMessage::tool_result(&tool_call.id, tool_result));
        }

        let follow_up = self.llm.chat(&messages, &[]).await?;
        if follow_up.has_tool_calls() {
            warn!("Ignoring tool calls in the follow-up completion");
        }

        Ok(reply_or_fallback(&follow_up))
    }
}

/// The reply text of a completion message, if it carries any.
pub fn reply_text(message: &ChatMessage) -> Option<String> {
    message
        .content
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn reply_or_fallback(message: &ChatMessage) -> String {
    reply_text(message).unwrap_or_else(|| EMPTY_REPLY_FALLBACK.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        matchers::{body_string_contains, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn test_config(server: &MockServer, with_search: bool) -> Config {
        let search_key = if with_search { "search-key" } else { "" };
        let file = format!(
            r#"
            [telegram]
            bot_token = "123456:TEST"

            [llm]
            api_key = "sk-test"
            base_url = "{uri}"
            system_prompt = "be brief"

            [search]
            api_key = "{search_key}"
            endpoint = "{uri}/search"
            "#,
            uri = server.uri(),
        );
        Config::from_sources(Some(file.as_str()), |_| None).unwrap()
    }

    fn text_completion(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": text}}]
        }))
    }

    fn tool_call_completion(id: &str, query: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": id,
                    "type": "function",
                    "function": {
                        "name": "web_search",
                        "arguments": json!({"query": query}).to_string()
                    }
                }]
            }}]
        }))
    }

    async fn completion_bodies(server: &MockServer) -> Vec<serde_json::Value> {
        server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.url.path() == "/chat/completions")
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }

    #[test]
    fn test_reply_text_trims_and_rejects_blank() {
        let mut msg = ChatMessage::user("  hi there \n");
        assert_eq!(reply_text(&msg).as_deref(), Some("hi there"));
        msg.content = Some("   ".to_string());
        assert_eq!(reply_text(&msg), None);
        msg.content = None;
        assert_eq!(reply_text(&msg), None);
        assert_eq!(reply_or_fallback(&msg), EMPTY_REPLY_FALLBACK);
    }

    #[tokio::test]
    async fn test_direct_answer_uses_single_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(text_completion("hi there"))
            .expect(1)
            .mount(&server)
            .await;

        let agent = Agent::new(&test_config(&server, false)).unwrap();
        assert_eq!(agent.complete("  hello ").await.unwrap(), "hi there");

        let bodies = completion_bodies(&server).await;
        assert_eq!(
            bodies[0]["messages"],
            json!([
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hello"}
            ])
        );
        assert!(bodies[0].get("tools").is_none());
    }

    #[tokio::test]
    async fn test_null_content_becomes_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": null}}]
            })))
            .mount(&server)
            .await;

        let agent = Agent::new(&test_config(&server, false)).unwrap();
        assert_eq!(agent.complete("hello").await.unwrap(), EMPTY_REPLY_FALLBACK);
    }

    #[tokio::test]
    async fn test_tool_round_trip_issues_one_follow_up() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("authorization", "Bearer search-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"content": "Rust 1.90 released"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("tool_call_id"))
            .respond_with(text_completion("Rust 1.90 is out."))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(tool_call_completion("call_42", "latest rust release"))
            .expect(1)
            .mount(&server)
            .await;

        let agent = Agent::new(&test_config(&server, true)).unwrap();
        let reply = agent.complete("what is new in rust?").await.unwrap();
        assert_eq!(reply, "Rust 1.90 is out.");

        let bodies = completion_bodies(&server).await;
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0]["tools"][0]["function"]["name"], "web_search");
        assert_eq!(bodies[0]["tool_choice"], "auto");

        let follow_up = bodies[1]["messages"].as_array().unwrap();
        assert_eq!(follow_up.len(), 4);
        assert_eq!(follow_up[2]["role"], "assistant");
        assert_eq!(follow_up[2]["tool_calls"][0]["id"], "call_42");
        assert_eq!(follow_up[3]["role"], "tool");
        assert_eq!(follow_up[3]["tool_call_id"], "call_42");
        assert_eq!(follow_up[3]["content"], "Rust 1.90 released");
        assert!(bodies[1].get("tools").is_none());
    }

    #[tokio::test]
    async fn test_search_without_query_reports_missing_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("tool_call_id"))
            .respond_with(text_completion("What should I look up?"))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_empty",
                        "type": "function",
                        "function": {"name": "web_search", "arguments": "{}"}
                    }]
                }}]
            })))
            .mount(&server)
            .await;

        let agent = Agent::new(&test_config(&server, true)).unwrap();
        let reply = agent.complete("search something").await.unwrap();
        assert_eq!(reply, "What should I look up?");

        let bodies = completion_bodies(&server).await;
        assert_eq!(bodies.len(), 2);
        let tool_msg = &bodies[1]["messages"][3];
        assert_eq!(tool_msg["role"], "tool");
        assert_eq!(tool_msg["tool_call_id"], "call_empty");
        assert_eq!(tool_msg["content"], crate::search::QUERY_MISSING);
    }

    #[tokio::test]
    async fn test_second_tool_call_is_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(tool_call_completion("call_again", "more"))
            .mount(&server)
            .await;

        let agent = Agent::new(&test_config(&server, true)).unwrap();
        let reply = agent.complete("loop forever").await.unwrap();
        assert_eq!(reply, EMPTY_REPLY_FALLBACK);
        assert_eq!(completion_bodies(&server).await.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_result_is_reported_to_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("tool_call_id"))
            .respond_with(text_completion("I can't do that."))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "call_x",
                        "type": "function",
                        "function": {"name": "delete_everything", "arguments": "not json"}
                    }]
                }}]
            })))
            .mount(&server)
            .await;

        let agent = Agent::new(&test_config(&server, false)).unwrap();
        assert_eq!(agent.complete("hi").await.unwrap(), "I can't do that.");

        let bodies = completion_bodies(&server).await;
        let tool_msg = &bodies[1]["messages"][3];
        assert!(tool_msg["content"]
            .as_str()
            .unwrap()
            .starts_with("Tool error: Unknown tool"));
    }

    #[tokio::test]
    async fn test_api_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let agent = Agent::new(&test_config(&server, false)).unwrap();
        let err = agent.complete("hello").await.unwrap_err();
        assert!(matches!(err, CompletionError::Status { status: 500, .. }));
    }
}
