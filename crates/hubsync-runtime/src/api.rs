//! HTTP collaborator: the authoritative send and the read APIs.

use std::time::Duration;

use async_trait::async_trait;
use hubsync_core::dispatch::{ChatReply, ChatRequest};
use hubsync_core::types::{Agent, Conversation, ConversationDetail, ConversationId, Task, TaskId};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

/// User-facing failure of an API call. `Display` is the description shown
/// in the `System` error message.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Cannot connect to AgentHub server. Is it running?")]
    Unreachable { reason: String },
    #[error("{detail}")]
    Status { status: u16, detail: String },
    #[error("invalid response from server: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("invalid request url: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    fn from_send(e: reqwest::Error) -> Self {
        if e.is_connect() {
            ApiError::Unreachable {
                reason: e.to_string(),
            }
        } else {
            ApiError::Request(e)
        }
    }
}

/// Description of a non-success response: the body's `detail` field if it
/// has one, else `HTTP <status>`.
pub fn detail_from_body(status: u16, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").cloned());
    match detail {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s,
        Some(serde_json::Value::Null) | None => format!("HTTP {status}"),
        Some(serde_json::Value::String(_)) => format!("HTTP {status}"),
        Some(other) => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationPage {
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskQuery {
    pub limit: u32,
    pub offset: u32,
}

impl TaskQuery {
    pub fn recent(limit: u32) -> Self {
        Self { limit, offset: 0 }
    }
}

#[async_trait]
pub trait HubApi: Send + Sync + 'static {
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply, ApiError>;
    async fn list_agents(&self) -> Result<Vec<Agent>, ApiError>;
    async fn list_conversations(&self, limit: u32, offset: u32) -> Result<ConversationPage, ApiError>;
    async fn get_conversation(&self, id: ConversationId) -> Result<ConversationDetail, ApiError>;
    async fn list_tasks(&self, query: TaskQuery) -> Result<TaskPage, ApiError>;
    async fn get_task(&self, id: TaskId) -> Result<Task, ApiError>;
}

/// `HubApi` over reqwest. All paths live under `<base>/api/`.
pub struct HttpHubApi {
    client: reqwest::Client,
    api_base: Url,
}

impl HttpHubApi {
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::Request)?;
        let mut root = base_url.clone();
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }
        let api_base = root.join("api/")?;
        Ok(Self { client, api_base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.api_base.join(path)?)
    }

    fn tasks_url(&self, query: TaskQuery) -> Result<Url, ApiError> {
        let mut url = self.endpoint("tasks")?;
        url.query_pairs_mut()
            .append_pair("limit", &query.limit.to_string())
            .append_pair("offset", &query.offset.to_string());
        Ok(url)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await.map_err(ApiError::from_send)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = detail_from_body(status.as_u16(), &body);
            tracing::debug!(status = status.as_u16(), %detail, "api: request failed");
            return Err(ApiError::Status {
                status: status.as_u16(),
                detail,
            });
        }
        response.json::<T>().await.map_err(ApiError::Decode)
    }
}

#[async_trait]
impl HubApi for HttpHubApi {
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply, ApiError> {
        let url = self.endpoint("chat")?;
        self.fetch(self.client.post(url).json(request)).await
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, ApiError> {
        let url = self.endpoint("agents")?;
        self.fetch(self.client.get(url)).await
    }

    async fn list_conversations(&self, limit: u32, offset: u32) -> Result<ConversationPage, ApiError> {
        let mut url = self.endpoint("conversations")?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        self.fetch(self.client.get(url)).await
    }

    async fn get_conversation(&self, id: ConversationId) -> Result<ConversationDetail, ApiError> {
        let url = self.endpoint(&format!("conversations/{id}"))?;
        self.fetch(self.client.get(url)).await
    }

    async fn list_tasks(&self, query: TaskQuery) -> Result<TaskPage, ApiError> {
        let url = self.tasks_url(query)?;
        self.fetch(self.client.get(url)).await
    }

    async fn get_task(&self, id: TaskId) -> Result<Task, ApiError> {
        let url = self.endpoint(&format!("task/{id}"))?;
        self.fetch(self.client.get(url)).await
    }
}

/// In-memory `HubApi` for session tests.
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};
    use tokio::sync::Semaphore;

    #[derive(Default)]
    pub(crate) struct FakeHub {
        pub agents: Mutex<Vec<Agent>>,
        pub conversations: Mutex<HashMap<ConversationId, ConversationDetail>>,
        pub tasks: Mutex<Vec<Task>>,
        pub chat_replies: Mutex<VecDeque<Result<ChatReply, ApiError>>>,
        pub chat_requests: Mutex<Vec<ChatRequest>>,
        /// When set, `send_chat` waits for a permit before answering.
        pub gate: Option<Arc<Semaphore>>,
    }

    impl FakeHub {
        pub fn gated() -> (Self, Arc<Semaphore>) {
            let gate = Arc::new(Semaphore::new(0));
            let hub = Self {
                gate: Some(Arc::clone(&gate)),
                ..Self::default()
            };
            (hub, gate)
        }

        pub fn reply(&self, reply: Result<ChatReply, ApiError>) {
            self.chat_replies.lock().unwrap().push_back(reply);
        }

        pub fn put_conversation(&self, detail: ConversationDetail) {
            self.conversations
                .lock()
                .unwrap()
                .insert(detail.conversation.id, detail);
        }

        pub fn requests(&self) -> Vec<ChatRequest> {
            self.chat_requests.lock().unwrap().clone()
        }
    }

    fn not_found() -> ApiError {
        ApiError::Status {
            status: 404,
            detail: "Not found".into(),
        }
    }

    #[async_trait]
    impl HubApi for FakeHub {
        async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply, ApiError> {
            self.chat_requests.lock().unwrap().push(request.clone());
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            self.chat_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ApiError::Unreachable {
                    reason: "no reply queued".into(),
                }))
        }

        async fn list_agents(&self) -> Result<Vec<Agent>, ApiError> {
            Ok(self.agents.lock().unwrap().clone())
        }

        async fn list_conversations(&self, limit: u32, offset: u32) -> Result<ConversationPage, ApiError> {
            let mut conversations: Vec<Conversation> = self
                .conversations
                .lock()
                .unwrap()
                .values()
                .map(|d| d.conversation.clone())
                .collect();
            conversations.sort_by(|a, b| b.id.cmp(&a.id));
            let total = conversations.len() as u64;
            let conversations = conversations
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect();
            Ok(ConversationPage { conversations, total })
        }

        async fn get_conversation(&self, id: ConversationId) -> Result<ConversationDetail, ApiError> {
            self.conversations
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or_else(not_found)
        }

        async fn list_tasks(&self, query: TaskQuery) -> Result<TaskPage, ApiError> {
            let tasks = self.tasks.lock().unwrap();
            let total = tasks.len() as u64;
            let tasks = tasks.iter().take(query.limit as usize).cloned().collect();
            Ok(TaskPage { tasks, total })
        }

        async fn get_task(&self, id: TaskId) -> Result<Task, ApiError> {
            self.tasks
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .ok_or_else(not_found)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubsync_core::types::TaskStatus;

    #[test]
    fn detail_field_is_the_description() {
        assert_eq!(
            detail_from_body(429, r#"{"detail": "rate limited"}"#),
            "rate limited"
        );
    }

    #[test]
    fn missing_detail_falls_back_to_status() {
        assert_eq!(detail_from_body(500, "Internal Server Error"), "HTTP 500");
        assert_eq!(detail_from_body(502, r#"{"error": "x"}"#), "HTTP 502");
        assert_eq!(detail_from_body(503, r#"{"detail": null}"#), "HTTP 503");
    }

    #[test]
    fn structured_detail_is_rendered_as_json() {
        let body = r#"{"detail": [{"loc": ["body", "message"], "msg": "field required"}]}"#;
        let detail = detail_from_body(422, body);
        assert!(detail.contains("field required"));
    }

    #[test]
    fn error_display_is_user_facing() {
        let unreachable = ApiError::Unreachable {
            reason: "connection refused".into(),
        };
        assert_eq!(
            unreachable.to_string(),
            "Cannot connect to AgentHub server. Is it running?"
        );
        let status = ApiError::Status {
            status: 404,
            detail: "Conversation not found".into(),
        };
        assert_eq!(status.to_string(), "Conversation not found");
    }

    #[test]
    fn endpoints_live_under_api() {
        let base = Url::parse("http://localhost:8000").unwrap();
        let api = HttpHubApi::new(&base, Duration::from_secs(5)).unwrap();
        assert_eq!(
            api.endpoint("chat").unwrap().as_str(),
            "http://localhost:8000/api/chat"
        );
        assert_eq!(
            api.endpoint("conversations/12").unwrap().as_str(),
            "http://localhost:8000/api/conversations/12"
        );

        let prefixed = Url::parse("https://hub.example.com/agenthub").unwrap();
        let api = HttpHubApi::new(&prefixed, Duration::from_secs(5)).unwrap();
        assert_eq!(
            api.endpoint("task/3").unwrap().as_str(),
            "https://hub.example.com/agenthub/api/task/3"
        );
    }

    #[test]
    fn task_list_asks_for_the_most_recent_page() {
        let base = Url::parse("http://localhost:8000").unwrap();
        let api = HttpHubApi::new(&base, Duration::from_secs(5)).unwrap();
        assert_eq!(
            api.tasks_url(TaskQuery::recent(20)).unwrap().as_str(),
            "http://localhost:8000/api/tasks?limit=20&offset=0"
        );
    }

    #[test]
    fn pages_decode_from_read_api_shape() {
        let page: TaskPage = serde_json::from_str(
            r#"{"tasks": [{"id": 5, "conversation_id": 2, "parent_task_id": null,
                 "description": "summarize", "assigned_agent": "Writer",
                 "status": "complete", "result": "ok", "created_at": "2025-01-01 10:00:00",
                 "completed_at": null}], "total": 1, "limit": 20, "offset": 0}"#,
        )
        .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.tasks[0].assigned_agent.as_deref(), Some("Writer"));
        assert_eq!(page.tasks[0].status, TaskStatus::Complete);

        let page: ConversationPage = serde_json::from_str(
            r#"{"conversations": [{"id": 3, "title": "hello", "created_at": null, "updated_at": null}], "total": 9}"#,
        )
        .unwrap();
        assert_eq!(page.conversations[0].title, "hello");
    }
}
