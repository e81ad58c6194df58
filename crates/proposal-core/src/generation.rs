//! Generation service client
//!
//! The transport only moves bytes. [`GenerationClient`] decides what counts
//! as success: any non-2xx status, an empty or non-JSON body, or a top-level
//! `error` field is a [`GenerationError`].

use crate::config::GenerationEndpoints;
use crate::error::GenerationError;
use proposal_tree::{ProjectId, SectionId, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Raw HTTP-like response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body text
    pub body: String,
}

impl TransportResponse {
    /// 200 response with a JSON body
    #[must_use]
    pub fn ok_json(body: &Value) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
        }
    }

    /// Whether the status is 2xx
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Wire to the generation service
#[async_trait::async_trait]
pub trait GenerationTransport: Send + Sync {
    /// POST a JSON body to `endpoint`
    async fn post(&self, endpoint: &str, body: Value) -> Result<TransportResponse, GenerationError>;
}

#[async_trait::async_trait]
impl<T: GenerationTransport + ?Sized> GenerationTransport for Arc<T> {
    async fn post(
        &self,
        endpoint: &str,
        body: Value,
    ) -> Result<TransportResponse, GenerationError> {
        (**self).post(endpoint, body).await
    }
}

/// Which task-generation workflow to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskWorkflow {
    /// Technical requirement tasks
    #[default]
    Technical,
    /// Management plan tasks
    Management,
}

/// How generated output relates to existing content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Keep existing content, add new output after it
    #[default]
    Append,
    /// Existing content was cleared first
    Replace,
}

/// Image style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageType {
    /// Technical diagram
    #[default]
    Diagram,
    /// Illustration
    Illustration,
    /// Free-form with a custom prompt
    Custom,
}

/// Project-wide outline structure request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineRequest {
    pub project_id: ProjectId,
    pub action: GenerationMode,
    pub source_ids: Vec<String>,
}

/// Task generation request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TasksRequest {
    pub project_id: ProjectId,
    pub section_id: SectionId,
    pub section_title: String,
    pub source_ids: Vec<String>,
    pub user_description: String,
    pub mode: GenerationMode,
    /// Every section title in the outline, for de-duplication
    pub all_sections: Vec<String>,
}

/// Subsection generation request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsectionsRequest {
    pub project_id: ProjectId,
    pub section_id: SectionId,
    pub section_title: String,
    pub source_ids: Vec<String>,
    pub user_description: String,
    /// Root section titles, for de-duplication
    pub all_parent_sections: Vec<String>,
}

/// Task content request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    /// Always `"task"` for task content
    pub mode: &'static str,
    pub project_id: ProjectId,
    pub section_id: SectionId,
    pub section_title: String,
    pub task_id: TaskId,
    pub task_text: String,
    pub selected_source_ids: Vec<String>,
    pub all_sections: Vec<String>,
}

/// One task's content handed to integration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationPiece {
    pub task_id: TaskId,
    pub task_text: String,
    pub content: String,
}

/// Section integration request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrateRequest {
    pub project_id: ProjectId,
    pub section_id: SectionId,
    pub section_title: String,
    pub tasks: Vec<IntegrationPiece>,
}

/// Image generation request (snake_case on the wire)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRequest {
    pub task_id: TaskId,
    pub project_id: ProjectId,
    pub task_content: String,
    pub image_type: ImageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<String>,
}

/// Acknowledgement of a structural generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    /// Service message
    pub message: Option<String>,
    /// Tasks or modules the service reports creating
    pub total: Option<u32>,
}

/// Outcome of a task generation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TasksOutcome {
    /// Service wrote tasks to the backend
    Generated(GenerationReport),
    /// Service returned draft text only; nothing was written
    Draft(String),
}

/// Outcome of a content generation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentOutcome {
    /// Reported word count
    pub word_count: u32,
    /// Content, when the service echoes it
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructureReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, alias = "total_modules", alias = "taskCount")]
    total_modules: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    word_count: Option<u32>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntegrateReply {
    #[serde(default)]
    integrated_content: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    image_url: Option<String>,
}

fn error_field(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) => Some(s.clone()),
        other => Some(
            other
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| other.to_string(), str::to_string),
        ),
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

/// Interprets generation service responses
#[derive(Debug, Clone)]
pub struct GenerationClient<T> {
    transport: T,
    endpoints: GenerationEndpoints,
    timeout: Duration,
}

impl<T: GenerationTransport> GenerationClient<T> {
    /// New client
    #[must_use]
    pub fn new(transport: T, endpoints: GenerationEndpoints, timeout: Duration) -> Self {
        Self {
            transport,
            endpoints,
            timeout,
        }
    }

    /// Configured endpoints
    #[inline]
    #[must_use]
    pub fn endpoints(&self) -> &GenerationEndpoints {
        &self.endpoints
    }

    /// POST and interpret one call
    ///
    /// # Errors
    /// Transport failure, timeout, non-2xx, empty or non-JSON body, or an
    /// `error` field in the payload
    pub async fn call(&self, endpoint: &str, body: Value) -> Result<Value, GenerationError> {
        debug!(endpoint, "generation request");
        let pending = self.transport.post(endpoint, body);
        let response = match tokio::time::timeout(self.timeout, pending).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(GenerationError::Timeout {
                    secs: self.timeout.as_secs(),
                })
            }
        };

        let parsed: Option<Value> = serde_json::from_str(&response.body).ok();
        if !response.is_success() {
            let message = parsed
                .as_ref()
                .and_then(error_field)
                .unwrap_or_else(|| response.body.trim().to_string());
            warn!(endpoint, status = response.status, "generation service returned failure status");
            return Err(GenerationError::Status {
                status: response.status,
                message,
            });
        }
        if response.body.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        let value = parsed.ok_or_else(|| {
            GenerationError::InvalidPayload(response.body.chars().take(200).collect())
        })?;
        if let Some(message) = error_field(&value) {
            return Err(GenerationError::Service(message));
        }
        Ok(value)
    }

    async fn call_as<R, D>(&self, endpoint: &str, request: &R) -> Result<D, GenerationError>
    where
        R: Serialize + Sync,
        D: serde::de::DeserializeOwned,
    {
        let body = serde_json::to_value(request)
            .map_err(|e| GenerationError::InvalidPayload(e.to_string()))?;
        let value = self.call(endpoint, body).await?;
        serde_json::from_value(value).map_err(|e| GenerationError::InvalidPayload(e.to_string()))
    }

    /// Generate the project outline structure
    ///
    /// # Errors
    /// See [`GenerationClient::call`]
    pub async fn generate_outline(
        &self,
        request: &OutlineRequest,
    ) -> Result<GenerationReport, GenerationError> {
        let reply: StructureReply = self.call_as(&self.endpoints.outline, request).await?;
        Ok(GenerationReport {
            message: reply.message,
            total: reply.total_modules,
        })
    }

    /// Generate tasks for a section
    ///
    /// # Errors
    /// See [`GenerationClient::call`]; a payload that is neither a success
    /// acknowledgement nor a draft is [`GenerationError::InvalidPayload`]
    pub async fn generate_tasks(
        &self,
        workflow: TaskWorkflow,
        request: &TasksRequest,
    ) -> Result<TasksOutcome, GenerationError> {
        let endpoint = match workflow {
            TaskWorkflow::Technical => &self.endpoints.tasks_technical,
            TaskWorkflow::Management => &self.endpoints.tasks_management,
        };
        let reply: StructureReply = self.call_as(endpoint, request).await?;
        let result = reply.result.as_ref().and_then(Value::as_str).map(str::to_string);
        if result.as_deref() == Some("success") || reply.message.is_some() {
            return Ok(TasksOutcome::Generated(GenerationReport {
                message: reply.message,
                total: reply.total_modules,
            }));
        }
        match non_empty(result) {
            Some(draft) => Ok(TasksOutcome::Draft(draft)),
            None => Err(GenerationError::InvalidPayload(
                "neither success acknowledgement nor draft".to_string(),
            )),
        }
    }

    /// Generate subsections for a section
    ///
    /// # Errors
    /// See [`GenerationClient::call`]
    pub async fn generate_subsections(
        &self,
        request: &SubsectionsRequest,
    ) -> Result<GenerationReport, GenerationError> {
        let reply: StructureReply = self.call_as(&self.endpoints.subsections, request).await?;
        Ok(GenerationReport {
            message: reply.message,
            total: reply.total_modules,
        })
    }

    /// Generate content for a task
    ///
    /// # Errors
    /// See [`GenerationClient::call`]; `success: false` is
    /// [`GenerationError::Service`]
    pub async fn generate_content(
        &self,
        request: &ContentRequest,
    ) -> Result<ContentOutcome, GenerationError> {
        let reply: ContentReply = self.call_as(&self.endpoints.content, request).await?;
        if !reply.success {
            return Err(GenerationError::Service(
                "content generation reported no success".to_string(),
            ));
        }
        Ok(ContentOutcome {
            word_count: reply.word_count.unwrap_or(0),
            content: non_empty(reply.content),
        })
    }

    /// Integrate task contents into section prose
    ///
    /// # Errors
    /// See [`GenerationClient::call`]; a reply without `integratedContent`
    /// or `content` is [`GenerationError::MissingField`]
    pub async fn integrate(&self, request: &IntegrateRequest) -> Result<String, GenerationError> {
        let reply: IntegrateReply = self.call_as(&self.endpoints.integrate, request).await?;
        non_empty(reply.integrated_content)
            .or_else(|| non_empty(reply.content))
            .ok_or(GenerationError::MissingField("integratedContent"))
    }

    /// Generate an image for a task, returning its URL
    ///
    /// # Errors
    /// See [`GenerationClient::call`]; a reply without `success` and
    /// `image_url` is a failure
    pub async fn generate_image(&self, request: &ImageRequest) -> Result<String, GenerationError> {
        let reply: ImageReply = self.call_as(&self.endpoints.image, request).await?;
        if !reply.success {
            return Err(GenerationError::Service(
                "image generation reported no success".to_string(),
            ));
        }
        non_empty(reply.image_url).ok_or(GenerationError::MissingField("image_url"))
    }

    /// Fetch the analysis document of a project
    ///
    /// # Errors
    /// See [`GenerationClient::call`]
    pub async fn fetch_analysis(&self, project: &ProjectId) -> Result<Value, GenerationError> {
        let body = serde_json::json!({ "projectId": project });
        self.call(&self.endpoints.analysis, body).await
    }
}
