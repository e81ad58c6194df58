//! Testing utilities for the proposal editor workspace
//!
//! In-memory backend, scripted generation transport, and row fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use proposal_core::{
    EditorConfig, GenerationError, GenerationTransport, PersistenceBackend, PersistenceError,
    ProposalEditor, TransportResponse,
};
use proposal_tree::{
    OrderKey, Outline, OutlineRows, ProjectId, SectionId, SectionPatch, SectionRow, TaskContentRow,
    TaskId, TaskImageRow, TaskPatch, TaskRow, TaskStatus,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

pub const PROJECT: &str = "project-1";

pub type TestEditor = ProposalEditor<MemoryBackend, Arc<ScriptedTransport>>;

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn project() -> ProjectId {
    ProjectId::from(PROJECT)
}

pub fn timestamp(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, minute, 0)
        .single()
        .unwrap_or_default()
}

// ---- rows ----------------------------------------------------------------

pub fn section_row(id: &str, title: &str, parent: Option<&str>, key: f64) -> SectionRow {
    SectionRow {
        id: SectionId::from(id),
        project_id: project(),
        title: title.to_string(),
        parent_id: parent.map(SectionId::from),
        order_key: OrderKey::new(key),
        content: None,
        last_integrated_at: None,
    }
}

pub fn task_row(id: &str, section: &str, text: &str, key: f64) -> TaskRow {
    TaskRow {
        id: TaskId::from(id),
        section_id: SectionId::from(section),
        text: text.to_string(),
        status: TaskStatus::Pending,
        order_key: OrderKey::new(key),
    }
}

pub fn content_row(task: &str, text: &str, minute: u32) -> TaskContentRow {
    TaskContentRow {
        task_id: TaskId::from(task),
        content: text.to_string(),
        word_count: u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX),
        created_at: timestamp(minute),
    }
}

/// Three chapters; the second nests two levels deep
///
/// ```text
/// s1 一、项目背景        t1, t2
/// s2 二、技术方案
///    s2a （一）总体架构   t3
///        s2a1 1. 模块划分 t4
/// s3 三、实施计划
/// ```
pub fn sample_rows() -> OutlineRows {
    OutlineRows {
        sections: vec![
            section_row("s1", "一、项目背景", None, 0.0),
            section_row("s2", "二、技术方案", None, 1000.0),
            section_row("s2a", "（一）总体架构", Some("s2"), 0.0),
            section_row("s2a1", "1. 模块划分", Some("s2a"), 0.0),
            section_row("s3", "三、实施计划", None, 2000.0),
        ],
        tasks: vec![
            task_row("t1", "s1", "Summarise the tender scope", 0.0),
            task_row("t2", "s1", "List stakeholder constraints", 1000.0),
            task_row("t3", "s2a", "Describe the service topology", 0.0),
            task_row("t4", "s2a1", "Break down the modules", 0.0),
        ],
        contents: Vec::new(),
        images: Vec::new(),
    }
}

/// Rows that rebuild `outline`
pub fn outline_rows(project: &ProjectId, outline: &Outline) -> OutlineRows {
    let tasks = outline.tasks();
    OutlineRows {
        sections: outline
            .sections()
            .into_iter()
            .map(|s| SectionRow::from_section(project, s))
            .collect(),
        tasks: tasks.iter().map(|t| TaskRow::from(*t)).collect(),
        contents: tasks
            .iter()
            .filter_map(|t| {
                t.generated_content.as_ref().map(|c| TaskContentRow {
                    task_id: t.id.clone(),
                    content: c.text.clone(),
                    word_count: c.word_count,
                    created_at: c.generated_at,
                })
            })
            .collect(),
        images: tasks
            .iter()
            .flat_map(|t| {
                t.images.iter().map(|i| TaskImageRow {
                    task_id: t.id.clone(),
                    image_url: i.url.clone(),
                    created_at: i.created_at,
                })
            })
            .collect(),
    }
}

// ---- backend -------------------------------------------------------------

/// One call the editor made against the backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Fetch,
    InsertSection(SectionRow),
    UpdateSection(SectionId, SectionPatch),
    DeleteSection(SectionId),
    DeleteChildSections(SectionId),
    DeleteProjectSections(ProjectId),
    InsertTask(TaskRow),
    UpdateTask(TaskId, TaskPatch),
    DeleteTask(TaskId),
    DeleteSectionTasks(SectionId),
    DeleteTaskContents(TaskId),
}

impl BackendCall {
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Fetch)
    }

    /// Task the call targets, if any
    pub fn task(&self) -> Option<&TaskId> {
        match self {
            Self::InsertTask(row) => Some(&row.id),
            Self::UpdateTask(id, _) | Self::DeleteTask(id) | Self::DeleteTaskContents(id) => {
                Some(id)
            }
            _ => None,
        }
    }
}

/// Relational-style store held in memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    rows: Mutex<OutlineRows>,
    calls: Mutex<Vec<BackendCall>>,
    write_failures: Mutex<VecDeque<PersistenceError>>,
    fetch_failures: Mutex<VecDeque<PersistenceError>>,
    delay: Mutex<Option<Duration>>,
    task_delays: Mutex<HashMap<TaskId, Duration>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: OutlineRows) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    pub fn sample() -> Self {
        Self::with_rows(sample_rows())
    }

    pub fn rows(&self) -> OutlineRows {
        self.rows.lock().clone()
    }

    /// Outline the stored rows describe
    pub fn outline(&self) -> Outline {
        Outline::from_rows(self.rows())
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    pub fn writes(&self) -> Vec<BackendCall> {
        self.calls.lock().iter().filter(|c| c.is_write()).cloned().collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Next write fails with `err`
    pub fn fail_next_write(&self, err: PersistenceError) {
        self.write_failures.lock().push_back(err);
    }

    /// Next fetch fails with `err`
    pub fn fail_next_fetch(&self, err: PersistenceError) {
        self.fetch_failures.lock().push_back(err);
    }

    /// Every call sleeps for `delay` first
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Calls targeting task `id` sleep for `delay` instead
    pub fn delay_task(&self, id: &TaskId, delay: Duration) {
        self.task_delays.lock().insert(id.clone(), delay);
    }

    /// Write rows the way the generation service would
    pub fn mutate(&self, f: impl FnOnce(&mut OutlineRows)) {
        f(&mut self.rows.lock());
    }

    async fn enter(&self, call: BackendCall) -> Result<(), PersistenceError> {
        let per_task = call.task().and_then(|id| self.task_delays.lock().get(id).copied());
        let delay = per_task.or(*self.delay.lock());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = if call.is_write() {
            self.write_failures.lock().pop_front()
        } else {
            self.fetch_failures.lock().pop_front()
        };
        self.calls.lock().push(call);
        failure.map_or(Ok(()), Err)
    }
}

fn not_found(what: &str, id: &str) -> PersistenceError {
    PersistenceError::Rejected {
        code: Some("PGRST116".to_string()),
        message: format!("{what} {id} not found"),
    }
}

/// Section ids at or below each of `roots`
fn subtree(rows: &OutlineRows, roots: &[SectionId]) -> HashSet<SectionId> {
    let mut found: HashSet<SectionId> = roots.iter().cloned().collect();
    let mut frontier: Vec<SectionId> = roots.to_vec();
    while let Some(id) = frontier.pop() {
        for row in &rows.sections {
            if row.parent_id.as_ref() == Some(&id) && found.insert(row.id.clone()) {
                frontier.push(row.id.clone());
            }
        }
    }
    found
}

fn cascade(rows: &mut OutlineRows, sections: &HashSet<SectionId>) {
    rows.sections.retain(|s| !sections.contains(&s.id));
    let gone: HashSet<TaskId> = rows
        .tasks
        .iter()
        .filter(|t| sections.contains(&t.section_id))
        .map(|t| t.id.clone())
        .collect();
    drop_tasks(rows, &gone);
}

fn drop_tasks(rows: &mut OutlineRows, tasks: &HashSet<TaskId>) {
    rows.tasks.retain(|t| !tasks.contains(&t.id));
    rows.contents.retain(|c| !tasks.contains(&c.task_id));
    rows.images.retain(|i| !tasks.contains(&i.task_id));
}

#[async_trait]
impl PersistenceBackend for MemoryBackend {
    async fn fetch_outline(&self, project: &ProjectId) -> Result<OutlineRows, PersistenceError> {
        self.enter(BackendCall::Fetch).await?;
        let mut rows = self.rows();
        rows.sections.retain(|s| s.project_id == *project);
        Ok(rows)
    }

    async fn insert_section(&self, row: SectionRow) -> Result<(), PersistenceError> {
        self.enter(BackendCall::InsertSection(row.clone())).await?;
        let mut rows = self.rows.lock();
        if rows.sections.iter().any(|s| s.id == row.id) {
            return Err(PersistenceError::Rejected {
                code: Some("23505".to_string()),
                message: format!("duplicate section {}", row.id),
            });
        }
        rows.sections.push(row);
        Ok(())
    }

    async fn update_section(
        &self,
        id: &SectionId,
        patch: SectionPatch,
    ) -> Result<(), PersistenceError> {
        self.enter(BackendCall::UpdateSection(id.clone(), patch.clone())).await?;
        let mut rows = self.rows.lock();
        let row = rows
            .sections
            .iter_mut()
            .find(|s| s.id == *id)
            .ok_or_else(|| not_found("section", id.as_str()))?;
        if let Some(title) = patch.title {
            row.title = title;
        }
        if let Some(parent) = patch.parent_id {
            row.parent_id = parent;
        }
        if let Some(key) = patch.order_key {
            row.order_key = key;
        }
        if let Some(content) = patch.content {
            row.content = Some(content);
        }
        if let Some(at) = patch.last_integrated_at {
            row.last_integrated_at = Some(at);
        }
        Ok(())
    }

    async fn delete_section(&self, id: &SectionId) -> Result<(), PersistenceError> {
        self.enter(BackendCall::DeleteSection(id.clone())).await?;
        let mut rows = self.rows.lock();
        let doomed = subtree(&rows, std::slice::from_ref(id));
        cascade(&mut rows, &doomed);
        Ok(())
    }

    async fn delete_child_sections(&self, parent: &SectionId) -> Result<(), PersistenceError> {
        self.enter(BackendCall::DeleteChildSections(parent.clone())).await?;
        let mut rows = self.rows.lock();
        let children: Vec<SectionId> = rows
            .sections
            .iter()
            .filter(|s| s.parent_id.as_ref() == Some(parent))
            .map(|s| s.id.clone())
            .collect();
        let doomed = subtree(&rows, &children);
        cascade(&mut rows, &doomed);
        Ok(())
    }

    async fn delete_project_sections(&self, project: &ProjectId) -> Result<(), PersistenceError> {
        self.enter(BackendCall::DeleteProjectSections(project.clone())).await?;
        let mut rows = self.rows.lock();
        let doomed: HashSet<SectionId> = rows
            .sections
            .iter()
            .filter(|s| s.project_id == *project)
            .map(|s| s.id.clone())
            .collect();
        cascade(&mut rows, &doomed);
        Ok(())
    }

    async fn insert_task(&self, row: TaskRow) -> Result<(), PersistenceError> {
        self.enter(BackendCall::InsertTask(row.clone())).await?;
        let mut rows = self.rows.lock();
        if rows.tasks.iter().any(|t| t.id == row.id) {
            return Err(PersistenceError::Rejected {
                code: Some("23505".to_string()),
                message: format!("duplicate task {}", row.id),
            });
        }
        rows.tasks.push(row);
        Ok(())
    }

    async fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<(), PersistenceError> {
        self.enter(BackendCall::UpdateTask(id.clone(), patch.clone())).await?;
        let mut rows = self.rows.lock();
        let row = rows
            .tasks
            .iter_mut()
            .find(|t| t.id == *id)
            .ok_or_else(|| not_found("task", id.as_str()))?;
        if let Some(section) = patch.section_id {
            row.section_id = section;
        }
        if let Some(text) = patch.text {
            row.text = text;
        }
        if let Some(status) = patch.status {
            row.status = status;
        }
        if let Some(key) = patch.order_key {
            row.order_key = key;
        }
        Ok(())
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), PersistenceError> {
        self.enter(BackendCall::DeleteTask(id.clone())).await?;
        drop_tasks(&mut self.rows.lock(), &HashSet::from([id.clone()]));
        Ok(())
    }

    async fn delete_section_tasks(&self, section: &SectionId) -> Result<(), PersistenceError> {
        self.enter(BackendCall::DeleteSectionTasks(section.clone())).await?;
        let mut rows = self.rows.lock();
        let gone: HashSet<TaskId> = rows
            .tasks
            .iter()
            .filter(|t| t.section_id == *section)
            .map(|t| t.id.clone())
            .collect();
        drop_tasks(&mut rows, &gone);
        Ok(())
    }

    async fn delete_task_contents(&self, task: &TaskId) -> Result<(), PersistenceError> {
        self.enter(BackendCall::DeleteTaskContents(task.clone())).await?;
        self.rows.lock().contents.retain(|c| c.task_id != *task);
        Ok(())
    }
}

// ---- transport -----------------------------------------------------------

type Reply = Result<TransportResponse, GenerationError>;
type SideEffect = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Generation transport answering from per-endpoint queues
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<(String, Value)>>,
    side_effect: Mutex<Option<SideEffect>>,
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("requests", &self.requests.lock().len())
            .finish_non_exhaustive()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, endpoint: &str, reply: Reply) {
        self.replies
            .lock()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn respond_json(&self, endpoint: &str, body: &Value) {
        self.respond(endpoint, Ok(TransportResponse::ok_json(body)));
    }

    pub fn respond_status(&self, endpoint: &str, status: u16, body: &str) {
        self.respond(
            endpoint,
            Ok(TransportResponse {
                status,
                body: body.to_string(),
            }),
        );
    }

    /// Run `effect` on every request before replying
    pub fn on_request(&self, effect: impl Fn(&str, &Value) + Send + Sync + 'static) {
        *self.side_effect.lock() = Some(Arc::new(effect));
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, endpoint: &str) -> Vec<Value> {
        self.requests
            .lock()
            .iter()
            .filter(|(e, _)| e == endpoint)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

#[async_trait]
impl GenerationTransport for ScriptedTransport {
    async fn post(
        &self,
        endpoint: &str,
        body: Value,
    ) -> Result<TransportResponse, GenerationError> {
        let effect = self.side_effect.lock().clone();
        if let Some(effect) = effect {
            effect(endpoint, &body);
        }
        self.requests.lock().push((endpoint.to_string(), body));
        self.replies
            .lock()
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(GenerationError::Transport(format!(
                    "no reply scripted for {endpoint}"
                )))
            })
    }
}

// ---- editor --------------------------------------------------------------

/// Editor loaded from `backend` with default configuration
pub async fn load_editor(
    backend: Arc<MemoryBackend>,
    transport: Arc<ScriptedTransport>,
) -> TestEditor {
    load_editor_with(backend, transport, EditorConfig::new()).await
}

pub async fn load_editor_with(
    backend: Arc<MemoryBackend>,
    transport: Arc<ScriptedTransport>,
    config: EditorConfig,
) -> TestEditor {
    ProposalEditor::load(project(), backend, transport, config)
        .await
        .expect("initial load")
}

/// Sample editor with its backend and transport
pub async fn sample_editor() -> (TestEditor, Arc<MemoryBackend>, Arc<ScriptedTransport>) {
    init_tracing();
    let backend = Arc::new(MemoryBackend::sample());
    let transport = Arc::new(ScriptedTransport::new());
    let editor = load_editor(Arc::clone(&backend), Arc::clone(&transport)).await;
    backend.clear_calls();
    (editor, backend, transport)
}
