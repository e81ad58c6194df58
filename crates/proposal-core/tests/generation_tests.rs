use pretty_assertions::assert_eq;
use proposal_core::prelude::*;
use proposal_core::{
    ConflictContext, ConflictError, ContentOutcome, GenerationError, GenerationOutput,
    GenerationReport, ImageOptions, ImageType, PersistenceError, TasksOutcome, WorkflowState,
};
use proposal_test_utils::{
    content_row, load_editor, sample_editor, sample_rows, section_row, task_row, BackendCall,
    MemoryBackend, ScriptedTransport,
};
use serde_json::json;
use std::sync::Arc;

const TASKS: &str = "/api/webhook/generate-tasks-advanced";
const TASKS_MANAGEMENT: &str = "/api/webhook/generate-tasks-management";
const OUTLINE: &str = "/api/webhook/generate-structure-check";
const SUBSECTIONS: &str = "/api/webhook/generate-requirements";
const CONTENT: &str = "/api/webhook/generate-content";
const INTEGRATE: &str = "/api/webhook/integrate-chapter";
const IMAGE: &str = "/api/webhook/generate-image";
const ANALYSIS: &str = "/api/webhook/analysis";

fn sid(id: &str) -> SectionId {
    SectionId::from(id)
}

fn tid(id: &str) -> TaskId {
    TaskId::from(id)
}

fn task_texts(outline: &Outline, section: &str) -> Vec<String> {
    outline
        .find_section(&sid(section))
        .map(|s| s.tasks.iter().map(|t| t.text.clone()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn empty_section_generates_without_prompt() {
    let (editor, backend, transport) = sample_editor().await;
    let writer = Arc::clone(&backend);
    transport.on_request(move |endpoint, _| {
        if endpoint == TASKS {
            writer.mutate(|rows| {
                rows.tasks.push(task_row("g1", "s3", "Define milestones", 0.0));
                rows.tasks.push(task_row("g2", "s3", "Assign owners", 1000.0));
            });
        }
    });
    transport.respond_json(
        TASKS,
        &json!({"result": "success", "message": "2 tasks created", "total_modules": 2}),
    );

    let params = GenerationParams::new()
        .with_sources(["rfp-2024"])
        .with_description("Focus on delivery risk");
    let status = editor.generate_tasks(&sid("s3"), params).await.unwrap();

    let report = GenerationReport {
        message: Some("2 tasks created".to_string()),
        total: Some(2),
    };
    assert_eq!(
        status,
        GenerationStatus::Completed(GenerationOutput::Tasks(TasksOutcome::Generated(report)))
    );
    let requests = transport.requests_to(TASKS);
    assert_eq!(requests.len(), 1);
    let body = &requests[0];
    assert_eq!(body["projectId"], "project-1");
    assert_eq!(body["sectionId"], "s3");
    assert_eq!(body["sectionTitle"], "三、实施计划");
    assert_eq!(body["sourceIds"], json!(["rfp-2024"]));
    assert_eq!(body["userDescription"], "Focus on delivery risk");
    assert_eq!(body["mode"], "append");
    assert_eq!(body["allSections"].as_array().map(Vec::len), Some(5));

    assert_eq!(backend.calls(), vec![BackendCall::Fetch]);
    assert_eq!(task_texts(&editor.outline(), "s3"), vec!["Define milestones", "Assign owners"]);
    assert_eq!(
        editor.conflict_state(&GenerationTarget::SectionTasks(sid("s3"))),
        WorkflowState::Idle
    );
}

#[tokio::test]
async fn populated_section_waits_for_a_choice() {
    let (editor, backend, transport) = sample_editor().await;
    let target = GenerationTarget::SectionTasks(sid("s1"));

    let status = editor.generate_tasks(&sid("s1"), GenerationParams::new()).await.unwrap();

    let expected = ConflictContext {
        target: target.clone(),
        params: GenerationParams::new(),
        existing: 2,
    };
    assert_eq!(status, GenerationStatus::AwaitingChoice(expected.clone()));
    assert_eq!(editor.conflict_state(&target), WorkflowState::AwaitingUserChoice);
    assert_eq!(editor.pending_conflict(&target), Some(expected));
    assert!(backend.calls().is_empty());
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn replace_clears_before_generating() {
    let (editor, backend, transport) = sample_editor().await;
    let target = GenerationTarget::SectionTasks(sid("s1"));
    editor.generate_tasks(&sid("s1"), GenerationParams::new()).await.unwrap();
    let writer = Arc::clone(&backend);
    transport.on_request(move |_, _| {
        let task = task_row("g1", "s1", "Restate the tender goals", 0.0);
        writer.mutate(|rows| rows.tasks.push(task));
    });
    transport.respond_json(TASKS, &json!({"result": "success"}));

    let status = editor.resolve_conflict(&target, Resolution::Replace).await.unwrap();

    assert!(matches!(status, GenerationStatus::Completed(GenerationOutput::Tasks(_))));
    assert_eq!(backend.writes(), vec![BackendCall::DeleteSectionTasks(sid("s1"))]);
    assert_eq!(transport.requests_to(TASKS)[0]["mode"], "replace");
    assert_eq!(task_texts(&editor.outline(), "s1"), vec!["Restate the tender goals"]);
    assert_eq!(editor.conflict_state(&target), WorkflowState::Idle);
}

#[tokio::test]
async fn append_keeps_existing_tasks() {
    let (editor, backend, transport) = sample_editor().await;
    let target = GenerationTarget::SectionTasks(sid("s1"));
    editor.generate_tasks(&sid("s1"), GenerationParams::new()).await.unwrap();
    transport.respond_json(TASKS, &json!({"message": "appended"}));

    editor.resolve_conflict(&target, Resolution::Append).await.unwrap();

    assert!(backend.writes().is_empty());
    assert_eq!(transport.requests_to(TASKS)[0]["mode"], "append");
    assert_eq!(task_texts(&editor.outline(), "s1").len(), 2);
}

#[tokio::test]
async fn cancel_is_reported_but_not_a_failure() {
    let (editor, backend, transport) = sample_editor().await;
    let target = GenerationTarget::SectionTasks(sid("s1"));
    editor.generate_tasks(&sid("s1"), GenerationParams::new()).await.unwrap();

    let err = editor.resolve_conflict(&target, Resolution::Cancel).await.unwrap_err();

    assert!(matches!(err, EditorError::UserCancelled));
    assert!(!err.is_failure());
    assert_eq!(editor.conflict_state(&target), WorkflowState::Idle);
    assert!(editor.pending_conflict(&target).is_none());
    assert!(backend.calls().is_empty());
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn resolving_without_pending_conflict_fails() {
    let (editor, _, _) = sample_editor().await;
    let target = GenerationTarget::SectionTasks(sid("s1"));

    let err = editor.resolve_conflict(&target, Resolution::Append).await.unwrap_err();

    assert!(matches!(
        err,
        EditorError::Workflow(ConflictError::NoPendingConflict(ref t)) if *t == target
    ));
}

#[tokio::test]
async fn second_request_while_pending_is_busy() {
    let (editor, _, _) = sample_editor().await;
    editor.generate_tasks(&sid("s1"), GenerationParams::new()).await.unwrap();

    let err = editor.generate_tasks(&sid("s1"), GenerationParams::new()).await.unwrap_err();

    assert!(matches!(err, EditorError::Workflow(ConflictError::Busy(_))));
    // other targets are independent
    let status = editor.generate_subsections(&sid("s2"), GenerationParams::new()).await.unwrap();
    assert!(matches!(status, GenerationStatus::AwaitingChoice(_)));
}

#[tokio::test]
async fn service_failure_leaves_tree_untouched() {
    let (editor, backend, transport) = sample_editor().await;
    let before = editor.outline();
    transport.respond_status(TASKS, 500, r#"{"error":"model overloaded"}"#);

    let err = editor.generate_tasks(&sid("s3"), GenerationParams::new()).await.unwrap_err();

    assert!(matches!(
        err,
        EditorError::GenerationFailure(GenerationError::Status { status: 500, .. })
    ));
    assert!(err.is_retryable());
    assert!(!err.rolled_back());
    assert_eq!(*editor.outline(), *before);
    assert!(backend.calls().is_empty());
    assert_eq!(
        editor.conflict_state(&GenerationTarget::SectionTasks(sid("s3"))),
        WorkflowState::Idle
    );
}

#[tokio::test]
async fn failed_clear_aborts_replace() {
    let (editor, backend, transport) = sample_editor().await;
    let target = GenerationTarget::SectionTasks(sid("s1"));
    let before = editor.outline();
    editor.generate_tasks(&sid("s1"), GenerationParams::new()).await.unwrap();
    backend.fail_next_write(PersistenceError::Unavailable("timeout talking to db".to_string()));

    let err = editor.resolve_conflict(&target, Resolution::Replace).await.unwrap_err();

    assert!(matches!(err, EditorError::PersistenceFailure(_)));
    assert_eq!(*editor.outline(), *before);
    assert!(transport.requests().is_empty());
    assert_eq!(editor.conflict_state(&target), WorkflowState::Idle);
}

#[tokio::test]
async fn management_workflow_uses_its_endpoint() {
    let (editor, _, transport) = sample_editor().await;
    transport.respond_json(TASKS_MANAGEMENT, &json!({"result": "success", "taskCount": 3}));

    let params = GenerationParams::new().with_workflow(TaskWorkflow::Management);
    editor.generate_tasks(&sid("s3"), params).await.unwrap();

    assert_eq!(transport.requests_to(TASKS_MANAGEMENT).len(), 1);
    assert!(transport.requests_to(TASKS).is_empty());
}

#[tokio::test]
async fn draft_result_writes_nothing() {
    let (editor, backend, transport) = sample_editor().await;
    transport.respond_json(TASKS, &json!({"result": "1. 制定进度计划\n2. 明确里程碑"}));

    let status = editor.generate_tasks(&sid("s3"), GenerationParams::new()).await.unwrap();

    assert_eq!(
        status,
        GenerationStatus::Completed(GenerationOutput::Tasks(TasksOutcome::Draft(
            "1. 制定进度计划\n2. 明确里程碑".to_string()
        )))
    );
    assert!(backend.writes().is_empty());
    assert!(task_texts(&editor.outline(), "s3").is_empty());
}

#[tokio::test]
async fn generated_subsections_are_sorted_by_numeral() {
    let (editor, backend, transport) = sample_editor().await;
    let writer = Arc::clone(&backend);
    transport.on_request(move |_, _| {
        writer.mutate(|rows| {
            rows.sections.push(section_row("c3", "三、风险控制", Some("s3"), 0.0));
            rows.sections.push(section_row("c1", "一、进度安排", Some("s3"), 1000.0));
            rows.sections.push(section_row("c2", "二、人员配置", Some("s3"), 2000.0));
        });
    });
    transport.respond_json(SUBSECTIONS, &json!({"message": "3 subsections created"}));

    editor.generate_subsections(&sid("s3"), GenerationParams::new()).await.unwrap();

    let outline = editor.outline();
    let children: Vec<(String, f64)> = outline
        .find_section(&sid("s3"))
        .unwrap()
        .children
        .iter()
        .map(|c| (c.id.to_string(), c.order_key.value()))
        .collect();
    assert_eq!(
        children,
        vec![
            ("c1".to_string(), 0.0),
            ("c2".to_string(), 1000.0),
            ("c3".to_string(), 2000.0)
        ]
    );
    assert_eq!(backend.writes().len(), 3);
    assert_eq!(backend.outline(), *outline);

    let body = &transport.requests_to(SUBSECTIONS)[0];
    assert_eq!(
        body["allParentSections"],
        json!(["一、项目背景", "二、技术方案", "三、实施计划"])
    );
}

#[tokio::test]
async fn outline_replace_drops_every_section() {
    let (editor, backend, transport) = sample_editor().await;
    let status = editor.generate_outline(GenerationParams::new()).await.unwrap();
    assert!(matches!(
        status,
        GenerationStatus::AwaitingChoice(ConflictContext { existing: 3, .. })
    ));
    transport.respond_json(OUTLINE, &json!({"message": "outline rebuilt", "totalModules": 5}));

    let status = editor
        .resolve_conflict(&GenerationTarget::Outline, Resolution::Replace)
        .await
        .unwrap();

    assert_eq!(
        status,
        GenerationStatus::Completed(GenerationOutput::Structure(GenerationReport {
            message: Some("outline rebuilt".to_string()),
            total: Some(5),
        }))
    );
    assert_eq!(
        backend.writes(),
        vec![BackendCall::DeleteProjectSections(proposal_test_utils::project())]
    );
    assert_eq!(transport.requests_to(OUTLINE)[0]["action"], "replace");
    assert!(editor.outline().roots.is_empty());
}

#[tokio::test]
async fn integration_needs_generated_content() {
    let (editor, _, transport) = sample_editor().await;

    let err = editor.integrate_section(&sid("s1")).await.unwrap_err();

    assert!(matches!(err, EditorError::NothingToIntegrate(ref id) if *id == sid("s1")));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn integration_stores_section_prose() {
    let mut rows = sample_rows();
    rows.contents.push(content_row("t1", "Scope covers three districts.", 1));
    rows.contents.push(content_row("t2", "Constraints include budget caps.", 2));
    rows.contents.push(content_row("t3", "Topology is hub and spoke.", 3));
    let backend = Arc::new(MemoryBackend::with_rows(rows));
    let transport = Arc::new(ScriptedTransport::new());
    let editor = load_editor(Arc::clone(&backend), Arc::clone(&transport)).await;
    backend.clear_calls();
    transport.respond_json(
        INTEGRATE,
        &json!({"integratedContent": "The project spans three districts."}),
    );

    let text = editor.integrate_section(&sid("s1")).await.unwrap();

    assert_eq!(text, "The project spans three districts.");
    let body = &transport.requests_to(INTEGRATE)[0];
    assert_eq!(body["sectionTitle"], "一、项目背景");
    assert_eq!(body["tasks"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["tasks"][0]["taskId"], "t1");
    assert_eq!(body["tasks"][0]["content"], "Scope covers three districts.");

    let writes = backend.writes();
    assert!(matches!(
        writes.as_slice(),
        [BackendCall::UpdateSection(id, patch)]
            if *id == sid("s1") && patch.content.as_deref() == Some(text.as_str())
    ));
    let outline = editor.outline();
    let section = outline.find_section(&sid("s1")).unwrap();
    assert_eq!(section.content.as_deref(), Some("The project spans three districts."));
    assert!(section.last_integrated_at.is_some());
}

#[tokio::test]
async fn task_content_conflict_and_replace() {
    let mut rows = sample_rows();
    rows.contents.push(content_row("t1", "Old draft", 1));
    let backend = Arc::new(MemoryBackend::with_rows(rows));
    let transport = Arc::new(ScriptedTransport::new());
    let editor = load_editor(Arc::clone(&backend), Arc::clone(&transport)).await;
    backend.clear_calls();
    let target = GenerationTarget::TaskContent(tid("t1"));

    let status = editor
        .generate_task_content(&tid("t1"), GenerationParams::new().with_sources(["src-1"]))
        .await
        .unwrap();
    assert!(matches!(
        status,
        GenerationStatus::AwaitingChoice(ConflictContext { existing: 1, .. })
    ));

    let writer = Arc::clone(&backend);
    transport.on_request(move |_, _| {
        writer.mutate(|rows| rows.contents.push(content_row("t1", "New draft text", 5)));
    });
    transport.respond_json(
        CONTENT,
        &json!({"success": true, "wordCount": 3, "content": "New draft text"}),
    );

    let status = editor.resolve_conflict(&target, Resolution::Replace).await.unwrap();

    assert_eq!(
        status,
        GenerationStatus::Completed(GenerationOutput::Content(ContentOutcome {
            word_count: 3,
            content: Some("New draft text".to_string()),
        }))
    );
    assert_eq!(backend.writes(), vec![BackendCall::DeleteTaskContents(tid("t1"))]);
    let body = &transport.requests_to(CONTENT)[0];
    assert_eq!(body["mode"], "task");
    assert_eq!(body["taskId"], "t1");
    assert_eq!(body["taskText"], "Summarise the tender scope");
    assert_eq!(body["selectedSourceIds"], json!(["src-1"]));
    let outline = editor.outline();
    let content = outline.find_task(&tid("t1")).and_then(|t| t.generated_content.clone());
    assert_eq!(content.map(|c| c.text), Some("New draft text".to_string()));
}

#[tokio::test]
async fn content_reporting_no_success_fails() {
    let (editor, _, transport) = sample_editor().await;
    transport.respond_json(CONTENT, &json!({"success": false}));

    let err = editor.generate_task_content(&tid("t2"), GenerationParams::new()).await.unwrap_err();

    assert!(matches!(err, EditorError::GenerationFailure(GenerationError::Service(_))));
    assert_eq!(
        editor.conflict_state(&GenerationTarget::TaskContent(tid("t2"))),
        WorkflowState::Idle
    );
}

#[tokio::test]
async fn generated_image_is_attached_to_task() {
    let (editor, backend, transport) = sample_editor().await;
    transport.respond_json(
        IMAGE,
        &json!({"success": true, "image_url": "https://cdn.example.com/t3.png"}),
    );

    let url = editor
        .generate_image(
            &tid("t3"),
            ImageOptions {
                image_type: ImageType::Diagram,
                ..ImageOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(url, "https://cdn.example.com/t3.png");
    let body = &transport.requests_to(IMAGE)[0];
    assert_eq!(body["task_id"], "t3");
    assert_eq!(body["project_id"], "project-1");
    assert_eq!(body["task_content"], "Describe the service topology");
    assert_eq!(body["image_type"], "diagram");
    assert!(body.get("custom_prompt").is_none());

    let outline = editor.outline();
    let images: Vec<&str> = outline
        .find_task(&tid("t3"))
        .map(|t| t.images.iter().map(|i| i.url.as_str()).collect())
        .unwrap_or_default();
    assert_eq!(images, vec!["https://cdn.example.com/t3.png"]);
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn analysis_citations_get_ids() {
    let (editor, _, transport) = sample_editor().await;
    transport.respond_json(
        ANALYSIS,
        &json!({
            "requirements": [
                {
                    "text": "Deliver within 90 days [1]",
                    "citations": [{"source_id": "rfp", "page": 4, "title": "Tender document"}]
                },
                {
                    "text": "Budget cap applies [1][2]",
                    "citations": [
                        {"source_id": "rfp", "page": 4, "title": "Tender document"},
                        {"source_id": "annex-b", "page": 2, "title": "Annex B"}
                    ]
                }
            ]
        }),
    );

    let analysis = editor.analysis_evidence().await.unwrap();

    assert_eq!(transport.requests_to(ANALYSIS)[0], json!({"projectId": "project-1"}));
    assert_eq!(analysis.evidence.len(), 2);
    assert_eq!(analysis.document["requirements"][0]["citationIds"], json!([1]));
    assert_eq!(analysis.document["requirements"][1]["citationIds"], json!([1, 2]));
    assert_eq!(analysis.evidence.get(2).map(|e| e.title.as_str()), Some("Annex B"));
}
