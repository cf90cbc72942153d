// End-to-end pipeline scenarios over real temp repositories, with the model
// replaced by a scripted backend (recorded responses played back in order).

use docweave::config::Config;
use docweave::error::{LlmError, PipelineError};
use docweave::graph;
use docweave::llm::{ChatBackend, ChatFuture, ChatRequest, ChatResponse};
use docweave::orchestrate;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

struct ScriptedBackend {
    responses: Mutex<Vec<Result<ChatResponse, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    fn new(responses: Vec<Result<ChatResponse, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl ChatBackend for ScriptedBackend {
    fn chat(&self, request: ChatRequest) -> ChatFuture<'_> {
        self.requests.lock().unwrap().push(request);
        let next = {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Err(LlmError::Status {
                    status: 400,
                    message: "script exhausted".into(),
                })
            } else {
                responses.remove(0)
            }
        };
        Box::pin(async move { next })
    }
}

fn text(content: &str) -> Result<ChatResponse, LlmError> {
    Ok(serde_json::from_value(serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    }))
    .unwrap())
}

fn tool_call(name: &str, arguments: serde_json::Value) -> Result<ChatResponse, LlmError> {
    Ok(serde_json::from_value(serde_json::json!({
        "choices": [{"message": {
            "role": "assistant",
            "tool_calls": [{
                "id": format!("call_{}", name),
                "type": "function",
                "function": {"name": name, "arguments": arguments.to_string()}
            }]
        }}]
    }))
    .unwrap())
}

fn create_md(docs: &Path, file: &str, body: &str) -> Result<ChatResponse, LlmError> {
    tool_call(
        "str_replace_editor",
        serde_json::json!({
            "command": "create",
            "path": docs.join(file).to_string_lossy(),
            "file_text": body,
        }),
    )
}

fn python_repo(temp: &TempDir) -> PathBuf {
    let repo = temp.path().join("myrepo");
    fs::create_dir_all(&repo).unwrap();
    fs::write(repo.join("a.py"), "def f():\n    g()\n").unwrap();
    fs::write(repo.join("b.py"), "def g():\n    pass\n").unwrap();
    repo
}

fn config_for(repo: PathBuf, docs: PathBuf) -> Config {
    let mut config = Config::from_env(repo, docs);
    config.main_model = "main-model".into();
    config.cluster_model = "cluster-model".into();
    config
}

const CLUSTER_SPLIT: &str = r#"<GROUPED_COMPONENTS>
{"core": {"path": "a.py", "components": ["a.f"]}, "util": {"path": "b.py", "components": ["b.g"]}}
</GROUPED_COMPONENTS>"#;

const OVERVIEW: &str = "<OVERVIEW>\n# myrepo\n\nTwo small modules.\n</OVERVIEW>";

#[tokio::test]
async fn python_repo_documents_every_module_and_the_overview() {
    let temp = TempDir::new().unwrap();
    let repo = python_repo(&temp);
    let docs = temp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();

    let mut config = config_for(repo, docs.clone());
    // total exceeds the module budget, each single-component child fits
    config.budgets.max_tokens_per_module = 10;

    let backend = Arc::new(ScriptedBackend::new(vec![
        text(CLUSTER_SPLIT),
        create_md(&docs, "core.md", "# core\n\nCalls into [util](util.md).\n"),
        text("core done"),
        create_md(&docs, "util.md", "# util\n\nLeaf helpers.\n"),
        text("util done"),
        text(OVERVIEW),
    ]));

    orchestrate::run_pipeline(&config, backend.clone())
        .await
        .unwrap();

    assert!(docs.join("core.md").exists());
    assert!(docs.join("util.md").exists());
    assert_eq!(
        fs::read_to_string(docs.join(orchestrate::OVERVIEW_FILENAME)).unwrap(),
        "# myrepo\n\nTwo small modules.\n"
    );
    assert!(docs.join(orchestrate::MODULE_TREE_FILENAME).exists());

    // the graph artifact round-trips with the resolved edge in place
    let registry = graph::load_registry(&docs.join("myrepo_dependency_graph.json")).unwrap();
    assert_eq!(registry.len(), 2);
    assert!(registry["a.f"].depends_on.contains("b.g"));
    assert!(registry["b.g"].depends_on.is_empty());

    let metadata: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(docs.join(orchestrate::METADATA_FILENAME)).unwrap())
            .unwrap();
    assert_eq!(metadata["statistics"]["total_components"], 2);
    assert_eq!(metadata["statistics"]["files_analyzed"], 2);
    assert_eq!(metadata["generation_info"]["main_model"], "main-model");

    // cluster call went to the cluster model, agent calls to the main chain
    let requests = backend.requests.lock().unwrap();
    assert_eq!(requests[0].model, "cluster-model");
    assert_eq!(requests[1].model, "main-model");
}

#[tokio::test]
async fn unchanged_repository_reruns_with_zero_model_calls() {
    let temp = TempDir::new().unwrap();
    let repo = python_repo(&temp);
    let docs = temp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();

    let mut config = config_for(repo, docs.clone());
    config.budgets.max_tokens_per_module = 10;

    let first = Arc::new(ScriptedBackend::new(vec![
        text(CLUSTER_SPLIT),
        create_md(&docs, "core.md", "# core\n"),
        text("done"),
        create_md(&docs, "util.md", "# util\n"),
        text("done"),
        text(OVERVIEW),
    ]));
    orchestrate::run_pipeline(&config, first).await.unwrap();

    // second run: every artifact exists, so no agent or cluster invocations
    let second = Arc::new(ScriptedBackend::new(vec![]));
    orchestrate::run_pipeline(&config, second.clone())
        .await
        .unwrap();
    assert_eq!(second.request_count(), 0);
}

#[tokio::test]
async fn single_module_repository_promotes_its_artifact_to_the_overview() {
    let temp = TempDir::new().unwrap();
    let repo = temp.path().join("tiny");
    fs::create_dir_all(&repo).unwrap();
    fs::write(repo.join("only.py"), "def solo():\n    pass\n").unwrap();
    let docs = temp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();

    let config = config_for(repo, docs.clone());
    let backend = Arc::new(ScriptedBackend::new(vec![
        create_md(&docs, "tiny.md", "# tiny\n\nOne function.\n"),
        text("done"),
    ]));

    orchestrate::run_pipeline(&config, backend.clone())
        .await
        .unwrap();

    // generous budgets: no clustering call, the root module's artifact is
    // renamed to the repository overview
    assert!(docs.join(orchestrate::OVERVIEW_FILENAME).exists());
    assert!(!docs.join("tiny.md").exists());
    assert_eq!(backend.request_count(), 2);
}

#[tokio::test]
async fn repository_with_only_excluded_files_gets_a_degenerate_overview() {
    let temp = TempDir::new().unwrap();
    let repo = temp.path().join("testsonly");
    fs::create_dir_all(repo.join("tests")).unwrap();
    fs::write(repo.join("tests/test_x.py"), "def test_x():\n    pass\n").unwrap();
    let docs = temp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();

    let config = config_for(repo, docs.clone());
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    orchestrate::run_pipeline(&config, backend.clone())
        .await
        .unwrap();

    assert_eq!(backend.request_count(), 0);
    let overview = fs::read_to_string(docs.join(orchestrate::OVERVIEW_FILENAME)).unwrap();
    assert!(overview.contains("No documentable components"));

    let metadata: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(docs.join(orchestrate::METADATA_FILENAME)).unwrap())
            .unwrap();
    assert_eq!(metadata["statistics"]["total_components"], 0);
}

#[tokio::test]
async fn agent_failure_aborts_the_run_naming_the_module() {
    let temp = TempDir::new().unwrap();
    let repo = python_repo(&temp);
    let docs = temp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();

    let mut config = config_for(repo, docs.clone());
    config.budgets.max_tokens_per_module = 10;

    // clusterer succeeds, the first agent call dies with a fatal 400
    let backend = Arc::new(ScriptedBackend::new(vec![
        text(CLUSTER_SPLIT),
        Err(LlmError::Status {
            status: 400,
            message: "bad request".into(),
        }),
    ]));

    let err = orchestrate::run_pipeline(&config, backend)
        .await
        .unwrap_err();
    match &err {
        PipelineError::Module { module, .. } => assert_eq!(module, "core"),
        other => panic!("unexpected error: {}", other),
    }

    // artifacts written before the failure stay in place for resume
    assert!(docs.join(orchestrate::MODULE_TREE_FILENAME).exists());
}

#[tokio::test]
async fn malformed_overview_response_is_an_overview_error() {
    let temp = TempDir::new().unwrap();
    let repo = python_repo(&temp);
    let docs = temp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();

    let mut config = config_for(repo, docs.clone());
    config.budgets.max_tokens_per_module = 10;

    let backend = Arc::new(ScriptedBackend::new(vec![
        text(CLUSTER_SPLIT),
        create_md(&docs, "core.md", "# core\n"),
        text("done"),
        create_md(&docs, "util.md", "# util\n"),
        text("done"),
        text("an overview without sentinel tags"),
    ]));

    let err = orchestrate::run_pipeline(&config, backend).await.unwrap_err();
    assert!(matches!(err, PipelineError::Overview { .. }));
}
