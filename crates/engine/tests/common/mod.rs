#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use toolhost_engine::backend::{
    CodeIntelligence, Diagnostics, FetchedContent, Fetcher, FileOutline, Location, TextEdit,
};
use toolhost_engine::{
    handler_fn, Engine, EngineBuilder, ExecutionContext, FieldSpec, FieldType, ProjectRoot,
    ProjectRoots, SandboxedPath, SourcePosition, SymbolCommand, ToolDescriptor, ToolError,
};

/// Temp directory holding one project root named `root_name`.
pub struct Project {
    _temp: TempDir,
    pub root: PathBuf,
    pub context: ExecutionContext,
}

impl Project {
    pub fn new(root_name: &str) -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let root = temp.path().join(root_name);
        std::fs::create_dir_all(&root)?;
        let roots = ProjectRoots::single(ProjectRoot::new(&root)?);
        Ok(Self {
            _temp: temp,
            root,
            context: ExecutionContext::new(roots),
        })
    }

    pub fn write(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn read(&self, rel: &str) -> Result<String> {
        Ok(std::fs::read_to_string(self.root.join(rel))?)
    }

    pub fn outside(&self) -> &Path {
        self.root.parent().unwrap_or(&self.root)
    }
}

/// Order in which recorded tools started and finished.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().expect("journal lock").push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().expect("journal lock").clone()
    }
}

/// `sleep` waits `ms` then echoes `label`; `fail` always fails; `record` journals its label.
pub fn with_test_tools(builder: EngineBuilder, journal: &Journal) -> EngineBuilder {
    let sleep_journal = journal.clone();
    let record_journal = journal.clone();
    builder
        .tool(
            ToolDescriptor::new("sleep", "sleep then echo")
                .field(FieldSpec::required("ms", FieldType::Integer, "delay"))
                .field(FieldSpec::required("label", FieldType::String, "label")),
            handler_fn(move |input| {
                let journal = sleep_journal.clone();
                async move {
                    let ms = input.fields()["ms"].as_u64().unwrap_or(0);
                    let label = input.fields()["label"].as_str().unwrap_or("").to_string();
                    journal.push(format!("start:{label}"));
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    journal.push(format!("end:{label}"));
                    Ok::<_, anyhow::Error>(json!({ "label": label }))
                }
            }),
        )
        .tool(
            ToolDescriptor::new("fail", "always fails")
                .field(FieldSpec::optional("message", FieldType::String, "message")),
            handler_fn(|input| async move {
                let message = input
                    .fields()
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("boom")
                    .to_string();
                Err::<Value, _>(anyhow::anyhow!(message))
            }),
        )
        .tool(
            ToolDescriptor::new("record", "journals its label")
                .field(FieldSpec::required("label", FieldType::String, "label")),
            handler_fn(move |input| {
                let journal = record_journal.clone();
                async move {
                    let label = input.fields()["label"].as_str().unwrap_or("").to_string();
                    journal.push(label.clone());
                    Ok::<_, anyhow::Error>(json!({ "label": label }))
                }
            }),
        )
}

/// Canned code intelligence: answers queries with fixed locations and records what it saw.
#[derive(Default)]
pub struct FakeCodeIntelligence {
    pub locations: Vec<Location>,
    pub outline: Vec<FileOutline>,
    pub edits: Vec<TextEdit>,
    pub seen: Mutex<Vec<(SourcePosition, String)>>,
}

#[async_trait]
impl CodeIntelligence for FakeCodeIntelligence {
    async fn query(&self, position: &SourcePosition, command: SymbolCommand) -> Result<Vec<Location>> {
        self.seen
            .lock()
            .expect("seen lock")
            .push((position.clone(), command.as_str().to_string()));
        Ok(self.locations.clone())
    }

    async fn outline(&self, path: Option<&SandboxedPath>) -> Result<Vec<FileOutline>> {
        let outline = match path {
            Some(path) => self
                .outline
                .iter()
                .filter(|file| file.path == path.display_path())
                .cloned()
                .collect(),
            None => self.outline.clone(),
        };
        Ok(outline)
    }

    async fn diagnostics(&self, path: Option<&SandboxedPath>) -> Result<Diagnostics> {
        match path {
            Some(_) => Ok(Diagnostics::File {
                diagnostics: Vec::new(),
            }),
            None => Ok(Diagnostics::Project { files: Vec::new() }),
        }
    }

    async fn rename(&self, position: &SourcePosition, new_name: &str) -> Result<Vec<TextEdit>> {
        self.seen
            .lock()
            .expect("seen lock")
            .push((position.clone(), format!("rename:{new_name}")));
        Ok(self.edits.clone())
    }
}

/// Fetcher that serves one canned response and never touches the network.
pub struct StaticFetcher {
    pub body: String,
    pub content_type: Option<String>,
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, _url: &str) -> Result<FetchedContent> {
        Ok(FetchedContent {
            body: self.body.as_bytes().to_vec(),
            content_type: self.content_type.clone(),
        })
    }
}

pub fn offline_engine(code: Arc<dyn CodeIntelligence>, journal: &Journal) -> Result<Engine> {
    let builder = Engine::builder()
        .with_builtins()
        .code_intelligence(code)
        .fetcher(Arc::new(StaticFetcher {
            body: "<html><body><p>fetched page</p></body></html>".to_string(),
            content_type: Some("text/html".to_string()),
        }));
    with_test_tools(builder, journal).build()
}

pub fn engine() -> Result<Engine> {
    offline_engine(Arc::new(FakeCodeIntelligence::default()), &Journal::default())
}

pub fn error_kind(err: &ToolError) -> &'static str {
    err.kind().as_str()
}
