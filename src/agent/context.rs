// agent/context.rs
// Shared dependency context injected into every tool call, plus the per-file
// edit history backing undo_edit.

use crate::config::{Config, DocType, TokenBudgets};
use crate::llm::ChatBackend;
use crate::model::{ComponentRegistry, ModuleNode};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// One undoable edit: the file content before the edit, `None` when the file
/// did not exist (create).
#[derive(Debug)]
pub struct EditRecord {
    pub prior: Option<String>,
}

/// Per-file stack of prior contents, scoped to one orchestrator run.
#[derive(Debug, Default)]
pub struct EditHistory {
    stacks: HashMap<PathBuf, Vec<EditRecord>>,
}

impl EditHistory {
    pub fn push(&mut self, path: PathBuf, prior: Option<String>) {
        self.stacks
            .entry(path)
            .or_default()
            .push(EditRecord { prior });
    }

    pub fn pop(&mut self, path: &PathBuf) -> Option<EditRecord> {
        self.stacks.get_mut(path)?.pop()
    }

    pub fn clear(&mut self) {
        self.stacks.clear();
    }
}

/// Everything a tool call can reach, cheap to clone per invocation.
#[derive(Clone)]
pub struct AgentContext {
    /// Absolute documentation output directory; fully writable.
    pub docs_dir: PathBuf,
    /// Absolute repository root; view-only.
    pub repo_root: PathBuf,
    pub registry: Arc<ComponentRegistry>,
    /// Full module tree, read-only.
    pub module_tree: Arc<ModuleNode>,
    pub history: Arc<Mutex<EditHistory>>,
    pub backend: Arc<dyn ChatBackend>,
    /// Ordered agent model chain: main model first.
    pub model_chain: Vec<String>,
    pub budgets: TokenBudgets,
    pub doc_type: DocType,
    pub custom_instructions: Option<String>,
    pub focus_modules: Vec<String>,
    /// Names from the root to the module currently being documented.
    pub module_path: Vec<String>,
    /// Sub-agent nesting level of the current invocation.
    pub current_depth: usize,
}

impl AgentContext {
    pub fn new(
        config: &Config,
        registry: Arc<ComponentRegistry>,
        module_tree: Arc<ModuleNode>,
        backend: Arc<dyn ChatBackend>,
    ) -> Self {
        Self {
            docs_dir: config.output_dir.clone(),
            repo_root: config.repository_root.clone(),
            registry,
            module_tree,
            history: Arc::new(Mutex::new(EditHistory::default())),
            backend,
            model_chain: config.model_chain(),
            budgets: config.budgets,
            doc_type: config.doc_type,
            custom_instructions: config.custom_instructions.clone(),
            focus_modules: config.focus_modules.clone(),
            module_path: Vec::new(),
            current_depth: 0,
        }
    }

    /// Context for documenting a specific module at a given nesting depth.
    pub fn for_module(&self, module_path: Vec<String>, depth: usize) -> Self {
        let mut ctx = self.clone();
        ctx.module_path = module_path;
        ctx.current_depth = depth;
        ctx
    }

    /// The module node this context points at.
    pub fn current_module(&self) -> Option<&ModuleNode> {
        self.module_tree.descend(&self.module_path)
    }
}
