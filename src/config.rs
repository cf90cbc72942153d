// config.rs
// Run configuration: paths, pattern gates, model identifiers, token budgets

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Process-wide numeric thresholds governing clustering and recursion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenBudgets {
    /// Above this, the clusterer asks the model to partition the set.
    pub max_tokens_per_module: usize,
    /// Above this, a complex child module gets its own sub-agent.
    pub max_tokens_per_leaf_module: usize,
    /// Cap on a single model response.
    pub max_output_tokens: usize,
    /// Hard cap on clustering depth and sub-agent nesting.
    pub max_recursion_depth: usize,
}

impl Default for TokenBudgets {
    fn default() -> Self {
        Self {
            max_tokens_per_module: 36_369,
            max_tokens_per_leaf_module: 16_000,
            max_output_tokens: 32_768,
            max_recursion_depth: 2,
        }
    }
}

/// Documentation emphasis, inserted as a fixed paragraph into the agent
/// system prompt. Does not change partitioning or traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocType {
    Api,
    Architecture,
    UserGuide,
    Developer,
}

impl DocType {
    pub fn emphasis(self) -> &'static str {
        match self {
            DocType::Api => {
                "Emphasize the public API surface: exported functions, types, \
                 and their contracts. Document parameters, return values, and \
                 error behavior precisely."
            }
            DocType::Architecture => {
                "Emphasize structure over detail: component boundaries, \
                 dependency direction, data flow, and the reasons modules are \
                 separated the way they are."
            }
            DocType::UserGuide => {
                "Write for someone using this software, not modifying it. \
                 Lead with tasks and workflows; keep internals to the minimum \
                 needed to explain behavior."
            }
            DocType::Developer => {
                "Write for a contributor making changes. Cover invariants, \
                 extension points, non-obvious coupling, and where to start \
                 reading for common kinds of change."
            }
        }
    }
}

/// Full run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Absolute path of the repository to analyze.
    pub repository_root: PathBuf,
    /// Directory receiving every artifact.
    pub output_dir: PathBuf,
    /// Include globs over relative paths; empty means everything.
    pub include_patterns: Vec<String>,
    /// Exclude globs over relative paths.
    pub exclude_patterns: Vec<String>,
    /// Logical module names to call out in prompts. Does not change
    /// partitioning.
    pub focus_modules: Vec<String>,
    pub doc_type: DocType,
    /// Free-form text appended to the agent system prompt.
    pub custom_instructions: Option<String>,
    pub main_model: String,
    pub cluster_model: String,
    /// Tried in order after `main_model` on retryable failures.
    pub fallback_models: Vec<String>,
    pub llm_base_url: String,
    pub llm_api_key: String,
    pub budgets: TokenBudgets,
}

impl Config {
    /// Build a configuration from paths plus environment variables, the same
    /// variables the generation config has always read: `OPENAI_API_KEY` (or
    /// `OPENAI_KEY`), `OPENAI_BASE_URL`, `OPENAI_MODEL`, `CLUSTER_MODEL`,
    /// `FALLBACK_MODELS` (comma-separated).
    pub fn from_env(repository_root: PathBuf, output_dir: PathBuf) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY")
            .or_else(|_| std::env::var("OPENAI_KEY"))
            .unwrap_or_default();
        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let main_model =
            std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let cluster_model =
            std::env::var("CLUSTER_MODEL").unwrap_or_else(|_| main_model.clone());
        let fallback_models = std::env::var("FALLBACK_MODELS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            repository_root,
            output_dir,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            focus_modules: Vec::new(),
            doc_type: DocType::Architecture,
            custom_instructions: None,
            main_model,
            cluster_model,
            fallback_models,
            llm_base_url: base_url,
            llm_api_key: api_key,
            budgets: TokenBudgets::default(),
        }
    }

    /// The ordered fallback chain for agent calls: main model first.
    pub fn model_chain(&self) -> Vec<String> {
        let mut chain = vec![self.main_model.clone()];
        chain.extend(self.fallback_models.iter().cloned());
        chain
    }

    /// Repository directory name, used as the root module label.
    pub fn repository_name(&self) -> String {
        self.repository_root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "repository".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_chain_is_main_then_fallbacks() {
        let mut config = Config::from_env(PathBuf::from("/r"), PathBuf::from("/o"));
        config.main_model = "alpha".into();
        config.fallback_models = vec!["beta".into(), "gamma".into()];
        assert_eq!(config.model_chain(), vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn doc_type_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&DocType::UserGuide).unwrap(),
            "\"user-guide\""
        );
    }
}
