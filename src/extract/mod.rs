// extract/mod.rs
// Repository walk, file filtering, and parallel per-file extraction.
// Per-file failures are isolated: a file that fails to parse is skipped with
// a warning and never aborts the run.

pub mod engine;
pub mod filter;
pub mod go;
pub mod language;
pub mod php;
pub mod python;
pub mod vue;

use crate::model::{CallEdge, Component, ComponentRegistry};
use filter::FileFilter;
use language::Language;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One source file handed to a language strategy.
pub struct FileInput<'a> {
    pub file_path: &'a Path,
    pub relative_path: &'a str,
    pub content: &'a str,
}

/// Aggregated extractor output for a repository.
pub struct ExtractionResult {
    pub registry: ComponentRegistry,
    pub edges: Vec<CallEdge>,
    pub files_analyzed: usize,
    /// True if any analyzed file was Go; the leaf filter widens kinds then.
    pub has_go: bool,
}

/// Walk the repository, filter files through both gates, and extract every
/// supported file across a worker pool sized to the CPU count.
pub fn extract_repository(
    repo_root: &Path,
    include_patterns: &[String],
    exclude_patterns: &[String],
) -> ExtractionResult {
    let filter = FileFilter::new(include_patterns, exclude_patterns);
    let files = discover_files(repo_root, &filter);
    info!("discovered {} source files", files.len());

    let outputs = parse_files(&files);

    let mut registry = ComponentRegistry::new();
    let mut edges = Vec::new();
    let mut files_analyzed = 0;
    let mut has_go = false;
    for (language, components, mut file_edges) in outputs {
        if components.is_empty() && file_edges.is_empty() {
            continue;
        }
        files_analyzed += 1;
        has_go |= language == Language::Go;
        engine::merge_components(components, &mut registry);
        edges.append(&mut file_edges);
    }

    info!(
        "extracted {} components and {} raw edges from {} files",
        registry.len(),
        edges.len(),
        files_analyzed
    );
    ExtractionResult {
        registry,
        edges,
        files_analyzed,
        has_go,
    }
}

/// Recursive walk honoring the directory ignore set. Symbolic links are
/// never followed.
fn discover_files(repo_root: &Path, filter: &FileFilter) -> Vec<(PathBuf, String, Language)> {
    let mut files = Vec::new();
    let mut stack = vec![repo_root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("cannot read directory {:?}: {}", dir, e);
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(_) => continue,
            };
            if file_type.is_symlink() {
                debug!("skipping symlink {:?}", path);
                continue;
            }
            if file_type.is_dir() {
                let name = entry.file_name().to_string_lossy().to_string();
                if filter.allows_dir(&name) {
                    stack.push(path);
                }
                continue;
            }
            let Some(language) = Language::from_path(&path) else {
                continue;
            };
            let relative = match path.strip_prefix(repo_root) {
                Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            if filter.allows_file(&relative) {
                files.push((path, relative, language));
            }
        }
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    files
}

type FileOutput = (Language, Vec<Component>, Vec<CallEdge>);

/// Parse files on a rayon pool; if the pool cannot be built, degrade to
/// sequential processing rather than failing the run.
fn parse_files(files: &[(PathBuf, String, Language)]) -> Vec<FileOutput> {
    use rayon::prelude::*;

    let workers = match num_cpus::get() {
        0 => 4,
        n => n,
    };

    match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool.install(|| {
            files
                .par_iter()
                .map(|(path, relative, language)| parse_one(path, relative, *language))
                .collect()
        }),
        Err(e) => {
            warn!("worker pool init failed, running sequentially: {}", e);
            files
                .iter()
                .map(|(path, relative, language)| parse_one(path, relative, *language))
                .collect()
        }
    }
}

fn parse_one(path: &Path, relative: &str, language: Language) -> FileOutput {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("cannot read {}: {}", relative, e);
            return (language, Vec::new(), Vec::new());
        }
    };
    let input = FileInput {
        file_path: path,
        relative_path: relative,
        content: &content,
    };
    let (components, edges) = extract_file(&input, language);
    debug!(
        "{}: {} components, {} edges",
        relative,
        components.len(),
        edges.len()
    );
    (language, components, edges)
}

/// Dispatch one file to its language strategy.
pub fn extract_file(input: &FileInput, language: Language) -> (Vec<Component>, Vec<CallEdge>) {
    match language {
        Language::Python => python::extract(input),
        Language::Go => go::extract(input),
        Language::Php => php::extract(input),
        Language::Vue => vue::extract(input),
        other => match engine::spec_for(other) {
            Some(spec) => engine::extract(input, spec),
            None => (Vec::new(), Vec::new()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn walk_skips_ignored_dirs_and_unsupported_files() {
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/dep")).unwrap();
        fs::write(root.join("src/a.py"), "def f():\n    pass\n").unwrap();
        fs::write(root.join("src/notes.txt"), "hello").unwrap();
        fs::write(root.join("node_modules/dep/index.js"), "module.exports = 1;").unwrap();

        let filter = FileFilter::new(&[], &[]);
        let files = discover_files(root, &filter);
        let relatives: Vec<&str> = files.iter().map(|(_, r, _)| r.as_str()).collect();
        assert_eq!(relatives, vec!["src/a.py"]);
    }

    #[test]
    fn extraction_aggregates_across_files() {
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("a.py"), "def f():\n    g()\n").unwrap();
        fs::write(root.join("b.py"), "def g():\n    pass\n").unwrap();

        let result = extract_repository(root, &[], &[]);
        assert_eq!(result.files_analyzed, 2);
        assert!(result.registry.contains_key("a.f"));
        assert!(result.registry.contains_key("b.g"));
        assert!(!result.has_go);
        assert_eq!(result.edges.len(), 1);
    }

    #[test]
    fn unreadable_file_is_skipped_not_fatal() {
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("ok.py"), "def f():\n    pass\n").unwrap();
        // binary content that is not valid UTF-8
        fs::write(root.join("bad.py"), [0xff, 0xfe, 0x00, 0x01]).unwrap();

        let result = extract_repository(root, &[], &[]);
        assert!(result.registry.contains_key("ok.f"));
        assert!(!result.registry.keys().any(|k| k.starts_with("bad.")));
    }
}
