// extract/language.rs
// Language tags and tree-sitter grammar dispatch by file extension

use std::path::Path;

/// Supported source languages. Vue is a composite: the SFC envelope is
/// handled by the HTML grammar and the script block delegates to TS/JS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Java,
    CSharp,
    C,
    Cpp,
    Php,
    Go,
    Vue,
}

impl Language {
    pub fn from_path(path: &Path) -> Option<Language> {
        let name = path.file_name()?.to_str()?.to_lowercase();
        let ext = name.rsplit('.').next()?;
        match ext {
            "py" => Some(Language::Python),
            "js" | "mjs" | "cjs" | "jsx" => Some(Language::JavaScript),
            "ts" | "mts" | "cts" => Some(Language::TypeScript),
            "tsx" => Some(Language::Tsx),
            "java" => Some(Language::Java),
            "cs" => Some(Language::CSharp),
            "c" | "h" => Some(Language::C),
            "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Some(Language::Cpp),
            "php" | "phtml" | "inc" => Some(Language::Php),
            "go" => Some(Language::Go),
            "vue" => Some(Language::Vue),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::Java => "java",
            Language::CSharp => "c_sharp",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Php => "php",
            Language::Go => "go",
            Language::Vue => "vue",
        }
    }

    /// The tree-sitter grammar backing this language. Vue returns the HTML
    /// grammar, which parses the SFC envelope and template.
    pub fn grammar(self) -> tree_sitter::Language {
        match self {
            Language::Python => tree_sitter_python::LANGUAGE.into(),
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Language::Java => tree_sitter_java::LANGUAGE.into(),
            Language::CSharp => tree_sitter_c_sharp::LANGUAGE.into(),
            Language::C => tree_sitter_c::LANGUAGE.into(),
            Language::Cpp => tree_sitter_cpp::LANGUAGE.into(),
            Language::Php => tree_sitter_php::LANGUAGE_PHP.into(),
            Language::Go => tree_sitter_go::LANGUAGE.into(),
            Language::Vue => tree_sitter_html::LANGUAGE.into(),
        }
    }
}

/// Dotted module path for a relative file path: extension stripped,
/// separators mapped to `.`. `src/auth/service.py` -> `src.auth.service`.
pub fn module_path(relative_path: &str) -> String {
    let normalized = relative_path.replace('\\', "/");
    let without_ext = match normalized.rfind('.') {
        Some(idx) if idx > normalized.rfind('/').map(|s| s + 1).unwrap_or(0) => {
            &normalized[..idx]
        }
        _ => normalized.as_str(),
    };
    without_ext.replace('/', ".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn dispatch_by_extension() {
        assert_eq!(
            Language::from_path(&PathBuf::from("src/a.py")),
            Some(Language::Python)
        );
        assert_eq!(
            Language::from_path(&PathBuf::from("App.vue")),
            Some(Language::Vue)
        );
        assert_eq!(
            Language::from_path(&PathBuf::from("x/y.tsx")),
            Some(Language::Tsx)
        );
        assert_eq!(Language::from_path(&PathBuf::from("README.md")), None);
        assert_eq!(Language::from_path(&PathBuf::from("Makefile")), None);
    }

    #[test]
    fn module_path_strips_extension_and_maps_separators() {
        assert_eq!(module_path("src/auth/service.py"), "src.auth.service");
        assert_eq!(module_path("main.go"), "main");
        assert_eq!(module_path("pkg/.hidden/mod.rs"), "pkg..hidden.mod");
    }
}
