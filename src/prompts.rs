// prompts.rs
// Prompt assembly for the clusterer, the documentation agent, and the
// overview synthesis calls. Sentinel tags (<GROUPED_COMPONENTS>, <OVERVIEW>)
// are part of the wire contract with the model.

use crate::config::DocType;
use crate::model::{ComponentRegistry, ModuleNode};
use std::collections::BTreeMap;

pub const COMPLEX_SYSTEM_PROMPT: &str = r#"<ROLE>
You are an AI documentation assistant. Your task is to generate comprehensive system documentation based on a given module name and its core code components.
</ROLE>

<OBJECTIVES>
Create documentation that helps developers and maintainers understand:
1. The module's purpose and core functionality
2. Architecture and component relationships
3. How the module fits into the overall system
</OBJECTIVES>

<DOCUMENTATION_STRUCTURE>
1. **Main documentation file** (`{module_name}.md`):
   - Brief introduction and purpose
   - Architecture overview with diagrams
   - High-level functionality of each sub-module with references to its documentation file
   - Link to other module documentation instead of duplicating information

2. **Sub-module documentation** (if applicable):
   - Detailed descriptions of each sub-module saved in the working directory as `sub_module_name.md`

3. **Visual documentation**:
   - Mermaid diagrams for architecture, dependencies, and data flow
</DOCUMENTATION_STRUCTURE>

<WORKFLOW>
1. Analyze the provided code components and module structure; explore dependencies not given with `read_code_components` if needed
2. Create the main `{module_name}.md` file with overview and architecture in the working directory
3. Use `generate_sub_module_documentation` for COMPLEX child modules that span more than one code file and clearly split into sub-modules
4. Include relevant Mermaid diagrams throughout the documentation
5. After all sub-modules are documented, adjust `{module_name}.md` in ONE step so every generated file is cross-referenced
</WORKFLOW>

<AVAILABLE_TOOLS>
- `str_replace_editor`: file operations for creating and editing documentation files
- `read_code_components`: explore additional code dependencies not included in the provided components
- `generate_sub_module_documentation`: generate detailed documentation for individual sub-modules via sub-agents
</AVAILABLE_TOOLS>"#;

pub const LEAF_SYSTEM_PROMPT: &str = r#"<ROLE>
You are an AI documentation assistant. Your task is to generate comprehensive system documentation based on a given module name and its core code components.
</ROLE>

<OBJECTIVES>
Create comprehensive documentation that helps developers and maintainers understand:
1. The module's purpose and core functionality
2. Architecture and component relationships
3. How the module fits into the overall system
</OBJECTIVES>

<DOCUMENTATION_REQUIREMENTS>
1. Structure: brief introduction, then comprehensive documentation with Mermaid diagrams
2. Diagrams: include architecture, dependencies, data flow, and process flows as relevant
3. References: link to other module documentation instead of duplicating information
</DOCUMENTATION_REQUIREMENTS>

<WORKFLOW>
1. Analyze the provided code components and module structure
2. Explore dependencies between components if needed
3. Generate the complete {module_name}.md documentation file
</WORKFLOW>

<AVAILABLE_TOOLS>
- `str_replace_editor`: file operations for creating and editing documentation files
- `read_code_components`: explore additional code dependencies not included in the provided components
</AVAILABLE_TOOLS>"#;

pub const CLUSTER_REPO_PROMPT: &str = r#"Here is a list of all potential core components of the repository (it is normal that some components are not essential to the repository):
<POTENTIAL_CORE_COMPONENTS>
{potential_core_components}
</POTENTIAL_CORE_COMPONENTS>

Please group the components such that each group is a set of closely related components that together form a module. DO NOT include components that are not essential to the repository.
First reason about the components, then group them and return the result in the following format:
<GROUPED_COMPONENTS>
{
    "module_name_1": {
        "path": "path/to/module_1",
        "components": ["component_id_1", "component_id_2"]
    },
    "module_name_2": {
        "path": "path/to/module_2",
        "components": ["component_id_3"]
    }
}
</GROUPED_COMPONENTS>"#;

pub const CLUSTER_MODULE_PROMPT: &str = r#"Here is the module tree of a repository:
<MODULE_TREE>
{module_tree}
</MODULE_TREE>

Here is a list of all potential core components of the module {module_name} (it is normal that some components are not essential to the module):
<POTENTIAL_CORE_COMPONENTS>
{potential_core_components}
</POTENTIAL_CORE_COMPONENTS>

Please group the components such that each group is a set of closely related components that together form a smaller module. DO NOT include components that are not essential to the module.
First reason from the given context, then group them and return the result in the following format:
<GROUPED_COMPONENTS>
{
    "module_name_1": {
        "path": "path/to/module_1",
        "components": ["component_id_1", "component_id_2"]
    },
    "module_name_2": {
        "path": "path/to/module_2",
        "components": ["component_id_3"]
    }
}
</GROUPED_COMPONENTS>"#;

pub const REPO_OVERVIEW_PROMPT: &str = r#"You are an AI documentation assistant. Your task is to generate a brief overview of the {repo_name} repository.

The overview should cover:
- The purpose of the repository
- The end-to-end architecture of the repository visualized by Mermaid diagrams
- References to the core module documentation

Here is the `{repo_name}` repo structure and its core module documentation:
<REPO_STRUCTURE>
{repo_structure}
</REPO_STRUCTURE>

Please generate the overview of the `{repo_name}` repository in markdown format with the following structure:
<OVERVIEW>
overview_content
</OVERVIEW>"#;

pub const MODULE_OVERVIEW_PROMPT: &str = r#"You are an AI documentation assistant. Your task is to generate a brief overview of the `{module_name}` module.

The overview should cover:
- The purpose of the module
- The architecture of the module visualized by Mermaid diagrams
- References to the core component documentation

Here is the repo structure and core component documentation of the `{module_name}` module:
<REPO_STRUCTURE>
{repo_structure}
</REPO_STRUCTURE>

Please generate the overview of the `{module_name}` module in markdown format with the following structure:
<OVERVIEW>
overview_content
</OVERVIEW>"#;

/// Message returned by `generate_sub_module_documentation` when the child
/// does not qualify for its own sub-agent.
pub const DOCUMENT_INLINE_MESSAGE: &str =
    "This sub-module is small enough to document inline; include it directly \
     in the current module's documentation instead of spawning a sub-agent.";

const FENCE_LANGUAGES: &[(&str, &str)] = &[
    ("py", "python"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("java", "java"),
    ("cs", "csharp"),
    ("c", "c"),
    ("h", "c"),
    ("cpp", "cpp"),
    ("cc", "cpp"),
    ("cxx", "cpp"),
    ("hpp", "cpp"),
    ("php", "php"),
    ("phtml", "php"),
    ("go", "go"),
    ("vue", "vue"),
];

fn fence_language(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    FENCE_LANGUAGES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, lang)| *lang)
        .unwrap_or("text")
}

/// Compact leaf listing grouped by file, sorted by path. The second variant
/// appends each component's source and is used only for token counting.
pub fn format_core_components(
    leaf_ids: &[String],
    registry: &ComponentRegistry,
) -> (String, String) {
    let mut by_file: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for id in leaf_ids {
        let Some(component) = registry.get(id) else {
            continue;
        };
        by_file
            .entry(component.relative_path.as_str())
            .or_default()
            .push(id);
    }

    let mut listing = String::new();
    let mut with_code = String::new();
    for (file, ids) in by_file {
        listing.push_str(&format!("# {}\n", file));
        with_code.push_str(&format!("# {}\n", file));
        for id in ids {
            let display = registry
                .get(id)
                .map(|c| c.display_name())
                .unwrap_or_default();
            listing.push_str(&format!("\t{} ({})\n", id, display));
            with_code.push_str(&format!("\t{} ({})\n", id, display));
            if let Some(source) = registry.get(id).and_then(|c| c.source_code.as_deref()) {
                with_code.push_str(source);
                with_code.push('\n');
            }
        }
    }
    (listing, with_code)
}

/// Render the module tree as an indented outline, marking the current module.
pub fn format_module_tree(tree: &ModuleNode, current: Option<&str>) -> String {
    fn walk(node: &ModuleNode, current: Option<&str>, indent: usize, out: &mut Vec<String>) {
        let pad = "  ".repeat(indent);
        if current == Some(node.name.as_str()) {
            out.push(format!("{}{} (current module)", pad, node.name));
        } else {
            out.push(format!("{}{}", pad, node.name));
        }
        if !node.components.is_empty() {
            out.push(format!(
                "{}  Core components: {}",
                pad,
                node.components.join(", ")
            ));
        }
        if !node.children.is_empty() {
            out.push(format!("{}  Children:", pad));
            for child in node.children.values() {
                walk(child, current, indent + 2, out);
            }
        }
    }
    let mut out = Vec::new();
    walk(tree, current, 0, &mut out);
    out.join("\n")
}

pub fn cluster_prompt(
    listing: &str,
    module_tree: Option<&ModuleNode>,
    module_name: Option<&str>,
) -> String {
    match module_tree {
        None => CLUSTER_REPO_PROMPT.replace("{potential_core_components}", listing),
        Some(tree) => CLUSTER_MODULE_PROMPT
            .replace("{module_tree}", &format_module_tree(tree, module_name))
            .replace("{module_name}", module_name.unwrap_or(""))
            .replace("{potential_core_components}", listing),
    }
}

/// Agent system prompt: variant by module complexity, plus the doc-type
/// emphasis paragraph and any caller-supplied custom instructions.
pub fn agent_system_prompt(
    module_name: &str,
    complex: bool,
    doc_type: DocType,
    custom_instructions: Option<&str>,
) -> String {
    let template = if complex {
        COMPLEX_SYSTEM_PROMPT
    } else {
        LEAF_SYSTEM_PROMPT
    };
    let mut prompt = template.replace("{module_name}", module_name);
    prompt.push_str("\n\n<EMPHASIS>\n");
    prompt.push_str(doc_type.emphasis());
    prompt.push_str("\n</EMPHASIS>");
    if let Some(custom) = custom_instructions.filter(|c| !c.trim().is_empty()) {
        prompt.push_str("\n\n<CUSTOM_INSTRUCTIONS>\n");
        prompt.push_str(custom.trim());
        prompt.push_str("\n</CUSTOM_INSTRUCTIONS>");
    }
    prompt
}

/// Agent user prompt: module tree outline plus the module's component
/// sources grouped per file, each under a language-tagged fence.
pub fn agent_user_prompt(
    module_name: &str,
    component_ids: &[String],
    registry: &ComponentRegistry,
    module_tree: &ModuleNode,
    focus_modules: &[String],
) -> String {
    let mut by_file: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for id in component_ids {
        if let Some(component) = registry.get(id) {
            by_file
                .entry(component.relative_path.as_str())
                .or_default()
                .push(id);
        }
    }

    let mut codes = String::new();
    for (file, ids) in by_file {
        codes.push_str(&format!("# File: {}\n\n", file));
        codes.push_str("## Core components in this file:\n");
        for id in &ids {
            codes.push_str(&format!("- {}\n", id));
        }
        codes.push_str(&format!("\n## Sources:\n```{}\n", fence_language(file)));
        for id in &ids {
            if let Some(source) = registry.get(*id).and_then(|c| c.source_code.as_deref()) {
                codes.push_str(source);
                if !source.ends_with('\n') {
                    codes.push('\n');
                }
            }
        }
        codes.push_str("```\n\n");
    }

    let mut prompt = format!(
        "Generate comprehensive documentation for the {module} module using the provided \
         module tree and core components.\n\n<MODULE_TREE>\n{tree}\n</MODULE_TREE>\n\
         * NOTE: All documentation files live in one flat directory; reference other modules \
         as [module_name](module_name.md).\n\n<CORE_COMPONENT_CODES>\n{codes}</CORE_COMPONENT_CODES>",
        module = module_name,
        tree = format_module_tree(module_tree, Some(module_name)),
        codes = codes,
    );
    if !focus_modules.is_empty() {
        prompt.push_str(&format!(
            "\n\n<FOCUS_MODULES>\nGive extra depth to these modules when they appear: {}\n</FOCUS_MODULES>",
            focus_modules.join(", ")
        ));
    }
    prompt
}

pub fn module_overview_prompt(module_name: &str, structure: &str) -> String {
    MODULE_OVERVIEW_PROMPT
        .replace("{module_name}", module_name)
        .replace("{repo_structure}", structure)
}

pub fn repo_overview_prompt(repo_name: &str, structure: &str) -> String {
    REPO_OVERVIEW_PROMPT
        .replace("{repo_name}", repo_name)
        .replace("{repo_structure}", structure)
}
