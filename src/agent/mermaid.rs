// agent/mermaid.rs
// Structural validation of Mermaid diagrams embedded in generated Markdown.
// A strict parser runs first; on failure a lenient one gets a second opinion.
// Only when both reject is the diagram reported back to the agent.

/// A diagram that failed both parsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramError {
    /// 1-based diagram number within the file.
    pub diagram: usize,
    /// 1-based line number in the Markdown file.
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for DiagramError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "mermaid diagram {} (line {}): {}",
            self.diagram, self.line, self.message
        )
    }
}

const DIAGRAM_HEADERS: &[&str] = &[
    "graph",
    "flowchart",
    "sequenceDiagram",
    "classDiagram",
    "stateDiagram",
    "stateDiagram-v2",
    "erDiagram",
    "journey",
    "gantt",
    "pie",
    "mindmap",
    "timeline",
    "quadrantChart",
];

/// Block keywords that must be closed by `end`.
const BLOCK_OPENERS: &[&str] = &["subgraph", "alt", "opt", "loop", "par", "rect", "critical"];

/// Extract every fenced block labeled `mermaid`: (diagram number, 1-based
/// line of the first diagram line, source).
pub fn extract_diagrams(markdown: &str) -> Vec<(usize, usize, String)> {
    let mut diagrams = Vec::new();
    let mut in_mermaid = false;
    let mut current = String::new();
    let mut start_line = 0;
    for (idx, line) in markdown.lines().enumerate() {
        let trimmed = line.trim();
        if in_mermaid {
            if trimmed.starts_with("```") {
                diagrams.push((diagrams.len() + 1, start_line, std::mem::take(&mut current)));
                in_mermaid = false;
            } else {
                current.push_str(line);
                current.push('\n');
            }
        } else if trimmed.strip_prefix("```").is_some_and(|rest| {
            let label = rest.trim();
            label == "mermaid" || label.starts_with("mermaid ")
        }) {
            in_mermaid = true;
            start_line = idx + 2;
        }
    }
    diagrams
}

/// Validate every diagram in a Markdown document. Returns the number of
/// diagrams checked, or the first failure.
pub fn validate_markdown(markdown: &str) -> Result<usize, DiagramError> {
    let diagrams = extract_diagrams(markdown);
    for (number, start_line, source) in &diagrams {
        if let Err((offset, message)) = parse_strict(source) {
            if parse_lenient(source).is_err() {
                return Err(DiagramError {
                    diagram: *number,
                    line: start_line + offset,
                    message,
                });
            }
        }
    }
    Ok(diagrams.len())
}

fn known_header(line: &str) -> bool {
    let head = line.split_whitespace().next().unwrap_or("");
    DIAGRAM_HEADERS.contains(&head)
}

/// Bracket delta of a line, ignoring quoted spans. A negative running depth
/// inside one line means a closing bracket with no opener.
fn bracket_scan(line: &str, depth: &mut i32) -> Result<(), String> {
    let mut in_quote = false;
    for ch in line.chars() {
        match ch {
            '"' => in_quote = !in_quote,
            '(' | '[' | '{' if !in_quote => *depth += 1,
            ')' | ']' | '}' if !in_quote => {
                *depth -= 1;
                if *depth < 0 {
                    return Err(format!("unmatched '{}'", ch));
                }
            }
            _ => {}
        }
    }
    if in_quote {
        return Err("unterminated quote".to_string());
    }
    Ok(())
}

/// Strict pass: known header, per-line bracket discipline, balanced
/// block/end pairs. Errors carry a 0-based line offset into the diagram.
fn parse_strict(source: &str) -> Result<(), (usize, String)> {
    let mut lines = source.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let Some((header_offset, header)) = lines.next() else {
        return Err((0, "empty diagram".to_string()));
    };
    if !known_header(header.trim()) {
        return Err((
            header_offset,
            format!("unknown diagram type '{}'", header.trim()),
        ));
    }

    let mut blocks = 0i32;
    for (offset, line) in lines {
        let trimmed = line.trim();
        if trimmed.starts_with("%%") {
            continue; // comment
        }
        let mut depth = 0;
        if let Err(message) = bracket_scan(trimmed, &mut depth) {
            return Err((offset, message));
        }
        if depth != 0 {
            return Err((offset, "unbalanced brackets".to_string()));
        }
        let first = trimmed.split_whitespace().next().unwrap_or("");
        if BLOCK_OPENERS.contains(&first) {
            blocks += 1;
        } else if first == "end" {
            blocks -= 1;
            if blocks < 0 {
                return Err((offset, "'end' with no open block".to_string()));
            }
        }
    }
    if blocks != 0 {
        return Err((0, "unclosed block (missing 'end')".to_string()));
    }
    Ok(())
}

/// Lenient pass: known header and overall bracket balance across the whole
/// diagram. Catches diagrams that only split constructs across lines.
fn parse_lenient(source: &str) -> Result<(), String> {
    let mut lines = source.lines().filter(|l| !l.trim().is_empty());
    let Some(header) = lines.next() else {
        return Err("empty diagram".to_string());
    };
    if !known_header(header.trim()) {
        return Err(format!("unknown diagram type '{}'", header.trim()));
    }
    let mut depth = 0;
    for line in lines {
        // cross-line balance only; negative depth may recover later
        let mut in_quote = false;
        for ch in line.chars() {
            match ch {
                '"' => in_quote = !in_quote,
                '(' | '[' | '{' if !in_quote => depth += 1,
                ')' | ']' | '}' if !in_quote => depth -= 1,
                _ => {}
            }
        }
    }
    if depth != 0 {
        return Err("unbalanced brackets".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(diagram: &str) -> String {
        format!("# Title\n\nSome text.\n\n```mermaid\n{}\n```\n", diagram)
    }

    #[test]
    fn valid_flowchart_passes() {
        let markdown = doc("graph TD\n    A[Start] --> B{Decision}\n    B -->|yes| C[Done]");
        assert_eq!(validate_markdown(&markdown), Ok(1));
    }

    #[test]
    fn valid_sequence_diagram_passes() {
        let markdown = doc(
            "sequenceDiagram\n    participant A\n    participant B\n    A->>B: request\n    alt ok\n        B->>A: reply\n    end",
        );
        assert_eq!(validate_markdown(&markdown), Ok(1));
    }

    #[test]
    fn unknown_header_fails_with_position() {
        let markdown = doc("flowchar TD\n    A --> B");
        let err = validate_markdown(&markdown).unwrap_err();
        assert_eq!(err.diagram, 1);
        assert_eq!(err.line, 6);
        assert!(err.message.contains("unknown diagram type"));
    }

    #[test]
    fn unbalanced_brackets_fail_both_parsers() {
        let markdown = doc("graph TD\n    A[Start --> B[End]");
        let err = validate_markdown(&markdown).unwrap_err();
        assert!(err.message.contains("unbalanced") || err.message.contains("unmatched"));
    }

    #[test]
    fn lenient_parser_rescues_multiline_nodes() {
        // strict fails (per-line imbalance); lenient sees overall balance
        let markdown = doc("graph TD\n    A[long\n    label] --> B[End]");
        assert_eq!(validate_markdown(&markdown), Ok(1));
    }

    #[test]
    fn subgraph_requires_end() {
        let markdown = doc("graph TD\n    subgraph api\n    A --> B");
        let err = validate_markdown(&markdown).unwrap_err();
        assert!(err.message.contains("end"));
    }

    #[test]
    fn non_mermaid_fences_are_ignored() {
        let markdown = "```python\nprint('[')\n```\n";
        assert_eq!(validate_markdown(markdown), Ok(0));
    }

    #[test]
    fn second_diagram_number_is_reported() {
        let markdown = format!(
            "{}\n```mermaid\nnot a diagram\n```\n",
            doc("graph TD\n    A --> B")
        );
        let err = validate_markdown(&markdown).unwrap_err();
        assert_eq!(err.diagram, 2);
    }
}
