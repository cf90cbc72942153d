// tokens.rs
// Fixed token estimator shared by every budget comparison

use crate::model::{ComponentId, ComponentRegistry};

/// Estimate token count for a text. Rough approximation: ~4 chars per token.
///
/// Every budget decision in the pipeline goes through this single estimator
/// so that repeated runs over an unchanged repository make identical
/// split/recurse choices.
pub fn estimate(text: &str) -> usize {
    text.len() / 4
}

/// Combined token estimate of the source code of a set of components.
pub fn estimate_components(ids: &[ComponentId], registry: &ComponentRegistry) -> usize {
    ids.iter()
        .filter_map(|id| registry.get(id))
        .map(|c| c.source_code.as_deref().map(estimate).unwrap_or(0))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_chars_per_token() {
        assert_eq!(estimate(""), 0);
        assert_eq!(estimate("abcd"), 1);
        assert_eq!(estimate("abcdefgh"), 2);
    }
}
