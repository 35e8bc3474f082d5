//! Selectors applied to binary tokens: bracket balancing and token-type overrides

use super::attributes::StandardTokenType;
use crate::selector::{self, Selector};

/// Which scopes may contain balanced brackets
///
/// `*` in the balanced list allows every scope. Unbalanced selectors always
/// take precedence.
#[derive(Debug, Clone, Default)]
pub struct BalancedBracketSelectors {
    balanced: Vec<Selector>,
    unbalanced: Vec<Selector>,
    allow_any: bool,
}

impl BalancedBracketSelectors {
    pub fn new<S: AsRef<str>>(balanced: &[S], unbalanced: &[S]) -> Self {
        let mut allow_any = false;
        let mut balanced_selectors = Vec::new();
        for source in balanced {
            if source.as_ref() == "*" {
                allow_any = true;
                balanced_selectors.clear();
                break;
            }
            balanced_selectors.extend(selector::parse(source.as_ref()).into_iter().map(|p| p.selector));
        }

        let unbalanced = unbalanced
            .iter()
            .flat_map(|source| selector::parse(source.as_ref()))
            .map(|p| p.selector)
            .collect();

        Self {
            balanced: balanced_selectors,
            unbalanced,
            allow_any,
        }
    }

    pub fn matches_always(&self) -> bool {
        self.allow_any && self.unbalanced.is_empty()
    }

    pub fn matches_never(&self) -> bool {
        !self.allow_any && self.balanced.is_empty()
    }

    pub fn matches<S: AsRef<str>>(&self, scopes: &[S]) -> bool {
        if self.unbalanced.iter().any(|excluder| excluder.matches(scopes)) {
            return false;
        }
        if self.balanced.iter().any(|includer| includer.matches(scopes)) {
            return true;
        }
        self.allow_any
    }
}

/// Forces a token type on tokens whose scope path matches `selector`
#[derive(Debug, Clone)]
pub struct TokenTypeMatcher {
    pub token_type: StandardTokenType,
    pub selector: Selector,
}

impl TokenTypeMatcher {
    /// One matcher per comma-separated alternative of `source`
    pub fn parse(source: &str, token_type: StandardTokenType) -> Vec<Self> {
        selector::parse(source)
            .into_iter()
            .map(|parsed| Self {
                token_type,
                selector: parsed.selector,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_matches_always() {
        let selectors = BalancedBracketSelectors::new(&["*"], &[]);
        assert!(selectors.matches_always());
        assert!(!selectors.matches_never());
        assert!(selectors.matches(&["anything"]));
    }

    #[test]
    fn test_empty_matches_never() {
        let selectors = BalancedBracketSelectors::new::<&str>(&[], &[]);
        assert!(selectors.matches_never());
        assert!(!selectors.matches(&["source.x"]));
    }

    #[test]
    fn test_excluders_win() {
        let selectors = BalancedBracketSelectors::new(&["*"], &["string", "comment"]);
        assert!(!selectors.matches_always());
        assert!(selectors.matches(&["source.x", "meta.block"]));
        assert!(!selectors.matches(&["source.x", "string.quoted"]));
    }

    #[test]
    fn test_specific_includers() {
        let selectors = BalancedBracketSelectors::new(&["meta.block"], &[]);
        assert!(selectors.matches(&["source.x", "meta.block.x"]));
        assert!(!selectors.matches(&["source.x"]));
    }

    #[test]
    fn test_token_type_matchers_per_alternative() {
        let matchers = TokenTypeMatcher::parse("string.template, comment.doc", StandardTokenType::Other);
        assert_eq!(matchers.len(), 2);
        assert!(matchers[1].selector.matches(&["source.js", "comment.doc"]));
    }
}
