//! Token accumulation for one line

use serde::Serialize;

use super::attributes;
use super::brackets::{BalancedBracketSelectors, TokenTypeMatcher};
use super::scope_stack::AttributedScopeStack;
use super::state_stack::StateStack;

/// A run of text sharing one scope path; offsets are UTF-8 byte offsets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub start_index: usize,
    pub end_index: usize,
    /// Outermost scope first
    pub scopes: Vec<String>,
}

pub struct LineTokens<'a> {
    emit_binary_tokens: bool,
    tokens: Vec<Token>,
    /// Flat (start offset, attributes) pairs
    binary_tokens: Vec<u32>,
    last_token_end: usize,
    token_type_overrides: &'a [TokenTypeMatcher],
    balanced_bracket_selectors: Option<&'a BalancedBracketSelectors>,
}

impl<'a> LineTokens<'a> {
    pub fn new(
        emit_binary_tokens: bool,
        token_type_overrides: &'a [TokenTypeMatcher],
        balanced_bracket_selectors: Option<&'a BalancedBracketSelectors>,
    ) -> Self {
        Self {
            emit_binary_tokens,
            tokens: Vec::new(),
            binary_tokens: Vec::new(),
            last_token_end: 0,
            token_type_overrides,
            balanced_bracket_selectors,
        }
    }

    pub fn produce(&mut self, stack: &StateStack, end: usize) {
        self.produce_from_scopes(stack.content_name_scopes(), end);
    }

    /// Emit `[last end, end)` with `scopes`; a no-op unless `end` moves forward
    pub fn produce_from_scopes(&mut self, scopes: &AttributedScopeStack, end: usize) {
        if self.last_token_end >= end {
            return;
        }
        self.emit(scopes, self.last_token_end, end);
        self.last_token_end = end;
    }

    fn emit(&mut self, scopes: &AttributedScopeStack, start: usize, end: usize) {
        if self.emit_binary_tokens {
            let metadata = self.binary_metadata(scopes);
            if self.binary_tokens.last() == Some(&metadata) {
                return;
            }
            self.binary_tokens.push(start as u32);
            self.binary_tokens.push(metadata);
            return;
        }

        let scope_names = scopes.scope_names();
        if let Some(last) = self.tokens.last_mut() {
            if last.end_index == start && last.scopes == scope_names {
                last.end_index = end;
                return;
            }
        }
        self.tokens.push(Token {
            start_index: start,
            end_index: end,
            scopes: scope_names,
        });
    }

    fn binary_metadata(&self, scopes: &AttributedScopeStack) -> u32 {
        let mut metadata = scopes.token_attributes();
        let selectors = self.balanced_bracket_selectors;

        let mut contains_balanced_brackets = selectors.is_some_and(|s| s.matches_always());
        let selective_brackets =
            selectors.is_some_and(|s| !s.matches_always() && !s.matches_never());

        if !self.token_type_overrides.is_empty() || selective_brackets {
            let scope_names = scopes.scope_names();
            for matcher in self.token_type_overrides {
                if matcher.selector.matches(&scope_names) {
                    metadata = attributes::set(metadata, 0, Some(matcher.token_type), None, None, 0, 0);
                }
            }
            if let Some(selectors) = selectors {
                contains_balanced_brackets = selectors.matches(&scope_names);
            }
        }

        if contains_balanced_brackets {
            metadata = attributes::set(metadata, 0, None, Some(true), None, 0, 0);
        }
        metadata
    }

    /// Finished tokens for a line of `line_len` bytes (including the appended
    /// `\n`) whose caller-visible text is `content_len` bytes long
    pub fn into_tokens(mut self, stack: &StateStack, line_len: usize, content_len: usize) -> Vec<Token> {
        if self
            .tokens
            .last()
            .is_some_and(|last| last.start_index + 1 == line_len)
        {
            self.tokens.pop();
        }

        if self.tokens.is_empty() {
            self.emit(stack.content_name_scopes(), 0, line_len);
        }

        if let Some(last) = self.tokens.last_mut() {
            last.end_index = last.end_index.min(content_len);
        }
        self.tokens
    }

    /// Finished `(start, attributes)` pairs for a line of `line_len` bytes
    pub fn into_binary_tokens(mut self, stack: &StateStack, line_len: usize) -> Vec<u32> {
        let len = self.binary_tokens.len();
        if len >= 2 && self.binary_tokens[len - 2] as usize + 1 == line_len {
            self.binary_tokens.truncate(len - 2);
        }

        if self.binary_tokens.is_empty() {
            self.emit(stack.content_name_scopes(), 0, line_len);
        }
        self.binary_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::StandardTokenType;
    use crate::rules::RuleId;

    fn stack(scopes: &[&str]) -> StateStack {
        let mut list: Option<AttributedScopeStack> = None;
        for (depth, scope) in scopes.iter().enumerate() {
            list = Some(AttributedScopeStack::new(list, *scope, depth as u32 + 1));
        }
        let list = list.unwrap();
        StateStack::root(RuleId(1), list.clone(), list)
    }

    #[test]
    fn test_adjacent_equal_scopes_merge() {
        let root = stack(&["source"]);
        let mut tokens = LineTokens::new(false, &[], None);
        tokens.produce(&root, 2);
        tokens.produce(&root, 4);
        tokens.produce(&root, 5);

        let result = tokens.into_tokens(&root, 5, 4);
        assert_eq!(result.len(), 1);
        assert_eq!((result[0].start_index, result[0].end_index), (0, 4));
    }

    #[test]
    fn test_newline_token_is_dropped() {
        let root = stack(&["source"]);
        let inner = stack(&["source", "keyword"]);
        let mut tokens = LineTokens::new(false, &[], None);
        tokens.produce(&inner, 3);
        tokens.produce(&root, 4);

        let result = tokens.into_tokens(&root, 4, 3);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].scopes, vec!["source", "keyword"]);
        assert_eq!(result[0].end_index, 3);
    }

    #[test]
    fn test_empty_line_yields_one_token() {
        let root = stack(&["source"]);
        let mut tokens = LineTokens::new(false, &[], None);
        tokens.produce(&root, 1);

        let result = tokens.into_tokens(&root, 1, 0);
        assert_eq!(result.len(), 1);
        assert_eq!((result[0].start_index, result[0].end_index), (0, 0));
        assert_eq!(result[0].scopes, vec!["source"]);
    }

    #[test]
    fn test_binary_tokens_skip_equal_metadata() {
        let root = stack(&["source"]);
        let inner = stack(&["source", "keyword"]);
        let mut tokens = LineTokens::new(true, &[], None);
        tokens.produce(&root, 2);
        tokens.produce(&root, 3);
        tokens.produce(&inner, 5);
        tokens.produce(&root, 6);

        let result = tokens.into_binary_tokens(&root, 6);
        assert_eq!(result, vec![0, 1, 3, 2]);
    }

    #[test]
    fn test_binary_overrides_and_brackets() {
        let inner = stack(&["source", "string.quoted"]);
        let overrides = TokenTypeMatcher::parse("string", StandardTokenType::Other);
        let brackets = BalancedBracketSelectors::new(&["*"], &[]);
        let mut tokens = LineTokens::new(true, &overrides, Some(&brackets));
        tokens.produce(&inner, 3);

        let result = tokens.into_binary_tokens(&inner, 4);
        assert_eq!(result.len(), 2);
        assert_eq!(attributes::token_type(result[1]), StandardTokenType::Other);
        assert!(attributes::contains_balanced_brackets(result[1]));
    }
}
