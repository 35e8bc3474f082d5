//! Scope selectors
//!
//! Selectors decide where injections apply and which scopes get token-type
//! overrides or bracket matching. Supported syntax:
//!
//! - `a b` : `a` followed (not necessarily directly) by `b` in the scope path
//! - `a - b` : `a` unless `b`
//! - `(a | b)` / `(a, b)` : alternatives inside parentheses
//! - `L:a, R:b` : comma-separated top-level selectors with a priority prefix
//!
//! A selector segment matches a scope when it equals it or is a dotted prefix
//! of it (`string` matches `string.quoted` but not `strings`).

use std::sync::LazyLock;

use regex::Regex;

use crate::util::scope_matches;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([LR]:|[\w\.:][\w\.:\-]*|[\,\|\-\(\)])").expect("selector token regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Ordered scope segments that must appear in the path in this order
    Path(Vec<String>),
    /// Negation; a `-` with nothing after it never matches
    Not(Option<Box<Selector>>),
    And(Vec<Selector>),
    Or(Vec<Selector>),
}

impl Selector {
    pub fn matches<S: AsRef<str>>(&self, scopes: &[S]) -> bool {
        match self {
            Selector::Path(identifiers) => path_matches(identifiers, scopes),
            Selector::Not(inner) => inner.as_ref().is_some_and(|inner| !inner.matches(scopes)),
            Selector::And(all) => all.iter().all(|selector| selector.matches(scopes)),
            Selector::Or(any) => any.iter().any(|selector| selector.matches(scopes)),
        }
    }
}

/// Priority of an injection selector: `L:` is -1, `R:` is 1, none is 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrioritizedSelector {
    pub selector: Selector,
    pub priority: i8,
}

fn path_matches<S: AsRef<str>>(identifiers: &[String], scopes: &[S]) -> bool {
    if scopes.len() < identifiers.len() {
        return false;
    }

    let mut next = 0;
    identifiers.iter().all(|identifier| {
        match scopes[next..]
            .iter()
            .position(|scope| scope_matches(scope.as_ref(), identifier))
        {
            Some(offset) => {
                next += offset + 1;
                true
            }
            None => false,
        }
    })
}

fn is_identifier(token: Option<&str>) -> bool {
    token
        .and_then(|token| token.chars().next())
        .is_some_and(|ch| ch.is_alphanumeric() || matches!(ch, '_' | '.' | ':'))
}

/// Parse a comma-separated list of prioritized selectors
pub fn parse(source: &str) -> Vec<PrioritizedSelector> {
    let mut parser = Parser::new(source);
    let mut results = Vec::new();

    while parser.token.is_some() {
        let mut priority = 0;
        if let Some(token) = parser.token {
            if token.len() == 2 && token.ends_with(':') {
                priority = match token.as_bytes()[0] {
                    b'R' => 1,
                    b'L' => -1,
                    _ => 0,
                };
                parser.advance();
            }
        }

        let selector = parser.conjunction();
        results.push(PrioritizedSelector { selector, priority });

        if parser.token != Some(",") {
            break;
        }
        parser.advance();
    }

    results
}

struct Parser<'s> {
    tokens: regex::Matches<'static, 's>,
    token: Option<&'s str>,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str) -> Self {
        let mut tokens = TOKEN.find_iter(source);
        let token = tokens.next().map(|m| m.as_str());
        Self { tokens, token }
    }

    fn advance(&mut self) {
        self.token = self.tokens.next().map(|m| m.as_str());
    }

    fn inner_expression(&mut self) -> Selector {
        let mut alternatives = vec![self.conjunction()];
        while matches!(self.token, Some("|") | Some(",")) {
            while matches!(self.token, Some("|") | Some(",")) {
                self.advance();
            }
            alternatives.push(self.conjunction());
        }
        Selector::Or(alternatives)
    }

    fn conjunction(&mut self) -> Selector {
        let mut operands = Vec::new();
        while let Some(operand) = self.operand() {
            operands.push(operand);
        }
        Selector::And(operands)
    }

    fn operand(&mut self) -> Option<Selector> {
        match self.token {
            Some("-") => {
                self.advance();
                let negated = self.operand().map(Box::new);
                Some(Selector::Not(negated))
            }
            Some("(") => {
                self.advance();
                let inner = self.inner_expression();
                if self.token == Some(")") {
                    self.advance();
                }
                Some(inner)
            }
            token if is_identifier(token) => {
                let mut identifiers = Vec::new();
                while let Some(token) = self.token.filter(|token| is_identifier(Some(*token))) {
                    identifiers.push(token.to_string());
                    self.advance();
                }
                Some(Selector::Path(identifiers))
            }
            _ => None,
        }
    }
}
