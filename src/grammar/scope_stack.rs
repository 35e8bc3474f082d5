//! Attributed scope stack
//!
//! An immutable, structurally shared list of scopes from leaf to root. Every
//! node carries the encoded attributes of the token it would produce, computed
//! once when the scope is pushed.

use std::fmt;
use std::sync::Arc;

use super::attributes;
use super::scope_attributes::{BasicScopeAttributes, ScopeAttributesProvider};
use crate::util::scope_matches;

#[derive(Clone)]
pub struct AttributedScopeStack(Arc<ScopeNode>);

struct ScopeNode {
    parent: Option<AttributedScopeStack>,
    scope_path: String,
    token_attributes: u32,
}

impl AttributedScopeStack {
    pub fn new(
        parent: Option<AttributedScopeStack>,
        scope_path: impl Into<String>,
        token_attributes: u32,
    ) -> Self {
        Self(Arc::new(ScopeNode {
            parent,
            scope_path: scope_path.into(),
            token_attributes,
        }))
    }

    pub fn parent(&self) -> Option<&AttributedScopeStack> {
        self.0.parent.as_ref()
    }

    pub fn scope_path(&self) -> &str {
        &self.0.scope_path
    }

    pub fn token_attributes(&self) -> u32 {
        self.0.token_attributes
    }

    /// Scopes from root to leaf
    pub fn scope_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut node = Some(self);
        while let Some(current) = node {
            names.push(current.0.scope_path.clone());
            node = current.parent();
        }
        names.reverse();
        names
    }

    /// Push a scope path; space-separated paths push one scope per segment
    pub fn push_attributed(
        &self,
        scope_path: Option<&str>,
        provider: &mut ScopeAttributesProvider,
    ) -> Self {
        let Some(scope_path) = scope_path else {
            return self.clone();
        };

        let mut target = self.clone();
        for scope in scope_path.split(' ') {
            let basic = provider.basic_attributes(scope);
            let merged = Self::merge_attributes(target.token_attributes(), Some(&target), &basic);
            target = Self::new(Some(target), scope, merged);
        }
        target
    }

    /// Attributes for a scope pushed on top of `scopes`
    ///
    /// The first theme rule whose parent scopes match the existing stack
    /// supplies font style and colors; unset fields are inherited.
    pub fn merge_attributes(
        existing: u32,
        scopes: Option<&AttributedScopeStack>,
        basic: &BasicScopeAttributes,
    ) -> u32 {
        let mut font_style = None;
        let mut foreground = 0;
        let mut background = 0;

        if let Some(rule) = basic
            .theme_data
            .iter()
            .find(|rule| matches_parent_scopes(scopes, rule.parent_scopes.as_deref()))
        {
            font_style = rule.font_style;
            foreground = rule.foreground;
            background = rule.background;
        }

        attributes::set(
            existing,
            basic.language_id,
            basic.token_type,
            None,
            font_style,
            foreground,
            background,
        )
    }
}

/// Parent scopes (nearest first) appear in order walking from `target` to the root
fn matches_parent_scopes(target: Option<&AttributedScopeStack>, parent_scopes: Option<&[String]>) -> bool {
    let Some(parent_scopes) = parent_scopes else {
        return true;
    };

    let mut pending = parent_scopes.iter().peekable();
    let mut node = target;
    while let (Some(current), Some(selector)) = (node, pending.peek()) {
        if scope_matches(current.scope_path(), selector) {
            pending.next();
        }
        node = current.parent();
    }
    pending.peek().is_none()
}

impl PartialEq for AttributedScopeStack {
    fn eq(&self, other: &Self) -> bool {
        let mut a = Some(self);
        let mut b = Some(other);
        loop {
            match (a, b) {
                (None, None) => return true,
                (Some(x), Some(y)) => {
                    if Arc::ptr_eq(&x.0, &y.0) {
                        return true;
                    }
                    if x.0.scope_path != y.0.scope_path
                        || x.0.token_attributes != y.0.token_attributes
                    {
                        return false;
                    }
                    a = x.parent();
                    b = y.parent();
                }
                _ => return false,
            }
        }
    }
}

impl Eq for AttributedScopeStack {}

impl fmt::Debug for AttributedScopeStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.scope_names()).finish()
    }
}
