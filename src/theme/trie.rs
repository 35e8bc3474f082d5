//! Dotted-scope trie
//!
//! Each node is one scope segment. A node's main rule carries the style
//! accumulated from every rule on the way down, so falling off the trie at any
//! depth still yields the most specific style seen. Rules that only apply
//! under particular parent scopes are kept next to the main rule.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::grammar::FontStyle;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThemeTrieRule {
    pub name: Option<String>,
    /// Number of scope segments matched to reach the rule
    pub scope_depth: u32,
    /// Required ancestors, nearest first
    pub parent_scopes: Option<Vec<String>>,
    pub font_style: Option<FontStyle>,
    pub foreground: u32,
    pub background: u32,
}

impl ThemeTrieRule {
    fn accept_overwrite(&mut self, incoming: &ThemeTrieRule) {
        if self.scope_depth <= incoming.scope_depth {
            self.scope_depth = incoming.scope_depth;
        }
        if incoming.font_style.is_some() {
            self.font_style = incoming.font_style;
        }
        if incoming.foreground != 0 {
            self.foreground = incoming.foreground;
        }
        if incoming.background != 0 {
            self.background = incoming.background;
        }
        if incoming.name.as_deref().is_some_and(|name| !name.is_empty()) {
            self.name = incoming.name.clone();
        }
    }
}

/// Deeper matches first, then longer and more numerous parent scopes
fn cmp_by_specificity(a: &ThemeTrieRule, b: &ThemeTrieRule) -> Ordering {
    if a.scope_depth != b.scope_depth {
        return b.scope_depth.cmp(&a.scope_depth);
    }

    let a_parents = a.parent_scopes.as_deref().unwrap_or_default();
    let b_parents = b.parent_scopes.as_deref().unwrap_or_default();
    if a_parents.len() == b_parents.len() {
        for (a_parent, b_parent) in a_parents.iter().zip(b_parents) {
            if a_parent.len() != b_parent.len() {
                return b_parent.len().cmp(&a_parent.len());
            }
        }
    }
    b_parents.len().cmp(&a_parents.len())
}

fn sorted_by_specificity(mut rules: Vec<ThemeTrieRule>) -> Vec<ThemeTrieRule> {
    if rules.len() > 1 {
        rules.sort_by(cmp_by_specificity);
    }
    rules
}

#[derive(Debug, Clone, Default)]
pub struct ThemeTrieElement {
    main_rule: ThemeTrieRule,
    rules_with_parent_scopes: Vec<ThemeTrieRule>,
    children: HashMap<String, ThemeTrieElement>,
}

impl ThemeTrieElement {
    pub fn new(main_rule: ThemeTrieRule) -> Self {
        Self {
            main_rule,
            ..Self::default()
        }
    }

    /// Rules applying to `scope`, most specific first
    pub fn match_scope(&self, scope: &str) -> Vec<ThemeTrieRule> {
        if scope.is_empty() {
            let mut rules = Vec::with_capacity(self.rules_with_parent_scopes.len() + 1);
            rules.push(self.main_rule.clone());
            rules.extend(self.rules_with_parent_scopes.iter().cloned());
            return sorted_by_specificity(rules);
        }

        let (head, tail) = scope.split_once('.').unwrap_or((scope, ""));
        if let Some(child) = self.children.get(head) {
            return child.match_scope(tail);
        }

        let mut rules = Vec::with_capacity(self.rules_with_parent_scopes.len() + 1);
        if self.main_rule.foreground > 0 {
            rules.push(self.main_rule.clone());
        }
        rules.extend(self.rules_with_parent_scopes.iter().cloned());
        sorted_by_specificity(rules)
    }

    /// Insert `rule` (with `scope_depth` 0) under the dotted `scope`
    pub fn insert(&mut self, scope: &str, mut rule: ThemeTrieRule) {
        if scope.is_empty() {
            self.insert_here(rule);
            return;
        }

        let (head, tail) = scope.split_once('.').unwrap_or((scope, ""));
        let main_rule = &self.main_rule;
        let rules_with_parent_scopes = &self.rules_with_parent_scopes;
        let child = self
            .children
            .entry(head.to_string())
            .or_insert_with(|| ThemeTrieElement {
                main_rule: main_rule.clone(),
                rules_with_parent_scopes: rules_with_parent_scopes.clone(),
                children: HashMap::new(),
            });

        rule.scope_depth += 1;
        child.insert(tail, rule);
    }

    fn insert_here(&mut self, mut rule: ThemeTrieRule) {
        let Some(parent_scopes) = &rule.parent_scopes else {
            self.main_rule.accept_overwrite(&rule);
            return;
        };

        if let Some(existing) = self
            .rules_with_parent_scopes
            .iter_mut()
            .find(|existing| existing.parent_scopes.as_ref() == Some(parent_scopes))
        {
            // Merged rules keep their own name
            rule.name = None;
            existing.accept_overwrite(&rule);
            return;
        }

        if rule.name.as_deref().map_or(true, str::is_empty) {
            rule.name = self.main_rule.name.clone();
        }
        if rule.font_style.is_none() {
            rule.font_style = self.main_rule.font_style;
        }
        if rule.foreground == 0 {
            rule.foreground = self.main_rule.foreground;
        }
        if rule.background == 0 {
            rule.background = self.main_rule.background;
        }
        self.rules_with_parent_scopes.push(rule);
    }
}
