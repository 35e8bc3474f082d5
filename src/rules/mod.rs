//! Compiled rule graph
//!
//! Grammar rules are compiled into an arena indexed by [`RuleId`]. Rules refer
//! to each other only through ids, so recursive grammars (a rule including
//! itself through the repository) are plain cycles in the id graph.
//!
//! Each rule that can sit on top of the state stack lazily builds a
//! [`RegExpSourceList`] of everything it can match next and keeps it as its
//! scanner cache.

pub mod compiler;
pub mod regex_source;
pub mod scanner;

use std::collections::HashSet;
use std::sync::Arc;

pub use regex_source::{CompiledRule, RegExpSource, RegExpSourceList};
pub use scanner::{CaptureIndex, ScanMatch, Scanner};

use crate::util::{has_captures, replace_captures};

/// Handle of a compiled rule
///
/// Positive ids are real rules. `0` marks "no rule" (the root frame of a
/// state stack), negative ids are the end and while patterns of the rule on
/// top of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub i32);

impl RuleId {
    pub const NO_RULE: RuleId = RuleId(0);
    pub const END_RULE: RuleId = RuleId(-1);
    pub const WHILE_RULE: RuleId = RuleId(-2);

    /// Arena slot for a real rule
    pub fn index(self) -> Option<usize> {
        (self.0 > 0).then_some(self.0 as usize)
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
pub struct MatchRule {
    pub regex: RegExpSource,
    pub captures: Vec<Option<RuleId>>,
    cache: Option<RegExpSourceList>,
}

#[derive(Debug)]
pub struct IncludeOnlyRule {
    pub patterns: Vec<RuleId>,
    pub has_missing_patterns: bool,
    cache: Option<RegExpSourceList>,
}

#[derive(Debug)]
pub struct BeginEndRule {
    pub begin: RegExpSource,
    pub begin_captures: Vec<Option<RuleId>>,
    pub end: RegExpSource,
    pub end_captures: Vec<Option<RuleId>>,
    pub apply_end_pattern_last: bool,
    pub patterns: Vec<RuleId>,
    pub has_missing_patterns: bool,
    cache: Option<RegExpSourceList>,
}

#[derive(Debug)]
pub struct BeginWhileRule {
    pub begin: RegExpSource,
    pub begin_captures: Vec<Option<RuleId>>,
    pub while_: RegExpSource,
    pub while_captures: Vec<Option<RuleId>>,
    pub patterns: Vec<RuleId>,
    pub has_missing_patterns: bool,
    cache: Option<RegExpSourceList>,
    while_cache: Option<RegExpSourceList>,
}

/// A capture group, optionally re-tokenized with its own patterns
#[derive(Debug)]
pub struct CaptureRule {
    pub retokenize_captured_with: Option<RuleId>,
}

#[derive(Debug)]
pub enum RuleKind {
    Match(MatchRule),
    IncludeOnly(IncludeOnlyRule),
    BeginEnd(BeginEndRule),
    BeginWhile(BeginWhileRule),
    Capture(CaptureRule),
}

#[derive(Debug)]
pub struct Rule {
    pub id: RuleId,
    name: Option<String>,
    name_has_captures: bool,
    content_name: Option<String>,
    content_name_has_captures: bool,
    pub kind: RuleKind,
}

impl Rule {
    pub fn new(
        id: RuleId,
        name: Option<String>,
        content_name: Option<String>,
        kind: RuleKind,
    ) -> Self {
        Self {
            id,
            name_has_captures: name.as_deref().is_some_and(has_captures),
            name,
            content_name_has_captures: content_name.as_deref().is_some_and(has_captures),
            content_name,
            kind,
        }
    }

    pub fn new_match(
        id: RuleId,
        name: Option<String>,
        regex: &str,
        captures: Vec<Option<RuleId>>,
    ) -> Self {
        let kind = RuleKind::Match(MatchRule {
            regex: RegExpSource::new(regex, id),
            captures,
            cache: None,
        });
        Self::new(id, name, None, kind)
    }

    pub fn new_include_only(
        id: RuleId,
        name: Option<String>,
        content_name: Option<String>,
        patterns: Vec<RuleId>,
        has_missing_patterns: bool,
    ) -> Self {
        let kind = RuleKind::IncludeOnly(IncludeOnlyRule {
            patterns,
            has_missing_patterns,
            cache: None,
        });
        Self::new(id, name, content_name, kind)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_begin_end(
        id: RuleId,
        name: Option<String>,
        content_name: Option<String>,
        begin: &str,
        begin_captures: Vec<Option<RuleId>>,
        end: &str,
        end_captures: Vec<Option<RuleId>>,
        apply_end_pattern_last: bool,
        patterns: Vec<RuleId>,
        has_missing_patterns: bool,
    ) -> Self {
        let kind = RuleKind::BeginEnd(BeginEndRule {
            begin: RegExpSource::new(begin, id),
            begin_captures,
            end: RegExpSource::new(end, RuleId::END_RULE),
            end_captures,
            apply_end_pattern_last,
            patterns,
            has_missing_patterns,
            cache: None,
        });
        Self::new(id, name, content_name, kind)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_begin_while(
        id: RuleId,
        name: Option<String>,
        content_name: Option<String>,
        begin: &str,
        begin_captures: Vec<Option<RuleId>>,
        while_: &str,
        while_captures: Vec<Option<RuleId>>,
        patterns: Vec<RuleId>,
        has_missing_patterns: bool,
    ) -> Self {
        let kind = RuleKind::BeginWhile(BeginWhileRule {
            begin: RegExpSource::new(begin, id),
            begin_captures,
            while_: RegExpSource::new(while_, RuleId::WHILE_RULE),
            while_captures,
            patterns,
            has_missing_patterns,
            cache: None,
            while_cache: None,
        });
        Self::new(id, name, content_name, kind)
    }

    pub fn new_capture(
        id: RuleId,
        name: Option<String>,
        content_name: Option<String>,
        retokenize_captured_with: Option<RuleId>,
    ) -> Self {
        let kind = RuleKind::Capture(CaptureRule {
            retokenize_captured_with,
        });
        Self::new(id, name, content_name, kind)
    }

    /// Scope name, with `$N` references resolved against the match when given
    pub fn name(&self, line: Option<&str>, captures: Option<&[CaptureIndex]>) -> Option<String> {
        resolve_name(self.name.as_deref(), self.name_has_captures, line, captures)
    }

    pub fn content_name(
        &self,
        line: Option<&str>,
        captures: Option<&[CaptureIndex]>,
    ) -> Option<String> {
        resolve_name(
            self.content_name.as_deref(),
            self.content_name_has_captures,
            line,
            captures,
        )
    }

    /// Child pattern ids of container-like rules
    pub fn patterns(&self) -> &[RuleId] {
        match &self.kind {
            RuleKind::IncludeOnly(rule) => &rule.patterns,
            RuleKind::BeginEnd(rule) => &rule.patterns,
            RuleKind::BeginWhile(rule) => &rule.patterns,
            RuleKind::Match(_) | RuleKind::Capture(_) => &[],
        }
    }

    pub fn has_missing_patterns(&self) -> bool {
        match &self.kind {
            RuleKind::IncludeOnly(rule) => rule.has_missing_patterns,
            RuleKind::BeginEnd(rule) => rule.has_missing_patterns,
            RuleKind::BeginWhile(rule) => rule.has_missing_patterns,
            RuleKind::Match(_) | RuleKind::Capture(_) => false,
        }
    }

    fn cache(&self) -> Option<&RegExpSourceList> {
        match &self.kind {
            RuleKind::Match(rule) => rule.cache.as_ref(),
            RuleKind::IncludeOnly(rule) => rule.cache.as_ref(),
            RuleKind::BeginEnd(rule) => rule.cache.as_ref(),
            RuleKind::BeginWhile(rule) => rule.cache.as_ref(),
            RuleKind::Capture(_) => None,
        }
    }

    fn set_cache(&mut self, list: RegExpSourceList) {
        match &mut self.kind {
            RuleKind::Match(rule) => rule.cache = Some(list),
            RuleKind::IncludeOnly(rule) => rule.cache = Some(list),
            RuleKind::BeginEnd(rule) => rule.cache = Some(list),
            RuleKind::BeginWhile(rule) => rule.cache = Some(list),
            RuleKind::Capture(_) => {}
        }
    }
}

fn resolve_name(
    name: Option<&str>,
    name_has_captures: bool,
    line: Option<&str>,
    captures: Option<&[CaptureIndex]>,
) -> Option<String> {
    let name = name?;
    match (name_has_captures, line, captures) {
        (true, Some(line), Some(captures)) => Some(replace_captures(name, line, captures)),
        _ => Some(name.to_string()),
    }
}

/// Arena of compiled rules; slot 0 is reserved for [`RuleId::NO_RULE`]
#[derive(Debug)]
pub struct RuleGraph {
    rules: Vec<Option<Rule>>,
}

impl Default for RuleGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleGraph {
    pub fn new() -> Self {
        Self { rules: vec![None] }
    }

    /// Allocate the next id; the slot stays empty until [`RuleGraph::fill`]
    pub fn reserve(&mut self) -> RuleId {
        let id = RuleId(self.rules.len() as i32);
        self.rules.push(None);
        id
    }

    pub fn fill(&mut self, rule: Rule) {
        if let Some(slot) = rule.id.index().and_then(|index| self.rules.get_mut(index)) {
            *slot = Some(rule);
        }
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id.index()?)?.as_ref()
    }

    pub fn get_mut(&mut self, id: RuleId) -> Option<&mut Rule> {
        self.rules.get_mut(id.index()?)?.as_mut()
    }

    /// Number of allocated ids, including the reserved slot
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.len() <= 1
    }

    /// Add what `id` can match to `out`
    ///
    /// When `is_first` is set the rule is the one on top of the stack, so a
    /// begin rule contributes its children; otherwise it contributes its begin
    /// pattern. Containers always contribute their children.
    fn collect_patterns(
        &self,
        id: RuleId,
        out: &mut RegExpSourceList,
        is_first: bool,
        visited: &mut HashSet<RuleId>,
    ) {
        let Some(rule) = self.get(id) else {
            return;
        };

        match &rule.kind {
            RuleKind::Match(rule) => out.push(rule.regex.clone()),
            RuleKind::IncludeOnly(rule) => {
                if !visited.insert(id) {
                    return;
                }
                for &child in &rule.patterns {
                    self.collect_patterns(child, out, false, visited);
                }
            }
            RuleKind::BeginEnd(BeginEndRule {
                begin, patterns, ..
            })
            | RuleKind::BeginWhile(BeginWhileRule {
                begin, patterns, ..
            }) => {
                if is_first {
                    for &child in patterns {
                        self.collect_patterns(child, out, false, visited);
                    }
                } else {
                    out.push(begin.clone());
                }
            }
            RuleKind::Capture(_) => {}
        }
    }

    fn build_cache(&self, id: RuleId) -> Option<RegExpSourceList> {
        let rule = self.get(id)?;
        let mut list = RegExpSourceList::new();
        let mut visited = HashSet::new();
        self.collect_patterns(id, &mut list, true, &mut visited);

        if let RuleKind::BeginEnd(rule) = &rule.kind {
            if rule.apply_end_pattern_last {
                list.push(rule.end.clone());
            } else {
                list.unshift(rule.end.clone());
            }
        }
        Some(list)
    }

    /// Scanner over everything `id` can match next
    ///
    /// `end_regex` is the frame's back-reference-resolved end pattern, used
    /// only when the rule's end pattern has back-references.
    pub fn compile(
        &mut self,
        id: RuleId,
        end_regex: Option<&str>,
        allow_a: bool,
        allow_g: bool,
    ) -> Option<Arc<CompiledRule>> {
        if self.get(id)?.cache().is_none() {
            let list = self.build_cache(id)?;
            self.get_mut(id)?.set_cache(list);
        }

        let rule = self.get_mut(id)?;
        match &mut rule.kind {
            RuleKind::Match(MatchRule { cache, .. })
            | RuleKind::IncludeOnly(IncludeOnlyRule { cache, .. })
            | RuleKind::BeginWhile(BeginWhileRule { cache, .. }) => {
                Some(cache.as_mut()?.compile(allow_a, allow_g))
            }
            RuleKind::BeginEnd(rule) => {
                let list = rule.cache.as_mut()?;
                if rule.end.has_back_references() {
                    if let Some(end_regex) = end_regex {
                        let index = if rule.apply_end_pattern_last {
                            list.len().saturating_sub(1)
                        } else {
                            0
                        };
                        list.set_source(index, end_regex);
                    }
                }
                Some(list.compile(allow_a, allow_g))
            }
            RuleKind::Capture(_) => None,
        }
    }

    /// Scanner holding only the while condition of a begin/while rule
    pub fn compile_while(
        &mut self,
        id: RuleId,
        end_regex: Option<&str>,
        allow_a: bool,
        allow_g: bool,
    ) -> Option<Arc<CompiledRule>> {
        let RuleKind::BeginWhile(rule) = &mut self.get_mut(id)?.kind else {
            return None;
        };

        let list = rule.while_cache.get_or_insert_with(|| {
            let mut list = RegExpSourceList::new();
            list.push(rule.while_.clone());
            list
        });
        if rule.while_.has_back_references() {
            if let Some(end_regex) = end_regex {
                list.set_source(0, end_regex);
            }
        }
        Some(list.compile(allow_a, allow_g))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with_begin_end(apply_end_pattern_last: bool) -> (RuleGraph, RuleId) {
        let mut graph = RuleGraph::new();
        let outer = graph.reserve();
        let inner = graph.reserve();
        graph.fill(Rule::new_match(inner, Some("inner".into()), "x", vec![]));
        graph.fill(Rule::new_begin_end(
            outer,
            Some("outer".into()),
            None,
            "<",
            vec![],
            ">",
            vec![],
            apply_end_pattern_last,
            vec![inner],
            false,
        ));
        (graph, outer)
    }

    #[test]
    fn test_ids_are_sequential_from_one() {
        let mut graph = RuleGraph::new();
        assert_eq!(graph.reserve(), RuleId(1));
        assert_eq!(graph.reserve(), RuleId(2));
        assert!(graph.get(RuleId(1)).is_none());
        assert!(graph.get(RuleId::NO_RULE).is_none());
        assert!(graph.get(RuleId::END_RULE).is_none());
    }

    #[test]
    fn test_end_pattern_first_by_default() {
        let (mut graph, outer) = graph_with_begin_end(false);
        let compiled = graph.compile(outer, None, false, false).unwrap();
        assert_eq!(compiled.rules, vec![RuleId::END_RULE, RuleId(2)]);
    }

    #[test]
    fn test_apply_end_pattern_last() {
        let (mut graph, outer) = graph_with_begin_end(true);
        let compiled = graph.compile(outer, None, false, false).unwrap();
        assert_eq!(compiled.rules, vec![RuleId(2), RuleId::END_RULE]);
    }

    #[test]
    fn test_nested_begin_rule_contributes_its_begin() {
        let mut graph = RuleGraph::new();
        let container = graph.reserve();
        let block = graph.reserve();
        graph.fill(Rule::new_begin_end(
            block,
            None,
            None,
            "\\{",
            vec![],
            "\\}",
            vec![],
            false,
            vec![],
            false,
        ));
        graph.fill(Rule::new_include_only(container, None, None, vec![block], false));

        let compiled = graph.compile(container, None, false, false).unwrap();
        assert_eq!(compiled.rules, vec![block]);
        let found = compiled.scanner.find_next_match("a{", 0).unwrap();
        assert_eq!(found.captures[0], CaptureIndex { start: 1, end: 2 });
    }

    #[test]
    fn test_self_including_container_terminates() {
        let mut graph = RuleGraph::new();
        let container = graph.reserve();
        let leaf = graph.reserve();
        graph.fill(Rule::new_match(leaf, None, "a", vec![]));
        graph.fill(Rule::new_include_only(
            container,
            None,
            None,
            vec![container, leaf],
            false,
        ));

        let compiled = graph.compile(container, None, false, false).unwrap();
        assert_eq!(compiled.rules, vec![leaf]);
    }

    #[test]
    fn test_end_back_reference_is_rewritten() {
        let mut graph = RuleGraph::new();
        let id = graph.reserve();
        graph.fill(Rule::new_begin_end(
            id,
            None,
            None,
            "(#+)",
            vec![],
            "\\1",
            vec![],
            false,
            vec![],
            false,
        ));

        let compiled = graph.compile(id, Some("\\#\\#\\#"), false, false).unwrap();
        assert!(compiled.scanner.find_next_match("#", 0).is_none());
        assert!(compiled.scanner.find_next_match("a###", 0).is_some());
    }

    #[test]
    fn test_name_substitution() {
        let rule = Rule::new_match(RuleId(1), Some("entity.$1".into()), "(\\w+)", vec![]);
        let captures = [
            CaptureIndex { start: 0, end: 3 },
            CaptureIndex { start: 0, end: 3 },
        ];
        assert_eq!(
            rule.name(Some("foo"), Some(&captures[..])).as_deref(),
            Some("entity.foo")
        );
        assert_eq!(rule.name(None, None).as_deref(), Some("entity.$1"));
    }
}
