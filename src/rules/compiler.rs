//! Raw grammar -> rule graph
//!
//! Rules are compiled on demand, starting from the grammar's root. An id is
//! reserved before a rule's children are compiled, so a rule that includes
//! itself (directly or through the repository) resolves to its own id.
//! Compiled ids are memoized on the raw node, which keeps recompilation
//! idempotent.

use std::collections::HashMap;
use std::sync::Arc;

use super::{Rule, RuleGraph, RuleId, RuleKind};
use crate::grammar::GrammarRepository;
use crate::raw::{RawCaptures, RawGrammar, RawRepository, RawRule};

/// End pattern used for a begin rule that declares none; it never matches
const MISSING_END: &str = "\u{FFFF}";

/// A raw grammar plus the synthetic `$self` rule wrapping its top-level patterns
#[derive(Debug)]
pub struct LoadedGrammar {
    raw: Arc<RawGrammar>,
    self_rule: RawRule,
}

impl LoadedGrammar {
    pub fn new(raw: Arc<RawGrammar>) -> Self {
        let self_rule = RawRule {
            name: Some(raw.scope_name.clone()),
            patterns: Some(raw.patterns.clone()),
            ..RawRule::default()
        };
        Self { raw, self_rule }
    }

    pub fn raw(&self) -> &RawGrammar {
        &self.raw
    }

    pub fn scope_name(&self) -> &str {
        &self.raw.scope_name
    }

    pub fn self_rule(&self) -> &RawRule {
        &self.self_rule
    }
}

/// Lookup scope for `#name`, `$self` and `$base`
///
/// Rules without `begin` may carry their own repository; it is layered on top
/// of the enclosing one for their children.
#[derive(Clone)]
struct Repository<'a> {
    layers: Vec<&'a RawRepository>,
    self_rule: &'a RawRule,
    base_rule: &'a RawRule,
}

impl<'a> Repository<'a> {
    fn for_grammar(grammar: &'a LoadedGrammar, base_rule: &'a RawRule) -> Self {
        Self {
            layers: vec![&grammar.raw.repository],
            self_rule: &grammar.self_rule,
            base_rule,
        }
    }

    fn get(&self, name: &str) -> Option<&'a RawRule> {
        match name {
            "$self" => Some(self.self_rule),
            "$base" => Some(self.base_rule),
            _ => self.layers.iter().rev().find_map(|layer| layer.get(name)),
        }
    }

    fn with_layer(&self, layer: &'a RawRepository) -> Self {
        let mut layered = self.clone();
        layered.layers.push(layer);
        layered
    }
}

/// Owns the rule graph of one grammar and the state needed to extend it
#[derive(Debug)]
pub struct RuleFactory {
    graph: RuleGraph,
    /// Raw node address -> compiled id
    memo: HashMap<usize, RuleId>,
    externals: HashMap<String, Arc<LoadedGrammar>>,
    root: Arc<LoadedGrammar>,
}

impl RuleFactory {
    pub fn new(root: Arc<LoadedGrammar>) -> Self {
        Self {
            graph: RuleGraph::new(),
            memo: HashMap::new(),
            externals: HashMap::new(),
            root,
        }
    }

    pub fn graph(&self) -> &RuleGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut RuleGraph {
        &mut self.graph
    }

    pub fn root(&self) -> &Arc<LoadedGrammar> {
        &self.root
    }

    /// Compile the grammar's `$self` rule
    pub fn compile_root(&mut self, lookup: &dyn GrammarRepository) -> RuleId {
        let root = Arc::clone(&self.root);
        let repository = Repository::for_grammar(&root, &root.self_rule);
        self.compile_rule(&root.self_rule, &repository, lookup)
    }

    /// Compile a rule owned by `owner` (the root grammar or an injector)
    pub fn compile_in(
        &mut self,
        owner: &LoadedGrammar,
        desc: &RawRule,
        lookup: &dyn GrammarRepository,
    ) -> RuleId {
        let root = Arc::clone(&self.root);
        let repository = Repository::for_grammar(owner, &root.self_rule);
        self.compile_rule(desc, &repository, lookup)
    }

    /// Grammar for `scope_name`, fetched once and kept for the factory's lifetime
    pub fn external(
        &mut self,
        scope_name: &str,
        lookup: &dyn GrammarRepository,
    ) -> Option<Arc<LoadedGrammar>> {
        if scope_name == self.root.scope_name() {
            return Some(Arc::clone(&self.root));
        }
        if let Some(loaded) = self.externals.get(scope_name) {
            return Some(Arc::clone(loaded));
        }

        let Some(raw) = lookup.lookup(scope_name) else {
            tracing::debug!("External grammar {} is not available", scope_name);
            return None;
        };
        let loaded = Arc::new(LoadedGrammar::new(raw));
        self.externals
            .insert(scope_name.to_string(), Arc::clone(&loaded));
        Some(loaded)
    }

    fn compile_rule<'a>(
        &mut self,
        desc: &'a RawRule,
        repository: &Repository<'a>,
        lookup: &dyn GrammarRepository,
    ) -> RuleId {
        let key = desc as *const RawRule as usize;
        if let Some(&id) = self.memo.get(&key) {
            return id;
        }

        let id = self.graph.reserve();
        self.memo.insert(key, id);

        let name = desc.name.clone();
        let content_name = desc.content_name.clone();

        let rule = if let Some(regex) = &desc.match_ {
            let captures = self.compile_captures(desc.captures.as_ref(), repository, lookup);
            Rule::new_match(id, name, regex, captures)
        } else if let Some(begin) = &desc.begin {
            let begin_captures = self.compile_captures(
                desc.begin_captures.as_ref().or(desc.captures.as_ref()),
                repository,
                lookup,
            );
            let patterns = desc.patterns.as_deref().unwrap_or_default();

            if let Some(while_) = &desc.while_ {
                let while_captures = self.compile_captures(
                    desc.while_captures.as_ref().or(desc.captures.as_ref()),
                    repository,
                    lookup,
                );
                let (patterns, has_missing) = self.compile_patterns(patterns, repository, lookup);
                Rule::new_begin_while(
                    id,
                    name,
                    content_name,
                    begin,
                    begin_captures,
                    while_,
                    while_captures,
                    patterns,
                    has_missing,
                )
            } else {
                let end_captures = self.compile_captures(
                    desc.end_captures.as_ref().or(desc.captures.as_ref()),
                    repository,
                    lookup,
                );
                let (patterns, has_missing) = self.compile_patterns(patterns, repository, lookup);
                Rule::new_begin_end(
                    id,
                    name,
                    content_name,
                    begin,
                    begin_captures,
                    desc.end.as_deref().unwrap_or(MISSING_END),
                    end_captures,
                    desc.apply_end_pattern_last,
                    patterns,
                    has_missing,
                )
            }
        } else {
            let layered;
            let repository = match &desc.repository {
                Some(local) => {
                    layered = repository.with_layer(local);
                    &layered
                }
                None => repository,
            };

            let patterns: &[RawRule] = match (&desc.patterns, &desc.include) {
                (Some(patterns), _) => patterns,
                (None, Some(_)) => std::slice::from_ref(desc),
                (None, None) => &[],
            };
            let (patterns, has_missing) = self.compile_patterns(patterns, repository, lookup);
            Rule::new_include_only(id, name, content_name, patterns, has_missing)
        };

        self.graph.fill(rule);
        id
    }

    fn compile_patterns<'a>(
        &mut self,
        patterns: &'a [RawRule],
        repository: &Repository<'a>,
        lookup: &dyn GrammarRepository,
    ) -> (Vec<RuleId>, bool) {
        let mut resolved = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            let id = match &pattern.include {
                Some(include) => self.resolve_include(include, repository, lookup),
                None => Some(self.compile_rule(pattern, repository, lookup)),
            };
            let Some(id) = id else {
                continue;
            };

            // A rule still being compiled has no slot yet and is kept
            if let Some(rule) = self.graph.get(id) {
                let is_container = matches!(
                    rule.kind,
                    RuleKind::IncludeOnly(_) | RuleKind::BeginEnd(_) | RuleKind::BeginWhile(_)
                );
                if is_container && rule.has_missing_patterns() && rule.patterns().is_empty() {
                    continue;
                }
            }
            resolved.push(id);
        }

        let has_missing = resolved.len() != patterns.len();
        (resolved, has_missing)
    }

    fn resolve_include<'a>(
        &mut self,
        include: &str,
        repository: &Repository<'a>,
        lookup: &dyn GrammarRepository,
    ) -> Option<RuleId> {
        if let Some(name) = include.strip_prefix('#') {
            let desc = repository.get(name)?;
            return Some(self.compile_rule(desc, repository, lookup));
        }
        if include == "$self" || include == "$base" {
            let desc = repository.get(include)?;
            return Some(self.compile_rule(desc, repository, lookup));
        }

        let (scope_name, rule_name) = match include.split_once('#') {
            Some((scope_name, rule_name)) => (scope_name, Some(rule_name)),
            None => (include, None),
        };
        let external = self.external(scope_name, lookup)?;
        let external_repository = Repository {
            layers: vec![&external.raw.repository],
            self_rule: &external.self_rule,
            base_rule: repository.base_rule,
        };
        let desc = match rule_name {
            Some(rule_name) => external_repository.get(rule_name)?,
            None => external_repository.self_rule,
        };
        Some(self.compile_rule(desc, &external_repository, lookup))
    }

    fn compile_captures<'a>(
        &mut self,
        captures: Option<&'a RawCaptures>,
        repository: &Repository<'a>,
        lookup: &dyn GrammarRepository,
    ) -> Vec<Option<RuleId>> {
        let Some((captures, max_index)) =
            captures.and_then(|captures| Some((captures, captures.max_index()?)))
        else {
            return Vec::new();
        };

        let mut compiled = vec![None; max_index + 1];
        for (index, desc) in captures.iter() {
            let retokenize = desc
                .patterns
                .is_some()
                .then(|| self.compile_rule(desc, repository, lookup));
            let id = self.graph.reserve();
            self.graph.fill(Rule::new_capture(
                id,
                desc.name.clone(),
                desc.content_name.clone(),
                retokenize,
            ));
            compiled[index] = Some(id);
        }
        compiled
    }
}
