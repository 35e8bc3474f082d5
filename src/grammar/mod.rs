//! Grammar: one root scope, its compiled rule graph, and line tokenization
//!
//! The rule graph is built lazily on the first tokenize call. Injections (the
//! grammar's own `injections` map plus grammars that inject into its scope)
//! are collected at the same time.
//!
//! Lines are tokenized one at a time; the [`StateStack`] returned for a line is
//! passed back in for the next one.

pub mod attributes;
pub mod brackets;
pub mod line_tokens;
pub mod scope_attributes;
pub mod scope_stack;
pub mod state_stack;
mod tokenizer;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use attributes::{FontStyle, StandardTokenType};
pub use brackets::{BalancedBracketSelectors, TokenTypeMatcher};
pub use line_tokens::{LineTokens, Token};
pub use scope_attributes::{BasicScopeAttributes, ScopeAttributesProvider};
pub use scope_stack::AttributedScopeStack;
pub use state_stack::StateStack;

use crate::raw::RawGrammar;
use crate::rules::compiler::{LoadedGrammar, RuleFactory};
use crate::rules::{RuleGraph, RuleId};
use crate::selector::{self, Selector};
use crate::theme::Theme;
use tokenizer::{TokenizeStringResult, TokenizerContext};

/// Source of grammars referenced by other grammars
pub trait GrammarRepository: Send + Sync {
    /// Raw grammar for `scope_name`, if one is known
    fn lookup(&self, scope_name: &str) -> Option<Arc<RawGrammar>>;

    /// Scope names of grammars that inject into `scope_name`
    fn injections(&self, scope_name: &str) -> Vec<String>;
}

/// Per-grammar tokenizer options
#[derive(Debug, Clone, Default)]
pub struct GrammarConfiguration {
    /// Language id written into the root scope's attributes
    pub initial_language: u32,
    /// Scope prefix -> language id
    pub embedded_languages: BTreeMap<String, u32>,
    /// Selector -> forced token type for binary tokens
    pub token_types: BTreeMap<String, StandardTokenType>,
    pub balanced_bracket_selectors: Vec<String>,
    pub unbalanced_bracket_selectors: Vec<String>,
}

/// A rule tried at every scan position whose content scopes match `selector`
#[derive(Debug, Clone)]
pub struct Injection {
    pub selector: Selector,
    /// `-1` for `L:`, `1` for `R:`, `0` otherwise
    pub priority: i8,
    pub rule_id: RuleId,
}

#[derive(Debug, Clone)]
pub struct TokenizeLineResult {
    pub tokens: Vec<Token>,
    pub rule_stack: StateStack,
    pub stopped_early: bool,
}

/// Binary variant: flat `(start offset, packed attributes)` pairs
#[derive(Debug, Clone)]
pub struct TokenizeLineResult2 {
    pub tokens: Vec<u32>,
    pub rule_stack: StateStack,
    pub stopped_early: bool,
}

pub struct Grammar {
    factory: RuleFactory,
    root_id: Option<RuleId>,
    injections: Vec<Injection>,
    repository: Arc<dyn GrammarRepository>,
    provider: ScopeAttributesProvider,
    token_type_matchers: Vec<TokenTypeMatcher>,
    balanced_bracket_selectors: Option<BalancedBracketSelectors>,
    compiling: Arc<AtomicBool>,
}

impl Grammar {
    pub fn new(
        raw: Arc<RawGrammar>,
        config: GrammarConfiguration,
        repository: Arc<dyn GrammarRepository>,
        theme: Arc<Theme>,
    ) -> Self {
        let token_type_matchers = config
            .token_types
            .iter()
            .flat_map(|(source, token_type)| TokenTypeMatcher::parse(source, *token_type))
            .collect();

        let balanced_bracket_selectors = (!config.balanced_bracket_selectors.is_empty()
            || !config.unbalanced_bracket_selectors.is_empty())
        .then(|| {
            BalancedBracketSelectors::new(
                &config.balanced_bracket_selectors,
                &config.unbalanced_bracket_selectors,
            )
        });

        Self {
            factory: RuleFactory::new(Arc::new(LoadedGrammar::new(raw))),
            root_id: None,
            injections: Vec::new(),
            repository,
            provider: ScopeAttributesProvider::new(
                config.initial_language,
                theme,
                &config.embedded_languages,
            ),
            token_type_matchers,
            balanced_bracket_selectors,
            compiling: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.factory.root().raw().name.as_deref()
    }

    pub fn scope_name(&self) -> &str {
        self.factory.root().scope_name()
    }

    pub fn file_types(&self) -> &[String] {
        &self.factory.root().raw().file_types
    }

    pub fn first_line_match(&self) -> Option<&str> {
        self.factory.root().raw().first_line_match.as_deref()
    }

    pub fn theme(&self) -> &Arc<Theme> {
        self.provider.theme()
    }

    pub fn rule_graph(&self) -> &RuleGraph {
        self.factory.graph()
    }

    /// Injections in the order they are tried; empty until the first tokenize call
    pub fn injections(&self) -> &[Injection] {
        &self.injections
    }

    /// True while the rule graph is being built for the first time
    ///
    /// Compilation itself takes no lock. Callers sharing one grammar across
    /// threads must serialize tokenize calls.
    pub fn is_compiling(&self) -> bool {
        self.compiling.load(Ordering::Acquire)
    }

    /// Shared handle to the compiling flag, readable from other threads
    pub fn compiling_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.compiling)
    }

    /// Use a new theme; cached scope attributes are dropped, the rule graph stays
    pub fn on_did_change_theme(&mut self, theme: Arc<Theme>) {
        self.provider.on_did_change_theme(theme);
    }

    pub fn tokenize_line(
        &mut self,
        line_text: &str,
        prev_state: Option<&StateStack>,
        time_limit: Option<Duration>,
    ) -> TokenizeLineResult {
        let run = self.run_line(line_text, prev_state, false, time_limit);
        let tokens = run
            .tokens
            .into_tokens(&run.result.stack, run.line_len, run.content_len);
        TokenizeLineResult {
            tokens,
            rule_stack: run.result.stack,
            stopped_early: run.result.stopped_early,
        }
    }

    pub fn tokenize_line2(
        &mut self,
        line_text: &str,
        prev_state: Option<&StateStack>,
        time_limit: Option<Duration>,
    ) -> TokenizeLineResult2 {
        let run = self.run_line(line_text, prev_state, true, time_limit);
        let tokens = run.tokens.into_binary_tokens(&run.result.stack, run.line_len);
        TokenizeLineResult2 {
            tokens,
            rule_stack: run.result.stack,
            stopped_early: run.result.stopped_early,
        }
    }

    fn run_line(
        &mut self,
        line_text: &str,
        prev_state: Option<&StateStack>,
        emit_binary_tokens: bool,
        time_limit: Option<Duration>,
    ) -> LineRun<'_> {
        let root_id = self.ensure_compiled();

        let (stack, is_first_line) = match prev_state {
            Some(prev) => {
                prev.reset();
                (prev.clone(), false)
            }
            None => (self.root_stack(root_id), true),
        };

        let content = line_text.strip_suffix('\n').unwrap_or(line_text);
        let line = format!("{content}\n");

        let mut tokens = LineTokens::new(
            emit_binary_tokens,
            &self.token_type_matchers,
            self.balanced_bracket_selectors.as_ref(),
        );
        let mut ctx = TokenizerContext {
            graph: self.factory.graph_mut(),
            provider: &mut self.provider,
            injections: &self.injections,
        };
        let result = tokenizer::tokenize_string(
            &mut ctx,
            &line,
            is_first_line,
            0,
            stack,
            &mut tokens,
            true,
            time_limit,
        );

        LineRun {
            tokens,
            result,
            line_len: line.len(),
            content_len: content.len(),
        }
    }

    fn ensure_compiled(&mut self) -> RuleId {
        if let Some(root_id) = self.root_id {
            return root_id;
        }

        self.compiling.store(true, Ordering::Release);
        let repository = Arc::clone(&self.repository);
        let root_id = self.factory.compile_root(repository.as_ref());
        self.injections = self.collect_injections(repository.as_ref());
        self.root_id = Some(root_id);
        self.compiling.store(false, Ordering::Release);

        tracing::debug!(
            "Compiled grammar {}: {} rules, {} injections",
            self.scope_name(),
            self.factory.graph().len(),
            self.injections.len()
        );
        root_id
    }

    fn collect_injections(&mut self, repository: &dyn GrammarRepository) -> Vec<Injection> {
        let root = Arc::clone(self.factory.root());
        let mut injections = Vec::new();

        if let Some(own) = &root.raw().injections {
            for (expression, rule) in own {
                let rule_id = self.factory.compile_in(&root, rule, repository);
                injections.extend(selector::parse(expression).into_iter().map(|parsed| {
                    Injection {
                        selector: parsed.selector,
                        priority: parsed.priority,
                        rule_id,
                    }
                }));
            }
        }

        for injector_scope in repository.injections(root.scope_name()) {
            let Some(injector) = self.factory.external(&injector_scope, repository) else {
                continue;
            };
            let Some(expression) = injector.raw().injection_selector.clone() else {
                tracing::debug!("Grammar {} has no injectionSelector", injector_scope);
                continue;
            };
            let rule_id = self
                .factory
                .compile_in(&injector, injector.self_rule(), repository);
            injections.extend(selector::parse(&expression).into_iter().map(|parsed| {
                Injection {
                    selector: parsed.selector,
                    priority: parsed.priority,
                    rule_id,
                }
            }));
        }

        injections.sort_by_key(|injection| injection.priority);
        injections
    }

    fn root_stack(&mut self, root_id: RuleId) -> StateStack {
        let defaults = self.provider.default_attributes();
        let root_name = self
            .factory
            .graph()
            .get(root_id)
            .and_then(|rule| rule.name(None, None));

        let scopes = match root_name {
            Some(name) => {
                let basic = self.provider.basic_attributes(&name);
                let merged = AttributedScopeStack::merge_attributes(defaults, None, &basic);
                AttributedScopeStack::new(None, name, merged)
            }
            None => AttributedScopeStack::new(None, "unknown", defaults),
        };
        StateStack::root(root_id, scopes.clone(), scopes)
    }
}

struct LineRun<'g> {
    tokens: LineTokens<'g>,
    result: TokenizeStringResult,
    line_len: usize,
    content_len: usize,
}
