//! Grammar registry
//!
//! Loads a root grammar together with every grammar it references, keeps the
//! compiled [`Grammar`]s by scope name and owns the active [`Theme`].
//!
//! ```text
//! RegistryOptions ──load_raw_grammar──► GrammarStore (raw grammars, injections)
//!                                            │ GrammarRepository
//!                                            ▼
//!                                     Grammar (per root scope) ◄── Theme
//! ```

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use crate::grammar::{Grammar, GrammarConfiguration, GrammarRepository};
use crate::raw::{LoadError, RawGrammar, RawRule, RawTheme};
use crate::theme::Theme;

/// Where the registry gets grammars and themes from
pub trait RegistryOptions: Send + Sync {
    /// Raw grammar for `scope_name`; `Ok(None)` when the scope is unknown
    fn load_raw_grammar(&self, scope_name: &str) -> Result<Option<RawGrammar>, LoadError>;

    /// Scope names of grammars injecting into `scope_name`
    fn injections(&self, _scope_name: &str) -> Option<Vec<String>> {
        None
    }

    /// Theme referenced by another theme's `include`
    fn load_raw_theme(&self, _name: &str) -> Option<RawTheme> {
        None
    }

    /// Theme used until [`Registry::set_theme`] is called
    fn default_theme(&self) -> Option<RawTheme> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No grammar is known for the requested root scope
    UnknownGrammar(String),
    /// The root grammar exists but could not be read
    Load(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::UnknownGrammar(scope) => write!(f, "No grammar for scope {}", scope),
            RegistryError::Load(e) => write!(f, "Failed to load grammar: {}", e),
        }
    }
}

impl std::error::Error for RegistryError {}

/// In-memory [`RegistryOptions`]
#[derive(Debug, Default, Clone)]
pub struct StaticRegistryOptions {
    grammars: HashMap<String, RawGrammar>,
    injections: HashMap<String, Vec<String>>,
    themes: HashMap<String, RawTheme>,
    default_theme: Option<RawTheme>,
}

impl StaticRegistryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a grammar under its own scope name; returns that scope name
    pub fn add_grammar(&mut self, grammar: RawGrammar) -> String {
        let scope_name = grammar.scope_name.clone();
        self.grammars.insert(scope_name.clone(), grammar);
        scope_name
    }

    pub fn add_grammar_file(&mut self, path: &Path) -> Result<String, LoadError> {
        let grammar = RawGrammar::from_json_file(path)?;
        tracing::debug!("Loaded grammar {} from {}", grammar.scope_name, path.display());
        Ok(self.add_grammar(grammar))
    }

    /// Declare that `injector` injects into `target`
    pub fn add_injection(&mut self, target: &str, injector: &str) {
        let injectors = self.injections.entry(target.to_string()).or_default();
        if !injectors.iter().any(|existing| existing == injector) {
            injectors.push(injector.to_string());
        }
    }

    pub fn add_theme(&mut self, name: &str, theme: RawTheme) {
        self.themes.insert(name.to_string(), theme);
    }

    pub fn set_default_theme(&mut self, theme: RawTheme) {
        self.default_theme = Some(theme);
    }

    /// Scope of the grammar whose `fileTypes` contains the path's extension
    /// or file name
    pub fn scope_for_path(&self, path: &Path) -> Option<String> {
        let extension = path.extension().and_then(|e| e.to_str());
        let file_name = path.file_name().and_then(|n| n.to_str());

        let mut candidates: Vec<&RawGrammar> = self.grammars.values().collect();
        candidates.sort_by(|a, b| a.scope_name.cmp(&b.scope_name));
        candidates
            .into_iter()
            .find(|grammar| {
                grammar.file_types.iter().any(|file_type| {
                    let file_type = file_type.trim_start_matches('.');
                    Some(file_type) == extension || Some(file_type) == file_name
                })
            })
            .map(|grammar| grammar.scope_name.clone())
    }

    pub fn scope_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.grammars.keys().cloned().collect();
        names.sort();
        names
    }
}

impl RegistryOptions for StaticRegistryOptions {
    fn load_raw_grammar(&self, scope_name: &str) -> Result<Option<RawGrammar>, LoadError> {
        Ok(self.grammars.get(scope_name).cloned())
    }

    fn injections(&self, scope_name: &str) -> Option<Vec<String>> {
        self.injections.get(scope_name).cloned()
    }

    fn load_raw_theme(&self, name: &str) -> Option<RawTheme> {
        self.themes.get(name).cloned()
    }

    fn default_theme(&self) -> Option<RawTheme> {
        self.default_theme.clone()
    }
}

/// Raw grammars loaded so far, shared with every compiled grammar
#[derive(Debug, Default)]
pub struct GrammarStore {
    grammars: RwLock<HashMap<String, Arc<RawGrammar>>>,
    injections: RwLock<HashMap<String, Vec<String>>>,
}

impl GrammarStore {
    pub fn contains(&self, scope_name: &str) -> bool {
        self.grammars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(scope_name)
    }

    /// Store a grammar and return the scopes it depends on
    pub fn add_grammar(&self, grammar: RawGrammar, injections: Option<Vec<String>>) -> Vec<String> {
        let scope_name = grammar.scope_name.clone();
        let mut dependencies = external_dependencies(&grammar);

        if let Some(injections) = injections {
            dependencies.extend(injections.iter().cloned());
            self.injections
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(scope_name.clone(), injections);
        }

        self.grammars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(scope_name, Arc::new(grammar));
        dependencies
    }
}

impl GrammarRepository for GrammarStore {
    fn lookup(&self, scope_name: &str) -> Option<Arc<RawGrammar>> {
        self.grammars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(scope_name)
            .cloned()
    }

    fn injections(&self, scope_name: &str) -> Vec<String> {
        self.injections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(scope_name)
            .cloned()
            .unwrap_or_default()
    }
}

/// Scopes named by non-local includes anywhere in `grammar`, sorted
fn external_dependencies(grammar: &RawGrammar) -> Vec<String> {
    let mut found = BTreeSet::new();
    let mut pending: Vec<&RawRule> = grammar.patterns.iter().collect();
    pending.extend(grammar.repository.values());
    if let Some(injections) = &grammar.injections {
        pending.extend(injections.values());
    }

    while let Some(rule) = pending.pop() {
        if let Some(include) = &rule.include {
            if !include.starts_with('#') && include != "$self" && include != "$base" {
                let scope_name = include.split('#').next().unwrap_or(include);
                if !scope_name.is_empty() && scope_name != grammar.scope_name {
                    found.insert(scope_name.to_string());
                }
            }
        }

        pending.extend(rule.patterns.iter().flatten());
        pending.extend(rule.repository.iter().flat_map(|repository| repository.values()));
        for captures in [
            &rule.captures,
            &rule.begin_captures,
            &rule.end_captures,
            &rule.while_captures,
        ]
        .into_iter()
        .flatten()
        {
            pending.extend(captures.iter().map(|(_, capture)| capture));
        }
    }

    found.into_iter().collect()
}

pub struct Registry {
    options: Box<dyn RegistryOptions>,
    store: Arc<GrammarStore>,
    theme: Arc<Theme>,
    grammars: HashMap<String, Grammar>,
}

impl Registry {
    pub fn new(options: impl RegistryOptions + 'static) -> Self {
        let theme = match options.default_theme() {
            Some(raw) => build_theme(&options, &raw),
            None => Theme::default(),
        };
        Self {
            options: Box::new(options),
            store: Arc::new(GrammarStore::default()),
            theme: Arc::new(theme),
            grammars: HashMap::new(),
        }
    }

    pub fn theme(&self) -> &Arc<Theme> {
        &self.theme
    }

    /// Replace the theme for this registry and every grammar it has loaded
    pub fn set_theme(&mut self, raw: &RawTheme) {
        self.theme = Arc::new(build_theme(self.options.as_ref(), raw));
        for grammar in self.grammars.values_mut() {
            grammar.on_did_change_theme(Arc::clone(&self.theme));
        }
        tracing::debug!(
            "Theme changed to {}",
            self.theme.name().unwrap_or("<unnamed>")
        );
    }

    pub fn load_grammar(&mut self, scope_name: &str) -> Result<&mut Grammar, RegistryError> {
        self.load_grammar_with_configuration(scope_name, GrammarConfiguration::default())
    }

    /// Load `scope_name` and, breadth-first, every grammar it includes or
    /// that injects into it
    ///
    /// Only the root scope may fail the call. An already loaded grammar is
    /// returned as is; `config` applies on first load.
    pub fn load_grammar_with_configuration(
        &mut self,
        scope_name: &str,
        config: GrammarConfiguration,
    ) -> Result<&mut Grammar, RegistryError> {
        self.load_dependencies(scope_name)?;

        if !self.grammars.contains_key(scope_name) {
            let raw = self
                .store
                .lookup(scope_name)
                .ok_or_else(|| RegistryError::UnknownGrammar(scope_name.to_string()))?;
            let repository: Arc<dyn GrammarRepository> = self.store.clone();
            let grammar = Grammar::new(raw, config, repository, Arc::clone(&self.theme));
            self.grammars.insert(scope_name.to_string(), grammar);
        }

        self.grammars
            .get_mut(scope_name)
            .ok_or_else(|| RegistryError::UnknownGrammar(scope_name.to_string()))
    }

    fn load_dependencies(&mut self, initial: &str) -> Result<(), RegistryError> {
        let mut seen = HashSet::from([initial.to_string()]);
        let mut remaining = VecDeque::from([initial.to_string()]);

        while let Some(scope_name) = remaining.pop_front() {
            if self.store.contains(&scope_name) {
                continue;
            }

            let is_root = scope_name == initial;
            let grammar = match self.options.load_raw_grammar(&scope_name) {
                Ok(Some(grammar)) => grammar,
                Ok(None) if is_root => {
                    return Err(RegistryError::UnknownGrammar(scope_name));
                }
                Ok(None) => {
                    tracing::warn!("Grammar {} referenced by {} is not available", scope_name, initial);
                    continue;
                }
                Err(e) if is_root => return Err(RegistryError::Load(e.to_string())),
                Err(e) => {
                    tracing::warn!("Skipping grammar {}: {}", scope_name, e);
                    continue;
                }
            };

            let injections = self.options.injections(&scope_name);
            for dependency in self.store.add_grammar(grammar, injections) {
                if seen.insert(dependency.clone()) {
                    remaining.push_back(dependency);
                }
            }
        }

        Ok(())
    }
}

fn build_theme(options: &dyn RegistryOptions, raw: &RawTheme) -> Theme {
    let include = raw.include.as_deref().and_then(|name| {
        let included = options.load_raw_theme(name);
        if included.is_none() {
            tracing::warn!("Theme include {} is not available", name);
        }
        included
    });
    Theme::from_raw(raw, include.as_ref())
}
