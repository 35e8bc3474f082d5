//! Registry loading, dependency resolution and theme tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tmscope::grammar::{attributes, GrammarConfiguration, Token};
use tmscope::raw::{LoadError, RawGrammar, RawTheme};
use tmscope::registry::{Registry, RegistryError, RegistryOptions, StaticRegistryOptions};

const DEMO_GRAMMAR: &str = include_str!("../samples/demo.tmLanguage.json");

fn grammar(json: &str) -> RawGrammar {
    RawGrammar::from_json(json).unwrap()
}

fn token(start: usize, end: usize, scopes: &[&str]) -> Token {
    Token {
        start_index: start,
        end_index: end,
        scopes: scopes.iter().map(|s| s.to_string()).collect(),
    }
}

/// Serves one grammar, fails one scope, and counts lookups
#[derive(Default)]
struct CountingOptions {
    grammars: StaticRegistryOptions,
    lookups: Arc<AtomicUsize>,
}

impl RegistryOptions for CountingOptions {
    fn load_raw_grammar(&self, scope_name: &str) -> Result<Option<RawGrammar>, LoadError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if scope_name.starts_with("source.broken") {
            return Err(LoadError::Parse("broken grammar".to_string()));
        }
        self.grammars.load_raw_grammar(scope_name)
    }
}

// ============================================================================
// Root grammar errors
// ============================================================================

#[test]
fn test_unknown_root_scope() {
    let mut registry = Registry::new(StaticRegistryOptions::new());
    assert_eq!(
        registry.load_grammar("source.none").err(),
        Some(RegistryError::UnknownGrammar("source.none".to_string()))
    );
}

#[test]
fn test_root_load_failure() {
    let mut registry = Registry::new(CountingOptions::default());
    let error = registry.load_grammar("source.broken").err().unwrap();
    assert_eq!(
        error,
        RegistryError::Load("Parse error: broken grammar".to_string())
    );
    assert!(error.to_string().contains("broken grammar"));
}

// ============================================================================
// Dependencies
// ============================================================================

#[test]
fn test_external_repository_include() {
    let mut options = StaticRegistryOptions::new();
    options.add_grammar(grammar(
        r##"{ "scopeName": "source.main", "patterns": [{ "include": "source.other#numbers" }] }"##,
    ));
    options.add_grammar(grammar(
        r##"{
            "scopeName": "source.other",
            "patterns": [{ "match": "\\w+", "name": "variable.other" }],
            "repository": { "numbers": { "match": "\\d+", "name": "constant.numeric.other" } }
        }"##,
    ));

    let mut registry = Registry::new(options);
    let grammar = registry.load_grammar("source.main").unwrap();
    let result = grammar.tokenize_line("ab 12", None, None);
    assert_eq!(
        result.tokens,
        vec![
            token(0, 3, &["source.main"]),
            token(3, 5, &["source.main", "constant.numeric.other"]),
        ]
    );
}

#[test]
fn test_external_grammar_include() {
    let mut options = StaticRegistryOptions::new();
    options.add_grammar(grammar(
        r##"{ "scopeName": "source.main", "patterns": [{ "include": "source.other" }] }"##,
    ));
    options.add_grammar(grammar(
        r##"{ "scopeName": "source.other", "patterns": [{ "match": "[a-z]+", "name": "variable.other" }] }"##,
    ));

    let mut registry = Registry::new(options);
    let result = registry
        .load_grammar("source.main")
        .unwrap()
        .tokenize_line("ab 12", None, None);
    assert_eq!(
        result.tokens,
        vec![
            token(0, 2, &["source.main", "variable.other"]),
            token(2, 5, &["source.main"]),
        ]
    );
}

#[test]
fn test_missing_dependency_is_skipped() {
    let mut options = StaticRegistryOptions::new();
    options.add_grammar(grammar(
        r##"{
            "scopeName": "source.main",
            "patterns": [
                { "include": "source.missing" },
                { "match": "x", "name": "keyword.x" }
            ]
        }"##,
    ));

    let mut registry = Registry::new(options);
    let result = registry
        .load_grammar("source.main")
        .unwrap()
        .tokenize_line("ax", None, None);
    assert_eq!(
        result.tokens,
        vec![
            token(0, 1, &["source.main"]),
            token(1, 2, &["source.main", "keyword.x"]),
        ]
    );
}

#[test]
fn test_failing_dependency_is_skipped() {
    let mut options = CountingOptions::default();
    options.grammars.add_grammar(grammar(
        r##"{
            "scopeName": "source.main",
            "patterns": [
                { "include": "source.broken#rules" },
                { "match": "x", "name": "keyword.x" }
            ]
        }"##,
    ));
    let lookups = Arc::clone(&options.lookups);

    let mut registry = Registry::new(options);
    assert!(registry.load_grammar("source.main").is_ok());
    assert_eq!(lookups.load(Ordering::SeqCst), 2);
}

#[test]
fn test_each_dependency_loaded_once() {
    let mut options = CountingOptions::default();
    options.grammars.add_grammar(grammar(
        r##"{
            "scopeName": "source.main",
            "patterns": [
                { "include": "source.a" },
                { "include": "source.b#x" },
                { "include": "source.a#y" }
            ]
        }"##,
    ));
    options.grammars.add_grammar(grammar(
        r##"{ "scopeName": "source.a", "patterns": [{ "include": "source.b" }, { "include": "source.main" }] }"##,
    ));
    options.grammars.add_grammar(grammar(
        r##"{ "scopeName": "source.b", "patterns": [{ "include": "source.a" }] }"##,
    ));
    let lookups = Arc::clone(&options.lookups);

    let mut registry = Registry::new(options);
    registry.load_grammar("source.main").unwrap();
    assert_eq!(lookups.load(Ordering::SeqCst), 3);

    registry.load_grammar("source.a").unwrap();
    assert_eq!(lookups.load(Ordering::SeqCst), 3);
}

// ============================================================================
// Grammar cache
// ============================================================================

#[test]
fn test_loaded_grammar_is_cached() {
    let mut options = StaticRegistryOptions::new();
    let scope = options.add_grammar(grammar(DEMO_GRAMMAR));
    let mut registry = Registry::new(options);

    let first: *const _ = registry.load_grammar(&scope).unwrap();
    let second: *const _ = registry.load_grammar(&scope).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_grammar_metadata() {
    let mut options = StaticRegistryOptions::new();
    let scope = options.add_grammar(grammar(DEMO_GRAMMAR));
    let mut registry = Registry::new(options);

    let grammar = registry.load_grammar(&scope).unwrap();
    assert_eq!(grammar.name(), Some("Demo"));
    assert_eq!(grammar.scope_name(), "source.demo");
    assert_eq!(grammar.file_types(), ["demo".to_string()]);
    assert_eq!(grammar.first_line_match(), Some("^#!.*\\bdemo\\b"));
}

#[test]
fn test_first_configuration_wins() {
    let mut options = StaticRegistryOptions::new();
    let scope = options.add_grammar(grammar(DEMO_GRAMMAR));
    let mut registry = Registry::new(options);

    let config = GrammarConfiguration {
        initial_language: 7,
        ..GrammarConfiguration::default()
    };
    registry.load_grammar_with_configuration(&scope, config).unwrap();

    let other = GrammarConfiguration {
        initial_language: 9,
        ..GrammarConfiguration::default()
    };
    let result = registry
        .load_grammar_with_configuration(&scope, other)
        .unwrap()
        .tokenize_line2("x", None, None);
    assert_eq!(attributes::language_id(result.tokens[1]), 7);
}

// ============================================================================
// Static options
// ============================================================================

#[test]
fn test_add_grammar_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("demo.tmLanguage.json");
    std::fs::write(&path, DEMO_GRAMMAR).unwrap();

    let mut options = StaticRegistryOptions::new();
    assert_eq!(options.add_grammar_file(&path).unwrap(), "source.demo");
    assert_eq!(options.scope_names(), vec!["source.demo"]);
    assert_eq!(
        options
            .scope_for_path(std::path::Path::new("main.demo"))
            .as_deref(),
        Some("source.demo")
    );
}

#[test]
fn test_add_grammar_file_errors() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = StaticRegistryOptions::new();

    let missing = options.add_grammar_file(&dir.path().join("missing.json"));
    assert!(matches!(missing, Err(LoadError::Io(_))));

    let invalid = dir.path().join("invalid.json");
    std::fs::write(&invalid, "{ not json").unwrap();
    assert!(matches!(
        options.add_grammar_file(&invalid),
        Err(LoadError::Parse(_))
    ));
    assert!(options.scope_names().is_empty());
}

#[test]
fn test_scope_names_are_sorted() {
    let mut options = StaticRegistryOptions::new();
    options.add_grammar(grammar(r#"{ "scopeName": "source.z", "patterns": [] }"#));
    options.add_grammar(grammar(r#"{ "scopeName": "source.a", "patterns": [] }"#));
    assert_eq!(options.scope_names(), vec!["source.a", "source.z"]);
}

// ============================================================================
// Themes
// ============================================================================

#[test]
fn test_default_theme_with_include() {
    let mut options = StaticRegistryOptions::new();
    options.add_theme(
        "base",
        RawTheme::from_json(
            r##"{ "settings": [{ "scope": "string", "settings": { "foreground": "#111111" } }] }"##,
        )
        .unwrap(),
    );
    options.set_default_theme(
        RawTheme::from_json(
            r##"{
                "name": "Layered",
                "include": "base",
                "settings": [{ "scope": "comment", "settings": { "foreground": "#222222" } }]
            }"##,
        )
        .unwrap(),
    );

    let registry = Registry::new(options);
    let theme = registry.theme();
    assert_eq!(theme.name(), Some("Layered"));
    assert_eq!(
        theme.resolve_style(&["string.quoted"]).foreground.as_deref(),
        Some("#111111")
    );
    assert_eq!(
        theme.resolve_style(&["comment.line"]).foreground.as_deref(),
        Some("#222222")
    );
}

#[test]
fn test_without_default_theme() {
    let registry = Registry::new(StaticRegistryOptions::new());
    let theme = registry.theme();
    assert_eq!(theme.name(), None);
    assert_eq!(theme.color(theme.defaults().foreground), Some("#000000"));
    assert_eq!(theme.color(theme.defaults().background), Some("#ffffff"));
}

#[test]
fn test_set_theme_reaches_loaded_grammars() {
    let mut options = StaticRegistryOptions::new();
    let scope = options.add_grammar(grammar(DEMO_GRAMMAR));
    let mut registry = Registry::new(options);
    registry.load_grammar(&scope).unwrap();

    let raw = RawTheme::from_json(
        r##"{ "name": "Keywords", "settings": [{ "scope": "keyword", "settings": { "foreground": "#abcdef" } }] }"##,
    )
    .unwrap();
    registry.set_theme(&raw);
    assert_eq!(registry.theme().name(), Some("Keywords"));

    let theme = Arc::clone(registry.theme());
    let grammar = registry.load_grammar(&scope).unwrap();
    assert!(Arc::ptr_eq(grammar.theme(), &theme));

    let result = grammar.tokenize_line2("let", None, None);
    assert_eq!(
        theme.color(attributes::foreground(result.tokens[1])),
        Some("#abcdef")
    );
}
