//! tmscope - TextMate grammar tokenizer
//!
//! Tokenizes text line by line with TextMate grammars (Oniguruma regexes,
//! begin/end and begin/while rules, injections) and resolves the resulting
//! scope paths against a theme.
//!
//! ```no_run
//! use tmscope::raw::RawGrammar;
//! use tmscope::registry::{Registry, StaticRegistryOptions};
//!
//! let mut options = StaticRegistryOptions::new();
//! let scope = options.add_grammar(RawGrammar::from_json_file("demo.json".as_ref()).unwrap());
//! let mut registry = Registry::new(options);
//! let grammar = registry.load_grammar(&scope).unwrap();
//!
//! let first = grammar.tokenize_line("let x = 1;", None, None);
//! let second = grammar.tokenize_line("x + 1", Some(&first.rule_stack), None);
//! ```

pub mod cli;
pub mod config;
pub mod config_paths;
pub mod grammar;
pub mod raw;
pub mod registry;
pub mod rules;
pub mod selector;
pub mod theme;
pub mod tracing;
pub mod util;

// Re-export commonly used types
pub use config::TokenizerConfig;
pub use grammar::{
    Grammar, GrammarConfiguration, GrammarRepository, StateStack, Token, TokenizeLineResult,
    TokenizeLineResult2,
};
pub use raw::{RawGrammar, RawTheme};
pub use registry::{Registry, RegistryError, RegistryOptions, StaticRegistryOptions};
pub use theme::Theme;
