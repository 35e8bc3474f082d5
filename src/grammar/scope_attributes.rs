//! Per-scope attributes that do not depend on the scope's ancestors

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::attributes::{self, StandardTokenType};
use crate::theme::{Theme, ThemeTrieRule};
use crate::util::scope_matches;

static STANDARD_TOKEN_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(comment|string|regex|meta\.embedded)\b").expect("token type regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicScopeAttributes {
    /// Embedded language id, 0 when the scope names none
    pub language_id: u32,
    /// `None` keeps the inherited token type
    pub token_type: Option<StandardTokenType>,
    /// Theme rules for the scope, most specific first
    pub theme_data: Vec<ThemeTrieRule>,
}

/// Computes and caches [`BasicScopeAttributes`] until the theme changes
#[derive(Debug)]
pub struct ScopeAttributesProvider {
    initial_language: u32,
    theme: Arc<Theme>,
    /// Longest scope prefix first
    embedded_languages: Vec<(String, u32)>,
    cache: HashMap<String, Arc<BasicScopeAttributes>>,
}

impl ScopeAttributesProvider {
    pub fn new(
        initial_language: u32,
        theme: Arc<Theme>,
        embedded_languages: &BTreeMap<String, u32>,
    ) -> Self {
        let mut embedded_languages: Vec<(String, u32)> = embedded_languages
            .iter()
            .map(|(scope, id)| (scope.clone(), *id))
            .collect();
        embedded_languages.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            initial_language,
            theme,
            embedded_languages,
            cache: HashMap::new(),
        }
    }

    pub fn theme(&self) -> &Arc<Theme> {
        &self.theme
    }

    /// Encoded attributes every line starts from: initial language plus theme defaults
    pub fn default_attributes(&self) -> u32 {
        let defaults = self.theme.defaults();
        attributes::set(
            0,
            self.initial_language,
            None,
            None,
            defaults.font_style,
            defaults.foreground,
            defaults.background,
        )
    }

    pub fn basic_attributes(&mut self, scope: &str) -> Arc<BasicScopeAttributes> {
        if let Some(cached) = self.cache.get(scope) {
            return Arc::clone(cached);
        }

        let computed = Arc::new(BasicScopeAttributes {
            language_id: self.scope_to_language(scope),
            token_type: to_standard_token_type(scope),
            theme_data: self.theme.rules_for(scope),
        });
        self.cache.insert(scope.to_string(), Arc::clone(&computed));
        computed
    }

    /// Swap the theme; cached attributes are dropped, nothing else changes
    pub fn on_did_change_theme(&mut self, theme: Arc<Theme>) {
        self.theme = theme;
        self.cache.clear();
    }

    fn scope_to_language(&self, scope: &str) -> u32 {
        self.embedded_languages
            .iter()
            .find(|(prefix, _)| scope_matches(scope, prefix))
            .map_or(0, |(_, id)| *id)
    }
}

fn to_standard_token_type(scope: &str) -> Option<StandardTokenType> {
    let found = STANDARD_TOKEN_TYPE.find(scope)?;
    match found.as_str() {
        "comment" => Some(StandardTokenType::Comment),
        "string" => Some(StandardTokenType::String),
        "regex" => Some(StandardTokenType::RegEx),
        _ => Some(StandardTokenType::Other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::RawTheme;

    fn embedded() -> BTreeMap<String, u32> {
        BTreeMap::from([
            ("source.js".to_string(), 2),
            ("source.js.regexp".to_string(), 3),
        ])
    }

    #[test]
    fn test_embedded_language_longest_prefix() {
        let mut provider = ScopeAttributesProvider::new(1, Arc::new(Theme::default()), &embedded());
        assert_eq!(provider.basic_attributes("source.js").language_id, 2);
        assert_eq!(provider.basic_attributes("source.js.embedded").language_id, 2);
        assert_eq!(provider.basic_attributes("source.js.regexp.x").language_id, 3);
        assert_eq!(provider.basic_attributes("source.jsx").language_id, 0);
    }

    #[test]
    fn test_standard_token_types() {
        assert_eq!(
            to_standard_token_type("comment.line.double-slash"),
            Some(StandardTokenType::Comment)
        );
        assert_eq!(
            to_standard_token_type("string.quoted"),
            Some(StandardTokenType::String)
        );
        assert_eq!(
            to_standard_token_type("string.regex"),
            Some(StandardTokenType::String)
        );
        assert_eq!(
            to_standard_token_type("meta.embedded.block"),
            Some(StandardTokenType::Other)
        );
        assert_eq!(to_standard_token_type("keyword.control"), None);
        assert_eq!(to_standard_token_type("strings"), None);
    }

    #[test]
    fn test_theme_change_clears_cache() {
        let dark = RawTheme::from_json(
            r##"{ "settings": [{ "scope": "keyword", "settings": { "foreground": "#ff0000" } }] }"##,
        )
        .unwrap();
        let mut provider =
            ScopeAttributesProvider::new(0, Arc::new(Theme::from_raw(&dark, None)), &BTreeMap::new());
        assert_eq!(provider.basic_attributes("keyword").theme_data.len(), 1);

        provider.on_did_change_theme(Arc::new(Theme::default()));
        assert!(provider.basic_attributes("keyword").theme_data.is_empty());
    }

    #[test]
    fn test_default_attributes_use_theme_defaults() {
        let provider = ScopeAttributesProvider::new(4, Arc::new(Theme::default()), &BTreeMap::new());
        let encoded = provider.default_attributes();
        assert_eq!(attributes::language_id(encoded), 4);
        assert_eq!(
            provider.theme().color(attributes::foreground(encoded)),
            Some("#000000")
        );
        assert_eq!(
            provider.theme().color(attributes::background(encoded)),
            Some("#ffffff")
        );
    }
}
