//! Token color themes
//!
//! A [`Theme`] is built from a [`RawTheme`] (and optionally the theme it
//! includes). Settings are flattened into [`ParsedThemeRule`]s, sorted, and
//! inserted into a [`ThemeTrieElement`] per theme. Colors are interned in a
//! [`ColorMap`] shared by both tries so encoded token attributes can refer to
//! them by id.
//!
//! ## Matching
//!
//! [`Theme::matches`] walks the scope path from innermost to outermost and
//! collects the theme's rules, then the included theme's rules, then the
//! defaults rule.

pub mod color_map;
pub mod trie;

use std::collections::BTreeMap;

pub use color_map::ColorMap;
pub use trie::{ThemeTrieElement, ThemeTrieRule};

use crate::grammar::FontStyle;
use crate::raw::{RawTheme, RawThemeSetting, ThemeScope};
use crate::util::{is_valid_hex_color, scope_matches, str_arr_cmp};

const DEFAULT_FOREGROUND: &str = "#000000";
const DEFAULT_BACKGROUND: &str = "#ffffff";

/// One (scope, parent scopes) entry of a theme setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedThemeRule {
    pub name: Option<String>,
    pub scope: String,
    /// Required ancestors, nearest first
    pub parent_scopes: Option<Vec<String>>,
    /// Position of the setting in its list
    pub index: usize,
    pub font_style: Option<FontStyle>,
    pub foreground: Option<String>,
    pub background: Option<String>,
}

/// Flatten `settings` and `tokenColors` of a raw theme
pub fn parse_theme(raw: &RawTheme) -> Vec<ParsedThemeRule> {
    let mut rules = Vec::new();
    for settings in [&raw.settings, &raw.token_colors].into_iter().flatten() {
        lookup_theme_rules(settings, &mut rules);
    }
    rules
}

fn lookup_theme_rules(settings: &[RawThemeSetting], out: &mut Vec<ParsedThemeRule>) {
    let mut index = 0;
    for entry in settings {
        let Some(style) = &entry.settings else {
            continue;
        };

        let scopes: Vec<&str> = match &entry.scope {
            Some(ThemeScope::Single(scope)) => scope
                .trim_matches(',')
                .split(',')
                .filter(|scope| !scope.is_empty())
                .collect(),
            Some(ThemeScope::List(scopes)) => scopes.iter().map(String::as_str).collect(),
            None => vec![""],
        };

        let font_style = style.font_style.as_deref().map(FontStyle::parse);
        let foreground = style
            .foreground
            .clone()
            .filter(|color| is_valid_hex_color(color));
        let background = style
            .background
            .clone()
            .filter(|color| is_valid_hex_color(color));

        for scope in scopes {
            let segments: Vec<&str> = scope.split(' ').filter(|s| !s.is_empty()).collect();
            let (scope, parents) = match segments.split_last() {
                Some((scope, parents)) => (*scope, parents),
                None => ("", &[][..]),
            };
            let parent_scopes = (!parents.is_empty())
                .then(|| parents.iter().rev().map(|parent| parent.to_string()).collect());

            out.push(ParsedThemeRule {
                name: entry.name.clone(),
                scope: scope.to_string(),
                parent_scopes,
                index,
                font_style,
                foreground: foreground.clone(),
                background: background.clone(),
            });
        }

        index += 1;
    }
}

#[derive(Debug, Clone)]
struct ParsedTheme {
    defaults: ThemeTrieRule,
    root: ThemeTrieElement,
}

impl ParsedTheme {
    /// Sort, pull out the empty-scope defaults, and build the trie
    fn resolve(mut rules: Vec<ParsedThemeRule>, color_map: &mut ColorMap) -> Self {
        rules.sort_by(|a, b| {
            a.scope
                .cmp(&b.scope)
                .then_with(|| str_arr_cmp(a.parent_scopes.as_deref(), b.parent_scopes.as_deref()))
                .then_with(|| a.index.cmp(&b.index))
        });

        let mut default_font_style = FontStyle::empty();
        let mut default_foreground = DEFAULT_FOREGROUND.to_string();
        let mut default_background = DEFAULT_BACKGROUND.to_string();

        let defaults_end = rules.iter().take_while(|rule| rule.scope.is_empty()).count();
        for incoming in rules.drain(..defaults_end) {
            if let Some(font_style) = incoming.font_style {
                default_font_style = font_style;
            }
            if let Some(foreground) = incoming.foreground {
                default_foreground = foreground;
            }
            if let Some(background) = incoming.background {
                default_background = background;
            }
        }

        let defaults = ThemeTrieRule {
            name: None,
            scope_depth: 0,
            parent_scopes: None,
            font_style: Some(default_font_style),
            foreground: color_map.get_id(&default_foreground),
            background: color_map.get_id(&default_background),
        };

        let mut root = ThemeTrieElement::default();
        for rule in rules {
            let foreground = rule.foreground.as_deref().map_or(0, |c| color_map.get_id(c));
            let background = rule.background.as_deref().map_or(0, |c| color_map.get_id(c));
            root.insert(
                &rule.scope,
                ThemeTrieRule {
                    name: rule.name,
                    scope_depth: 0,
                    parent_scopes: rule.parent_scopes,
                    font_style: rule.font_style,
                    foreground,
                    background,
                },
            );
        }

        Self { defaults, root }
    }
}

/// Style resolved for a scope path
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedStyle {
    pub font_style: FontStyle,
    pub foreground: Option<String>,
    pub background: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Theme {
    name: Option<String>,
    color_map: ColorMap,
    theme: ParsedTheme,
    include: ParsedTheme,
    gui_colors: BTreeMap<String, String>,
}

impl Default for Theme {
    fn default() -> Self {
        Self::from_raw(&RawTheme::default(), None)
    }
}

impl Theme {
    /// Build a theme; `include` is the raw theme named by `raw.include`, if loaded
    pub fn from_raw(raw: &RawTheme, include: Option<&RawTheme>) -> Self {
        let mut color_map = ColorMap::new();
        let theme = ParsedTheme::resolve(parse_theme(raw), &mut color_map);
        let include_rules = include.map(parse_theme).unwrap_or_default();
        let include_theme = ParsedTheme::resolve(include_rules, &mut color_map);

        let mut gui_colors = BTreeMap::new();
        for source in include.into_iter().chain(std::iter::once(raw)) {
            let Some(colors) = &source.colors else {
                continue;
            };
            for (key, value) in colors {
                if let Some(color) = value.as_str() {
                    gui_colors.insert(key.clone(), color.to_string());
                }
            }
        }

        Self {
            name: raw.name.clone(),
            color_map,
            theme,
            include: include_theme,
            gui_colors,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Rules for `scope` from the theme and its include, without defaults
    pub fn rules_for(&self, scope: &str) -> Vec<ThemeTrieRule> {
        let mut rules = self.theme.root.match_scope(scope);
        rules.extend(self.include.root.match_scope(scope));
        rules
    }

    /// Rules for a scope path (outermost first), innermost scope's rules first
    pub fn matches<S: AsRef<str>>(&self, scopes: &[S]) -> Vec<ThemeTrieRule> {
        let mut rules = Vec::new();
        for scope in scopes.iter().rev() {
            rules.extend(self.theme.root.match_scope(scope.as_ref()));
        }
        for scope in scopes.iter().rev() {
            rules.extend(self.include.root.match_scope(scope.as_ref()));
        }
        rules.push(self.theme.defaults.clone());
        rules
    }

    /// Fold the rules for a scope path into one style
    ///
    /// Same order as [`Theme::matches`], but rules whose parent scopes are not
    /// ancestors of the matched scope are skipped.
    pub fn resolve_style<S: AsRef<str>>(&self, scopes: &[S]) -> ResolvedStyle {
        let mut font_style = None;
        let mut foreground = 0;
        let mut background = 0;

        let mut rules = Vec::new();
        for tree in [&self.theme.root, &self.include.root] {
            for (depth, scope) in scopes.iter().enumerate().rev() {
                let ancestors = &scopes[..depth];
                rules.extend(
                    tree.match_scope(scope.as_ref())
                        .into_iter()
                        .filter(|rule| parents_match(rule.parent_scopes.as_deref(), ancestors)),
                );
            }
        }
        rules.push(self.theme.defaults.clone());

        for rule in rules {
            if font_style.is_none() {
                font_style = rule.font_style;
            }
            if foreground == 0 {
                foreground = rule.foreground;
            }
            if background == 0 {
                background = rule.background;
            }
        }

        ResolvedStyle {
            font_style: font_style.unwrap_or_default(),
            foreground: self.color(foreground).map(str::to_string),
            background: self.color(background).map(str::to_string),
        }
    }

    pub fn defaults(&self) -> &ThemeTrieRule {
        &self.theme.defaults
    }

    /// Every interned color, in id order (id 1 first)
    pub fn color_map(&self) -> &[String] {
        self.color_map.colors()
    }

    pub fn color(&self, id: u32) -> Option<&str> {
        self.color_map.get_color(id)
    }

    pub fn color_id(&self, color: &str) -> Option<u32> {
        self.color_map.lookup(color)
    }

    /// Non-token UI colors; the theme's own entries override its include's
    pub fn gui_colors(&self) -> &BTreeMap<String, String> {
        &self.gui_colors
    }
}

/// Parent scopes (nearest first) appear in order walking outward through `ancestors`
fn parents_match<S: AsRef<str>>(parent_scopes: Option<&[String]>, ancestors: &[S]) -> bool {
    let Some(parent_scopes) = parent_scopes else {
        return true;
    };

    let mut pending = parent_scopes.iter().peekable();
    for scope in ancestors.iter().rev() {
        match pending.peek() {
            Some(selector) if scope_matches(scope.as_ref(), selector) => {
                pending.next();
            }
            Some(_) => {}
            None => break,
        }
    }
    pending.peek().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn theme(json: &str) -> Theme {
        Theme::from_raw(&RawTheme::from_json(json).unwrap(), None)
    }

    #[test]
    fn test_parse_scope_forms() {
        let raw = RawTheme::from_json(
            r##"{
                "settings": [
                    { "scope": ",comment, string ,", "settings": { "foreground": "#111111" } },
                    { "scope": "source.js meta.block variable", "settings": { "fontStyle": "bold" } },
                    { "scope": "ignored" },
                    { "settings": { "foreground": "nope" } }
                ]
            }"##,
        )
        .unwrap();

        let rules = parse_theme(&raw);
        assert_eq!(rules.len(), 4);
        assert_eq!(rules[0].scope, "comment");
        assert_eq!(rules[1].scope, "string");
        assert_eq!(rules[0].foreground.as_deref(), Some("#111111"));

        assert_eq!(rules[2].scope, "variable");
        assert_eq!(
            rules[2].parent_scopes,
            Some(vec!["meta.block".to_string(), "source.js".to_string()])
        );
        assert_eq!(rules[2].font_style, Some(FontStyle::BOLD));
        assert_eq!(rules[2].index, 1);

        assert_eq!(rules[3].scope, "");
        assert_eq!(rules[3].foreground, None);
        assert_eq!(rules[3].index, 2);
    }

    #[test]
    fn test_defaults_fallback() {
        let theme = theme(r#"{ "settings": [] }"#);
        let defaults = theme.defaults();
        assert_eq!(theme.color(defaults.foreground), Some("#000000"));
        assert_eq!(theme.color(defaults.background), Some("#ffffff"));
        assert_eq!(defaults.font_style, Some(FontStyle::empty()));
    }

    #[test]
    fn test_comment_rule_before_defaults() {
        let theme = theme(
            r##"{
                "settings": [
                    { "settings": { "foreground": "#000000" } },
                    { "scope": "comment", "settings": { "foreground": "#008000" } }
                ]
            }"##,
        );

        let matched = theme.matches(&["comment.line"]);
        assert_eq!(matched.len(), 2);
        assert_eq!(theme.color(matched[0].foreground), Some("#008000"));
        assert_eq!(matched[1], *theme.defaults());
    }

    #[test]
    fn test_resolve_style_inner_scope_wins() {
        let theme = theme(
            r##"{
                "settings": [
                    { "settings": { "foreground": "#000000", "background": "#ffffff" } },
                    { "scope": "source", "settings": { "foreground": "#111111" } },
                    { "scope": "string", "settings": { "foreground": "#222222", "fontStyle": "italic" } }
                ]
            }"##,
        );

        let style = theme.resolve_style(&["source.x", "string.quoted"]);
        assert_eq!(style.foreground.as_deref(), Some("#222222"));
        assert_eq!(style.background.as_deref(), Some("#ffffff"));
        assert_eq!(style.font_style, FontStyle::ITALIC);

        let style = theme.resolve_style(&["source.x"]);
        assert_eq!(style.foreground.as_deref(), Some("#111111"));
        assert_eq!(style.font_style, FontStyle::empty());
    }

    #[test]
    fn test_include_rules_follow_own_rules() {
        let base = RawTheme::from_json(
            r##"{
                "settings": [{ "scope": "keyword", "settings": { "foreground": "#0000ff" } }],
                "colors": { "editor.background": "#101010", "editor.foreground": "#eeeeee" }
            }"##,
        )
        .unwrap();
        let raw = RawTheme::from_json(
            r##"{
                "include": "base",
                "settings": [{ "scope": "keyword.control", "settings": { "foreground": "#ff0000" } }],
                "colors": { "editor.background": "#202020" }
            }"##,
        )
        .unwrap();

        let theme = Theme::from_raw(&raw, Some(&base));
        let matched = theme.matches(&["keyword.control"]);
        assert_eq!(theme.color(matched[0].foreground), Some("#ff0000"));
        assert_eq!(theme.color(matched[1].foreground), Some("#0000ff"));

        assert_eq!(theme.gui_colors()["editor.background"], "#202020");
        assert_eq!(theme.gui_colors()["editor.foreground"], "#eeeeee");
    }
}
