//! Raw grammar and theme data as read from JSON
//!
//! These types mirror the TextMate / VS Code file formats closely and carry no
//! behavior beyond deserialization. The engine compiles them into rules
//! (`crate::rules`) and theme tries (`crate::theme`).

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Deserializer};

/// Named sub-rules of a grammar or of a single rule
pub type RawRepository = HashMap<String, RawRule>;

/// One grammar rule, pattern or capture entry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRule {
    pub include: Option<String>,
    pub name: Option<String>,
    pub content_name: Option<String>,
    #[serde(rename = "match")]
    pub match_: Option<String>,
    pub captures: Option<RawCaptures>,
    pub begin: Option<String>,
    pub begin_captures: Option<RawCaptures>,
    pub end: Option<String>,
    pub end_captures: Option<RawCaptures>,
    #[serde(rename = "while")]
    pub while_: Option<String>,
    pub while_captures: Option<RawCaptures>,
    pub patterns: Option<Vec<RawRule>>,
    pub repository: Option<RawRepository>,
    #[serde(default, deserialize_with = "bool_or_int")]
    pub apply_end_pattern_last: bool,
}

/// Capture group number -> rule
///
/// Grammars write captures either as an object keyed by group number or as an
/// array indexed by group number. Non-numeric keys are ignored.
#[derive(Debug, Clone, Default)]
pub struct RawCaptures(pub BTreeMap<usize, RawRule>);

impl RawCaptures {
    pub fn get(&self, index: usize) -> Option<&RawRule> {
        self.0.get(&index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &RawRule)> {
        self.0.iter().map(|(index, rule)| (*index, rule))
    }

    /// Highest group number present
    pub fn max_index(&self) -> Option<usize> {
        self.0.keys().next_back().copied()
    }
}

impl<'de> Deserialize<'de> for RawCaptures {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Map(HashMap<String, RawRule>),
            List(Vec<RawRule>),
        }

        let captures = match Shape::deserialize(deserializer)? {
            Shape::Map(map) => map
                .into_iter()
                .filter_map(|(key, rule)| key.trim().parse::<usize>().ok().map(|i| (i, rule)))
                .collect(),
            Shape::List(list) => list.into_iter().enumerate().collect(),
        };
        Ok(RawCaptures(captures))
    }
}

fn bool_or_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(i)) => i != 0,
        None => false,
    })
}

/// A complete grammar file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGrammar {
    pub scope_name: String,
    pub name: Option<String>,
    #[serde(default)]
    pub patterns: Vec<RawRule>,
    #[serde(default)]
    pub repository: RawRepository,
    /// Selector -> rule injected into grammars whose scopes match the selector
    pub injections: Option<BTreeMap<String, RawRule>>,
    /// Selector used when this whole grammar is injected into another one
    pub injection_selector: Option<String>,
    #[serde(default)]
    pub file_types: Vec<String>,
    pub first_line_match: Option<String>,
}

impl RawGrammar {
    pub fn from_json(json: &str) -> Result<Self, LoadError> {
        serde_json::from_str(json).map_err(|e| LoadError::Parse(e.to_string()))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LoadError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }
}

/// A theme file in either vscode-textmate (`settings`) or VS Code (`tokenColors`) layout
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTheme {
    pub name: Option<String>,
    /// Name of another theme to layer underneath this one
    pub include: Option<String>,
    pub settings: Option<Vec<RawThemeSetting>>,
    pub token_colors: Option<Vec<RawThemeSetting>>,
    /// Non-token UI colors, passed through untouched
    pub colors: Option<BTreeMap<String, serde_json::Value>>,
}

impl RawTheme {
    pub fn from_json(json: &str) -> Result<Self, LoadError> {
        serde_json::from_str(json).map_err(|e| LoadError::Parse(e.to_string()))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LoadError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawThemeSetting {
    pub name: Option<String>,
    pub scope: Option<ThemeScope>,
    pub settings: Option<RawThemeStyle>,
}

/// `"a, b c"` or `["a", "b c"]`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ThemeScope {
    Single(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawThemeStyle {
    pub font_style: Option<String>,
    pub foreground: Option<String>,
    pub background: Option<String>,
}

/// Reading a grammar or theme file failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    Io(String),
    Parse(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "IO error: {}", e),
            LoadError::Parse(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}
