//! Pattern sources and the per-rule scanner cache
//!
//! A [`RegExpSource`] wraps one grammar pattern. At construction `\z` is
//! rewritten into a zero-width end-of-line assertion and the presence of `\A` /
//! `\G` is recorded. Anchored sources precompute four variants, one per
//! combination of "may match at string start" and "may match at the scan
//! anchor"; a disallowed anchor is replaced with `\u{FFFF}`, which never occurs
//! in line text.
//!
//! A [`RegExpSourceList`] is the ordered set of sources scanned together for a
//! rule. It caches one compiled [`Scanner`] per anchor variant and drops those
//! caches whenever a source is rewritten with resolved back-references.

use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};

use super::scanner::{CaptureIndex, Scanner};
use super::RuleId;
use crate::util::escape_regexp_characters;

static BACK_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\(\d+)").expect("back-reference regex"));

/// Never present in real text, so an anchor replaced by it cannot match
const NEVER_MATCHES: char = '\u{FFFF}';

#[derive(Debug, Clone)]
struct AnchorVariants {
    a0_g0: String,
    a0_g1: String,
    a1_g0: String,
    a1_g1: String,
}

#[derive(Debug, Clone)]
pub struct RegExpSource {
    source: String,
    rule_id: RuleId,
    has_anchor: bool,
    has_back_references: bool,
    anchor_variants: Option<AnchorVariants>,
}

impl RegExpSource {
    pub fn new(source: &str, rule_id: RuleId) -> Self {
        let (source, has_anchor) = rewrite_end_anchors(source);
        let has_back_references = BACK_REFERENCE.is_match(&source);
        let anchor_variants = has_anchor.then(|| build_anchor_variants(&source));
        Self {
            source,
            rule_id,
            has_anchor,
            has_back_references,
            anchor_variants,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    pub fn has_anchor(&self) -> bool {
        self.has_anchor
    }

    pub fn has_back_references(&self) -> bool {
        self.has_back_references
    }

    /// Replace the pattern text, rebuilding anchor variants when needed
    pub fn set_source(&mut self, source: &str) {
        if self.source == source {
            return;
        }
        self.source = source.to_string();
        if self.has_anchor {
            self.anchor_variants = Some(build_anchor_variants(&self.source));
        }
    }

    /// Substitute `\N` with the escaped text of capture `N` from `line`
    pub fn resolve_back_references(&self, line: &str, captures: &[CaptureIndex]) -> String {
        BACK_REFERENCE
            .replace_all(&self.source, |caps: &Captures| {
                let captured = caps
                    .get(1)
                    .and_then(|m| m.as_str().parse::<usize>().ok())
                    .and_then(|index| captures.get(index))
                    .and_then(|capture| line.get(capture.start..capture.end))
                    .unwrap_or("");
                escape_regexp_characters(captured)
            })
            .into_owned()
    }

    /// Pattern text for the given anchor context
    pub fn resolve_anchors(&self, allow_a: bool, allow_g: bool) -> &str {
        let Some(variants) = &self.anchor_variants else {
            return &self.source;
        };
        match (allow_a, allow_g) {
            (false, false) => &variants.a0_g0,
            (false, true) => &variants.a0_g1,
            (true, false) => &variants.a1_g0,
            (true, true) => &variants.a1_g1,
        }
    }
}

/// Rewrite `\z` and report whether `\A` or `\G` occur
fn rewrite_end_anchors(source: &str) -> (String, bool) {
    let mut output = String::with_capacity(source.len());
    let mut has_anchor = false;
    let mut chars = source.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            output.push(ch);
            continue;
        }
        match chars.next() {
            Some('z') => output.push_str("$(?!\\n)(?<!\\n)"),
            Some(next) => {
                if next == 'A' || next == 'G' {
                    has_anchor = true;
                }
                output.push('\\');
                output.push(next);
            }
            None => output.push('\\'),
        }
    }

    (output, has_anchor)
}

fn build_anchor_variants(source: &str) -> AnchorVariants {
    let mut variants = AnchorVariants {
        a0_g0: String::with_capacity(source.len()),
        a0_g1: String::with_capacity(source.len()),
        a1_g0: String::with_capacity(source.len()),
        a1_g1: String::with_capacity(source.len()),
    };
    let mut chars = source.chars();

    while let Some(ch) = chars.next() {
        let escaped = if ch == '\\' { chars.next() } else { None };
        let (a0_g0, a0_g1, a1_g0, a1_g1) = match escaped {
            Some('A') => (NEVER_MATCHES, NEVER_MATCHES, 'A', 'A'),
            Some('G') => (NEVER_MATCHES, 'G', NEVER_MATCHES, 'G'),
            Some(next) => (next, next, next, next),
            None => {
                variants.a0_g0.push(ch);
                variants.a0_g1.push(ch);
                variants.a1_g0.push(ch);
                variants.a1_g1.push(ch);
                continue;
            }
        };
        for (out, replacement) in [
            (&mut variants.a0_g0, a0_g0),
            (&mut variants.a0_g1, a0_g1),
            (&mut variants.a1_g0, a1_g0),
            (&mut variants.a1_g1, a1_g1),
        ] {
            // A replaced anchor drops its backslash so the sentinel is a literal
            if replacement != NEVER_MATCHES {
                out.push('\\');
            }
            out.push(replacement);
        }
    }

    variants
}

/// Compiled scanner plus the rule id each alternative resolves to
#[derive(Debug)]
pub struct CompiledRule {
    pub scanner: Scanner,
    pub rules: Vec<RuleId>,
}

#[derive(Debug, Default)]
struct AnchorCache {
    a0_g0: Option<Arc<CompiledRule>>,
    a0_g1: Option<Arc<CompiledRule>>,
    a1_g0: Option<Arc<CompiledRule>>,
    a1_g1: Option<Arc<CompiledRule>>,
}

impl AnchorCache {
    fn slot(&mut self, allow_a: bool, allow_g: bool) -> &mut Option<Arc<CompiledRule>> {
        match (allow_a, allow_g) {
            (false, false) => &mut self.a0_g0,
            (false, true) => &mut self.a0_g1,
            (true, false) => &mut self.a1_g0,
            (true, true) => &mut self.a1_g1,
        }
    }
}

#[derive(Debug, Default)]
pub struct RegExpSourceList {
    items: Vec<RegExpSource>,
    has_anchors: bool,
    cached: Option<Arc<CompiledRule>>,
    anchor_cache: AnchorCache,
}

impl RegExpSourceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: RegExpSource) {
        self.has_anchors |= item.has_anchor();
        self.items.push(item);
    }

    pub fn unshift(&mut self, item: RegExpSource) {
        self.has_anchors |= item.has_anchor();
        self.items.insert(0, item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Rewrite one source, invalidating every compiled scanner if it changed
    pub fn set_source(&mut self, index: usize, source: &str) {
        let Some(item) = self.items.get_mut(index) else {
            return;
        };
        if item.source() == source {
            return;
        }

        self.cached = None;
        self.anchor_cache = AnchorCache::default();
        item.set_source(source);
    }

    pub fn compile(&mut self, allow_a: bool, allow_g: bool) -> Arc<CompiledRule> {
        if !self.has_anchors {
            if let Some(cached) = &self.cached {
                return Arc::clone(cached);
            }
            let compiled = Arc::new(self.build(|item| item.source()));
            self.cached = Some(Arc::clone(&compiled));
            return compiled;
        }

        if let Some(cached) = self.anchor_cache.slot(allow_a, allow_g) {
            return Arc::clone(cached);
        }
        let compiled = Arc::new(self.build(|item| item.resolve_anchors(allow_a, allow_g)));
        *self.anchor_cache.slot(allow_a, allow_g) = Some(Arc::clone(&compiled));
        compiled
    }

    fn build<'a>(&'a self, source_of: impl Fn(&'a RegExpSource) -> &'a str) -> CompiledRule {
        let sources: Vec<&str> = self.items.iter().map(source_of).collect();
        CompiledRule {
            scanner: Scanner::new(&sources),
            rules: self.items.iter().map(RegExpSource::rule_id).collect(),
        }
    }
}
