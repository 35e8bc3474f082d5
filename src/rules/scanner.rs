//! Multi-pattern Oniguruma scanner
//!
//! A scanner holds the compiled alternatives of one rule context and reports
//! the alternative that matches earliest in the line. When two alternatives
//! start at the same offset the one listed first wins.

use onig::{Regex, RegexOptions, Region, SearchOptions, Syntax};

/// Byte range of one capture group inside the line
///
/// Groups that did not participate in the match are reported as `0..0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureIndex {
    pub start: usize,
    pub end: usize,
}

impl CaptureIndex {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Winning alternative and its capture offsets
#[derive(Debug, Clone)]
pub struct ScanMatch {
    pub index: usize,
    pub captures: Vec<CaptureIndex>,
}

pub struct Scanner {
    patterns: Vec<Option<Regex>>,
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("patterns", &self.patterns.len())
            .finish()
    }
}

impl Scanner {
    /// Compile every source; a source Oniguruma rejects never matches
    pub fn new<S: AsRef<str>>(sources: &[S]) -> Self {
        let patterns = sources
            .iter()
            .map(|source| {
                let source = source.as_ref();
                match Regex::with_options(
                    source,
                    RegexOptions::REGEX_OPTION_CAPTURE_GROUP,
                    Syntax::default(),
                ) {
                    Ok(regex) => Some(regex),
                    Err(e) => {
                        tracing::warn!("Invalid grammar regex {:?}: {}", source, e);
                        None
                    }
                }
            })
            .collect();
        Self { patterns }
    }

    /// Find the earliest match at or after `start`
    pub fn find_next_match(&self, text: &str, start: usize) -> Option<ScanMatch> {
        if start > text.len() {
            return None;
        }

        let mut best: Option<(usize, usize, Region)> = None;
        for (index, regex) in self.patterns.iter().enumerate() {
            let Some(regex) = regex else {
                continue;
            };

            let mut region = Region::new();
            let found = regex.search_with_options(
                text,
                start,
                text.len(),
                SearchOptions::SEARCH_OPTION_NONE,
                Some(&mut region),
            );
            let Some(match_start) = found else {
                continue;
            };

            if best
                .as_ref()
                .map_or(true, |(best_start, _, _)| match_start < *best_start)
            {
                let at_start = match_start == start;
                best = Some((match_start, index, region));
                if at_start {
                    break;
                }
            }
        }

        best.map(|(_, index, region)| ScanMatch {
            index,
            captures: (0..region.len())
                .map(|group| {
                    region
                        .pos(group)
                        .map(|(start, end)| CaptureIndex { start, end })
                        .unwrap_or_default()
                })
                .collect(),
        })
    }
}
