//! Line tokenizer
//!
//! Scans one line against the rule on top of the state stack, one match at a
//! time, pushing and popping frames as begin and end patterns match. Tokens are
//! produced into [`LineTokens`] as the scan position moves forward.
//!
//! ```text
//! check while conditions (continuation lines only)
//! loop:
//!     best match of (top rule scanner, injections) at line_pos
//!     END_RULE    -> end captures, pop
//!     begin rule  -> begin captures, push (+ contentName, resolved end)
//!     match rule  -> captures, push + pop
//!     none        -> produce rest of line, stop
//! ```
//!
//! A grammar that matches without consuming input and without changing the
//! stack would loop forever; those cases stop the line and emit the rest of it
//! as a single token.

use std::time::{Duration, Instant};

use super::line_tokens::LineTokens;
use super::scope_attributes::ScopeAttributesProvider;
use super::scope_stack::AttributedScopeStack;
use super::state_stack::StateStack;
use super::Injection;
use crate::rules::{CaptureIndex, RuleGraph, RuleId, RuleKind};

/// Mutable grammar state the tokenizer works against
pub(crate) struct TokenizerContext<'g> {
    pub graph: &'g mut RuleGraph,
    pub provider: &'g mut ScopeAttributesProvider,
    /// Sorted by priority
    pub injections: &'g [Injection],
}

pub(crate) struct TokenizeStringResult {
    pub stack: StateStack,
    pub stopped_early: bool,
}

struct MatchResult {
    captures: Vec<CaptureIndex>,
    rule_id: RuleId,
    is_priority_match: bool,
}

/// What the matched rule asks the tokenizer to do, extracted before the
/// graph is borrowed mutably again
enum Matched {
    Push {
        captures: Vec<Option<RuleId>>,
        content_name: Option<String>,
        resolved_end: Option<String>,
    },
    Match {
        captures: Vec<Option<RuleId>>,
    },
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn tokenize_string(
    ctx: &mut TokenizerContext<'_>,
    line: &str,
    is_first_line: bool,
    line_pos: usize,
    stack: StateStack,
    tokens: &mut LineTokens<'_>,
    check_while_conditions: bool,
    time_limit: Option<Duration>,
) -> TokenizeStringResult {
    let mut tokenizer = LineTokenizer {
        ctx,
        tokens,
        line,
        is_first_line,
        line_pos,
        stack,
        anchor_position: -1,
        stop: false,
    };
    tokenizer.scan(check_while_conditions, time_limit)
}

struct LineTokenizer<'t, 'g, 'a> {
    ctx: &'t mut TokenizerContext<'g>,
    tokens: &'t mut LineTokens<'a>,
    line: &'t str,
    is_first_line: bool,
    line_pos: usize,
    stack: StateStack,
    anchor_position: isize,
    stop: bool,
}

impl LineTokenizer<'_, '_, '_> {
    fn scan(
        &mut self,
        check_while_conditions: bool,
        time_limit: Option<Duration>,
    ) -> TokenizeStringResult {
        if check_while_conditions {
            self.check_while_conditions();
        }

        let started = Instant::now();
        while !self.stop {
            if time_limit.is_some_and(|limit| started.elapsed() >= limit) {
                tracing::debug!(
                    "Tokenizing stopped early at byte {} of {}",
                    self.line_pos,
                    self.line.len()
                );
                return TokenizeStringResult {
                    stack: self.stack.clone(),
                    stopped_early: true,
                };
            }
            self.scan_next();
        }

        TokenizeStringResult {
            stack: self.stack.clone(),
            stopped_early: false,
        }
    }

    fn finish_line(&mut self) {
        self.tokens.produce(&self.stack, self.line.len());
        self.stop = true;
    }

    fn scan_next(&mut self) {
        let Some(found) = self.match_rule_or_injections() else {
            self.finish_line();
            return;
        };

        let Some(whole) = found.captures.first().copied() else {
            self.finish_line();
            return;
        };
        let has_advanced = whole.end > self.line_pos;

        if found.rule_id == RuleId::END_RULE {
            let end_captures = match self.ctx.graph.get(self.stack.rule_id()).map(|r| &r.kind) {
                Some(RuleKind::BeginEnd(rule)) => rule.end_captures.clone(),
                _ => Vec::new(),
            };

            self.tokens.produce(&self.stack, whole.start);
            self.stack = self
                .stack
                .with_content_name_scopes(self.stack.name_scopes().clone());
            handle_captures(
                self.ctx,
                self.tokens,
                self.line,
                self.is_first_line,
                &self.stack,
                &end_captures,
                &found.captures,
            );
            self.tokens.produce(&self.stack, whole.end);

            let popped = self.stack.clone();
            self.stack = popped.safe_pop();
            self.anchor_position = popped.anchor_pos();

            if !has_advanced && popped.enter_pos() == self.line_pos as isize {
                tracing::debug!("Grammar pushed and popped rule {} without advancing", popped.rule_id());
                self.stack = popped;
                self.finish_line();
                return;
            }
        } else {
            let Some(rule) = self.ctx.graph.get(found.rule_id) else {
                self.finish_line();
                return;
            };

            let scope_name = rule.name(Some(self.line), Some(found.captures.as_slice()));
            let matched = match &rule.kind {
                RuleKind::BeginEnd(begin_end) => Matched::Push {
                    captures: begin_end.begin_captures.clone(),
                    content_name: rule.content_name(Some(self.line), Some(found.captures.as_slice())),
                    resolved_end: begin_end.end.has_back_references().then(|| {
                        begin_end
                            .end
                            .resolve_back_references(self.line, &found.captures)
                    }),
                },
                RuleKind::BeginWhile(begin_while) => Matched::Push {
                    captures: begin_while.begin_captures.clone(),
                    content_name: rule.content_name(Some(self.line), Some(found.captures.as_slice())),
                    resolved_end: begin_while.while_.has_back_references().then(|| {
                        begin_while
                            .while_
                            .resolve_back_references(self.line, &found.captures)
                    }),
                },
                RuleKind::Match(matched) => Matched::Match {
                    captures: matched.captures.clone(),
                },
                RuleKind::IncludeOnly(_) | RuleKind::Capture(_) => Matched::Match {
                    captures: Vec::new(),
                },
            };

            self.tokens.produce(&self.stack, whole.start);

            let before_push = self.stack.clone();
            let name_scopes = self
                .stack
                .content_name_scopes()
                .push_attributed(scope_name.as_deref(), self.ctx.provider);
            self.stack = self.stack.push(
                found.rule_id,
                self.line_pos as isize,
                self.anchor_position,
                whole.end == self.line.len(),
                None,
                name_scopes.clone(),
                name_scopes.clone(),
            );

            match matched {
                Matched::Push {
                    captures,
                    content_name,
                    resolved_end,
                } => {
                    handle_captures(
                        self.ctx,
                        self.tokens,
                        self.line,
                        self.is_first_line,
                        &self.stack,
                        &captures,
                        &found.captures,
                    );
                    self.tokens.produce(&self.stack, whole.end);
                    self.anchor_position = whole.end as isize;

                    let content_name_scopes =
                        name_scopes.push_attributed(content_name.as_deref(), self.ctx.provider);
                    self.stack = self.stack.with_content_name_scopes(content_name_scopes);
                    if let Some(resolved_end) = resolved_end {
                        self.stack = self.stack.with_end_rule(resolved_end);
                    }

                    if !has_advanced && before_push.has_same_rule_as(&self.stack) {
                        tracing::debug!(
                            "Grammar pushed rule {} again without advancing",
                            found.rule_id
                        );
                        self.stack = self.stack.safe_pop();
                        self.finish_line();
                        return;
                    }
                }
                Matched::Match { captures } => {
                    handle_captures(
                        self.ctx,
                        self.tokens,
                        self.line,
                        self.is_first_line,
                        &self.stack,
                        &captures,
                        &found.captures,
                    );
                    self.tokens.produce(&self.stack, whole.end);

                    // Match rules never stay on the stack
                    self.stack = self.stack.safe_pop();

                    if !has_advanced {
                        tracing::debug!(
                            "Grammar matched rule {} without advancing or changing the stack",
                            found.rule_id
                        );
                        self.stack = self.stack.safe_pop();
                        self.finish_line();
                        return;
                    }
                }
            }
        }

        if whole.end > self.line_pos {
            self.line_pos = whole.end;
            self.is_first_line = false;
        }
    }

    fn allow_g(&self) -> bool {
        self.line_pos as isize == self.anchor_position
    }

    fn match_rule(&mut self) -> Option<MatchResult> {
        let allow_g = self.allow_g();
        let compiled = self.ctx.graph.compile(
            self.stack.rule_id(),
            self.stack.end_rule(),
            self.is_first_line,
            allow_g,
        )?;
        let found = compiled.scanner.find_next_match(self.line, self.line_pos)?;
        Some(MatchResult {
            rule_id: *compiled.rules.get(found.index)?,
            captures: found.captures,
            is_priority_match: false,
        })
    }

    fn match_injections(&mut self) -> Option<MatchResult> {
        let allow_g = self.allow_g();
        let scopes = self.stack.content_name_scopes().scope_names();
        let injections = self.ctx.injections;

        // Lowest start wins. On equal starts a later injection replaces the
        // earlier one, unless the earlier one already matched at `line_pos`.
        let mut best: Option<(usize, MatchResult)> = None;
        for injection in injections {
            if !injection.selector.matches(&scopes) {
                continue;
            }

            let Some(compiled) =
                self.ctx
                    .graph
                    .compile(injection.rule_id, None, self.is_first_line, allow_g)
            else {
                continue;
            };
            let Some(found) = compiled.scanner.find_next_match(self.line, self.line_pos) else {
                continue;
            };
            let Some(rating) = found.captures.first().map(|whole| whole.start) else {
                continue;
            };
            if best.as_ref().is_some_and(|(best_rating, _)| rating > *best_rating) {
                continue;
            }
            let Some(&rule_id) = compiled.rules.get(found.index) else {
                continue;
            };

            best = Some((
                rating,
                MatchResult {
                    captures: found.captures,
                    rule_id,
                    is_priority_match: injection.priority == -1,
                },
            ));
            if rating == self.line_pos {
                break;
            }
        }

        best.map(|(_, result)| result)
    }

    fn match_rule_or_injections(&mut self) -> Option<MatchResult> {
        let match_result = self.match_rule();
        if self.ctx.injections.is_empty() {
            return match_result;
        }

        let Some(injection_result) = self.match_injections() else {
            return match_result;
        };
        let Some(match_result) = match_result else {
            return Some(injection_result);
        };

        let match_start = match_result.captures.first().map_or(usize::MAX, |c| c.start);
        let injection_start = injection_result
            .captures
            .first()
            .map_or(usize::MAX, |c| c.start);

        if injection_start < match_start
            || (injection_result.is_priority_match && injection_start == match_start)
        {
            return Some(injection_result);
        }
        Some(match_result)
    }

    /// Re-check every begin/while frame bottom-up; the first failure cuts the
    /// stack back to that frame's parent
    fn check_while_conditions(&mut self) {
        let mut anchor_position: isize = if self.stack.begin_rule_captured_eol() {
            0
        } else {
            -1
        };

        let mut while_frames = Vec::new();
        let mut node = Some(self.stack.clone());
        while let Some(frame) = node {
            if let Some(RuleKind::BeginWhile(_)) = self.ctx.graph.get(frame.rule_id()).map(|r| &r.kind) {
                while_frames.push(frame.clone());
            }
            node = frame.pop();
        }

        for frame in while_frames.iter().rev() {
            let allow_g = anchor_position == self.line_pos as isize;
            let found = self
                .ctx
                .graph
                .compile_while(frame.rule_id(), frame.end_rule(), self.is_first_line, allow_g)
                .and_then(|compiled| {
                    let found = compiled.scanner.find_next_match(self.line, self.line_pos)?;
                    Some((compiled.rules.get(found.index).copied(), found))
                });

            let found = match found {
                Some((Some(RuleId::WHILE_RULE), found)) => found,
                _ => {
                    self.stack = frame.safe_pop();
                    break;
                }
            };
            let Some(whole) = found.captures.first().copied() else {
                continue;
            };

            let while_captures = match self.ctx.graph.get(frame.rule_id()).map(|r| &r.kind) {
                Some(RuleKind::BeginWhile(rule)) => rule.while_captures.clone(),
                _ => Vec::new(),
            };

            self.tokens.produce(frame, whole.start);
            handle_captures(
                self.ctx,
                self.tokens,
                self.line,
                self.is_first_line,
                frame,
                &while_captures,
                &found.captures,
            );
            self.tokens.produce(frame, whole.end);

            anchor_position = whole.end as isize;
            if whole.end > self.line_pos {
                self.line_pos = whole.end;
                self.is_first_line = false;
            }
        }

        self.anchor_position = anchor_position;
    }
}

/// Produce tokens for the capture groups of a match
///
/// Captures may nest; a local stack keeps the scopes of captures that are
/// still open. Captures whose rule has patterns are tokenized again with
/// those patterns, limited to the captured text.
fn handle_captures(
    ctx: &mut TokenizerContext<'_>,
    tokens: &mut LineTokens<'_>,
    line: &str,
    is_first_line: bool,
    stack: &StateStack,
    captures: &[Option<RuleId>],
    indices: &[CaptureIndex],
) {
    let Some(max_end) = indices.first().map(|whole| whole.end) else {
        return;
    };
    let len = captures.len().min(indices.len());
    let mut local_stack: Vec<(AttributedScopeStack, usize)> = Vec::new();

    for (capture, index) in captures[..len].iter().zip(&indices[..len]) {
        let Some(capture_id) = *capture else {
            continue;
        };
        if index.is_empty() {
            continue;
        }
        if index.start > max_end {
            break;
        }

        while let Some((scopes, end)) = local_stack.last() {
            if *end > index.start {
                break;
            }
            tokens.produce_from_scopes(scopes, *end);
            local_stack.pop();
        }

        match local_stack.last() {
            Some((scopes, _)) => tokens.produce_from_scopes(scopes, index.start),
            None => tokens.produce(stack, index.start),
        }

        let Some(rule) = ctx.graph.get(capture_id) else {
            continue;
        };
        let name = rule.name(Some(line), Some(indices));
        let retokenize = match &rule.kind {
            RuleKind::Capture(capture) => capture.retokenize_captured_with,
            _ => None,
        };

        if let Some(retokenize) = retokenize {
            let content_name = rule.content_name(Some(line), Some(indices));
            let name_scopes = stack
                .content_name_scopes()
                .push_attributed(name.as_deref(), ctx.provider);
            let content_name_scopes =
                name_scopes.push_attributed(content_name.as_deref(), ctx.provider);
            let pushed = stack.push(
                retokenize,
                index.start as isize,
                -1,
                false,
                None,
                name_scopes,
                content_name_scopes,
            );

            let captured_line = line.get(..index.end).unwrap_or(line);
            tokenize_string(
                ctx,
                captured_line,
                is_first_line && index.start == 0,
                index.start,
                pushed,
                tokens,
                false,
                None,
            );
            continue;
        }

        if let Some(name) = name {
            let base = local_stack
                .last()
                .map_or(stack.content_name_scopes(), |(scopes, _)| scopes);
            let scopes = base.push_attributed(Some(name.as_str()), ctx.provider);
            local_stack.push((scopes, index.end));
        }
    }

    while let Some((scopes, end)) = local_stack.pop() {
        tokens.produce_from_scopes(&scopes, end);
    }
}
