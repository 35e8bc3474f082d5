//! Rule state carried from one line to the next
//!
//! A [`StateStack`] is an immutable, reference-counted list of active rule
//! frames. Lines share their common prefix. The only mutable parts are the
//! enter and anchor positions, which are scratch values for the line being
//! tokenized and are reset before each top-level call.

use std::fmt;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

use super::scope_stack::AttributedScopeStack;
use crate::rules::RuleId;

#[derive(Clone)]
pub struct StateStack(Arc<Frame>);

struct Frame {
    parent: Option<StateStack>,
    depth: usize,
    rule_id: RuleId,
    enter_pos: AtomicIsize,
    anchor_pos: AtomicIsize,
    begin_rule_captured_eol: bool,
    end_rule: Option<String>,
    name_scopes: AttributedScopeStack,
    content_name_scopes: AttributedScopeStack,
}

impl StateStack {
    /// Bottom frame of a grammar; depth 0
    pub fn root(
        rule_id: RuleId,
        name_scopes: AttributedScopeStack,
        content_name_scopes: AttributedScopeStack,
    ) -> Self {
        Self::new_frame(None, rule_id, -1, -1, false, None, name_scopes, content_name_scopes)
    }

    #[allow(clippy::too_many_arguments)]
    fn new_frame(
        parent: Option<StateStack>,
        rule_id: RuleId,
        enter_pos: isize,
        anchor_pos: isize,
        begin_rule_captured_eol: bool,
        end_rule: Option<String>,
        name_scopes: AttributedScopeStack,
        content_name_scopes: AttributedScopeStack,
    ) -> Self {
        let depth = parent.as_ref().map_or(0, |parent| parent.depth() + 1);
        Self(Arc::new(Frame {
            parent,
            depth,
            rule_id,
            enter_pos: AtomicIsize::new(enter_pos),
            anchor_pos: AtomicIsize::new(anchor_pos),
            begin_rule_captured_eol,
            end_rule,
            name_scopes,
            content_name_scopes,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn push(
        &self,
        rule_id: RuleId,
        enter_pos: isize,
        anchor_pos: isize,
        begin_rule_captured_eol: bool,
        end_rule: Option<String>,
        name_scopes: AttributedScopeStack,
        content_name_scopes: AttributedScopeStack,
    ) -> Self {
        Self::new_frame(
            Some(self.clone()),
            rule_id,
            enter_pos,
            anchor_pos,
            begin_rule_captured_eol,
            end_rule,
            name_scopes,
            content_name_scopes,
        )
    }

    pub fn pop(&self) -> Option<StateStack> {
        self.0.parent.clone()
    }

    /// Parent, or the stack itself when it is the root
    pub fn safe_pop(&self) -> StateStack {
        self.pop().unwrap_or_else(|| self.clone())
    }

    /// Clear the scratch positions of every frame
    pub fn reset(&self) {
        let mut frame = Some(self);
        while let Some(current) = frame {
            current.0.enter_pos.store(-1, Ordering::Relaxed);
            current.0.anchor_pos.store(-1, Ordering::Relaxed);
            frame = current.parent();
        }
    }

    pub fn parent(&self) -> Option<&StateStack> {
        self.0.parent.as_ref()
    }

    pub fn depth(&self) -> usize {
        self.0.depth
    }

    pub fn rule_id(&self) -> RuleId {
        self.0.rule_id
    }

    /// Offset where the frame was pushed on the current line, or -1
    pub fn enter_pos(&self) -> isize {
        self.0.enter_pos.load(Ordering::Relaxed)
    }

    /// End of the begin match on the current line, or -1
    pub fn anchor_pos(&self) -> isize {
        self.0.anchor_pos.load(Ordering::Relaxed)
    }

    pub fn begin_rule_captured_eol(&self) -> bool {
        self.0.begin_rule_captured_eol
    }

    /// End (or while) pattern with back-references resolved
    pub fn end_rule(&self) -> Option<&str> {
        self.0.end_rule.as_deref()
    }

    pub fn name_scopes(&self) -> &AttributedScopeStack {
        &self.0.name_scopes
    }

    pub fn content_name_scopes(&self) -> &AttributedScopeStack {
        &self.0.content_name_scopes
    }

    /// Same frame with different content scopes
    pub fn with_content_name_scopes(&self, content_name_scopes: AttributedScopeStack) -> Self {
        if self.0.content_name_scopes == content_name_scopes {
            return self.clone();
        }
        Self::new_frame(
            self.0.parent.clone(),
            self.0.rule_id,
            self.enter_pos(),
            self.anchor_pos(),
            self.0.begin_rule_captured_eol,
            self.0.end_rule.clone(),
            self.0.name_scopes.clone(),
            content_name_scopes,
        )
    }

    /// Same frame with a resolved end pattern
    pub fn with_end_rule(&self, end_rule: String) -> Self {
        if self.end_rule() == Some(end_rule.as_str()) {
            return self.clone();
        }
        Self::new_frame(
            self.0.parent.clone(),
            self.0.rule_id,
            self.enter_pos(),
            self.anchor_pos(),
            self.0.begin_rule_captured_eol,
            Some(end_rule),
            self.0.name_scopes.clone(),
            self.0.content_name_scopes.clone(),
        )
    }

    pub fn has_same_rule_as(&self, other: &StateStack) -> bool {
        self.0.rule_id == other.0.rule_id
    }

    fn structural_eq(a: Option<&StateStack>, b: Option<&StateStack>) -> bool {
        let mut a = a;
        let mut b = b;
        loop {
            match (a, b) {
                (None, None) => return true,
                (Some(x), Some(y)) => {
                    if Arc::ptr_eq(&x.0, &y.0) {
                        return true;
                    }
                    if x.0.depth != y.0.depth
                        || x.0.rule_id != y.0.rule_id
                        || x.0.end_rule != y.0.end_rule
                    {
                        return false;
                    }
                    a = x.parent();
                    b = y.parent();
                }
                _ => return false,
            }
        }
    }
}

impl PartialEq for StateStack {
    fn eq(&self, other: &Self) -> bool {
        Self::structural_eq(Some(self), Some(other))
            && self.0.content_name_scopes == other.0.content_name_scopes
    }
}

impl Eq for StateStack {}

impl fmt::Display for StateStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids = Vec::with_capacity(self.depth() + 1);
        let mut frame = Some(self);
        while let Some(current) = frame {
            ids.push(format!("({})", current.rule_id()));
            frame = current.parent();
        }
        ids.reverse();
        write!(f, "[{}]", ids.join(", "))
    }
}

impl fmt::Debug for StateStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStack")
            .field("depth", &self.depth())
            .field("rule_id", &self.rule_id())
            .field("end_rule", &self.end_rule())
            .field("content_name_scopes", self.content_name_scopes())
            .finish()
    }
}
