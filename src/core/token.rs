use std::{cell::Cell, rc::Rc};

use super::{AdaptiveObject, Level, NodeHeader};

/// Context for reading values and tracking dependencies.
///
/// Carries the node currently being evaluated. A node read with a token that has a caller
/// registers the caller as one of its outputs.
#[derive(Clone, Default)]
pub struct AdaptiveToken {
    caller: Option<Rc<dyn AdaptiveObject>>,
    level_raised: Cell<Option<Level>>,
}

impl AdaptiveToken {
    /// Token for reads outside of any node's evaluation. Does not track dependencies.
    pub fn top() -> Self {
        Self::default()
    }

    /// Returns a token for evaluating `caller`.
    pub fn with_caller(&self, caller: Rc<dyn AdaptiveObject>) -> Self {
        Self {
            caller: Some(caller),
            level_raised: Cell::new(None),
        }
    }

    pub fn caller(&self) -> Option<&Rc<dyn AdaptiveObject>> {
        self.caller.as_ref()
    }
    pub fn is_top(&self) -> bool {
        self.caller.is_none()
    }

    /// Records that the caller depends on `source`.
    ///
    /// Adds the caller to the outputs of `source` and raises the caller's level above the level of `source`.
    /// Returns `true` if the caller's level was raised.
    pub fn register(&self, source: &dyn AdaptiveObject) -> bool {
        let Some(caller) = &self.caller else {
            return false;
        };
        let source = source.header();
        if !source.is_constant() {
            source.add_output(caller);
        }
        let level = source.level().saturating_add(1);
        let raised = raise_level(caller.header(), level);
        if raised {
            self.level_raised.set(Some(caller.header().level()));
        }
        if let Some(target) = caller.as_indirect().and_then(|i| i.target()) {
            raise_level(target.header(), level);
        }
        raised
    }

    /// Returns the caller's new level if a read through this token raised it.
    ///
    /// A node evaluating inside [`AdaptiveObject::mark`] has read an input that may not be up to date yet
    /// when this returns `Some`, and should return [`MarkOutcome::LevelTooLow`](super::MarkOutcome::LevelTooLow)
    /// instead of using the value.
    pub fn level_raised(&self) -> Option<Level> {
        self.level_raised.get()
    }
}

fn raise_level(header: &NodeHeader, level: Level) -> bool {
    let raised = header.raise_level(level);
    if raised {
        tracing::trace!(level, "level raised by dependency");
    }
    raised
}

impl std::fmt::Debug for AdaptiveToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.caller {
            Some(caller) => f
                .debug_struct("AdaptiveToken")
                .field("caller", caller.header())
                .finish(),
            None => write!(f, "AdaptiveToken(top)"),
        }
    }
}
