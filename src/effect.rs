use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use crate::{
    core::{AdaptiveObject, AdaptiveToken, NodeHeader, Transaction},
    Result,
};


/// Calls `f` now and again after every commit that changes a value `f` read.
///
/// `f` runs as a finalizer of the committing transaction, so it must not commit transactions
/// on the same context.
/// Dropping the returned [`Effect`] stops the calls.
pub fn effect(f: impl FnMut(&AdaptiveToken) + 'static) -> Effect {
    let node = Rc::new_cyclic(|this| EffectNode {
        header: NodeHeader::new(),
        f: RefCell::new(Box::new(f)),
        this: this.clone(),
        scheduled: Cell::new(false),
    });
    node.run();
    Effect(node)
}

/// Handle of a node created by [`effect`].
pub struct Effect(Rc<EffectNode>);

impl Effect {
    pub fn header(&self) -> &NodeHeader {
        &self.0.header
    }
}
impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Effect").field(&self.0.header).finish()
    }
}

struct EffectNode {
    header: NodeHeader,
    f: RefCell<Box<dyn FnMut(&AdaptiveToken)>>,
    this: Weak<EffectNode>,
    scheduled: Cell<bool>,
}

impl EffectNode {
    fn run(self: &Rc<Self>) {
        self.scheduled.set(false);
        let token = AdaptiveToken::top().with_caller(self.clone());
        let mut f = self.f.borrow_mut();
        f(&token);
        self.header.set_out_of_date(false);
    }
}

impl AdaptiveObject for EffectNode {
    fn header(&self) -> &NodeHeader {
        &self.header
    }
    fn all_inputs_processed(&self, tx: &mut Transaction) -> Result<()> {
        if !self.scheduled.replace(true) {
            let this = self.this.clone();
            tx.add_finalizer(move || {
                if let Some(this) = this.upgrade() {
                    this.run();
                }
            });
        }
        Ok(())
    }
}
