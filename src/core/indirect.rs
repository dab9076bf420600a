use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use super::{AdaptiveObject, AdaptiveToken, NodeHeader};

/// An output edge that forwards notifications to another node.
///
/// The real target is held weakly. When a notification arrives after the target has been collected,
/// the proxy is released instead of being enqueued.
pub struct IndirectOutput {
    header: NodeHeader,
    target: RefCell<Option<Weak<dyn AdaptiveObject>>>,
    released: Cell<bool>,
}

impl IndirectOutput {
    pub fn new(target: &Rc<dyn AdaptiveObject>) -> Rc<Self> {
        Rc::new(Self {
            header: NodeHeader::with_level(target.header().level()),
            target: RefCell::new(Some(Rc::downgrade(target))),
            released: Cell::new(false),
        })
    }

    /// Returns the real target if it is still alive.
    pub fn target(&self) -> Option<Rc<dyn AdaptiveObject>> {
        self.target.borrow().as_ref()?.upgrade()
    }

    pub fn is_released(&self) -> bool {
        self.released.get()
    }

    /// Drops the reference to the target. The proxy no longer forwards anything.
    pub fn release(&self) {
        self.target.borrow_mut().take();
        self.released.set(true);
    }

    /// Returns a token whose reads register this proxy as their output.
    pub fn token(self: &Rc<Self>) -> AdaptiveToken {
        AdaptiveToken::top().with_caller(self.clone())
    }
}

impl AdaptiveObject for IndirectOutput {
    fn header(&self) -> &NodeHeader {
        &self.header
    }
    fn as_indirect(&self) -> Option<&IndirectOutput> {
        Some(self)
    }
}
