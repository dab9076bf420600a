use std::{
    any::Any,
    cell::{Cell, OnceCell, RefCell},
    rc::{Rc, Weak},
};

use parse_display::Display;

mod indirect;
mod token;
mod transaction;
mod weak_output_set;

pub use indirect::IndirectOutput;
pub use token::AdaptiveToken;
pub use transaction::{
    CommitStats, EvaluationContext, Transaction, TransactionId, TransactionState,
};
pub use weak_output_set::{WeakOutputSet, ARRAY_CAPACITY, COMPACTION_INTERVAL};

use crate::Result;


/// Lower bound of the topological depth of a node.
pub type Level = usize;

/// Highest level a node can be processed at.
///
/// The pending queue keeps one bucket per level up to the highest queued one.
pub const MAX_LEVEL: Level = 1 << 16;

/// Result of [`AdaptiveObject::mark`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub enum MarkOutcome {
    /// The observable value did not change. Propagation along this path stops.
    #[display("stable")]
    Stable,
    /// The observable value may have changed. Dependents are notified.
    #[display("changed")]
    Changed,
    /// An input deeper than the recorded level was discovered.
    ///
    /// The node is re-enqueued at the given level and processed again.
    #[display("level too low (needs {0})")]
    LevelTooLow(Level),
}
impl MarkOutcome {
    pub fn from_is_changed(is_changed: bool) -> Self {
        if is_changed {
            MarkOutcome::Changed
        } else {
            MarkOutcome::Stable
        }
    }
}

/// A node of the dependency graph.
///
/// The hooks are called only by [`Transaction::commit`].
pub trait AdaptiveObject: 'static {
    fn header(&self) -> &NodeHeader;

    /// Called after the node has been flagged out-of-date in the current pass.
    ///
    /// Returns whether propagation should continue to the dependents.
    fn mark(&self) -> Result<MarkOutcome> {
        Ok(MarkOutcome::Changed)
    }

    /// Called right before the node is finally processed in the current pass,
    /// after all of its recorded inputs have been processed.
    fn all_inputs_processed(&self, _tx: &mut Transaction) -> Result<()> {
        Ok(())
    }

    /// Called when a direct input of this node is being marked out-of-date.
    fn input_changed(
        &self,
        _tx: &mut Transaction,
        _input: &Rc<dyn AdaptiveObject>,
    ) -> Result<()> {
        Ok(())
    }

    /// Returns `Some` if this node only forwards notifications to another node.
    fn as_indirect(&self) -> Option<&IndirectOutput> {
        None
    }
}

/// State shared by every [`AdaptiveObject`].
pub struct NodeHeader {
    level: Cell<Level>,
    out_of_date: Cell<bool>,
    constant: bool,
    outputs: RefCell<WeakOutputSet>,
    this: OnceCell<Weak<dyn AdaptiveObject>>,
    tag: RefCell<Option<Rc<dyn Any>>>,
}

impl NodeHeader {
    /// Creates the header of a node that has not been evaluated yet.
    pub fn new() -> Self {
        Self::with_level(0)
    }
    pub fn with_level(level: Level) -> Self {
        Self {
            level: Cell::new(level),
            out_of_date: Cell::new(true),
            constant: false,
            outputs: RefCell::new(WeakOutputSet::new()),
            this: OnceCell::new(),
            tag: RefCell::new(None),
        }
    }

    /// Creates the header of a node whose value never changes.
    pub fn constant() -> Self {
        Self {
            out_of_date: Cell::new(false),
            constant: true,
            ..Self::new()
        }
    }

    pub fn level(&self) -> Level {
        self.level.get()
    }

    /// Raises the level to at least `level`.
    ///
    /// Returns `true` if the level changed.
    pub fn raise_level(&self, level: Level) -> bool {
        if level > self.level.get() {
            self.level.set(level);
            true
        } else {
            false
        }
    }

    pub fn is_out_of_date(&self) -> bool {
        self.out_of_date.get()
    }
    pub fn set_out_of_date(&self, value: bool) {
        self.out_of_date.set(value);
    }

    pub fn is_constant(&self) -> bool {
        self.constant
    }

    pub fn tag(&self) -> Option<Rc<dyn Any>> {
        self.tag.borrow().clone()
    }
    pub fn set_tag(&self, tag: Option<Rc<dyn Any>>) {
        *self.tag.borrow_mut() = tag;
    }

    /// Returns the weak reference to `node` stored by output sets, allocating it on first use.
    pub fn downgrade(node: &Rc<dyn AdaptiveObject>) -> Weak<dyn AdaptiveObject> {
        node.header()
            .this
            .get_or_init(|| Rc::downgrade(node))
            .clone()
    }

    /// Returns the weak self reference if it has already been allocated.
    pub fn weak(&self) -> Option<Weak<dyn AdaptiveObject>> {
        self.this.get().cloned()
    }

    pub fn add_output(&self, node: &Rc<dyn AdaptiveObject>) -> bool {
        self.outputs.borrow_mut().add(node)
    }
    pub fn remove_output(&self, node: &dyn AdaptiveObject) -> bool {
        self.outputs.borrow_mut().remove(node)
    }
    pub fn consume_outputs(&self, buffer: &mut Vec<Rc<dyn AdaptiveObject>>) -> usize {
        self.outputs.borrow_mut().consume(buffer)
    }
    pub fn has_outputs(&self) -> bool {
        !self.outputs.borrow().is_empty()
    }
}
impl Default for NodeHeader {
    fn default() -> Self {
        Self::new()
    }
}
impl std::fmt::Debug for NodeHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHeader")
            .field("level", &self.level.get())
            .field("out_of_date", &self.out_of_date.get())
            .field("constant", &self.constant)
            .finish_non_exhaustive()
    }
}

/// Identity of a node: the address of its allocation.
///
/// A live `Weak` keeps the allocation reserved, so the address cannot be reused while it is held.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Display)]
#[display("#{0}")]
pub struct NodeKey(usize);

impl NodeKey {
    pub fn of(node: &dyn AdaptiveObject) -> Self {
        Self(node as *const dyn AdaptiveObject as *const () as usize)
    }
    pub fn of_weak(node: &Weak<dyn AdaptiveObject>) -> Self {
        Self::of_ptr(node.as_ptr())
    }
    pub fn of_ptr<T: ?Sized>(ptr: *const T) -> Self {
        Self(ptr as *const () as usize)
    }
}

pub fn is_same_node(a: &dyn AdaptiveObject, b: &dyn AdaptiveObject) -> bool {
    NodeKey::of(a) == NodeKey::of(b)
}
