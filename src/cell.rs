use std::{cell::RefCell, rc::Rc};

use derive_ex::derive_ex;
use serde::{Deserialize, Serialize};

use crate::{
    core::{AdaptiveObject, AdaptiveToken, NodeHeader, Transaction},
    Adaptive, AdaptiveValue,
};


/// Similar to `Rc<RefCell<T>>`, but writes are propagated to the nodes that read it.
#[derive_ex(Clone, bound())]
pub struct ValueCell<T: 'static>(Rc<ValueNode<T>>);

impl<T: 'static> ValueCell<T> {
    /// Create a new `ValueCell` with the given initial value.
    pub fn new(value: T) -> Self {
        Self(Rc::new(ValueNode {
            header: NodeHeader::new(),
            value: RefCell::new(value),
        }))
    }

    /// Gets the current value and adds a dependency on this cell to `token`'s caller.
    pub fn get(&self, token: &AdaptiveToken) -> T
    where
        T: Clone,
    {
        self.0.read(token, T::clone)
    }

    /// Calls `f` with a reference to the current value and adds a dependency on this cell to `token`'s caller.
    pub fn with<U>(&self, token: &AdaptiveToken, f: impl FnOnce(&T) -> U) -> U {
        self.0.read(token, f)
    }

    /// Sets the value and, if it differs from the current one, schedules the dependents to be marked
    /// when `tx` commits.
    ///
    /// Returns `true` if the value changed.
    pub fn set(&self, tx: &mut Transaction, value: T) -> bool
    where
        T: PartialEq,
    {
        let mut current = self.0.value.borrow_mut();
        if *current == value {
            return false;
        }
        *current = value;
        drop(current);
        tx.enqueue(self.0.clone());
        true
    }

    /// Sets the value and schedules the dependents to be marked even if the value is unchanged.
    pub fn set_always(&self, tx: &mut Transaction, value: T) {
        *self.0.value.borrow_mut() = value;
        tx.enqueue(self.0.clone());
    }

    /// Modifies the value in place and schedules the dependents to be marked.
    pub fn update(&self, tx: &mut Transaction, f: impl FnOnce(&mut T)) {
        f(&mut self.0.value.borrow_mut());
        tx.enqueue(self.0.clone());
    }

    /// Returns a read-only handle to this cell.
    pub fn to_adaptive(&self) -> Adaptive<T>
    where
        T: Clone,
    {
        Adaptive::from_node(self.0.clone())
    }

    /// Creates a node whose value is `f` applied to the value of this cell.
    pub fn map<U: Clone + 'static>(&self, f: impl Fn(T) -> U + 'static) -> Adaptive<U>
    where
        T: Clone,
    {
        self.to_adaptive().map(f)
    }

    pub fn header(&self) -> &NodeHeader {
        &self.0.header
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ValueCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.value.try_borrow() {
            Ok(value) => std::fmt::Debug::fmt(&*value, f),
            Err(_) => write!(f, "<borrowed>"),
        }
    }
}
impl<T> Serialize for ValueCell<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        match self.0.value.try_borrow() {
            Ok(value) => T::serialize(&*value, serializer),
            Err(_) => Err(serde::ser::Error::custom("borrowed")),
        }
    }
}
impl<'de, T> Deserialize<'de> for ValueCell<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<ValueCell<T>, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        T::deserialize(deserializer).map(|value| ValueCell::new(value))
    }
}

struct ValueNode<T: 'static> {
    header: NodeHeader,
    value: RefCell<T>,
}
impl<T: 'static> ValueNode<T> {
    fn read<U>(&self, token: &AdaptiveToken, f: impl FnOnce(&T) -> U) -> U {
        self.header.set_out_of_date(false);
        token.register(self);
        f(&self.value.borrow())
    }
}

impl<T: 'static> AdaptiveObject for ValueNode<T> {
    fn header(&self) -> &NodeHeader {
        &self.header
    }
}
impl<T: Clone + 'static> AdaptiveValue<T> for ValueNode<T> {
    fn get_value(self: Rc<Self>, token: &AdaptiveToken) -> T {
        self.read(token, T::clone)
    }
    fn as_object(self: Rc<Self>) -> Rc<dyn AdaptiveObject> {
        self
    }
}
