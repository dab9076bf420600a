use std::{cell::RefCell, rc::Rc};

use derive_ex::derive_ex;

use crate::core::{AdaptiveObject, AdaptiveToken, NodeHeader, NodeKey};

mod bind;
mod map;


/// A node that produces a value of type `T`.
pub trait AdaptiveValue<T>: AdaptiveObject {
    /// Returns the current value and registers `token`'s caller as a dependent.
    fn get_value(self: Rc<Self>, token: &AdaptiveToken) -> T;

    fn as_object(self: Rc<Self>) -> Rc<dyn AdaptiveObject>;
}

/// Read-only handle to a node of the dependency graph.
#[derive_ex(Clone, bound())]
pub struct Adaptive<T: 'static>(Rc<dyn AdaptiveValue<T>>);

impl<T: 'static> Adaptive<T> {
    pub fn from_node(node: Rc<dyn AdaptiveValue<T>>) -> Self {
        Self(node)
    }

    /// Creates a node whose value never changes.
    pub fn constant(value: T) -> Self
    where
        T: Clone,
    {
        Self(Rc::new(ConstantNode {
            header: NodeHeader::constant(),
            value,
        }))
    }

    /// Gets the current value and adds a dependency on this node to `token`'s caller.
    pub fn get(&self, token: &AdaptiveToken) -> T {
        self.0.clone().get_value(token)
    }

    /// Creates a node whose value is `f` applied to the value of this node.
    ///
    /// The value is computed when it is read and cached until this node changes.
    pub fn map<U: Clone + 'static>(&self, f: impl Fn(T) -> U + 'static) -> Adaptive<U> {
        map::map(self.clone(), f)
    }

    /// Creates a node whose value is `f` applied to the values of two nodes.
    pub fn map2<U: 'static, R: Clone + 'static>(
        &self,
        other: &Adaptive<U>,
        f: impl Fn(T, U) -> R + 'static,
    ) -> Adaptive<R> {
        map::map2(self.clone(), other.clone(), f)
    }

    /// Creates a node that reads the node returned by `f`.
    ///
    /// `f` is called again only when this node changes. The dependency on the node returned by the
    /// previous call is dropped.
    pub fn bind<U: 'static>(&self, f: impl Fn(T) -> Adaptive<U> + 'static) -> Adaptive<U> {
        bind::bind(self.clone(), f)
    }

    pub fn header(&self) -> &NodeHeader {
        self.0.header()
    }
    pub fn node(&self) -> Rc<dyn AdaptiveObject> {
        self.0.clone().as_object()
    }
    pub fn key(&self) -> NodeKey {
        NodeKey::of_ptr(Rc::as_ptr(&self.0))
    }
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T: 'static> std::fmt::Debug for Adaptive<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Adaptive").field(self.header()).finish()
    }
}

struct ConstantNode<T> {
    header: NodeHeader,
    value: T,
}
impl<T: 'static> AdaptiveObject for ConstantNode<T> {
    fn header(&self) -> &NodeHeader {
        &self.header
    }
}
impl<T: Clone + 'static> AdaptiveValue<T> for ConstantNode<T> {
    fn get_value(self: Rc<Self>, token: &AdaptiveToken) -> T {
        token.register(&*self);
        self.value.clone()
    }
    fn as_object(self: Rc<Self>) -> Rc<dyn AdaptiveObject> {
        self
    }
}

/// Reads a cached value, recomputing it with `compute` if `node` is out-of-date.
fn get_cached<N, T>(
    node: &Rc<N>,
    cache: &RefCell<Option<T>>,
    token: &AdaptiveToken,
    compute: impl FnOnce(&AdaptiveToken) -> T,
) -> T
where
    N: AdaptiveObject,
    T: Clone,
{
    let header = node.header();
    let cached = if header.is_out_of_date() {
        None
    } else {
        cache.borrow().clone()
    };
    let value = match cached {
        Some(value) => value,
        None => {
            let this: Rc<dyn AdaptiveObject> = node.clone();
            let value = compute(&token.with_caller(this));
            *cache.borrow_mut() = Some(value.clone());
            header.set_out_of_date(false);
            value
        }
    };
    token.register(&**node);
    value
}
