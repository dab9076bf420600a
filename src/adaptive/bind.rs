use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use super::{Adaptive, AdaptiveValue};
use crate::{
    core::{AdaptiveObject, AdaptiveToken, NodeHeader, NodeKey, Transaction},
    Result,
};

pub(super) fn bind<S, T, F>(source: Adaptive<S>, f: F) -> Adaptive<T>
where
    S: 'static,
    T: 'static,
    F: Fn(S) -> Adaptive<T> + 'static,
{
    let header = NodeHeader::with_level(source.header().level() + 1);
    Adaptive::from_node(Rc::new(BindNode {
        header,
        source,
        f,
        inner: RefCell::new(None),
        source_changed: Cell::new(true),
    }))
}

struct BindNode<S: 'static, T: 'static, F> {
    header: NodeHeader,
    source: Adaptive<S>,
    f: F,
    inner: RefCell<Option<Adaptive<T>>>,
    source_changed: Cell<bool>,
}

impl<S, T, F> BindNode<S, T, F>
where
    S: 'static,
    T: 'static,
    F: Fn(S) -> Adaptive<T> + 'static,
{
    fn inner(&self, token: &AdaptiveToken) -> Adaptive<T> {
        if !self.source_changed.get() {
            if let Some(inner) = &*self.inner.borrow() {
                return inner.clone();
            }
        }
        let inner = (self.f)(self.source.get(token));
        self.source_changed.set(false);
        if let Some(old) = self.inner.replace(Some(inner.clone())) {
            if !old.ptr_eq(&inner) {
                old.header().remove_output(self);
            }
        }
        inner
    }
}

impl<S, T, F> AdaptiveObject for BindNode<S, T, F>
where
    S: 'static,
    T: 'static,
    F: Fn(S) -> Adaptive<T> + 'static,
{
    fn header(&self) -> &NodeHeader {
        &self.header
    }
    fn input_changed(&self, _tx: &mut Transaction, input: &Rc<dyn AdaptiveObject>) -> Result<()> {
        if NodeKey::of(&**input) == self.source.key() {
            self.source_changed.set(true);
        }
        Ok(())
    }
}

impl<S, T, F> AdaptiveValue<T> for BindNode<S, T, F>
where
    S: 'static,
    T: 'static,
    F: Fn(S) -> Adaptive<T> + 'static,
{
    fn get_value(self: Rc<Self>, token: &AdaptiveToken) -> T {
        let this: Rc<dyn AdaptiveObject> = self.clone();
        let inner_token = token.with_caller(this);
        let value = self.inner(&inner_token).get(&inner_token);
        self.header.set_out_of_date(false);
        token.register(&*self);
        value
    }
    fn as_object(self: Rc<Self>) -> Rc<dyn AdaptiveObject> {
        self
    }
}
