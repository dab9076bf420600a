use std::{cell::RefCell, rc::Rc};

use super::{get_cached, Adaptive, AdaptiveValue};
use crate::core::{AdaptiveObject, AdaptiveToken, NodeHeader};

pub(super) fn map<S, T, F>(source: Adaptive<S>, f: F) -> Adaptive<T>
where
    S: 'static,
    T: Clone + 'static,
    F: Fn(S) -> T + 'static,
{
    let header = NodeHeader::with_level(source.header().level() + 1);
    Adaptive::from_node(Rc::new(MapNode {
        header,
        source,
        f,
        cache: RefCell::new(None),
    }))
}

pub(super) fn map2<S0, S1, T, F>(s0: Adaptive<S0>, s1: Adaptive<S1>, f: F) -> Adaptive<T>
where
    S0: 'static,
    S1: 'static,
    T: Clone + 'static,
    F: Fn(S0, S1) -> T + 'static,
{
    let level = s0.header().level().max(s1.header().level()) + 1;
    Adaptive::from_node(Rc::new(Map2Node {
        header: NodeHeader::with_level(level),
        sources: (s0, s1),
        f,
        cache: RefCell::new(None),
    }))
}

struct MapNode<S: 'static, T, F> {
    header: NodeHeader,
    source: Adaptive<S>,
    f: F,
    cache: RefCell<Option<T>>,
}

impl<S, T, F> AdaptiveObject for MapNode<S, T, F>
where
    S: 'static,
    T: 'static,
    F: Fn(S) -> T + 'static,
{
    fn header(&self) -> &NodeHeader {
        &self.header
    }
}
impl<S, T, F> AdaptiveValue<T> for MapNode<S, T, F>
where
    S: 'static,
    T: Clone + 'static,
    F: Fn(S) -> T + 'static,
{
    fn get_value(self: Rc<Self>, token: &AdaptiveToken) -> T {
        get_cached(&self, &self.cache, token, |token| {
            (self.f)(self.source.get(token))
        })
    }
    fn as_object(self: Rc<Self>) -> Rc<dyn AdaptiveObject> {
        self
    }
}

struct Map2Node<S0: 'static, S1: 'static, T, F> {
    header: NodeHeader,
    sources: (Adaptive<S0>, Adaptive<S1>),
    f: F,
    cache: RefCell<Option<T>>,
}

impl<S0, S1, T, F> AdaptiveObject for Map2Node<S0, S1, T, F>
where
    S0: 'static,
    S1: 'static,
    T: 'static,
    F: Fn(S0, S1) -> T + 'static,
{
    fn header(&self) -> &NodeHeader {
        &self.header
    }
}
impl<S0, S1, T, F> AdaptiveValue<T> for Map2Node<S0, S1, T, F>
where
    S0: 'static,
    S1: 'static,
    T: Clone + 'static,
    F: Fn(S0, S1) -> T + 'static,
{
    fn get_value(self: Rc<Self>, token: &AdaptiveToken) -> T {
        get_cached(&self, &self.cache, token, |token| {
            let (s0, s1) = &self.sources;
            (self.f)(s0.get(token), s1.get(token))
        })
    }
    fn as_object(self: Rc<Self>) -> Rc<dyn AdaptiveObject> {
        self
    }
}
