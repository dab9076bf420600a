use std::{any::Any, rc::Rc};

use assert_call::call;

use crate::core::{AdaptiveObject, Level, NodeHeader};

pub fn call_on_drop(s: &'static str) -> impl Any {
    struct OnDrop(&'static str);
    impl Drop for OnDrop {
        fn drop(&mut self) {
            call!("{}", self.0);
        }
    }
    OnDrop(s)
}

/// A node without behavior, used to populate output sets.
pub struct PlainNode {
    header: NodeHeader,
    _on_drop: Option<Box<dyn Any>>,
}
impl PlainNode {
    pub fn new() -> Rc<dyn AdaptiveObject> {
        Self::with_header(NodeHeader::new(), None)
    }
    pub fn with_level(level: Level) -> Rc<dyn AdaptiveObject> {
        Self::with_header(NodeHeader::with_level(level), None)
    }
    pub fn constant() -> Rc<dyn AdaptiveObject> {
        Self::with_header(NodeHeader::constant(), None)
    }
    pub fn with_drop_call(s: &'static str) -> Rc<dyn AdaptiveObject> {
        Self::with_header(NodeHeader::new(), Some(Box::new(call_on_drop(s))))
    }
    fn with_header(header: NodeHeader, on_drop: Option<Box<dyn Any>>) -> Rc<dyn AdaptiveObject> {
        Rc::new(Self {
            header,
            _on_drop: on_drop,
        })
    }
}
impl AdaptiveObject for PlainNode {
    fn header(&self) -> &NodeHeader {
        &self.header
    }
}

pub fn plain_nodes(count: usize) -> Vec<Rc<dyn AdaptiveObject>> {
    (0..count).map(|_| PlainNode::new()).collect()
}
