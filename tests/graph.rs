use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use adaptive::*;
use assert_call::{call, CallRecorder};

/// A node that clamps the sum of its inputs and reports whether the result changed.
struct Sum {
    header: NodeHeader,
    name: &'static str,
    inputs: Vec<Adaptive<i32>>,
    max: i32,
    last: Cell<i32>,
    this: Weak<Sum>,
}
impl Sum {
    fn new(name: &'static str, inputs: Vec<Adaptive<i32>>, max: i32) -> Rc<Self> {
        let level = inputs.iter().map(|i| i.header().level() + 1).max();
        let node = Rc::new_cyclic(|this| Self {
            header: NodeHeader::with_level(level.unwrap_or(0)),
            name,
            inputs,
            max,
            last: Cell::new(0),
            this: this.clone(),
        });
        node.last.set(node.eval());
        node
    }
    fn eval(self: &Rc<Self>) -> i32 {
        let token = AdaptiveToken::top().with_caller(self.clone());
        let sum: i32 = self.inputs.iter().map(|i| i.get(&token)).sum();
        self.header.set_out_of_date(false);
        sum.min(self.max)
    }
}
impl AdaptiveObject for Sum {
    fn header(&self) -> &NodeHeader {
        &self.header
    }
    fn mark(&self) -> Result<MarkOutcome> {
        let Some(this) = self.this.upgrade() else {
            return Ok(MarkOutcome::Stable);
        };
        let value = this.eval();
        call!("{}={}", self.name, value);
        let changed = self.last.replace(value) != value;
        Ok(MarkOutcome::from_is_changed(changed))
    }
}

#[test]
fn stable_value_stops_propagation() {
    let mut cr = CallRecorder::new();
    let ctx = EvaluationContext::new();
    let a = ValueCell::new(20);
    let s = Sum::new("s", vec![a.to_adaptive()], 10);
    let observer = Sum::new("observer", vec![], 100);
    observer.header().raise_level(2);
    let observer_object: Rc<dyn AdaptiveObject> = observer.clone();
    s.header().add_output(&observer_object);

    let stats = ctx
        .transact(|tx| {
            a.set(tx, 30);
        })
        .unwrap();
    cr.verify("s=10");
    assert_eq!(stats.processed, 2);
    assert!(!s.header().is_out_of_date());
    assert!(s.header().has_outputs());

    let stats = ctx
        .transact(|tx| {
            a.set(tx, 5);
        })
        .unwrap();
    cr.verify(["s=5", "observer=0"]);
    assert_eq!(stats.processed, 3);
}

#[test]
fn failing_mark_aborts_commit() {
    struct Failing(NodeHeader);
    impl AdaptiveObject for Failing {
        fn header(&self) -> &NodeHeader {
            &self.0
        }
        fn mark(&self) -> Result<MarkOutcome> {
            Err(Error::evaluation("broken"))
        }
    }

    let ctx = EvaluationContext::new();
    let v = ValueCell::new(1);
    let d = v.map(|x| x * 2);
    assert_eq!(d.get(&AdaptiveToken::top()), 2);
    let node: Rc<dyn AdaptiveObject> = Rc::new(Failing(NodeHeader::with_level(1)));
    v.with(&AdaptiveToken::top().with_caller(node.clone()), |_| ());

    let e = ctx
        .transact(|tx| {
            v.set(tx, 2);
        })
        .unwrap_err();
    assert_eq!(e.to_string(), "evaluation failed: broken");
    assert!(std::error::Error::source(&e).is_some());
    assert_eq!(ctx.running_transaction(), None);
    assert!(d.header().is_out_of_date());

    // retry without reading in between
    ctx.transact(|tx| {
        v.set(tx, 3);
    })
    .unwrap();
    assert_eq!(d.get(&AdaptiveToken::top()), 6);

    let stats = ctx
        .transact(|tx| {
            v.set(tx, 4);
        })
        .unwrap();
    assert_eq!(stats.processed, 2);
    assert_eq!(d.get(&AdaptiveToken::top()), 8);
}

/// A node that reads `deep` only once `source` exceeds 1.
struct Eager {
    header: NodeHeader,
    source: Adaptive<i32>,
    deep: Adaptive<i32>,
    honors_level_raise: bool,
    value: Cell<i32>,
    this: Weak<Eager>,
}
impl Eager {
    fn new(source: Adaptive<i32>, deep: Adaptive<i32>, honors_level_raise: bool) -> Rc<Self> {
        let node = Rc::new_cyclic(|this| Self {
            header: NodeHeader::with_level(source.header().level() + 1),
            source,
            deep,
            honors_level_raise,
            value: Cell::new(0),
            this: this.clone(),
        });
        let (value, _) = node.eval();
        node.value.set(value);
        node
    }
    fn eval(self: &Rc<Self>) -> (i32, Option<Level>) {
        let token = AdaptiveToken::top().with_caller(self.clone());
        let source = self.source.get(&token);
        let value = if source > 1 {
            source + self.deep.get(&token)
        } else {
            source
        };
        self.header.set_out_of_date(false);
        (value, token.level_raised())
    }
}
impl AdaptiveObject for Eager {
    fn header(&self) -> &NodeHeader {
        &self.header
    }
    fn mark(&self) -> Result<MarkOutcome> {
        let Some(this) = self.this.upgrade() else {
            return Ok(MarkOutcome::Stable);
        };
        let (value, level_raised) = this.eval();
        if let (true, Some(level)) = (self.honors_level_raise, level_raised) {
            return Ok(MarkOutcome::LevelTooLow(level));
        }
        call!("{}", value);
        Ok(MarkOutcome::from_is_changed(self.value.replace(value) != value))
    }
}

fn switch_to_deeper_input(honors_level_raise: bool) -> (Rc<Eager>, CommitStats) {
    let ctx = EvaluationContext::new();
    let v = ValueCell::new(1);
    let deep = v.map(|x| x + 1).map(|x| x + 1).map(|x| x + 1);
    assert_eq!(deep.get(&AdaptiveToken::top()), 4);
    let e = Eager::new(v.to_adaptive(), deep.clone(), honors_level_raise);
    assert_eq!(e.header().level(), 1);

    let stats = ctx
        .transact(|tx| {
            v.set(tx, 5);
        })
        .unwrap();
    assert_eq!(e.header().level(), 4);
    assert_eq!(e.value.get(), 13);
    (e, stats)
}

#[test]
fn deeper_input_read_while_marking_is_renegotiated() {
    let mut cr = CallRecorder::new();
    let (_e, stats) = switch_to_deeper_input(true);
    cr.verify("13");
    assert_eq!(stats.renegotiations, 1);
    assert_eq!(stats.processed, 5);
}

#[test]
fn deeper_input_read_while_marking_is_renegotiated_without_node_support() {
    let mut cr = CallRecorder::new();
    let (_e, stats) = switch_to_deeper_input(false);
    // the first value used the deeper input before it was processed
    cr.verify(["9", "13"]);
    assert_eq!(stats.renegotiations, 1);
}

#[test]
fn indirect_output_follows_target() {
    let mut cr = CallRecorder::new();
    let ctx = EvaluationContext::new();
    let v = ValueCell::new(1);
    let s = Sum::new("s", vec![], 100);

    let target: Rc<dyn AdaptiveObject> = s.clone();
    let proxy = IndirectOutput::new(&target);
    v.get(&proxy.token());
    assert!(s.header().level() > v.header().level());

    ctx.transact(|tx| {
        v.set(tx, 2);
    })
    .unwrap();
    cr.verify("s=0");

    drop(target);
    drop(s);
    v.get(&proxy.token());
    let stats = ctx
        .transact(|tx| {
            v.set(tx, 3);
        })
        .unwrap();
    assert_eq!(stats.released, 1);
    assert!(proxy.is_released());
    cr.verify(());
}

#[test]
fn deep_graph_evaluates_in_level_order() {
    let mut cr = CallRecorder::new();
    let ctx = EvaluationContext::new();
    let v = ValueCell::new(1);
    let mut layer = vec![v.to_adaptive()];
    for _ in 0..5 {
        let prev = layer.clone();
        layer = (0..3)
            .map(|i| prev[i % prev.len()].map(|x| x + 1))
            .collect();
    }
    let top = layer[0].map2(&layer[2], |x, y| x + y);
    assert_eq!(top.header().level(), 6);

    let top0 = top.clone();
    let _e = effect(move |t| call!("{}", top0.get(t)));
    cr.verify("12");

    let stats = ctx
        .transact(|tx| {
            v.set(tx, 10);
        })
        .unwrap();
    cr.verify("30");
    assert_eq!(stats.finalizers, 1);
}

#[test]
fn nested_commit_from_finalizer_is_rejected() {
    let ctx = EvaluationContext::new();
    let result = Rc::new(RefCell::new(None));
    let mut tx = ctx.transaction();
    let id = tx.id();
    let (ctx0, result0) = (ctx.clone(), result.clone());
    tx.add_finalizer(move || {
        *result0.borrow_mut() = Some(ctx0.transact(|_| {}).map(|_| ()));
    });
    tx.commit().unwrap();

    let e = result.borrow_mut().take().unwrap().unwrap_err();
    assert_eq!(
        e.to_string(),
        format!("{id} is already committing on this evaluation context")
    );
}
