use std::{cell::Cell, mem::take, rc::Rc};

use derive_ex::derive_ex;
use parse_display::Display;

use super::{AdaptiveObject, Level, MarkOutcome, NodeKey, MAX_LEVEL};
use crate::{utils::level_queue::LevelQueue, Error, Result};


/// Identifies a transaction within its [`EvaluationContext`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Display)]
#[display("tx#{0}")]
pub struct TransactionId(u64);

/// Owner of the "currently running transaction".
///
/// Only one transaction created from the same context can commit at a time.
#[derive_ex(Default, Clone)]
#[default(Self::new())]
pub struct EvaluationContext(Rc<ContextData>);

struct ContextData {
    running: Cell<Option<TransactionId>>,
    next_id: Cell<u64>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self(Rc::new(ContextData {
            running: Cell::new(None),
            next_id: Cell::new(0),
        }))
    }

    /// Creates a new transaction in the [`Building`](TransactionState::Building) state.
    pub fn transaction(&self) -> Transaction {
        let id = self.0.next_id.get();
        self.0.next_id.set(id + 1);
        Transaction::new(self.clone(), TransactionId(id))
    }

    /// Creates a transaction, fills it with `f` and commits it.
    pub fn transact(&self, f: impl FnOnce(&mut Transaction)) -> Result<CommitStats> {
        let mut tx = self.transaction();
        f(&mut tx);
        tx.commit()
    }

    /// Returns the transaction currently committing on this context.
    pub fn running_transaction(&self) -> Option<TransactionId> {
        self.0.running.get()
    }

    fn enter(&self, id: TransactionId) -> Result<RunningGuard> {
        if let Some(running) = self.0.running.get() {
            return Err(Error::NestedCommit { running });
        }
        self.0.running.set(Some(id));
        Ok(RunningGuard(self.clone()))
    }
}
impl std::fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("running", &self.0.running.get())
            .finish()
    }
}

struct RunningGuard(EvaluationContext);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0 .0.running.set(None);
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub enum TransactionState {
    Building,
    Committing,
    Done,
}

/// Counters of one propagation pass.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct CommitStats {
    /// Nodes whose `mark` completed in this pass.
    pub processed: usize,
    /// Entries taken from the queue, including stale and duplicate ones.
    pub dequeued: usize,
    /// Times a node was re-enqueued after reporting [`MarkOutcome::LevelTooLow`].
    pub renegotiations: usize,
    /// Indirect outputs released because their target was collected.
    pub released: usize,
    pub finalizers: usize,
}

type Finalizer = Box<dyn FnOnce()>;

/// A batch of writes and the propagation pass that brings dependents up to date.
pub struct Transaction {
    ctx: EvaluationContext,
    id: TransactionId,
    state: TransactionState,
    queue: LevelQueue<Rc<dyn AdaptiveObject>>,
    current: Option<Rc<dyn AdaptiveObject>>,
    finalizers: Vec<Finalizer>,
    outputs: Vec<Rc<dyn AdaptiveObject>>,
    stats: CommitStats,
}

impl Transaction {
    fn new(ctx: EvaluationContext, id: TransactionId) -> Self {
        Self {
            ctx,
            id,
            state: TransactionState::Building,
            queue: LevelQueue::new(),
            current: None,
            finalizers: Vec::new(),
            outputs: Vec::new(),
            stats: CommitStats::default(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }
    pub fn state(&self) -> TransactionState {
        self.state
    }
    pub fn context(&self) -> &EvaluationContext {
        &self.ctx
    }

    /// The node being processed by the commit loop.
    pub fn current(&self) -> Option<&Rc<dyn AdaptiveObject>> {
        self.current.as_ref()
    }

    /// Number of queued entries, counting duplicates.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Schedules `node` to be processed at its current level.
    ///
    /// # Panics
    ///
    /// Panics if the level of `node` is greater than [`MAX_LEVEL`].
    pub fn enqueue(&mut self, node: Rc<dyn AdaptiveObject>) {
        let level = node.header().level();
        self.queue.push(level, node);
    }

    /// Registers a function to be called after the propagation pass has finished.
    ///
    /// Finalizers run in registration order. They are dropped without being called if the pass fails.
    pub fn add_finalizer(&mut self, f: impl FnOnce() + 'static) {
        self.finalizers.push(Box::new(f));
    }

    /// Propagates the changes of the enqueued nodes to their dependents.
    ///
    /// Nodes are processed in non-decreasing level order.
    /// If a hook returns an error, the remaining pass is aborted and the error is returned.
    /// Nodes already processed keep their state. Nodes reached but not processed are flagged
    /// out-of-date together with their dependents.
    pub fn commit(mut self) -> Result<CommitStats> {
        let _running = self.ctx.enter(self.id)?;
        let _span = tracing::debug_span!("commit", id = %self.id).entered();
        self.state = TransactionState::Committing;
        let result = self.propagate();
        if let Err(e) = result {
            tracing::debug!(error = %e, "commit aborted");
            self.abort();
            return Err(e);
        }
        self.current = None;
        let finalizers = take(&mut self.finalizers);
        self.stats.finalizers = finalizers.len();
        for f in finalizers {
            f();
        }
        self.state = TransactionState::Done;
        let stats = take(&mut self.stats);
        tracing::debug!(
            processed = stats.processed,
            renegotiations = stats.renegotiations,
            released = stats.released,
            "commit finished"
        );
        Ok(stats)
    }

    /// Drops the rest of the pass.
    ///
    /// Nodes that were reached but not processed, and everything depending on them, are flagged
    /// out-of-date so that the next read recomputes them.
    fn abort(&mut self) {
        let mut reached = Vec::new();
        if let Some(node) = self.current.take() {
            node.header().consume_outputs(&mut reached);
            reached.push(node);
        }
        while let Some((_, node)) = self.queue.pop() {
            reached.push(node);
        }
        let invalidated = self.invalidate(reached);
        if invalidated > 0 {
            tracing::debug!(invalidated, "nodes of the aborted pass flagged out-of-date");
        }
        self.finalizers.clear();
        self.outputs.clear();
        self.state = TransactionState::Done;
    }

    /// Flags `nodes` and their transitive dependents out-of-date without calling any hook.
    ///
    /// Returns the number of nodes flagged.
    fn invalidate(&mut self, mut nodes: Vec<Rc<dyn AdaptiveObject>>) -> usize {
        let mut count = 0;
        while let Some(node) = nodes.pop() {
            if let Some(indirect) = node.as_indirect() {
                match indirect.target() {
                    Some(target) => nodes.push(target),
                    None => {
                        indirect.release();
                        self.stats.released += 1;
                    }
                }
                continue;
            }
            let header = node.header();
            if header.is_out_of_date() {
                continue;
            }
            header.set_out_of_date(true);
            header.consume_outputs(&mut nodes);
            count += 1;
        }
        count
    }

    fn push(&mut self, level: Level, node: Rc<dyn AdaptiveObject>) -> Result<()> {
        if level > MAX_LEVEL {
            return Err(Error::LevelOverflow { level });
        }
        self.queue.push(level, node);
        Ok(())
    }

    fn propagate(&mut self) -> Result<()> {
        while let Some((level, node)) = self.queue.pop() {
            self.stats.dequeued += 1;
            let header = node.header();
            let current_level = header.level();
            if current_level != level {
                self.push(current_level, node)?;
                continue;
            }
            self.current = Some(node.clone());
            if header.is_out_of_date() {
                node.all_inputs_processed(self)?;
                continue;
            }
            header.set_out_of_date(true);
            node.all_inputs_processed(self)?;
            let outcome = match node.mark()? {
                MarkOutcome::LevelTooLow(proposed) => {
                    MarkOutcome::LevelTooLow(proposed.max(header.level()))
                }
                _ if header.level() > level => {
                    // a deeper input was read while marking; its value may be stale
                    MarkOutcome::LevelTooLow(header.level())
                }
                outcome => outcome,
            };
            match outcome {
                MarkOutcome::Stable => {
                    header.set_out_of_date(false);
                    self.stats.processed += 1;
                    tracing::trace!(node = %NodeKey::of(&*node), level, "stable");
                }
                MarkOutcome::LevelTooLow(proposed) => {
                    assert!(
                        proposed > level,
                        "renegotiated level {proposed} is not above the current level {level}"
                    );
                    header.raise_level(proposed);
                    header.set_out_of_date(false);
                    self.stats.renegotiations += 1;
                    tracing::debug!(
                        node = %NodeKey::of(&*node),
                        from = level,
                        to = proposed,
                        "level renegotiated"
                    );
                    self.push(proposed, node)?;
                }
                MarkOutcome::Changed => {
                    self.stats.processed += 1;
                    tracing::trace!(node = %NodeKey::of(&*node), level, "changed");
                    self.notify_outputs(&node)?;
                }
            }
        }
        Ok(())
    }

    fn notify_outputs(&mut self, node: &Rc<dyn AdaptiveObject>) -> Result<()> {
        let mut outputs = take(&mut self.outputs);
        node.header().consume_outputs(&mut outputs);
        let mut result = Ok(());
        for index in 0..outputs.len() {
            if let Err(e) = self.notify_output(node, outputs[index].clone()) {
                // the failed output and the rest were never enqueued
                self.invalidate(outputs.split_off(index));
                result = Err(e);
                break;
            }
        }
        outputs.clear();
        self.outputs = outputs;
        result
    }

    fn notify_output(
        &mut self,
        input: &Rc<dyn AdaptiveObject>,
        output: Rc<dyn AdaptiveObject>,
    ) -> Result<()> {
        if let Some(indirect) = output.as_indirect() {
            if let Some(target) = indirect.target() {
                target.input_changed(self, &output)?;
                self.push(target.header().level(), target)?;
            } else {
                indirect.release();
                self.stats.released += 1;
                tracing::trace!(proxy = %NodeKey::of(&*output), "indirect output released");
            }
        } else {
            output.input_changed(self, input)?;
            self.push(output.header().level(), output)?;
        }
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Building && !self.queue.is_empty() {
            tracing::warn!(
                id = %self.id,
                pending = self.queue.len(),
                "transaction dropped without commit"
            );
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("pending", &self.queue.len())
            .finish()
    }
}
