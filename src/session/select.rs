//! Transition selection, conflict resolution and exit/entry set computation.
//!
//! Everything here is a pure function of the document, the active
//! configuration and the history table. The [`Selector`] borrows all three
//! and never mutates them; the interpreter applies the results.

use super::error::SessionError;
use crate::builder::{Document, TransitionNode, TransitionType};
use crate::core::{Event, HistoryKind, HistoryTable, OrderedSet, StateId, TransitionId};
use std::collections::BTreeMap;

/// States to enter for a set of transitions.
#[derive(Debug, Default)]
pub(crate) struct EntrySet {
    pub states: OrderedSet<StateId>,
    /// Compound states entered through their default initial transition.
    pub default_entry: OrderedSet<StateId>,
    /// History default content to run when the keyed home state is entered.
    pub history_content: BTreeMap<StateId, TransitionId>,
}

pub(crate) struct Selector<'a, D> {
    doc: &'a Document<D>,
    configuration: &'a OrderedSet<StateId>,
    history: &'a HistoryTable,
}

impl<'a, D> Selector<'a, D> {
    pub fn new(
        doc: &'a Document<D>,
        configuration: &'a OrderedSet<StateId>,
        history: &'a HistoryTable,
    ) -> Self {
        Self {
            doc,
            configuration,
            history,
        }
    }

    /// Targets with every history pseudo-state replaced by what it stands
    /// for: its record when one exists, otherwise its default targets.
    pub fn effective_targets(&self, transition: TransitionId) -> OrderedSet<StateId> {
        let mut targets = OrderedSet::new();
        self.collect_effective(self.doc.transition(transition).targets(), &mut targets);
        targets
    }

    fn collect_effective(&self, states: &[StateId], out: &mut OrderedSet<StateId>) {
        for &state in states {
            if !self.doc.is_history(state) {
                out.insert(state);
                continue;
            }
            match self.history.get(state) {
                Some(recorded) => out.union(recorded.iter().copied()),
                None => {
                    if let Some(default) = self.history_default(state) {
                        self.collect_effective(self.doc.transition(default).targets(), out);
                    }
                }
            }
        }
    }

    fn history_default(&self, history: StateId) -> Option<TransitionId> {
        self.doc.node(history).transitions().first().copied()
    }

    /// The state whose descendants a transition exits and re-enters.
    /// `None` for a transition with no effective targets.
    pub fn domain(&self, transition: TransitionId) -> Option<StateId> {
        let node = self.doc.transition(transition);
        let targets = self.effective_targets(transition);
        if targets.is_empty() {
            return None;
        }

        let source = node.source();
        if node.kind() == TransitionType::Internal
            && self.doc.is_compound(source)
            && targets.iter().all(|t| self.doc.is_descendant(*t, source))
        {
            return Some(source);
        }

        let mut states = vec![source];
        states.extend(targets);
        Some(self.lcca(&states))
    }

    /// Least common compound ancestor: the nearest compound ancestor of the
    /// first state that contains all the others, falling back to the root.
    pub fn lcca(&self, states: &[StateId]) -> StateId {
        let Some((head, tail)) = states.split_first() else {
            return StateId::ROOT;
        };
        self.doc
            .proper_ancestors(*head, None)
            .into_iter()
            .filter(|a| self.doc.is_compound_or_root(*a))
            .find(|a| tail.iter().all(|s| self.doc.is_descendant(*s, *a)))
            .unwrap_or(StateId::ROOT)
    }

    /// Active states left when the transitions fire.
    pub fn exit_set(&self, transitions: &[TransitionId]) -> OrderedSet<StateId> {
        let mut exit = OrderedSet::new();
        for &transition in transitions {
            if self.doc.transition(transition).is_targetless() {
                continue;
            }
            if let Some(domain) = self.domain(transition) {
                exit.union(
                    self.configuration
                        .iter()
                        .copied()
                        .filter(|s| self.doc.is_descendant(*s, domain)),
                );
            }
        }
        exit
    }

    /// Drop transitions whose exit sets overlap an earlier pick, unless the
    /// later one comes from a descendant of the earlier one's source, in
    /// which case the later one replaces it.
    pub fn remove_conflicts(&self, enabled: OrderedSet<TransitionId>) -> OrderedSet<TransitionId> {
        let mut filtered: OrderedSet<TransitionId> = OrderedSet::new();

        for candidate in enabled {
            let exits = self.exit_set(&[candidate]);
            let source = self.doc.transition(candidate).source();
            let mut preempted = false;
            let mut evicted = Vec::new();

            for &accepted in &filtered {
                if !exits.intersects(&self.exit_set(&[accepted])) {
                    continue;
                }
                if self
                    .doc
                    .is_descendant(source, self.doc.transition(accepted).source())
                {
                    evicted.push(accepted);
                } else {
                    preempted = true;
                    break;
                }
            }

            if !preempted {
                for accepted in &evicted {
                    filtered.remove(accepted);
                }
                filtered.insert(candidate);
            }
        }

        filtered
    }

    /// Eventless transitions enabled in the current configuration.
    pub fn select_eventless(
        &self,
        data: &D,
        event: &Event,
    ) -> Result<OrderedSet<TransitionId>, SessionError> {
        self.select(data, event, TransitionNode::is_eventless)
    }

    /// Transitions enabled by `event`.
    pub fn select_for(
        &self,
        data: &D,
        event: &Event,
    ) -> Result<OrderedSet<TransitionId>, SessionError> {
        self.select(data, event, |t| !t.is_eventless() && t.matches(&event.name))
    }

    fn select<F>(
        &self,
        data: &D,
        event: &Event,
        qualifies: F,
    ) -> Result<OrderedSet<TransitionId>, SessionError>
    where
        F: Fn(&TransitionNode<D>) -> bool,
    {
        let mut atomic: Vec<StateId> = self
            .configuration
            .iter()
            .copied()
            .filter(|s| self.doc.is_atomic(*s))
            .collect();
        atomic.sort_by(|a, b| self.doc.document_cmp(*a, *b));

        let mut enabled = OrderedSet::new();
        for state in atomic {
            let mut chain = vec![state];
            chain.extend(self.doc.proper_ancestors(state, None));

            'chain: for level in chain {
                for &transition in self.doc.node(level).transitions() {
                    let node = self.doc.transition(transition);
                    if !qualifies(node) {
                        continue;
                    }
                    let passed = node.check(data, event).map_err(|source| SessionError::Guard {
                        state: self.doc.name(level).to_string(),
                        source,
                    })?;
                    if passed {
                        enabled.insert(transition);
                        break 'chain;
                    }
                }
            }
        }

        Ok(self.remove_conflicts(enabled))
    }

    /// States entered when the transitions fire, with default-entry and
    /// history bookkeeping.
    pub fn entry_set(&self, transitions: &[TransitionId]) -> EntrySet {
        let mut entry = EntrySet::default();
        for &transition in transitions {
            for &target in self.doc.transition(transition).targets() {
                self.add_descendants(target, &mut entry);
            }
            let domain = self.domain(transition);
            for target in self.effective_targets(transition) {
                self.add_ancestors(target, domain, &mut entry);
            }
        }
        entry
    }

    fn add_descendants(&self, state: StateId, entry: &mut EntrySet) {
        if self.doc.is_history(state) {
            let home = self.doc.node(state).parent().unwrap_or(StateId::ROOT);
            match self.history.get(state) {
                Some(recorded) => {
                    for &s in recorded {
                        self.add_descendants(s, entry);
                    }
                    for &s in recorded {
                        self.add_ancestors(s, Some(home), entry);
                    }
                }
                None => {
                    if let Some(default) = self.history_default(state) {
                        entry.history_content.insert(home, default);
                        let targets = self.doc.transition(default).targets();
                        for &s in targets {
                            self.add_descendants(s, entry);
                        }
                        for &s in targets {
                            self.add_ancestors(s, Some(home), entry);
                        }
                    }
                }
            }
            return;
        }

        entry.states.insert(state);

        if self.doc.is_compound(state) {
            entry.default_entry.insert(state);
            if let Some(initial) = self.doc.node(state).initial() {
                let targets = self.doc.transition(initial).targets();
                for &s in targets {
                    self.add_descendants(s, entry);
                }
                for &s in targets {
                    self.add_ancestors(s, Some(state), entry);
                }
            }
        } else if self.doc.is_parallel(state) {
            self.add_regions(state, entry);
        }
    }

    fn add_ancestors(&self, state: StateId, upto: Option<StateId>, entry: &mut EntrySet) {
        for ancestor in self.doc.proper_ancestors(state, upto) {
            entry.states.insert(ancestor);
            if self.doc.is_parallel(ancestor) {
                self.add_regions(ancestor, entry);
            }
        }
    }

    /// Enter every region of a parallel state not already covered.
    fn add_regions(&self, parallel: StateId, entry: &mut EntrySet) {
        for &child in self.doc.node(parallel).children() {
            let covered = entry
                .states
                .any(|s| *s == child || self.doc.is_descendant(*s, child));
            if !covered {
                self.add_descendants(child, entry);
            }
        }
    }

    /// What a history pseudo-state of `home` remembers from the current
    /// configuration.
    pub fn history_snapshot(&self, home: StateId, kind: HistoryKind) -> Vec<StateId> {
        self.configuration
            .iter()
            .copied()
            .filter(|s| match kind {
                HistoryKind::Deep => self.doc.is_atomic(*s) && self.doc.is_descendant(*s, home),
                HistoryKind::Shallow => self.doc.node(*s).parent() == Some(home),
            })
            .collect()
    }

    /// A compound state is done when one of its final children is active; a
    /// parallel state when every region is done.
    pub fn is_in_final_state(&self, state: StateId) -> bool {
        let node = self.doc.node(state);
        if node.is_compound() {
            node.children()
                .iter()
                .any(|c| self.doc.is_final(*c) && self.configuration.contains(c))
        } else if node.is_parallel() {
            node.children().iter().all(|c| self.is_in_final_state(*c))
        } else {
            false
        }
    }
}
