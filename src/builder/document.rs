//! The resolved, immutable document model.
//!
//! A [`Document`] is an arena of state, transition and invoke nodes addressed
//! by [`StateId`], [`TransitionId`] and [`InvokeId`]. Parent, ancestor,
//! descendant and target links are indices into that arena, computed once
//! by [`DocumentBuilder::build`] and never recomputed at query time.

use super::error::{BuildError, DocumentIssue};
use super::schema::{
    DataInit, InvokeSchema, InvokeSource, StateKind, StateSchema, TransitionSchema, TransitionType,
};
use super::validate;
use crate::content::Command;
use crate::core::{
    entry_order, exit_order, name_matches, DocumentNode, Event, Guard, GuardError, HistoryKind,
    InvokeId, StateId, TransitionId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use stillwater::validation::Validation;

/// Id of the synthetic root container. Authored states may not use it.
pub const ROOT_ID: &str = "$root";

/// Resolved mode of a state node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateMode {
    Atomic,
    Compound,
    Parallel,
    Final,
    History(HistoryKind),
}

/// One node of the state tree.
pub struct StateNode<D> {
    pub(crate) id: String,
    pub(crate) mode: StateMode,
    pub(crate) document_order: u32,
    pub(crate) depth: i32,
    pub(crate) parent: Option<StateId>,
    pub(crate) ancestors: Vec<StateId>,
    pub(crate) descendants: Vec<StateId>,
    pub(crate) children: Vec<StateId>,
    pub(crate) transitions: Vec<TransitionId>,
    pub(crate) invokes: Vec<InvokeId>,
    pub(crate) history: Vec<StateId>,
    pub(crate) on_entry: Vec<Command<D>>,
    pub(crate) on_exit: Vec<Command<D>>,
    pub(crate) initial: Option<TransitionId>,
    pub(crate) done_data: Option<Value>,
}

impl<D> StateNode<D> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> StateMode {
        self.mode
    }

    pub fn parent(&self) -> Option<StateId> {
        self.parent
    }

    /// Ancestors, nearest first, ending at the root.
    pub fn ancestors(&self) -> &[StateId] {
        &self.ancestors
    }

    /// Every state below this one, in document order. History pseudo-states
    /// are not included.
    pub fn descendants(&self) -> &[StateId] {
        &self.descendants
    }

    pub fn children(&self) -> &[StateId] {
        &self.children
    }

    pub fn transitions(&self) -> &[TransitionId] {
        &self.transitions
    }

    pub fn invokes(&self) -> &[InvokeId] {
        &self.invokes
    }

    /// History pseudo-states whose home is this state.
    pub fn history(&self) -> &[StateId] {
        &self.history
    }

    pub fn on_entry(&self) -> &[Command<D>] {
        &self.on_entry
    }

    pub fn on_exit(&self) -> &[Command<D>] {
        &self.on_exit
    }

    /// Default-entry transition of a compound state.
    pub fn initial(&self) -> Option<TransitionId> {
        self.initial
    }

    pub fn done_data(&self) -> Option<&Value> {
        self.done_data.as_ref()
    }

    /// A parallel state is never atomic, whatever its children.
    pub fn is_atomic(&self) -> bool {
        self.descendants.is_empty() && self.mode != StateMode::Parallel
    }

    pub fn is_compound(&self) -> bool {
        self.mode == StateMode::Compound
    }

    pub fn is_parallel(&self) -> bool {
        self.mode == StateMode::Parallel
    }

    pub fn is_final(&self) -> bool {
        self.mode == StateMode::Final
    }

    pub fn history_kind(&self) -> Option<HistoryKind> {
        match self.mode {
            StateMode::History(kind) => Some(kind),
            _ => None,
        }
    }
}

impl<D> DocumentNode for StateNode<D> {
    fn depth(&self) -> i32 {
        self.depth
    }

    fn document_order(&self) -> u32 {
        self.document_order
    }
}

/// One transition, with its targets resolved.
pub struct TransitionNode<D> {
    pub(crate) source: StateId,
    pub(crate) targets: Vec<StateId>,
    pub(crate) events: Vec<String>,
    pub(crate) kind: TransitionType,
    pub(crate) cond: Option<Guard<D>>,
    pub(crate) content: Vec<Command<D>>,
    pub(crate) document_order: u32,
}

impl<D> TransitionNode<D> {
    pub fn source(&self) -> StateId {
        self.source
    }

    pub fn targets(&self) -> &[StateId] {
        &self.targets
    }

    pub fn events(&self) -> &[String] {
        &self.events
    }

    pub fn kind(&self) -> TransitionType {
        self.kind
    }

    pub fn content(&self) -> &[Command<D>] {
        &self.content
    }

    pub fn document_order(&self) -> u32 {
        self.document_order
    }

    pub fn is_eventless(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_targetless(&self) -> bool {
        self.targets.is_empty()
    }

    /// True when one of the transition's patterns matches `name`.
    pub fn matches(&self, name: &str) -> bool {
        name_matches(&self.events, name)
    }

    /// Evaluate the guard. A transition without one is always enabled.
    pub fn check(&self, data: &D, event: &Event) -> Result<bool, GuardError> {
        match &self.cond {
            Some(guard) => guard.check(data, event),
            None => Ok(true),
        }
    }
}

/// One invocation attached to a state.
pub struct InvokeNode<D> {
    pub(crate) id: String,
    pub(crate) source: InvokeSource<D>,
    pub(crate) autoforward: bool,
    pub(crate) finalize: Vec<Command<D>>,
    pub(crate) data: Option<DataInit<D>>,
    pub(crate) state: StateId,
}

impl<D> InvokeNode<D> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &InvokeSource<D> {
        &self.source
    }

    pub fn autoforward(&self) -> bool {
        self.autoforward
    }

    pub fn finalize(&self) -> &[Command<D>] {
        &self.finalize
    }

    /// Build the child's data from the parent's, if an initializer was given.
    pub fn child_data(&self, parent: &D) -> Option<D> {
        self.data.as_ref().map(|init| init(parent))
    }

    /// State whose entry starts this invocation.
    pub fn state(&self) -> StateId {
        self.state
    }
}

/// A compiled state tree.
///
/// # Example
///
/// ```rust
/// use statecharts::builder::{parallel, state, Document};
///
/// let doc: Document<()> = Document::builder()
///     .state(parallel("parent").child(state("first")).child(state("second")))
///     .build()
///     .unwrap();
///
/// let parent = doc.lookup("parent").unwrap();
/// let first = doc.lookup("first").unwrap();
///
/// assert!(doc.is_parallel(parent));
/// assert!(doc.is_descendant(first, parent));
/// assert!(doc.is_atomic(first));
/// ```
pub struct Document<D> {
    states: Vec<StateNode<D>>,
    transitions: Vec<TransitionNode<D>>,
    invokes: Vec<InvokeNode<D>>,
    index: HashMap<String, StateId>,
}

impl<D> Document<D> {
    pub fn builder() -> DocumentBuilder<D> {
        DocumentBuilder::new()
    }

    /// Compile top-level states; the first one is the default entry.
    pub fn from_states<I>(states: I) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = StateSchema<D>>,
    {
        DocumentBuilder::new().states(states).build()
    }

    pub fn root(&self) -> &StateNode<D> {
        &self.states[StateId::ROOT.index()]
    }

    /// The state behind `id`, or `None` when the id belongs to another
    /// document.
    pub fn state(&self, id: StateId) -> Option<&StateNode<D>> {
        self.states.get(id.index())
    }

    /// Ids handed out by this document always index into its arena.
    pub(crate) fn node(&self, id: StateId) -> &StateNode<D> {
        &self.states[id.index()]
    }

    pub fn transition(&self, id: TransitionId) -> &TransitionNode<D> {
        &self.transitions[id.index()]
    }

    pub fn invoke(&self, id: InvokeId) -> &InvokeNode<D> {
        &self.invokes[id.index()]
    }

    /// Resolve an authored id.
    pub fn lookup(&self, id: &str) -> Option<StateId> {
        self.index.get(id).copied()
    }

    pub fn state_by_id(&self, id: &str) -> Option<&StateNode<D>> {
        self.lookup(id).map(|s| self.node(s))
    }

    /// Authored id of a state.
    pub fn name(&self, id: StateId) -> &str {
        &self.node(id).id
    }

    /// Number of states, the root included.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Always false: the root is always present.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// All states in document order, the root first.
    pub fn states(&self) -> impl Iterator<Item = (StateId, &StateNode<D>)> {
        self.states
            .iter()
            .enumerate()
            .map(|(i, node)| (StateId(i as u32), node))
    }

    /// Transitions, synthetic default-entry ones included.
    pub fn transitions(&self) -> impl Iterator<Item = (TransitionId, &TransitionNode<D>)> {
        self.transitions
            .iter()
            .enumerate()
            .map(|(i, node)| (TransitionId(i as u32), node))
    }

    /// Invocations in document order.
    pub fn invokes(&self) -> impl Iterator<Item = (InvokeId, &InvokeNode<D>)> {
        self.invokes
            .iter()
            .enumerate()
            .map(|(i, node)| (InvokeId(i as u32), node))
    }

    /// True when `state` lies strictly below `ancestor`.
    pub fn is_descendant(&self, state: StateId, ancestor: StateId) -> bool {
        self.node(state).ancestors.contains(&ancestor)
    }

    pub fn is_atomic(&self, id: StateId) -> bool {
        self.node(id).is_atomic()
    }

    pub fn is_compound(&self, id: StateId) -> bool {
        self.node(id).is_compound()
    }

    pub fn is_parallel(&self, id: StateId) -> bool {
        self.node(id).is_parallel()
    }

    pub fn is_final(&self, id: StateId) -> bool {
        self.node(id).is_final()
    }

    pub fn is_history(&self, id: StateId) -> bool {
        self.node(id).history_kind().is_some()
    }

    pub fn is_compound_or_root(&self, id: StateId) -> bool {
        id.is_root() || self.is_compound(id)
    }

    /// Ancestors of `state`, nearest first, stopping before `upto`.
    ///
    /// Returns nothing when `upto` is `state` itself, its parent, or one of
    /// its descendants. The root is never included.
    pub fn proper_ancestors(&self, state: StateId, upto: Option<StateId>) -> Vec<StateId> {
        if let Some(upto) = upto {
            if upto == state
                || self.node(state).parent == Some(upto)
                || self.is_descendant(upto, state)
            {
                return Vec::new();
            }
        }
        self.node(state)
            .ancestors
            .iter()
            .copied()
            .take_while(|a| Some(*a) != upto && !a.is_root())
            .collect()
    }

    /// Nearest state that has both `a` and `b` strictly below it.
    pub fn nearest_common_ancestor(&self, a: StateId, b: StateId) -> StateId {
        self.node(a)
            .ancestors
            .iter()
            .copied()
            .find(|anc| self.is_descendant(b, *anc))
            .unwrap_or(StateId::ROOT)
    }

    /// True when the two states may be active together: one contains the
    /// other, or they sit in different regions of a parallel state.
    pub fn compatible(&self, a: StateId, b: StateId) -> bool {
        a == b
            || self.is_descendant(a, b)
            || self.is_descendant(b, a)
            || self.is_parallel(self.nearest_common_ancestor(a, b))
    }

    /// True when every pair of `states` is [`compatible`](Self::compatible).
    pub fn is_legal_set(&self, states: &[StateId]) -> bool {
        states
            .iter()
            .enumerate()
            .all(|(i, a)| states[i + 1..].iter().all(|b| self.compatible(*a, *b)))
    }

    pub fn entry_cmp(&self, a: StateId, b: StateId) -> Ordering {
        entry_order(self.node(a), self.node(b))
    }

    pub fn exit_cmp(&self, a: StateId, b: StateId) -> Ordering {
        exit_order(self.node(a), self.node(b))
    }

    pub fn document_cmp(&self, a: StateId, b: StateId) -> Ordering {
        self.node(a).document_order.cmp(&self.node(b).document_order)
    }
}

impl<D> std::fmt::Debug for Document<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("states", &self.states.iter().map(|s| &s.id).collect::<Vec<_>>())
            .field("transitions", &self.transitions.len())
            .field("invokes", &self.invokes.len())
            .finish()
    }
}

/// Builder for compiling a [`Document`].
pub struct DocumentBuilder<D> {
    states: Vec<StateSchema<D>>,
    initial: Vec<String>,
    initial_content: Vec<Command<D>>,
}

impl<D> DocumentBuilder<D> {
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            initial: Vec::new(),
            initial_content: Vec::new(),
        }
    }

    /// Add a top-level state.
    pub fn state(mut self, state: StateSchema<D>) -> Self {
        self.states.push(state);
        self
    }

    pub fn states<I>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = StateSchema<D>>,
    {
        self.states.extend(states);
        self
    }

    /// Explicit initial configuration, overriding the marked or first top-level state.
    pub fn initial<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.initial.extend(targets.into_iter().map(Into::into));
        self
    }

    /// Content run once when the session enters its initial configuration.
    pub fn on_initial<I>(mut self, content: I) -> Self
    where
        I: IntoIterator<Item = Command<D>>,
    {
        self.initial_content.extend(content);
        self
    }

    /// Compile the tree. Every structural problem is reported at once.
    pub fn build(self) -> Result<Document<D>, BuildError> {
        let mut lowering = Lowering::new();
        let root_initial = lowering.lower_children(StateId::ROOT, self.states, self.initial);
        if let Some(rule) = root_initial {
            lowering.pending_initial.push(PendingInitial {
                state: StateId::ROOT,
                rule,
                content: self.initial_content,
            });
        }
        let (document, issues) = lowering.finish();

        let checks = validate::document(&document, issues);
        match checks {
            Validation::Success(()) => {
                tracing::debug!(
                    states = document.states.len(),
                    transitions = document.transitions.len(),
                    invokes = document.invokes.len(),
                    "document built"
                );
                Ok(document)
            }
            Validation::Failure(errors) => {
                for issue in errors.iter() {
                    tracing::warn!(%issue, "document issue");
                }
                Err(BuildError::Invalid(errors.iter().cloned().collect()))
            }
        }
    }
}

impl<D> Default for DocumentBuilder<D> {
    fn default() -> Self {
        Self::new()
    }
}

enum InitialRule {
    Child(StateId),
    Ids(Vec<String>),
}

struct PendingInitial<D> {
    state: StateId,
    rule: InitialRule,
    content: Vec<Command<D>>,
}

/// Pre-order walk from schema to arena.
struct Lowering<D> {
    states: Vec<StateNode<D>>,
    transitions: Vec<TransitionNode<D>>,
    invokes: Vec<InvokeNode<D>>,
    index: HashMap<String, StateId>,
    pending_targets: Vec<(TransitionId, Vec<String>)>,
    pending_initial: Vec<PendingInitial<D>>,
    issues: Vec<DocumentIssue>,
    order: u32,
}

impl<D> Lowering<D> {
    fn new() -> Self {
        let root = StateNode {
            id: ROOT_ID.to_string(),
            mode: StateMode::Atomic,
            document_order: 0,
            depth: -1,
            parent: None,
            ancestors: Vec::new(),
            descendants: Vec::new(),
            children: Vec::new(),
            transitions: Vec::new(),
            invokes: Vec::new(),
            history: Vec::new(),
            on_entry: Vec::new(),
            on_exit: Vec::new(),
            initial: None,
            done_data: None,
        };
        Self {
            states: vec![root],
            transitions: Vec::new(),
            invokes: Vec::new(),
            index: HashMap::new(),
            pending_targets: Vec::new(),
            pending_initial: Vec::new(),
            issues: Vec::new(),
            order: 1,
        }
    }

    fn next_order(&mut self) -> u32 {
        let order = self.order;
        self.order += 1;
        order
    }

    fn node(&mut self, id: StateId) -> &mut StateNode<D> {
        &mut self.states[id.index()]
    }

    /// Lower `children` under `parent` and fill in its descendants and mode.
    /// Returns how the parent's default entry should be resolved, if it has one.
    fn lower_children(
        &mut self,
        parent: StateId,
        children: Vec<StateSchema<D>>,
        explicit_initial: Vec<String>,
    ) -> Option<InitialRule> {
        let mut marked = None;
        for child in children {
            let is_marked = child.initial_marker;
            let id = self.lower_state(child, parent);
            if is_marked && marked.is_none() && self.states[id.index()].history_kind().is_none() {
                marked = Some(id);
            }
        }

        let child_ids = self.states[parent.index()].children.clone();
        let mut descendants = Vec::new();
        for child in &child_ids {
            descendants.push(*child);
            descendants.extend(self.states[child.index()].descendants.iter().copied());
        }
        let node = self.node(parent);
        node.descendants = descendants;
        if node.mode == StateMode::Atomic && !child_ids.is_empty() {
            node.mode = StateMode::Compound;
        }

        if node.mode != StateMode::Compound {
            if !explicit_initial.is_empty() {
                let id = node.id.clone();
                self.issues.push(DocumentIssue::InitialOnNonCompound { id });
            }
            return None;
        }
        if !explicit_initial.is_empty() {
            return Some(InitialRule::Ids(explicit_initial));
        }
        marked.or_else(|| child_ids.first().copied()).map(InitialRule::Child)
    }

    fn lower_state(&mut self, schema: StateSchema<D>, parent: StateId) -> StateId {
        let id = StateId(self.states.len() as u32);
        let document_order = self.next_order();
        let parent_node = &self.states[parent.index()];
        let depth = parent_node.depth + 1;
        let mut ancestors = Vec::with_capacity(parent_node.ancestors.len() + 1);
        ancestors.push(parent);
        ancestors.extend(parent_node.ancestors.iter().copied());

        if schema.id == ROOT_ID {
            self.issues.push(DocumentIssue::ReservedStateId { id: schema.id.clone() });
        } else if self.index.contains_key(&schema.id) {
            self.issues.push(DocumentIssue::DuplicateStateId { id: schema.id.clone() });
        } else {
            self.index.insert(schema.id.clone(), id);
        }

        let mode = match schema.kind {
            StateKind::State => StateMode::Atomic,
            StateKind::Parallel => StateMode::Parallel,
            StateKind::Final => StateMode::Final,
            StateKind::History(kind) => StateMode::History(kind),
        };

        self.states.push(StateNode {
            id: schema.id.clone(),
            mode,
            document_order,
            depth,
            parent: Some(parent),
            ancestors,
            descendants: Vec::new(),
            children: Vec::new(),
            transitions: Vec::new(),
            invokes: Vec::new(),
            history: Vec::new(),
            on_entry: schema.on_entry,
            on_exit: schema.on_exit,
            initial: None,
            done_data: schema.done_data,
        });

        match mode {
            StateMode::History(_) => self.node(parent).history.push(id),
            _ => self.node(parent).children.push(id),
        }

        for transition in schema.transitions {
            let tid = self.lower_transition(id, transition);
            self.node(id).transitions.push(tid);
        }
        for invoke in schema.invokes {
            let iid = self.lower_invoke(id, invoke);
            self.node(id).invokes.push(iid);
        }

        let has_children = !schema.children.is_empty();
        match mode {
            StateMode::Final if has_children => {
                self.issues.push(DocumentIssue::FinalWithChildren { id: schema.id });
            }
            StateMode::History(_) if has_children => {
                self.issues.push(DocumentIssue::HistoryWithChildren { id: schema.id });
            }
            StateMode::Final | StateMode::History(_) if !schema.initial_targets.is_empty() => {
                self.issues.push(DocumentIssue::InitialOnNonCompound { id: schema.id });
            }
            StateMode::Final | StateMode::History(_) => {}
            _ => {
                let initial = self.lower_children(id, schema.children, schema.initial_targets);
                if let Some(rule) = initial {
                    self.pending_initial.push(PendingInitial {
                        state: id,
                        rule,
                        content: schema.initial_content,
                    });
                }
            }
        }

        id
    }

    fn lower_transition(&mut self, source: StateId, schema: TransitionSchema<D>) -> TransitionId {
        let id = TransitionId(self.transitions.len() as u32);
        let document_order = self.next_order();
        self.transitions.push(TransitionNode {
            source,
            targets: Vec::new(),
            events: schema.events,
            kind: schema.kind,
            cond: schema.cond,
            content: schema.content,
            document_order,
        });
        self.pending_targets.push((id, schema.targets));
        id
    }

    fn lower_invoke(&mut self, state: StateId, schema: InvokeSchema<D>) -> InvokeId {
        let id = InvokeId(self.invokes.len() as u32);
        self.next_order();
        self.invokes.push(InvokeNode {
            id: schema.id,
            source: schema.source,
            autoforward: schema.autoforward,
            finalize: schema.finalize,
            data: schema.data,
            state,
        });
        id
    }

    fn push_synthetic(
        &mut self,
        source: StateId,
        targets: Vec<StateId>,
        content: Vec<Command<D>>,
    ) -> TransitionId {
        let id = TransitionId(self.transitions.len() as u32);
        let document_order = self.next_order();
        self.transitions.push(TransitionNode {
            source,
            targets,
            events: Vec::new(),
            kind: TransitionType::External,
            cond: None,
            content,
            document_order,
        });
        id
    }

    /// Resolve targets, create default-entry transitions and history defaults.
    fn finish(mut self) -> (Document<D>, Vec<DocumentIssue>) {
        for (tid, names) in std::mem::take(&mut self.pending_targets) {
            let source = self.transitions[tid.index()].source;
            let mut targets = Vec::with_capacity(names.len());
            for name in names {
                match self.index.get(&name) {
                    Some(target) => targets.push(*target),
                    None => self.issues.push(DocumentIssue::UnresolvedTarget {
                        state: self.states[source.index()].id.clone(),
                        target: name,
                    }),
                }
            }
            self.transitions[tid.index()].targets = targets;
        }

        for pending in std::mem::take(&mut self.pending_initial) {
            let targets = match pending.rule {
                InitialRule::Child(child) => vec![child],
                InitialRule::Ids(names) => {
                    let mut targets = Vec::with_capacity(names.len());
                    for name in names {
                        match self.index.get(&name) {
                            Some(target) => targets.push(*target),
                            None => self.issues.push(DocumentIssue::UnresolvedInitial {
                                state: self.states[pending.state.index()].id.clone(),
                                target: name,
                            }),
                        }
                    }
                    targets
                }
            };
            let tid = self.push_synthetic(pending.state, targets, pending.content);
            self.node(pending.state).initial = Some(tid);
        }

        let histories: Vec<StateId> = (0..self.states.len() as u32)
            .map(StateId)
            .filter(|s| {
                let node = &self.states[s.index()];
                node.history_kind().is_some() && node.transitions.is_empty()
            })
            .collect();
        for history in histories {
            let home = self.states[history.index()].parent.unwrap_or(StateId::ROOT);
            let home = &self.states[home.index()];
            let targets = match home.mode {
                StateMode::Parallel => home.children.clone(),
                _ => home
                    .initial
                    .map(|t| self.transitions[t.index()].targets.clone())
                    .unwrap_or_default(),
            };
            let tid = self.push_synthetic(history, targets, Vec::new());
            self.node(history).transitions.push(tid);
        }

        let document = Document {
            states: self.states,
            transitions: self.transitions,
            invokes: self.invokes,
            index: self.index,
        };
        (document, self.issues)
    }
}
