//! The session: event loop, macrostep, microstep and teardown.

use super::config::SessionConfig;
use super::datamodel::DataModel;
use super::error::{InvokeError, SessionError};
use super::handle::{EventSender, ParentLink, SessionHandle, SessionOutcome, SessionStatus};
use super::invoke::{ChildHandle, InvokeStatus, Registry, Service, ServiceRequest};
use super::select::Selector;
use crate::builder::{Document, InvokeNode, InvokeSource};
use crate::content::{Command, ContentError, Evaluator, Hooks, Outbox, Outgoing};
use crate::core::{Envelope, Event, EventKind, OrderedSet, StateId, TransitionId};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// One running instance of a document.
///
/// A session owns its configuration, an internal queue, an external queue,
/// a history table, a data bag and its invoked children. Many sessions may
/// share one [`Document`].
///
/// # Example
///
/// ```rust
/// use statecharts::builder::{state, transition, Document};
/// use statecharts::core::Event;
/// use statecharts::session::Session;
///
/// let doc = Document::from_states(vec![
///     state("init").transition(transition("NEXT").to("next")),
///     state("next"),
/// ])
/// .unwrap();
///
/// let mut session: Session<()> = Session::new(doc).unwrap();
/// session.start(()).unwrap();
/// assert_eq!(session.configuration(), vec!["init"]);
///
/// session.send(Event::new("NEXT")).unwrap();
/// session.run_pending().unwrap();
/// assert_eq!(session.configuration(), vec!["next"]);
/// ```
pub struct Session<D> {
    document: Arc<Document<D>>,
    config: SessionConfig,
    registry: Arc<Registry<D>>,
    datamodel: DataModel<D>,
    configuration: OrderedSet<StateId>,
    states_to_invoke: OrderedSet<StateId>,
    internal: VecDeque<Event>,
    sender: EventSender,
    receiver: mpsc::UnboundedReceiver<Envelope>,
    children: HashMap<String, ChildHandle<D>>,
    parent: Option<ParentLink>,
    status: SessionStatus,
    done_data: Option<Value>,
    snapshot: watch::Sender<Vec<String>>,
}

impl<D: Default + Send + 'static> Session<D> {
    /// A session with a generated name and an empty registry.
    pub fn new(document: impl Into<Arc<Document<D>>>) -> Result<Self, SessionError> {
        Self::with_config(document, SessionConfig::default(), Registry::new())
    }

    /// Fails with [`ContentError::UnknownScript`] when the document calls a
    /// script the registry does not provide.
    pub fn with_config(
        document: impl Into<Arc<Document<D>>>,
        config: SessionConfig,
        registry: impl Into<Arc<Registry<D>>>,
    ) -> Result<Self, SessionError> {
        let document = document.into();
        let registry = registry.into();
        check_scripts(&document, registry.hooks())?;

        let (sender, receiver) = EventSender::channel();
        let (snapshot, _) = watch::channel(Vec::new());
        Ok(Self {
            document,
            config,
            registry,
            datamodel: DataModel::default(),
            configuration: OrderedSet::new(),
            states_to_invoke: OrderedSet::new(),
            internal: VecDeque::new(),
            sender,
            receiver,
            children: HashMap::new(),
            parent: None,
            status: SessionStatus::Idle,
            done_data: None,
            snapshot,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    pub fn document(&self) -> &Arc<Document<D>> {
        &self.document
    }

    /// A sender into this session's external queue.
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Enqueue an event on this session's external queue.
    pub fn send(&self, event: Event) -> Result<(), SessionError> {
        self.sender.send(event)
    }

    /// Route an event as `send` content would: `_self`, `_internal`,
    /// `_parent`, this session's name or an invoke id.
    ///
    /// An `_internal` event on a running session is processed before this
    /// returns, so the session is stable again when the next external event
    /// is taken.
    pub fn send_to(&mut self, event: Event, target: &str) -> Result<(), SessionError> {
        self.deliver(event, Some(target))?;
        if target == "_internal" && self.is_running() {
            let result = self.macrostep();
            return self.settle(result);
        }
        Ok(())
    }

    /// Deliver the cancellation sentinel. It is observed at the next
    /// external wait.
    pub fn cancel(&self) -> Result<(), SessionError> {
        self.sender.cancel()
    }

    /// Active state ids, shallowest first.
    pub fn configuration(&self) -> Vec<String> {
        self.names(
            self.configuration
                .sorted_by(|a, b| self.document.entry_cmp(*a, *b)),
        )
    }

    /// Active state ids in the order they would be exited.
    pub fn exit_order(&self) -> Vec<String> {
        self.names(
            self.configuration
                .sorted_by(|a, b| self.document.exit_cmp(*a, *b)),
        )
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.document
            .lookup(id)
            .is_some_and(|s| self.configuration.contains(&s))
    }

    /// Read the data bag.
    pub fn with_data<R>(&self, f: impl FnOnce(&D) -> R) -> R {
        f(&self.datamodel.lock())
    }

    /// Shared handle to the data bag.
    pub fn data(&self) -> Arc<Mutex<D>> {
        self.datamodel.shared()
    }

    /// States remembered by the history pseudo-state `id`, if it has a record.
    pub fn history(&self, id: &str) -> Option<Vec<String>> {
        let history = self.document.lookup(id)?;
        let recorded = self.datamodel.history().get(history)?;
        Some(self.names(recorded.to_vec()))
    }

    /// Done-data of the top-level final state once the session is done.
    pub fn done_data(&self) -> Option<&Value> {
        self.done_data.as_ref()
    }

    /// `None` until the invocation's child has started, and again once it
    /// has been cancelled and dropped.
    pub fn invoke_status(&self, invoke_id: &str) -> Option<InvokeStatus> {
        self.children.get(invoke_id).map(ChildHandle::status)
    }

    /// Receiver of the configuration published after each macrostep.
    pub fn subscribe(&self) -> watch::Receiver<Vec<String>> {
        self.snapshot.subscribe()
    }

    pub fn outcome(&self) -> SessionOutcome {
        SessionOutcome {
            name: self.config.name.clone(),
            status: self.status,
            done_data: self.done_data.clone(),
            configuration: self.configuration(),
        }
    }

    /// Enter the initial configuration and run to a stable configuration.
    pub fn start(&mut self, data: D) -> Result<(), SessionError> {
        if self.status != SessionStatus::Idle {
            return Err(SessionError::AlreadyStarted);
        }
        self.datamodel.replace(data);
        self.status = SessionStatus::Running;
        tracing::info!(session = %self.config.name, "session started");

        let result = self.enter_initial();
        self.settle(result)
    }

    /// Process every envelope already queued, without waiting.
    pub fn run_pending(&mut self) -> Result<(), SessionError> {
        self.ensure_started()?;
        while self.is_running() {
            match self.receiver.try_recv() {
                Ok(envelope) => self.handle(envelope)?,
                Err(_) => break,
            }
        }
        Ok(())
    }

    /// Wait for one envelope and process it.
    pub async fn process_next(&mut self) -> Result<(), SessionError> {
        self.ensure_started()?;
        if !self.is_running() {
            return Ok(());
        }
        let envelope = self.receiver.recv().await.ok_or(SessionError::Closed)?;
        self.handle(envelope)
    }

    /// Run the event loop until the session is done, cancelled or fails.
    pub async fn run(&mut self) -> Result<SessionOutcome, SessionError> {
        self.ensure_started()?;
        while self.is_running() {
            self.process_next().await?;
        }
        Ok(self.outcome())
    }

    /// Start the session and drive it on a tokio task.
    pub fn spawn(mut self, data: D) -> Result<SessionHandle, SessionError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        self.start(data)?;

        let name = self.config.name.clone();
        let sender = self.sender.clone();
        let snapshot = self.snapshot.subscribe();
        let task = runtime.spawn(async move { self.run().await });
        Ok(SessionHandle {
            name,
            sender,
            snapshot,
            task,
        })
    }

    fn ensure_started(&self) -> Result<(), SessionError> {
        match self.status {
            SessionStatus::Idle => Err(SessionError::NotStarted),
            _ => Ok(()),
        }
    }

    fn enter_initial(&mut self) -> Result<(), SessionError> {
        if let Some(initial) = self.document.root().initial() {
            self.microstep(&[initial])?;
        }
        self.macrostep()
    }

    fn handle(&mut self, envelope: Envelope) -> Result<(), SessionError> {
        if !self.is_running() {
            return Ok(());
        }
        match envelope {
            Envelope::Cancel => {
                tracing::info!(session = %self.config.name, "session cancelled");
                self.status = SessionStatus::Cancelled;
                self.settle(Ok(()))
            }
            Envelope::Event(event) => {
                let result = self.process_external(event);
                self.settle(result)
            }
        }
    }

    /// Turn a step result into the session's next status, tearing down once
    /// it stops running.
    fn settle(&mut self, result: Result<(), SessionError>) -> Result<(), SessionError> {
        match result {
            Err(err) => Err(self.fail(err)),
            Ok(()) if !self.is_running() => match self.teardown() {
                Ok(()) => Ok(()),
                Err(err) => Err(self.fail(err)),
            },
            Ok(()) => Ok(()),
        }
    }

    fn process_external(&mut self, event: Event) -> Result<(), SessionError> {
        tracing::trace!(session = %self.config.name, event = %event.name, "external event");
        if let Some(invoke_id) = event.invoke_id.as_deref() {
            if event.is_done_invoke(invoke_id) {
                if let Some(child) = self.children.get_mut(invoke_id) {
                    child.mark_done();
                }
            }
        }

        self.datamodel.set_event(event.clone());
        self.finalize_and_forward(&event)?;

        let enabled = self.select_current()?;
        if !enabled.is_empty() {
            self.microstep(enabled.as_slice())?;
        }
        self.macrostep()
    }

    fn finalize_and_forward(&mut self, event: &Event) -> Result<(), SessionError> {
        let doc = Arc::clone(&self.document);
        let active: Vec<StateId> = self.configuration.iter().copied().collect();
        for state in active {
            for &invoke in doc.node(state).invokes() {
                let node = doc.invoke(invoke);
                if event.invoke_id.as_deref() == Some(node.id()) {
                    self.apply_finalize(node, event)?;
                }
                if node.autoforward() {
                    self.autoforward(node.id(), event);
                }
            }
        }
        Ok(())
    }

    fn apply_finalize(&mut self, node: &InvokeNode<D>, event: &Event) -> Result<(), SessionError> {
        if node.finalize().is_empty() {
            return Ok(());
        }
        let Some(data) = self.children.get(node.id()).and_then(|c| c.data().cloned()) else {
            tracing::warn!(session = %self.config.name, invoke = node.id(), "finalize has no child data");
            self.internal.push_back(
                Event::error_execution(format!("no child session for invoke '{}'", node.id()))
                    .with_invoke_id(node.id()),
            );
            return Ok(());
        };

        let mut outbox = Outbox::new();
        {
            let evaluator = Evaluator::new(&self.config.name, self.registry.hooks());
            let mut child = data.lock();
            evaluator.execute(node.finalize(), &mut child, event, &mut outbox)?;
        }
        self.route(&mut outbox);
        Ok(())
    }

    fn autoforward(&self, invoke_id: &str, event: &Event) {
        let Some(child) = self.children.get(invoke_id) else {
            return;
        };
        if child.status() == InvokeStatus::Invoked && child.forward(event.clone()).is_err() {
            tracing::debug!(session = %self.config.name, invoke = invoke_id, "autoforward target gone");
        }
    }

    /// Run eventless transitions and internal events until nothing is
    /// enabled, then start pending invocations.
    fn macrostep(&mut self) -> Result<(), SessionError> {
        let mut microsteps = 0usize;
        loop {
            while self.is_running() {
                let mut enabled = self.select_eventless()?;
                if enabled.is_empty() {
                    let Some(event) = self.internal.pop_front() else {
                        break;
                    };
                    self.datamodel.set_event(event);
                    enabled = self.select_current()?;
                }
                if !enabled.is_empty() {
                    microsteps += 1;
                    if microsteps > self.config.max_microsteps {
                        return Err(SessionError::MicrostepLimit {
                            limit: self.config.max_microsteps,
                        });
                    }
                    self.microstep(enabled.as_slice())?;
                }
            }
            if !self.is_running() {
                return Ok(());
            }
            self.start_invokes();
            if self.internal.is_empty() {
                break;
            }
        }

        if self.config.trace_configuration {
            tracing::debug!(
                session = %self.config.name,
                configuration = ?self.configuration(),
                microsteps,
                "macrostep complete"
            );
        }
        self.publish();
        Ok(())
    }

    fn microstep(&mut self, transitions: &[TransitionId]) -> Result<(), SessionError> {
        self.exit_states(transitions)?;
        let doc = Arc::clone(&self.document);
        for &transition in transitions {
            self.execute(doc.transition(transition).content())?;
        }
        self.enter_states(transitions)
    }

    fn exit_states(&mut self, transitions: &[TransitionId]) -> Result<(), SessionError> {
        let doc = Arc::clone(&self.document);
        let (exit, snapshots) = {
            let selector = self.selector();
            let exit = selector.exit_set(transitions);
            let mut snapshots = Vec::new();
            for &state in &exit {
                for &history in doc.node(state).history() {
                    if let Some(kind) = doc.node(history).history_kind() {
                        snapshots.push((history, kind, selector.history_snapshot(state, kind)));
                    }
                }
            }
            (exit, snapshots)
        };

        for state in &exit {
            self.states_to_invoke.remove(state);
        }
        for (history, kind, states) in snapshots {
            self.datamodel.history_mut().record(history, kind, states);
        }

        for state in exit.sorted_by(|a, b| doc.exit_cmp(*a, *b)) {
            let node = doc.node(state);
            tracing::trace!(session = %self.config.name, state = node.id(), "exit");
            self.execute(node.on_exit())?;
            for &invoke in node.invokes() {
                self.cancel_invoke(doc.invoke(invoke).id());
            }
            self.configuration.remove(&state);
        }
        Ok(())
    }

    fn enter_states(&mut self, transitions: &[TransitionId]) -> Result<(), SessionError> {
        let doc = Arc::clone(&self.document);
        let entry = self.selector().entry_set(transitions);

        for state in entry.states.sorted_by(|a, b| doc.entry_cmp(*a, *b)) {
            let node = doc.node(state);
            tracing::trace!(session = %self.config.name, state = node.id(), "enter");
            self.configuration.insert(state);
            self.states_to_invoke.insert(state);

            self.execute(node.on_entry())?;
            if entry.default_entry.contains(&state) {
                if let Some(initial) = node.initial() {
                    self.execute(doc.transition(initial).content())?;
                }
            }
            if let Some(default) = entry.history_content.get(&state) {
                self.execute(doc.transition(*default).content())?;
            }
            if node.is_final() {
                self.enter_final(state);
            }
        }
        Ok(())
    }

    fn enter_final(&mut self, state: StateId) {
        let doc = Arc::clone(&self.document);
        let node = doc.node(state);
        let parent = node.parent().unwrap_or(StateId::ROOT);
        if parent.is_root() {
            self.status = SessionStatus::Done;
            return;
        }

        let data = node.done_data().cloned().unwrap_or(Value::Null);
        self.internal
            .push_back(Event::done_state(doc.name(parent), data));

        if let Some(grandparent) = doc.node(parent).parent() {
            if doc.is_parallel(grandparent) && self.selector().is_in_final_state(grandparent) {
                self.internal
                    .push_back(Event::done_state(doc.name(grandparent), Value::Null));
            }
        }
    }

    fn start_invokes(&mut self) {
        let doc = Arc::clone(&self.document);
        let states = self.states_to_invoke.sorted_by(|a, b| doc.entry_cmp(*a, *b));
        self.states_to_invoke.clear();

        for state in states {
            for &invoke in doc.node(state).invokes() {
                let node = doc.invoke(invoke);
                if let Err(err) = self.start_invoke(node) {
                    tracing::warn!(
                        session = %self.config.name,
                        invoke = node.id(),
                        error = %err,
                        "invoke failed"
                    );
                    self.internal.push_back(
                        Event::error_execution(err.to_string()).with_invoke_id(node.id()),
                    );
                }
            }
        }
    }

    fn start_invoke(&mut self, node: &InvokeNode<D>) -> Result<(), InvokeError> {
        let child = match node.source() {
            InvokeSource::Machine(document) => self.spawn_child(node, Arc::clone(document))?,
            InvokeSource::Service(src) => match self.registry.resolve(src)?.clone() {
                Service::Machine(document) => self.spawn_child(node, document)?,
                Service::External(service) => {
                    let sender = service.start(ServiceRequest {
                        invoke_id: node.id().to_string(),
                        parent: ParentLink::new(self.sender.clone(), node.id()),
                    })?;
                    ChildHandle::external(node.id(), sender)
                }
            },
        };

        tracing::info!(session = %self.config.name, invoke = node.id(), "invoke started");
        if let Some(mut previous) = self.children.insert(node.id().to_string(), child) {
            previous.cancel();
        }
        Ok(())
    }

    fn spawn_child(
        &mut self,
        node: &InvokeNode<D>,
        document: Arc<Document<D>>,
    ) -> Result<ChildHandle<D>, InvokeError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| InvokeError::NoRuntime {
            id: node.id().to_string(),
        })?;

        let data = node.child_data(&self.datamodel.lock()).unwrap_or_default();
        let config = SessionConfig {
            name: format!("{}.{}", self.config.name, node.id()),
            ..self.config.clone()
        };
        let mut child = Session::with_config(document, config, Arc::clone(&self.registry))
            .map_err(|err| InvokeError::ServiceFailed {
                src: node.id().to_string(),
                reason: err.to_string(),
            })?;
        child.parent = Some(ParentLink::new(self.sender.clone(), node.id()));

        let sender = child.sender();
        let shared = child.data();
        let task = runtime.spawn(async move {
            child.start(data)?;
            child.run().await
        });
        Ok(ChildHandle::session(node.id(), sender, shared, task))
    }

    fn cancel_invoke(&mut self, invoke_id: &str) {
        if let Some(mut child) = self.children.remove(invoke_id) {
            child.cancel();
        }
    }

    /// Exit everything still active and notify the parent if a top-level
    /// final state was reached.
    fn teardown(&mut self) -> Result<(), SessionError> {
        let doc = Arc::clone(&self.document);
        let mut done = None;

        for state in self.configuration.sorted_by(|a, b| doc.exit_cmp(*a, *b)) {
            let node = doc.node(state);
            self.execute(node.on_exit())?;
            for &invoke in node.invokes() {
                self.cancel_invoke(doc.invoke(invoke).id());
            }
            self.configuration.remove(&state);
            if node.is_final() && node.parent() == Some(StateId::ROOT) {
                done = Some(node.done_data().cloned().unwrap_or(Value::Null));
            }
        }

        for (_, mut child) in self.children.drain() {
            child.cancel();
        }
        self.states_to_invoke.clear();
        self.internal.clear();

        if let Some(data) = done {
            if let Some(parent) = &self.parent {
                let event = Event::done_invoke(parent.invoke_id(), data.clone());
                if parent.send(event).is_err() {
                    tracing::warn!(session = %self.config.name, "parent gone before done notification");
                }
            }
            self.done_data = Some(data);
        }

        self.publish();
        tracing::info!(session = %self.config.name, status = ?self.status, "session stopped");
        Ok(())
    }

    /// Stop advancing after a fatal error.
    fn fail(&mut self, err: SessionError) -> SessionError {
        self.status = SessionStatus::Failed;
        tracing::error!(session = %self.config.name, error = %err, "session failed");

        for (_, mut child) in self.children.drain() {
            child.cancel();
        }
        if let Some(parent) = &self.parent {
            if parent.send(Event::error_execution(err.to_string())).is_err() {
                tracing::warn!(session = %self.config.name, "parent gone before failure notification");
            }
        }
        self.publish();
        err
    }

    fn execute(&mut self, commands: &[Command<D>]) -> Result<(), SessionError> {
        if commands.is_empty() {
            return Ok(());
        }
        let mut outbox = Outbox::new();
        {
            let evaluator = Evaluator::new(&self.config.name, self.registry.hooks());
            let mut data = self.datamodel.lock();
            evaluator.execute(commands, &mut data, self.datamodel.event(), &mut outbox)?;
        }
        self.route(&mut outbox);
        Ok(())
    }

    fn route(&mut self, outbox: &mut Outbox) {
        for item in outbox.drain() {
            match item {
                Outgoing::Raise(event) => self.internal.push_back(event),
                Outgoing::Send { event, target } => {
                    let name = event.name.clone();
                    if let Err(err) = self.deliver(event, target.as_deref()) {
                        let target = target.as_deref().unwrap_or("_self");
                        tracing::warn!(
                            session = %self.config.name,
                            target,
                            event = %name,
                            error = %err,
                            "undeliverable event"
                        );
                        self.internal
                            .push_back(Event::error_communication(target, &name));
                    }
                }
            }
        }
    }

    fn deliver(&mut self, event: Event, target: Option<&str>) -> Result<(), SessionError> {
        let undeliverable = |target: &str| SessionError::Undeliverable {
            target: target.to_string(),
        };
        match target {
            None | Some("_self") => self.sender.send(event),
            Some("_internal") => {
                self.internal.push_back(event.with_kind(EventKind::Internal));
                Ok(())
            }
            Some("_parent") => match &self.parent {
                Some(parent) => parent.send(event),
                None => Err(undeliverable("_parent")),
            },
            Some(name) if name == self.config.name => self.sender.send(event),
            Some(invoke_id) => match self.children.get(invoke_id) {
                Some(child) => child.forward(event),
                None => Err(undeliverable(invoke_id)),
            },
        }
    }

    fn selector(&self) -> Selector<'_, D> {
        Selector::new(&self.document, &self.configuration, self.datamodel.history())
    }

    fn select_eventless(&self) -> Result<OrderedSet<TransitionId>, SessionError> {
        let data = self.datamodel.lock();
        self.selector()
            .select_eventless(&data, self.datamodel.event())
    }

    fn select_current(&self) -> Result<OrderedSet<TransitionId>, SessionError> {
        let data = self.datamodel.lock();
        self.selector().select_for(&data, self.datamodel.event())
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.configuration());
    }

    fn names(&self, states: Vec<StateId>) -> Vec<String> {
        states
            .into_iter()
            .map(|s| self.document.name(s).to_string())
            .collect()
    }
}

impl<D> fmt::Debug for Session<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.config.name)
            .field("status", &self.status)
            .field("configuration", &self.configuration.len())
            .field("children", &self.children.len())
            .finish()
    }
}

/// Every `script` command in the document must name a registered hook.
fn check_scripts<D>(doc: &Document<D>, hooks: &Hooks<D>) -> Result<(), ContentError> {
    let states = doc
        .states()
        .flat_map(|(_, s)| s.on_entry().iter().chain(s.on_exit()));
    let transitions = doc.transitions().flat_map(|(_, t)| t.content());
    let finalize = doc.invokes().flat_map(|(_, i)| i.finalize());

    for command in states.chain(transitions).chain(finalize) {
        if let Command::Script(src) = command {
            if !hooks.has_script(src) {
                return Err(ContentError::UnknownScript { src: src.clone() });
            }
        }
    }
    Ok(())
}
