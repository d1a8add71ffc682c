#![forbid(unsafe_code)]

//! In-memory reference store.
//!
//! [`MemoryStore`] implements the full [`ResourceStore`] contract over plain
//! property maps: explicit connection gating, deferred activations and
//! property fetches settled by test drivers, media interpretation, and
//! change notification with batch deferral. It is the store the harness
//! fixtures build on, and doubles as the executable description of how a
//! real chronicle-backed store is expected to behave.
//!
//! # Invariants
//!
//! 1. Subscribers are notified in registration order.
//! 2. A mutation that leaves a subscriber's re-evaluated value structurally
//!    unchanged does not notify that subscriber.
//! 3. Inside [`MemoryStore::batch`], notifications are deferred; the
//!    outermost batch exit delivers at most one notification per binding.
//! 4. Dropping a [`LiveBinding`] detaches before any further delivery.
//! 5. [`MemoryStore::eval_count`] counts explicit `evaluate`/`subscribe`
//!    evaluations only, never internal re-evaluations during fan-out.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use tracing::{debug, trace, warn};

use inspire_core::{Deferred, Fault, Focus, ResourceId};

use crate::kuery::Kuery;
use crate::live::LiveBinding;
use crate::phase::ResourcePhase;
use crate::store::{Activation, Evaluation, ResourceStore, StoreError};

enum Media {
    Ready(Focus),
    Pending(Deferred<Focus>),
}

struct ResourceRecord {
    phase: ResourcePhase,
    connected: bool,
    reconnectable: bool,
    properties: AHashMap<Rc<str>, Focus>,
    pending_properties: AHashMap<Rc<str>, Deferred<Focus>>,
    pending_activation: Option<Deferred<ResourcePhase>>,
    media: Option<Media>,
}

impl ResourceRecord {
    fn new(phase: ResourcePhase) -> Self {
        Self {
            phase,
            connected: true,
            reconnectable: false,
            properties: AHashMap::new(),
            pending_properties: AHashMap::new(),
            pending_activation: None,
            media: None,
        }
    }
}

struct Subscriber {
    id: u64,
    frame: Focus,
    kuery: Kuery,
    last: Focus,
    callback: Rc<dyn Fn(&Focus)>,
}

struct Inner {
    resources: AHashMap<ResourceId, ResourceRecord>,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
    peak_subscribers: usize,
    batch_depth: u32,
    dirty: Vec<u64>,
    eval_counts: AHashMap<String, u64>,
}

/// Shared handle to an in-memory resource graph.
///
/// Clones share state; the store is single-threaded.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Rc<RefCell<Inner>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                resources: AHashMap::new(),
                subscribers: Vec::new(),
                next_subscriber: 0,
                peak_subscribers: 0,
                batch_depth: 0,
                dirty: Vec::new(),
                eval_counts: AHashMap::new(),
            })),
        }
    }

    // -----------------------------------------------------------------
    // Graph construction and mutation
    // -----------------------------------------------------------------

    /// Create a connected, `Active` resource.
    pub fn create_resource(&self, id: impl Into<ResourceId>) -> ResourceId {
        let id = id.into();
        debug!(resource = %id, "create resource");
        self.inner
            .borrow_mut()
            .resources
            .insert(id.clone(), ResourceRecord::new(ResourcePhase::Active));
        id
    }

    pub fn set_phase(&self, id: &ResourceId, phase: ResourcePhase) {
        if let Some(record) = self.inner.borrow_mut().resources.get_mut(id) {
            debug!(resource = %id, %phase, "phase change");
            record.phase = phase;
        }
        self.notify();
    }

    pub fn connect(&self, id: &ResourceId) {
        if let Some(record) = self.inner.borrow_mut().resources.get_mut(id) {
            debug!(resource = %id, "connect");
            record.connected = true;
        }
        self.notify();
    }

    pub fn disconnect(&self, id: &ResourceId) {
        if let Some(record) = self.inner.borrow_mut().resources.get_mut(id) {
            debug!(resource = %id, "disconnect");
            record.connected = false;
        }
    }

    /// Allow [`ResourceStore::acquire_connections`] to connect `id` on demand.
    pub fn mark_reconnectable(&self, id: &ResourceId) {
        if let Some(record) = self.inner.borrow_mut().resources.get_mut(id) {
            record.reconnectable = true;
        }
    }

    /// Set a property and notify affected subscribers.
    pub fn set_property(&self, id: &ResourceId, name: impl Into<Rc<str>>, value: Focus) {
        let name = name.into();
        if let Some(record) = self.inner.borrow_mut().resources.get_mut(id) {
            trace!(resource = %id, property = %name, "set property");
            record.properties.insert(name, value);
        }
        self.notify();
    }

    /// Mark a property as fetching; evaluation yields `Loading` until
    /// [`MemoryStore::settle_property`] or [`MemoryStore::fail_property`].
    pub fn begin_pending_property(
        &self,
        id: &ResourceId,
        name: impl Into<Rc<str>>,
    ) -> Deferred<Focus> {
        let deferred = Deferred::pending();
        if let Some(record) = self.inner.borrow_mut().resources.get_mut(id) {
            record
                .pending_properties
                .insert(name.into(), deferred.clone());
        }
        deferred
    }

    /// Complete a pending property fetch with `value`.
    pub fn settle_property(&self, id: &ResourceId, name: &str, value: Focus) {
        let pending = {
            let mut inner = self.inner.borrow_mut();
            let Some(record) = inner.resources.get_mut(id) else {
                return;
            };
            let pending = record.pending_properties.remove(name);
            record.properties.insert(name.into(), value.clone());
            pending
        };
        match pending {
            Some(deferred) => {
                if !deferred.settle(Ok(value)) {
                    warn!(resource = %id, property = name, "property settled twice");
                }
            }
            None => trace!(resource = %id, property = name, "settle without pending fetch"),
        }
        self.notify();
    }

    /// Fail a pending property fetch.
    pub fn fail_property(&self, id: &ResourceId, name: &str, fault: Fault) {
        let pending = {
            let mut inner = self.inner.borrow_mut();
            inner
                .resources
                .get_mut(id)
                .and_then(|record| record.pending_properties.remove(name))
        };
        if let Some(deferred) = pending {
            deferred.settle(Err(fault));
        }
    }

    /// Put `id` into `Activating` with a deferred final phase.
    pub fn begin_pending_activation(&self, id: &ResourceId) -> Deferred<ResourcePhase> {
        let deferred = Deferred::pending();
        if let Some(record) = self.inner.borrow_mut().resources.get_mut(id) {
            record.phase = ResourcePhase::Activating;
            record.pending_activation = Some(deferred.clone());
        }
        deferred
    }

    /// Finish a pending activation with the final phase.
    pub fn complete_activation(&self, id: &ResourceId, phase: ResourcePhase) {
        let pending = {
            let mut inner = self.inner.borrow_mut();
            let Some(record) = inner.resources.get_mut(id) else {
                return;
            };
            record.phase = phase;
            record.pending_activation.take()
        };
        match pending {
            Some(deferred) => {
                debug!(resource = %id, %phase, "activation complete");
                if !deferred.settle(Ok(phase)) {
                    warn!(resource = %id, "activation settled twice");
                }
            }
            None => trace!(resource = %id, "activation completion without pending"),
        }
        self.notify();
    }

    /// Attach immediately-interpretable media content.
    pub fn set_media(&self, id: &ResourceId, content: Focus) {
        if let Some(record) = self.inner.borrow_mut().resources.get_mut(id) {
            record.media = Some(Media::Ready(content));
        }
    }

    /// Attach media whose interpretation suspends until
    /// [`MemoryStore::settle_media`].
    pub fn begin_pending_media(&self, id: &ResourceId) -> Deferred<Focus> {
        let deferred = Deferred::pending();
        if let Some(record) = self.inner.borrow_mut().resources.get_mut(id) {
            record.media = Some(Media::Pending(deferred.clone()));
        }
        deferred
    }

    /// Complete a pending media interpretation.
    pub fn settle_media(&self, id: &ResourceId, content: Focus) {
        let pending = {
            let mut inner = self.inner.borrow_mut();
            let Some(record) = inner.resources.get_mut(id) else {
                return;
            };
            match record.media.take() {
                Some(Media::Pending(deferred)) => {
                    record.media = Some(Media::Ready(content.clone()));
                    Some(deferred)
                }
                other => {
                    record.media = other;
                    None
                }
            }
        };
        if let Some(deferred) = pending {
            deferred.settle(Ok(content));
        }
    }

    // -----------------------------------------------------------------
    // Batching and introspection
    // -----------------------------------------------------------------

    /// Run `f` with notifications deferred until the outermost batch exits.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = BatchGuard::enter(self);
        f()
    }

    /// How many times `kuery` was explicitly evaluated or subscribed.
    #[must_use]
    pub fn eval_count(&self, kuery: &Kuery) -> u64 {
        self.inner
            .borrow()
            .eval_counts
            .get(&kuery.to_string())
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Highest number of simultaneously live subscriptions ever observed.
    ///
    /// A rebind that detaches its old subscription before attaching the
    /// new one never raises this above the steady-state count.
    #[must_use]
    pub fn peak_subscriber_count(&self) -> usize {
        self.inner.borrow().peak_subscribers
    }

    // -----------------------------------------------------------------
    // Evaluation internals
    // -----------------------------------------------------------------

    fn eval_counted(&self, frame: &Focus, kuery: &Kuery) -> Result<Evaluation, StoreError> {
        *self
            .inner
            .borrow_mut()
            .eval_counts
            .entry(kuery.to_string())
            .or_insert(0) += 1;
        self.eval(frame, kuery)
    }

    fn eval(&self, frame: &Focus, kuery: &Kuery) -> Result<Evaluation, StoreError> {
        match kuery {
            Kuery::Head => Ok(Evaluation::Ready(frame.clone())),
            Kuery::Literal(value) => Ok(Evaluation::Ready(value.clone())),
            Kuery::Property(name) => self.eval_property(frame, name),
            Kuery::Chain(steps) => self.eval_chain(frame.clone(), steps.clone(), 0),
        }
    }

    fn eval_property(&self, frame: &Focus, name: &str) -> Result<Evaluation, StoreError> {
        let id = match frame {
            Focus::Resource(id) => id.clone(),
            other => {
                return Err(StoreError::WrongFocus {
                    operation: format!(".{name}"),
                    focus: other.clone(),
                });
            }
        };
        let inner = self.inner.borrow();
        let record = inner
            .resources
            .get(&id)
            .ok_or_else(|| StoreError::NoSuchResource(id.clone()))?;
        if record.phase.is_destroyed() {
            return Err(StoreError::Destroyed(id.clone()));
        }
        if !record.connected {
            return Err(StoreError::MissingConnection {
                resources: vec![id.clone()],
            });
        }
        if let Some(pending) = record.pending_properties.get(name) {
            return Ok(Evaluation::Loading(pending.clone()));
        }
        Ok(Evaluation::Ready(
            record.properties.get(name).cloned().unwrap_or(Focus::None),
        ))
    }

    fn eval_chain(
        &self,
        mut current: Focus,
        steps: Rc<[Kuery]>,
        mut index: usize,
    ) -> Result<Evaluation, StoreError> {
        while index < steps.len() {
            match self.eval(&current, &steps[index])? {
                Evaluation::Ready(value) => {
                    current = value;
                    index += 1;
                }
                Evaluation::Loading(step) => {
                    let out = Deferred::pending();
                    self.resume_chain(step, steps, index + 1, out.clone());
                    return Ok(Evaluation::Loading(out));
                }
            }
        }
        Ok(Evaluation::Ready(current))
    }

    /// Continue a chain once a suspended step settles, forwarding into `out`.
    fn resume_chain(
        &self,
        step: Deferred<Focus>,
        steps: Rc<[Kuery]>,
        next: usize,
        out: Deferred<Focus>,
    ) {
        let store = self.clone();
        step.on_settle(move |result| match result {
            Err(fault) => {
                out.settle(Err(fault));
            }
            Ok(value) => match store.eval_chain(value, steps, next) {
                Err(err) => {
                    out.settle(Err(err.into()));
                }
                Ok(Evaluation::Ready(value)) => {
                    out.settle(Ok(value));
                }
                Ok(Evaluation::Loading(rest)) => {
                    rest.on_settle(move |r| {
                        out.settle(r);
                    });
                }
            },
        });
    }

    // -----------------------------------------------------------------
    // Notification fan-out
    // -----------------------------------------------------------------

    fn notify(&self) {
        let deferred_ids = {
            let mut inner = self.inner.borrow_mut();
            if inner.batch_depth > 0 {
                let ids: Vec<u64> = inner.subscribers.iter().map(|s| s.id).collect();
                for id in ids {
                    if !inner.dirty.contains(&id) {
                        inner.dirty.push(id);
                    }
                }
                return;
            }
            inner.subscribers.iter().map(|s| s.id).collect::<Vec<_>>()
        };
        self.deliver(&deferred_ids);
    }

    /// Re-evaluate each listed subscriber and notify the changed ones, in
    /// registration order. Callbacks run without any store borrow held.
    fn deliver(&self, ids: &[u64]) {
        for &id in ids {
            let target = {
                let inner = self.inner.borrow();
                inner
                    .subscribers
                    .iter()
                    .find(|s| s.id == id)
                    .map(|s| (s.frame.clone(), s.kuery.clone()))
            };
            let Some((frame, kuery)) = target else {
                continue;
            };
            let value = match self.eval(&frame, &kuery) {
                Ok(Evaluation::Ready(value)) => value,
                // Still loading or currently unevaluable: delivery happens
                // on the mutation that makes it evaluable again.
                Ok(Evaluation::Loading(_)) | Err(_) => continue,
            };
            let callback = {
                let mut inner = self.inner.borrow_mut();
                let Some(sub) = inner.subscribers.iter_mut().find(|s| s.id == id) else {
                    continue;
                };
                if sub.last == value {
                    continue;
                }
                sub.last = value.clone();
                Rc::clone(&sub.callback)
            };
            trace!(subscriber = id, kuery = %kuery, "notify");
            callback(&value);
        }
    }
}

struct BatchGuard {
    store: MemoryStore,
}

impl BatchGuard {
    fn enter(store: &MemoryStore) -> Self {
        store.inner.borrow_mut().batch_depth += 1;
        Self {
            store: store.clone(),
        }
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let flush = {
            let mut inner = self.store.inner.borrow_mut();
            inner.batch_depth -= 1;
            inner.batch_depth == 0
        };
        if flush {
            let dirty = std::mem::take(&mut self.store.inner.borrow_mut().dirty);
            self.store.deliver(&dirty);
        }
    }
}

impl ResourceStore for MemoryStore {
    fn phase(&self, id: &ResourceId) -> ResourcePhase {
        self.inner
            .borrow()
            .resources
            .get(id)
            .map_or(ResourcePhase::Immaterial, |r| r.phase)
    }

    fn activate(&self, id: &ResourceId) -> Result<Activation, StoreError> {
        let inner = self.inner.borrow();
        let record = inner
            .resources
            .get(id)
            .ok_or_else(|| StoreError::NoSuchResource(id.clone()))?;
        if !record.connected {
            return Err(StoreError::MissingConnection {
                resources: vec![id.clone()],
            });
        }
        match &record.pending_activation {
            Some(deferred) => Ok(Activation::Pending(deferred.clone())),
            None => Ok(Activation::Ready(record.phase)),
        }
    }

    fn evaluate(&self, frame: &Focus, kuery: &Kuery) -> Result<Evaluation, StoreError> {
        self.eval_counted(frame, kuery)
    }

    fn subscribe(
        &self,
        frame: &Focus,
        kuery: &Kuery,
        on_change: Rc<dyn Fn(&Focus)>,
    ) -> Result<LiveBinding, StoreError> {
        let initial = match self.eval_counted(frame, kuery)? {
            Evaluation::Ready(value) => value,
            // Loading: the settling mutation re-notifies through the normal
            // changed-value path, so start from None.
            Evaluation::Loading(_) => Focus::None,
        };

        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_subscriber;
            inner.next_subscriber += 1;
            inner.subscribers.push(Subscriber {
                id,
                frame: frame.clone(),
                kuery: kuery.clone(),
                last: initial.clone(),
                callback: on_change,
            });
            inner.peak_subscribers = inner.peak_subscribers.max(inner.subscribers.len());
            id
        };
        trace!(subscriber = id, kuery = %kuery, "subscribe");

        let read_inner = Rc::clone(&self.inner);
        let read = Rc::new(move || {
            read_inner
                .borrow()
                .subscribers
                .iter()
                .find(|s| s.id == id)
                .map_or(Focus::None, |s| s.last.clone())
        });
        let detach_inner = Rc::clone(&self.inner);
        Ok(LiveBinding::new(read, move || {
            trace!(subscriber = id, "detach");
            let mut inner = detach_inner.borrow_mut();
            inner.subscribers.retain(|s| s.id != id);
            inner.dirty.retain(|d| *d != id);
        }))
    }

    fn get_property(
        &self,
        id: &ResourceId,
        names: &[&str],
    ) -> Result<Option<Focus>, StoreError> {
        let inner = self.inner.borrow();
        let record = inner
            .resources
            .get(id)
            .ok_or_else(|| StoreError::NoSuchResource(id.clone()))?;
        if record.phase.is_destroyed() {
            return Err(StoreError::Destroyed(id.clone()));
        }
        if !record.connected {
            return Err(StoreError::MissingConnection {
                resources: vec![id.clone()],
            });
        }
        for name in names {
            if let Some(value) = record.properties.get(*name) {
                return Ok(Some(value.clone()));
            }
        }
        Ok(None)
    }

    fn interpret(&self, id: &ResourceId) -> Result<Evaluation, StoreError> {
        let inner = self.inner.borrow();
        let record = inner
            .resources
            .get(id)
            .ok_or_else(|| StoreError::NoSuchResource(id.clone()))?;
        match &record.media {
            Some(Media::Ready(content)) => Ok(Evaluation::Ready(content.clone())),
            Some(Media::Pending(deferred)) => Ok(Evaluation::Loading(deferred.clone())),
            None => Err(StoreError::WrongFocus {
                operation: "interpret".into(),
                focus: Focus::Resource(id.clone()),
            }),
        }
    }

    fn acquire_connections(&self, resources: &[ResourceId]) -> bool {
        let mut all_connected = true;
        {
            let mut inner = self.inner.borrow_mut();
            for id in resources {
                match inner.resources.get_mut(id) {
                    Some(record) => {
                        if !record.connected && record.reconnectable {
                            debug!(resource = %id, "reconnect");
                            record.connected = true;
                        }
                        all_connected &= record.connected;
                    }
                    None => all_connected = false,
                }
            }
        }
        if all_connected {
            self.notify();
        }
        all_connected
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("MemoryStore")
            .field("resources", &inner.resources.len())
            .field("subscribers", &inner.subscribers.len())
            .field("batch_depth", &inner.batch_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn store_with(id: &str, name: &str, value: Focus) -> (MemoryStore, ResourceId) {
        let store = MemoryStore::new();
        let id = store.create_resource(id);
        store.set_property(&id, name, value);
        (store, id)
    }

    fn ready(evaluation: Evaluation) -> Focus {
        match evaluation {
            Evaluation::Ready(value) => value,
            Evaluation::Loading(_) => panic!("expected ready evaluation"),
        }
    }

    #[test]
    fn evaluate_reads_properties() {
        let (store, id) = store_with("r", "title", Focus::text("hello"));
        let out = store
            .evaluate(&Focus::Resource(id), &Kuery::property("title"))
            .unwrap();
        assert_eq!(ready(out), Focus::text("hello"));
    }

    #[test]
    fn missing_property_is_none() {
        let (store, id) = store_with("r", "title", Focus::text("hello"));
        let out = store
            .evaluate(&Focus::Resource(id), &Kuery::property("absent"))
            .unwrap();
        assert_eq!(ready(out), Focus::None);
    }

    #[test]
    fn property_of_non_resource_is_wrong_focus() {
        let store = MemoryStore::new();
        let err = store
            .evaluate(&Focus::Int(3), &Kuery::property("x"))
            .unwrap_err();
        assert!(matches!(err, StoreError::WrongFocus { .. }));
    }

    #[test]
    fn chain_follows_resource_steps() {
        let store = MemoryStore::new();
        let owner = store.create_resource("owner");
        let doc = store.create_resource("doc");
        store.set_property(&doc, "owner", Focus::Resource(owner.clone()));
        store.set_property(&owner, "name", Focus::text("ada"));

        let kuery = Kuery::chain(vec![Kuery::property("owner"), Kuery::property("name")]);
        let out = store.evaluate(&Focus::Resource(doc), &kuery).unwrap();
        assert_eq!(ready(out), Focus::text("ada"));
    }

    #[test]
    fn chain_suspends_and_resumes_through_pending_step() {
        let store = MemoryStore::new();
        let owner = store.create_resource("owner");
        let doc = store.create_resource("doc");
        store.set_property(&owner, "name", Focus::text("ada"));
        store.begin_pending_property(&doc, "owner");

        let kuery = Kuery::chain(vec![Kuery::property("owner"), Kuery::property("name")]);
        let out = store.evaluate(&Focus::Resource(doc.clone()), &kuery).unwrap();
        let Evaluation::Loading(deferred) = out else {
            panic!("expected loading evaluation");
        };
        assert!(deferred.is_pending());

        store.settle_property(&doc, "owner", Focus::Resource(owner));
        assert_eq!(deferred.peek(), Some(Ok(Focus::text("ada"))));
    }

    #[test]
    fn unconnected_resource_is_missing_connection() {
        let (store, id) = store_with("r", "title", Focus::text("x"));
        store.disconnect(&id);
        let err = store
            .evaluate(&Focus::Resource(id.clone()), &Kuery::property("title"))
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::MissingConnection {
                resources: vec![id],
            }
        );
    }

    #[test]
    fn acquire_connections_honors_reconnectable() {
        let (store, id) = store_with("r", "title", Focus::text("x"));
        store.disconnect(&id);
        assert!(!store.acquire_connections(std::slice::from_ref(&id)));

        store.mark_reconnectable(&id);
        assert!(store.acquire_connections(std::slice::from_ref(&id)));
        assert!(
            store
                .evaluate(&Focus::Resource(id), &Kuery::property("title"))
                .is_ok()
        );
    }

    #[test]
    fn subscribe_notifies_on_change_with_new_value() {
        let (store, id) = store_with("r", "n", Focus::Int(1));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let binding = store
            .subscribe(
                &Focus::Resource(id.clone()),
                &Kuery::property("n"),
                Rc::new(move |v: &Focus| s.borrow_mut().push(v.clone())),
            )
            .unwrap();

        assert_eq!(binding.value(), Focus::Int(1));
        store.set_property(&id, "n", Focus::Int(2));
        assert_eq!(binding.value(), Focus::Int(2));
        assert_eq!(&*seen.borrow(), &[Focus::Int(2)]);
    }

    #[test]
    fn unchanged_value_does_not_notify() {
        let (store, id) = store_with("r", "n", Focus::text("same"));
        let fired = Rc::new(Cell::new(0u32));
        let f = Rc::clone(&fired);
        let _binding = store
            .subscribe(
                &Focus::Resource(id.clone()),
                &Kuery::property("n"),
                Rc::new(move |_: &Focus| f.set(f.get() + 1)),
            )
            .unwrap();

        store.set_property(&id, "n", Focus::text("same"));
        assert_eq!(fired.get(), 0, "structurally equal value must not notify");
        store.set_property(&id, "n", Focus::text("changed"));
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn dropping_binding_stops_delivery() {
        let (store, id) = store_with("r", "n", Focus::Int(1));
        let fired = Rc::new(Cell::new(0u32));
        let f = Rc::clone(&fired);
        let binding = store
            .subscribe(
                &Focus::Resource(id.clone()),
                &Kuery::property("n"),
                Rc::new(move |_: &Focus| f.set(f.get() + 1)),
            )
            .unwrap();
        assert_eq!(store.subscriber_count(), 1);

        drop(binding);
        assert_eq!(store.subscriber_count(), 0);
        store.set_property(&id, "n", Focus::Int(2));
        assert_eq!(fired.get(), 0);
    }

    #[test]
    fn notification_order_is_registration_order() {
        let (store, id) = store_with("r", "n", Focus::Int(1));
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut bindings = Vec::new();
        for tag in 0..3 {
            let o = Rc::clone(&order);
            bindings.push(
                store
                    .subscribe(
                        &Focus::Resource(id.clone()),
                        &Kuery::property("n"),
                        Rc::new(move |_: &Focus| o.borrow_mut().push(tag)),
                    )
                    .unwrap(),
            );
        }
        store.set_property(&id, "n", Focus::Int(2));
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn batch_delivers_once_per_binding() {
        let (store, id) = store_with("r", "n", Focus::Int(0));
        let fired = Rc::new(Cell::new(0u32));
        let f = Rc::clone(&fired);
        let binding = store
            .subscribe(
                &Focus::Resource(id.clone()),
                &Kuery::property("n"),
                Rc::new(move |_: &Focus| f.set(f.get() + 1)),
            )
            .unwrap();

        store.batch(|| {
            store.set_property(&id, "n", Focus::Int(1));
            store.set_property(&id, "n", Focus::Int(2));
            store.set_property(&id, "n", Focus::Int(3));
            assert_eq!(fired.get(), 0, "deferred inside batch");
        });
        assert_eq!(fired.get(), 1);
        assert_eq!(binding.value(), Focus::Int(3));
    }

    #[test]
    fn nested_batch_flushes_at_outermost_exit() {
        let (store, id) = store_with("r", "n", Focus::Int(0));
        let fired = Rc::new(Cell::new(0u32));
        let f = Rc::clone(&fired);
        let _binding = store
            .subscribe(
                &Focus::Resource(id.clone()),
                &Kuery::property("n"),
                Rc::new(move |_: &Focus| f.set(f.get() + 1)),
            )
            .unwrap();

        store.batch(|| {
            store.set_property(&id, "n", Focus::Int(1));
            store.batch(|| {
                store.set_property(&id, "n", Focus::Int(2));
            });
            assert_eq!(fired.get(), 0, "inner exit must not flush");
        });
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn batch_with_no_net_change_stays_silent() {
        let (store, id) = store_with("r", "n", Focus::Int(0));
        let fired = Rc::new(Cell::new(0u32));
        let f = Rc::clone(&fired);
        let _binding = store
            .subscribe(
                &Focus::Resource(id.clone()),
                &Kuery::property("n"),
                Rc::new(move |_: &Focus| f.set(f.get() + 1)),
            )
            .unwrap();

        store.batch(|| {
            store.set_property(&id, "n", Focus::Int(5));
            store.set_property(&id, "n", Focus::Int(0));
        });
        assert_eq!(fired.get(), 0, "value returned to cached state");
    }

    #[test]
    fn pending_property_loads_then_settles() {
        let store = MemoryStore::new();
        let id = store.create_resource("r");
        store.begin_pending_property(&id, "body");

        let out = store
            .evaluate(&Focus::Resource(id.clone()), &Kuery::property("body"))
            .unwrap();
        let Evaluation::Loading(deferred) = out else {
            panic!("expected loading");
        };
        store.settle_property(&id, "body", Focus::text("loaded"));
        assert_eq!(deferred.peek(), Some(Ok(Focus::text("loaded"))));
    }

    #[test]
    fn failed_property_rejects_the_deferred() {
        let store = MemoryStore::new();
        let id = store.create_resource("r");
        store.begin_pending_property(&id, "body");
        let out = store
            .evaluate(&Focus::Resource(id.clone()), &Kuery::property("body"))
            .unwrap();
        let Evaluation::Loading(deferred) = out else {
            panic!("expected loading");
        };
        store.fail_property(&id, "body", Fault::new("fetch refused"));
        match deferred.peek() {
            Some(Err(fault)) => assert_eq!(fault.message(), "fetch refused"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn activation_lifecycle() {
        let store = MemoryStore::new();
        let id = store.create_resource("r");
        store.begin_pending_activation(&id);
        assert_eq!(store.phase(&id), ResourcePhase::Activating);

        let Activation::Pending(deferred) = store.activate(&id).unwrap() else {
            panic!("expected pending activation");
        };
        store.complete_activation(&id, ResourcePhase::Active);
        assert_eq!(deferred.peek(), Some(Ok(ResourcePhase::Active)));
        assert!(matches!(
            store.activate(&id).unwrap(),
            Activation::Ready(ResourcePhase::Active)
        ));
    }

    #[test]
    fn unknown_resource_phase_is_immaterial() {
        let store = MemoryStore::new();
        assert_eq!(
            store.phase(&ResourceId::new("ghost")),
            ResourcePhase::Immaterial
        );
        assert!(matches!(
            store.activate(&ResourceId::new("ghost")),
            Err(StoreError::NoSuchResource(_))
        ));
    }

    #[test]
    fn get_property_fallback_order() {
        let store = MemoryStore::new();
        let id = store.create_resource("r");
        store.set_property(&id, "second", Focus::Int(2));
        store.set_property(&id, "third", Focus::Int(3));
        let found = store
            .get_property(&id, &["first", "second", "third"])
            .unwrap();
        assert_eq!(found, Some(Focus::Int(2)));
        assert_eq!(store.get_property(&id, &["absent"]).unwrap(), None);
    }

    #[test]
    fn interpret_ready_and_pending() {
        let store = MemoryStore::new();
        let id = store.create_resource("m");
        store.set_media(&id, Focus::text("content"));
        assert_eq!(
            ready(store.interpret(&id).unwrap()),
            Focus::text("content")
        );

        let id2 = store.create_resource("m2");
        store.begin_pending_media(&id2);
        let Evaluation::Loading(deferred) = store.interpret(&id2).unwrap() else {
            panic!("expected loading interpretation");
        };
        store.settle_media(&id2, Focus::text("late"));
        assert_eq!(deferred.peek(), Some(Ok(Focus::text("late"))));
    }

    #[test]
    fn eval_count_tracks_explicit_evaluations_only() {
        let (store, id) = store_with("r", "n", Focus::Int(1));
        let kuery = Kuery::property("n");
        assert_eq!(store.eval_count(&kuery), 0);

        let _ = store.evaluate(&Focus::Resource(id.clone()), &kuery).unwrap();
        let _binding = store
            .subscribe(
                &Focus::Resource(id.clone()),
                &kuery,
                Rc::new(|_: &Focus| {}),
            )
            .unwrap();
        assert_eq!(store.eval_count(&kuery), 2);

        // Fan-out re-evaluation does not count.
        store.set_property(&id, "n", Focus::Int(9));
        assert_eq!(store.eval_count(&kuery), 2);
    }

    #[test]
    fn destroyed_resource_errors() {
        let (store, id) = store_with("r", "n", Focus::Int(1));
        store.set_phase(&id, ResourcePhase::Destroyed);
        let err = store
            .evaluate(&Focus::Resource(id.clone()), &Kuery::property("n"))
            .unwrap_err();
        assert_eq!(err, StoreError::Destroyed(id));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn last_write_wins_regardless_of_batching(
                writes in proptest::collection::vec((0u8..4u8, 0i32..100i32), 1..24),
                batched: bool,
            ) {
                let store = MemoryStore::new();
                let id = store.create_resource("r");
                let names = ["a", "b", "c", "d"];
                let apply = || {
                    for (slot, value) in &writes {
                        store.set_property(
                            &id,
                            names[usize::from(*slot)],
                            Focus::Int(i64::from(*value)),
                        );
                    }
                };
                if batched {
                    store.batch(apply);
                } else {
                    apply();
                }

                let mut expected: [Option<i64>; 4] = [None; 4];
                for (slot, value) in &writes {
                    expected[usize::from(*slot)] = Some(i64::from(*value));
                }
                for (slot, name) in names.iter().enumerate() {
                    let got = store.get_property(&id, &[name]).unwrap();
                    prop_assert_eq!(got, expected[slot].map(Focus::Int));
                }
            }
        }
    }
}
