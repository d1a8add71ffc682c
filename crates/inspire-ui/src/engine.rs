#![forbid(unsafe_code)]

//! Engine front door: mounting, scheduling, flushing.
//!
//! The engine owns the shared services (store handle, vocabulary,
//! policy, recorder table) and a queue of components whose state
//! changed since the last flush. Rendering is pulled: a flush renders
//! the root of each scheduled component's tree and lets the output
//! caches keep untouched subtrees cheap.
//!
//! # Invariants
//!
//! 1. A flush never runs re-entrantly. A flush triggered while one is
//!    draining returns zero and leaves the queue to the outer call.
//! 2. A scheduled component whose tree was already rendered clean this
//!    flush does not render again; the queue may hold duplicates but
//!    the work is deduplicated through the dirty flags.
//! 3. Dropped or unmounted components in the queue are skipped, never
//!    resurrected.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use inspire_core::{Focus, Key, Node};
use inspire_store::ResourceStore;

use crate::component::ComponentCore;
use crate::context::UiContext;
use crate::error::LensError;
use crate::lens::{Lens, Valoscope};
use crate::policy::RenderPolicy;
use crate::resolve::Services;
use crate::slots::SlotRegistry;
use crate::vocabulary::standard_registry;

// ---------------------------------------------------------------------------
// Engine internals
// ---------------------------------------------------------------------------

pub(crate) struct EngineInner {
    services: Rc<Services>,
    queue: RefCell<VecDeque<Weak<ComponentCore>>>,
    flushing: Cell<bool>,
    next_component: Cell<u64>,
}

impl EngineInner {
    pub(crate) fn services(&self) -> Rc<Services> {
        Rc::clone(&self.services)
    }

    pub(crate) fn next_component_id(&self) -> u64 {
        let id = self.next_component.get();
        self.next_component.set(id + 1);
        id
    }

    pub(crate) fn schedule(&self, component: Weak<ComponentCore>) {
        self.queue.borrow_mut().push_back(component);
    }
}

// ---------------------------------------------------------------------------
// Public surface
// ---------------------------------------------------------------------------

/// The rendering engine.
///
/// Cheap to construct per store; mounts any number of views. All work
/// happens on the calling thread: store notifications enqueue renders
/// and [`Engine::flush`] drains them.
pub struct Engine {
    inner: Rc<EngineInner>,
}

impl Engine {
    /// Engine over `store` with the standard slot vocabulary.
    pub fn new(store: Rc<dyn ResourceStore>, policy: RenderPolicy) -> Result<Self, LensError> {
        Self::with_registry(store, policy, standard_registry())
    }

    /// Engine over a caller-assembled vocabulary. The registry must
    /// contain the core slot names; anything else is a [`LensError`].
    pub fn with_registry(
        store: Rc<dyn ResourceStore>,
        policy: RenderPolicy,
        registry: SlotRegistry,
    ) -> Result<Self, LensError> {
        let services = Services::new(store, policy, registry)?;
        Ok(Self {
            inner: Rc::new(EngineInner {
                services,
                queue: RefCell::new(VecDeque::new()),
                flushing: Cell::new(false),
                next_component: Cell::new(0),
            }),
        })
    }

    /// Mount `lens` focused on `focus` and render it eagerly. The
    /// returned [`View`] owns the tree until unmounted.
    pub fn mount(&self, lens: impl Into<Lens>, focus: Focus) -> View {
        let spec = Rc::new(Valoscope::new().slot("lens", lens.into()));
        let context = UiContext::new();
        context.set_render_depth(0);
        let root = ComponentCore::mount(
            &self.inner,
            spec,
            focus,
            Key::new("root"),
            context,
            Weak::new(),
        );
        debug!("view mounted");
        root.render();
        View { root }
    }

    /// Drain the scheduled work. Returns how many tree renders ran.
    pub fn flush(&self) -> usize {
        if self.inner.flushing.replace(true) {
            return 0;
        }
        let mut rendered = 0;
        loop {
            let next = self.inner.queue.borrow_mut().pop_front();
            let Some(weak) = next else { break };
            let Some(component) = weak.upgrade() else {
                continue;
            };
            let root = component.root();
            if root.is_dirty() {
                trace!("flushing a scheduled render");
                root.render();
                rendered += 1;
            }
        }
        self.inner.flushing.set(false);
        rendered
    }

    /// Number of queued notifications awaiting a flush. Duplicates of
    /// one component count once each here but render at most once.
    #[must_use]
    pub fn pending_renders(&self) -> usize {
        self.inner.queue.borrow().len()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("pending_renders", &self.inner.queue.borrow().len())
            .finish_non_exhaustive()
    }
}

/// A mounted render tree.
#[derive(Debug)]
pub struct View {
    root: Rc<ComponentCore>,
}

impl View {
    /// Current output tree, re-rendering only what is dirty.
    #[must_use]
    pub fn tree(&self) -> Node {
        self.root.render()
    }

    /// Toggle whether the root error panel includes failure detail.
    pub fn toggle_error_detail(&self) {
        self.root.toggle_error_detail();
    }

    /// Drop the root's sticky fault and schedule a fresh render.
    pub fn clear_error(&self) {
        self.root.clear_error();
    }

    /// Tear the tree down: subscriptions detach, children unmount,
    /// scope resources release.
    pub fn unmount(self) {
        self.root.unmount();
    }
}
