#![forbid(unsafe_code)]

//! Live subscription handles.
//!
//! A [`LiveBinding`] is the RAII side of
//! [`ResourceStore::subscribe`](crate::ResourceStore::subscribe): while it
//! lives, change notifications flow; dropping it detaches the store-side
//! subscriber before any further notification can fire. The binding engine
//! holds one per live attribute and drops the whole set on unbind, which is
//! what makes unbind-before-rebind a matter of drop order.

use std::fmt;
use std::rc::Rc;

use inspire_core::Focus;

/// RAII handle to one store-side subscription.
pub struct LiveBinding {
    read: Rc<dyn Fn() -> Focus>,
    detach: Option<Box<dyn FnOnce()>>,
}

impl LiveBinding {
    /// Build a binding from a value reader and a detach action.
    ///
    /// `detach` runs exactly once, on drop.
    #[must_use]
    pub fn new(read: Rc<dyn Fn() -> Focus>, detach: impl FnOnce() + 'static) -> Self {
        Self {
            read,
            detach: Some(Box::new(detach)),
        }
    }

    /// The most recently delivered value.
    #[must_use]
    pub fn value(&self) -> Focus {
        (self.read)()
    }
}

impl Drop for LiveBinding {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl fmt::Debug for LiveBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveBinding")
            .field("value", &self.value())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn drop_runs_detach_once() {
        let detached = Rc::new(Cell::new(0));
        let d = Rc::clone(&detached);
        let binding = LiveBinding::new(Rc::new(|| Focus::Int(1)), move || d.set(d.get() + 1));
        assert_eq!(binding.value(), Focus::Int(1));
        drop(binding);
        assert_eq!(detached.get(), 1);
    }
}
