//! Viewer events and a listener dispatcher that tolerates teardown from inside a callback.
//!
//! Listeners receive a [`DispatcherHandle`] alongside each event. Calling
//! [`DispatcherHandle::destroy`] while a dispatch is running does not touch the
//! listener list; the dispatcher moves to [`DispatcherState::PendingDestroy`]
//! and tears down once the loop has finished.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::trace;

use crate::scene::SceneId;

/// Notifications emitted to code embedding the viewer.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewerEvent {
    SceneLoadStart(SceneId),
    SceneLoadComplete(SceneId),
    TransitionStart {
        from: Option<SceneId>,
        to: SceneId,
    },
    TransitionComplete {
        from: Option<SceneId>,
        to: SceneId,
    },
    HotspotClicked {
        scene: SceneId,
        hotspot: String,
    },
}

/// Lifecycle of an [`EventDispatcher`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Dispatching,
    /// Destroy was requested mid-dispatch.
    PendingDestroy,
    Destroyed,
}

/// Token returned by listener registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<E> = Box<dyn FnMut(&E, &DispatcherHandle)>;

struct Listener<E> {
    id: ListenerId,
    once: bool,
    callback: Callback<E>,
}

/// Control surface passed to listeners during dispatch.
#[derive(Clone)]
pub struct DispatcherHandle {
    state: Rc<Cell<DispatcherState>>,
    removed: Rc<RefCell<Vec<ListenerId>>>,
}

impl DispatcherHandle {
    /// Request teardown. Deferred until the running dispatch completes.
    pub fn destroy(&self) {
        match self.state.get() {
            DispatcherState::Dispatching => self.state.set(DispatcherState::PendingDestroy),
            DispatcherState::Idle => self.state.set(DispatcherState::Destroyed),
            DispatcherState::PendingDestroy | DispatcherState::Destroyed => {}
        }
    }

    /// Unregister a listener. Takes effect after the running dispatch.
    pub fn off(&self, id: ListenerId) {
        self.removed.borrow_mut().push(id);
    }

    pub fn state(&self) -> DispatcherState {
        self.state.get()
    }
}

/// Ordered list of persistent and one-shot listeners.
pub struct EventDispatcher<E> {
    listeners: Vec<Listener<E>>,
    next_id: u64,
    handle: DispatcherHandle,
}

impl<E> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventDispatcher<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
            handle: DispatcherHandle {
                state: Rc::new(Cell::new(DispatcherState::Idle)),
                removed: Rc::new(RefCell::new(Vec::new())),
            },
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.handle.state()
    }

    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Register a listener called for every event.
    pub fn on(&mut self, callback: impl FnMut(&E, &DispatcherHandle) + 'static) -> ListenerId {
        self.register(callback, false)
    }

    /// Register a listener removed after its first call.
    pub fn once(&mut self, callback: impl FnMut(&E, &DispatcherHandle) + 'static) -> ListenerId {
        self.register(callback, true)
    }

    fn register(
        &mut self,
        callback: impl FnMut(&E, &DispatcherHandle) + 'static,
        once: bool,
    ) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        if self.state() != DispatcherState::Destroyed {
            self.listeners.push(Listener {
                id,
                once,
                callback: Box::new(callback),
            });
        }
        id
    }

    pub fn off(&mut self, id: ListenerId) {
        self.listeners.retain(|l| l.id != id);
    }

    /// Call every listener with `event`. A no-op once destroyed.
    pub fn dispatch(&mut self, event: &E) {
        if self.state() != DispatcherState::Idle {
            return;
        }
        self.handle.state.set(DispatcherState::Dispatching);

        let mut fired_once = Vec::new();
        // A destroy requested by a listener waits for the loop to finish.
        for listener in self.listeners.iter_mut() {
            (listener.callback)(event, &self.handle);
            if listener.once {
                fired_once.push(listener.id);
            }
        }

        let removed: Vec<ListenerId> = self.handle.removed.borrow_mut().drain(..).collect();
        self.listeners
            .retain(|l| !fired_once.contains(&l.id) && !removed.contains(&l.id));

        match self.handle.state.get() {
            DispatcherState::PendingDestroy => self.teardown(),
            _ => self.handle.state.set(DispatcherState::Idle),
        }
    }

    /// Tear down now, or after the running dispatch.
    pub fn destroy(&mut self) {
        match self.state() {
            DispatcherState::Dispatching => self.handle.state.set(DispatcherState::PendingDestroy),
            DispatcherState::Idle => self.teardown(),
            DispatcherState::PendingDestroy | DispatcherState::Destroyed => {}
        }
    }

    fn teardown(&mut self) {
        trace!(listeners = self.listeners.len(), "dispatcher destroyed");
        self.listeners.clear();
        self.handle.removed.borrow_mut().clear();
        self.handle.state.set(DispatcherState::Destroyed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistent_and_once_listeners() {
        let calls = Rc::new(Cell::new(0));
        let once_calls = Rc::new(Cell::new(0));
        let mut dispatcher = EventDispatcher::<u32>::new();

        let c = calls.clone();
        dispatcher.on(move |_, _| c.set(c.get() + 1));
        let c = once_calls.clone();
        dispatcher.once(move |_, _| c.set(c.get() + 1));

        dispatcher.dispatch(&1);
        dispatcher.dispatch(&2);

        assert_eq!(calls.get(), 2);
        assert_eq!(once_calls.get(), 1);
        assert_eq!(dispatcher.listener_count(), 1);
    }

    #[test]
    fn destroy_during_dispatch_is_deferred() {
        let seen_states = Rc::new(RefCell::new(Vec::new()));
        let later_calls = Rc::new(Cell::new(0));
        let mut dispatcher = EventDispatcher::<u32>::new();

        let s = seen_states.clone();
        dispatcher.on(move |_, handle| {
            handle.destroy();
            s.borrow_mut().push(handle.state());
        });
        let c = later_calls.clone();
        dispatcher.on(move |_, _| c.set(c.get() + 1));

        dispatcher.dispatch(&1);

        // Teardown waited for the loop: the state was pending inside the callback.
        assert_eq!(*seen_states.borrow(), vec![DispatcherState::PendingDestroy]);
        assert_eq!(dispatcher.state(), DispatcherState::Destroyed);
        assert_eq!(dispatcher.listener_count(), 0);
        assert_eq!(later_calls.get(), 1);

        dispatcher.dispatch(&2);
        assert_eq!(seen_states.borrow().len(), 1);
    }

    #[test]
    fn destroy_when_idle_is_immediate() {
        let mut dispatcher = EventDispatcher::<u32>::new();
        dispatcher.on(|_, _| {});
        dispatcher.destroy();
        assert_eq!(dispatcher.state(), DispatcherState::Destroyed);
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[test]
    fn off_from_inside_a_listener() {
        let calls = Rc::new(Cell::new(0));
        let mut dispatcher = EventDispatcher::<u32>::new();
        let c = calls.clone();
        let id = Rc::new(Cell::new(None));
        let id_in = id.clone();
        let registered = dispatcher.on(move |_, handle| {
            c.set(c.get() + 1);
            if let Some(id) = id_in.get() {
                handle.off(id);
            }
        });
        id.set(Some(registered));

        dispatcher.dispatch(&1);
        dispatcher.dispatch(&2);

        assert_eq!(calls.get(), 1);
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
    }
}
