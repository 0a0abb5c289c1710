//! Multicast events with disconnectable listeners.
//!
//! Listeners receive a mutable target plus an argument value, so a
//! subscriber can mutate the state that fired it without shared ownership.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Callback<T, A> = Box<dyn FnMut(&mut T, &A)>;

struct Listener<T: ?Sized, A> {
    id: u64,
    callback: Callback<T, A>,
}

struct Registry<T: ?Sized, A> {
    next_id: u64,
    listeners: Vec<Listener<T, A>>,
    /// Ids disconnected while their callbacks were taken out for a fire.
    disconnected: Vec<u64>,
    firing: bool,
}

impl<T: ?Sized, A> Registry<T, A> {
    fn remove(&mut self, id: u64) {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        if self.firing && self.listeners.len() == before {
            self.disconnected.push(id);
        }
    }
}

/// An event that any number of listeners can connect to.
pub struct Event<T: ?Sized, A = ()> {
    registry: Rc<RefCell<Registry<T, A>>>,
}

impl<T: ?Sized, A> Default for Event<T, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + 'static, A: 'static> Event<T, A> {
    /// Connect a listener. Dropping the returned [`Connection`] keeps the
    /// listener attached; call [`Connection::disconnect`] to remove it.
    pub fn connect<F>(&self, callback: F) -> Connection
    where
        F: FnMut(&mut T, &A) + 'static,
    {
        let mut registry = self.registry.borrow_mut();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push(Listener {
            id,
            callback: Box::new(callback),
        });
        let weak: Weak<RefCell<Registry<T, A>>> = Rc::downgrade(&self.registry);
        Connection {
            id,
            detach: Some(Box::new(move |id| {
                if let Some(registry) = weak.upgrade() {
                    registry.borrow_mut().remove(id);
                }
            })),
        }
    }
}

impl<T: ?Sized, A> Event<T, A> {
    pub fn new() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
                disconnected: Vec::new(),
                firing: false,
            })),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry.borrow().listeners.len()
    }

    /// Call every connected listener in connection order.
    pub fn fire(&self, target: &mut T, args: &A) {
        let mut taken = {
            let mut registry = self.registry.borrow_mut();
            if registry.firing {
                log::warn!("Event fired re-entrantly; nested fire ignored");
                return;
            }
            registry.firing = true;
            std::mem::take(&mut registry.listeners)
        };

        for listener in taken.iter_mut() {
            let skip = self.registry.borrow().disconnected.contains(&listener.id);
            if !skip {
                (listener.callback)(target, args);
            }
        }

        let mut registry = self.registry.borrow_mut();
        let disconnected = std::mem::take(&mut registry.disconnected);
        taken.retain(|l| !disconnected.contains(&l.id));
        // Listeners connected during the fire were pushed onto the emptied list.
        let added = std::mem::take(&mut registry.listeners);
        taken.extend(added);
        registry.listeners = taken;
        registry.firing = false;
    }
}

/// Handle returned by [`Event::connect`].
pub struct Connection {
    id: u64,
    detach: Option<Box<dyn FnOnce(u64)>>,
}

impl Connection {
    /// Remove the listener. Calling this more than once is a no-op.
    pub fn disconnect(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach(self.id);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.detach.is_some()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn fire_calls_listeners_in_order() {
        let event: Event<Vec<u32>, u32> = Event::new();
        event.connect(|log, n| log.push(*n));
        event.connect(|log, n| log.push(n * 10));

        let mut log = Vec::new();
        event.fire(&mut log, &3);
        assert_eq!(log, vec![3, 30]);
    }

    #[test]
    fn disconnect_removes_only_that_listener() {
        let event: Event<Vec<&'static str>> = Event::new();
        let mut a = event.connect(|log, _| log.push("a"));
        event.connect(|log, _| log.push("b"));

        a.disconnect();
        a.disconnect();
        assert!(!a.is_connected());

        let mut log = Vec::new();
        event.fire(&mut log, &());
        assert_eq!(log, vec!["b"]);
        assert_eq!(event.listener_count(), 1);
    }

    #[test]
    fn listener_disconnected_mid_fire_is_not_called_later_in_that_fire() {
        let event: Event<Vec<&'static str>> = Event::new();
        let second: Rc<RefCell<Option<Connection>>> = Rc::new(RefCell::new(None));

        let handle = second.clone();
        event.connect(move |log, _| {
            log.push("first");
            if let Some(conn) = handle.borrow_mut().as_mut() {
                conn.disconnect();
            }
        });
        *second.borrow_mut() = Some(event.connect(|log, _| log.push("second")));

        let mut log = Vec::new();
        event.fire(&mut log, &());
        event.fire(&mut log, &());
        assert_eq!(log, vec!["first", "first"]);
    }

    #[test]
    fn listener_connected_mid_fire_runs_from_next_fire() {
        let event: Rc<Event<u32>> = Rc::new(Event::new());
        let inner = Rc::downgrade(&event);
        let connected = Rc::new(Cell::new(false));
        let flag = connected.clone();
        event.connect(move |count, _| {
            *count += 1;
            if !flag.get() {
                flag.set(true);
                if let Some(event) = inner.upgrade() {
                    event.connect(|count, _| *count += 100);
                }
            }
        });

        let mut count = 0;
        event.fire(&mut count, &());
        assert_eq!(count, 1);
        event.fire(&mut count, &());
        assert_eq!(count, 102);
    }
}
