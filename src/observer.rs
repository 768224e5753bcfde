//! Callback lists with synchronous, in-order dispatch.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

pub struct Observers<T> {
    next_id: u64,
    handlers: Vec<(HandlerId, Box<dyn FnMut(&T)>)>,
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            handlers: Vec::new(),
        }
    }
}

impl<T> fmt::Debug for Observers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl<T> Observers<T> {
    pub fn connect(&mut self, handler: impl FnMut(&T) + 'static) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    pub fn disconnect(&mut self, id: HandlerId) -> bool {
        let len = self.handlers.len();
        self.handlers.retain(|(h, _)| *h != id);
        self.handlers.len() != len
    }

    /// Calls every handler in connection order.
    pub fn emit(&mut self, event: &T) {
        for (_, handler) in &mut self.handlers {
            handler(event);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_emit_in_connection_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut observers = Observers::default();
        for tag in ["a", "b"] {
            let seen = Rc::clone(&seen);
            observers.connect(move |v: &i32| seen.borrow_mut().push(format!("{tag}{v}")));
        }
        observers.emit(&1);
        assert_eq!(*seen.borrow(), vec!["a1", "b1"]);
    }

    #[test]
    fn test_disconnect() {
        let count = Rc::new(RefCell::new(0));
        let mut observers = Observers::default();
        let c = Rc::clone(&count);
        let id = observers.connect(move |_: &()| *c.borrow_mut() += 1);
        observers.emit(&());
        assert!(observers.disconnect(id));
        assert!(!observers.disconnect(id));
        observers.emit(&());
        assert_eq!(*count.borrow(), 1);
        assert!(observers.is_empty());
    }
}
