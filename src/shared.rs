use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

// Shared lets tasks hand a test object (a cycle log, a scoreboard) to the
// code that outlives them. The simulation is single threaded, so Rc/RefCell
// is enough. Borrows must never be held across an await.
pub struct Shared<T>(Rc<RefCell<T>>);

impl<T> Shared<T> {
    pub fn new(data: T) -> Shared<T> {
        Shared(Rc::new(RefCell::new(data)))
    }
    pub fn get(&self) -> Ref<'_, T> {
        self.0.borrow()
    }
    pub fn get_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared(self.0.clone())
    }
}

impl<T: Default> Default for Shared<T> {
    fn default() -> Self {
        Shared::new(T::default())
    }
}
