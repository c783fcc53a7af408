use std::{
    fmt,
    ops::{Deref, DerefMut},
    rc::Rc,
};

/// Like [`Rc`], but automatically clones the underlying data when a mutable
/// reference is requested.
///
/// Expression trees are built from these pointers, so the same sub-tree may
/// be referenced by several parents. Rewriting a node through [`DerefMut`]
/// never changes what other parents see.
#[repr(transparent)]
pub struct Shared<T: ?Sized>(Rc<T>);

impl<T> Shared<T> {
    pub fn new(data: T) -> Self {
        Shared(Rc::new(data))
    }

    pub fn ref_count(this: &Self) -> usize {
        Rc::strong_count(&this.0)
    }

    /// Do both pointers refer to the same allocation?
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Rc::ptr_eq(&this.0, &other.0)
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared(self.0.clone())
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.0.deref()
    }
}

impl<T: Clone> DerefMut for Shared<T> {
    fn deref_mut(&mut self) -> &mut T {
        if cfg!(debug_assertions) {
            let strong_count = Rc::strong_count(&self.0);
            if strong_count > 1 {
                tracing::trace!(strong_count = strong_count, "cloning shared pointer");
            }
        }
        Rc::make_mut(&mut self.0)
    }
}

/// Shared nodes are compared structurally. Pointer equality is checked first,
/// so comparing a tree with an unchanged copy of itself is cheap.
impl<T: ?Sized + PartialEq> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
    }
}

impl<T: ?Sized> From<Rc<T>> for Shared<T> {
    fn from(v: Rc<T>) -> Shared<T> {
        Shared(v)
    }
}

impl<T: ?Sized + fmt::Display> fmt::Display for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
