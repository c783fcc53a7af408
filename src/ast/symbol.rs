use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Mutex;
use string_interner::{DefaultSymbol, StringInterner};

static INTERNED_STRINGS: Lazy<Mutex<StringInterner>> =
    Lazy::new(|| Mutex::new(StringInterner::new()));

/// An interned string.
///
/// The interner is global and guarded by a mutex, so symbols can be created
/// and compared from any thread.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(DefaultSymbol);

impl Symbol {
    pub fn intern(string: &str) -> Self {
        let mut interned = INTERNED_STRINGS
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Symbol(interned.get_or_intern(string))
    }

    pub fn to_owned(self) -> String {
        self.with_str(str::to_owned)
    }

    fn with_str<T>(self, f: impl FnOnce(&str) -> T) -> T {
        let interned = INTERNED_STRINGS
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // symbols are only ever created by `intern`, so resolution cannot fail
        f(interned.resolve(self.0).unwrap_or("<unknown>"))
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_str(|s| fmt::Debug::fmt(s, f))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_str(|s| fmt::Display::fmt(s, f))
    }
}

/// The name of a variable: a lambda parameter, a block local or a free
/// parameter of the whole tree.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ident {
    pub name: Symbol,
}

impl Ident {
    pub fn new(name: &str) -> Ident {
        Ident {
            name: Symbol::intern(name),
        }
    }
}

impl From<Symbol> for Ident {
    fn from(name: Symbol) -> Self {
        Ident { name }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name.fmt(f)
    }
}

impl fmt::Debug for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.name, f)
    }
}
