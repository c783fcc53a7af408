use std::fmt;

use crate::pretty::{Doc, SimplePretty};

use super::Symbol;

/// The built-in integer widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
}

impl IntKind {
    pub const ALL: [IntKind; 8] = [
        IntKind::I8,
        IntKind::U8,
        IntKind::I16,
        IntKind::U16,
        IntKind::I32,
        IntKind::U32,
        IntKind::I64,
        IntKind::U64,
    ];

    pub fn is_signed(self) -> bool {
        matches!(self, IntKind::I8 | IntKind::I16 | IntKind::I32 | IntKind::I64)
    }

    pub fn bits(self) -> u32 {
        match self {
            IntKind::I8 | IntKind::U8 => 8,
            IntKind::I16 | IntKind::U16 => 16,
            IntKind::I32 | IntKind::U32 => 32,
            IntKind::I64 | IntKind::U64 => 64,
        }
    }

    /// Smallest representable value.
    pub fn min(self) -> i128 {
        match self {
            IntKind::I8 => i8::MIN.into(),
            IntKind::I16 => i16::MIN.into(),
            IntKind::I32 => i32::MIN.into(),
            IntKind::I64 => i64::MIN.into(),
            IntKind::U8 | IntKind::U16 | IntKind::U32 | IntKind::U64 => 0,
        }
    }

    /// Largest representable value.
    pub fn max(self) -> i128 {
        match self {
            IntKind::I8 => i8::MAX.into(),
            IntKind::U8 => u8::MAX.into(),
            IntKind::I16 => i16::MAX.into(),
            IntKind::U16 => u16::MAX.into(),
            IntKind::I32 => i32::MAX.into(),
            IntKind::U32 => u32::MAX.into(),
            IntKind::I64 => i64::MAX.into(),
            IntKind::U64 => u64::MAX.into(),
        }
    }

    /// Can every value of `self` be represented in `other`?
    pub fn fits_into(self, other: IntKind) -> bool {
        other.min() <= self.min() && self.max() <= other.max()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IntKind::I8 => "I8",
            IntKind::U8 => "U8",
            IntKind::I16 => "I16",
            IntKind::U16 => "U16",
            IntKind::I32 => "I32",
            IntKind::U32 => "U32",
            IntKind::I64 => "I64",
            IntKind::U64 => "U64",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatKind {
    F32,
    F64,
}

/// A user-defined type. Named types are compared by name, so two
/// declarations with the same name denote the same type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedTy {
    pub name: Symbol,
    /// Value types are never `null` unless wrapped in [`TyKind::Nullable`].
    pub is_value_type: bool,
}

/// Defines the kinds of types.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum TyKind {
    /// The type of expressions that do not produce a value.
    Void,
    Bool,
    Char,
    Int(IntKind),
    Float(FloatKind),
    /// Immutable strings (a reference type).
    Str,
    /// An optional value type. Operators over the inner type are lifted.
    Nullable(Box<TyKind>),
    /// Arrays are reference types.
    Array(Box<TyKind>),
    /// A user-defined class or struct.
    Named(NamedTy),
    /// Error payloads carried by `throw` expressions.
    Exception,
    /// The type of lambda expressions.
    Func(Vec<TyKind>, Box<TyKind>),
}

impl TyKind {
    pub fn nullable(inner: TyKind) -> TyKind {
        TyKind::Nullable(Box::new(inner))
    }

    pub fn array(element: TyKind) -> TyKind {
        TyKind::Array(Box::new(element))
    }

    pub fn class(name: &str) -> TyKind {
        TyKind::Named(NamedTy {
            name: Symbol::intern(name),
            is_value_type: false,
        })
    }

    pub fn structure(name: &str) -> TyKind {
        TyKind::Named(NamedTy {
            name: Symbol::intern(name),
            is_value_type: true,
        })
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TyKind::Void)
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, TyKind::Nullable(_))
    }

    /// For nullable types, return the wrapped type. All other types are
    /// returned unchanged.
    pub fn non_nullable(&self) -> &TyKind {
        match self {
            TyKind::Nullable(inner) => inner,
            _ => self,
        }
    }

    /// Values of value types are copied, never shared, and only nullable
    /// wrappers of them admit `null`.
    pub fn is_value_type(&self) -> bool {
        match self {
            TyKind::Bool
            | TyKind::Char
            | TyKind::Int(_)
            | TyKind::Float(_)
            | TyKind::Nullable(_) => true,
            TyKind::Named(named) => named.is_value_type,
            TyKind::Void
            | TyKind::Str
            | TyKind::Array(_)
            | TyKind::Exception
            | TyKind::Func(_, _) => false,
        }
    }

    /// Can an expression of this type evaluate to `null`?
    pub fn admits_null(&self) -> bool {
        !self.is_void() && (self.is_nullable() || !self.is_value_type())
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, TyKind::Int(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, TyKind::Int(_) | TyKind::Float(_))
    }

    /// Is this `Bool` or `Bool?`?
    pub fn is_boolish(&self) -> bool {
        matches!(self.non_nullable(), TyKind::Bool)
    }
}

// Named types print by name only.
impl fmt::Debug for TyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for TyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => write!(f, "Void"),
            Self::Bool => write!(f, "Bool"),
            Self::Char => write!(f, "Char"),
            Self::Int(kind) => write!(f, "{}", kind.as_str()),
            Self::Float(FloatKind::F32) => write!(f, "F32"),
            Self::Float(FloatKind::F64) => write!(f, "F64"),
            Self::Str => write!(f, "Str"),
            Self::Nullable(inner) => write!(f, "{}?", inner),
            Self::Array(element) => write!(f, "[]{}", element),
            Self::Named(named) => write!(f, "{}", named.name),
            Self::Exception => write!(f, "Exception"),
            Self::Func(params, ret) => {
                write!(f, "fn(")?;
                if let [front @ .., last] = params.as_slice() {
                    for param in front.iter() {
                        write!(f, "{}, ", param)?;
                    }
                    write!(f, "{}", last)?;
                }
                write!(f, ") -> {}", ret)
            }
        }
    }
}

impl SimplePretty for TyKind {
    fn pretty(&self) -> Doc {
        Doc::as_string(self)
    }
}

#[cfg(test)]
mod test {
    use super::{IntKind, TyKind};

    #[test]
    fn value_and_reference_types() {
        assert!(TyKind::Int(IntKind::I32).is_value_type());
        assert!(!TyKind::Int(IntKind::I32).admits_null());
        assert!(TyKind::nullable(TyKind::Bool).admits_null());
        assert!(TyKind::Str.admits_null());
        assert!(!TyKind::structure("Money").admits_null());
        assert!(TyKind::class("Account").admits_null());
        assert!(!TyKind::Void.admits_null());
    }

    #[test]
    fn int_ranges() {
        assert!(IntKind::U8.fits_into(IntKind::I16));
        assert!(!IntKind::I8.fits_into(IntKind::U64));
        assert!(IntKind::U32.fits_into(IntKind::I64));
        assert_eq!(IntKind::I64.min(), i64::MIN as i128);
    }

    #[test]
    fn display() {
        let ty = TyKind::array(TyKind::nullable(TyKind::Int(IntKind::U16)));
        assert_eq!(ty.to_string(), "[]U16?");
    }
}
