//! Runtime values, as they appear in constant nodes and as results of
//! evaluation.

use std::{any::Any, fmt, sync::Arc};

use super::{FloatKind, IntKind, Symbol, TyKind};

/// A value of a user-defined type.
///
/// Objects are shared by reference. Equality at runtime is reference
/// equality unless the type defines an equality operator member.
pub trait ObjectValue: fmt::Debug + Send + Sync + 'static {
    /// The dynamic type of this object.
    fn ty(&self) -> TyKind;

    fn as_any(&self) -> &dyn Any;

    /// Structural equality, used to compare trees. Defaults to identity.
    fn same_as(&self, other: &dyn ObjectValue) -> bool {
        std::ptr::eq(
            self.as_any() as *const dyn Any as *const u8,
            other.as_any() as *const dyn Any as *const u8,
        )
    }
}

pub type ObjectRef = Arc<dyn ObjectValue>;

/// The kind of a runtime error.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FaultKind {
    NullReference,
    IndexOutOfRange,
    Overflow,
    DivideByZero,
    /// E.g. reading the value of an empty nullable.
    InvalidOperation,
    InvalidCast,
    Argument,
    /// An error raised by user code.
    Custom(Symbol),
}

/// A runtime error. Thrown by `throw` expressions and by failing operators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: Option<String>,
}

impl Fault {
    pub fn new(kind: FaultKind) -> Self {
        Fault {
            kind,
            message: None,
        }
    }

    pub fn with_message(kind: FaultKind, message: impl Into<String>) -> Self {
        Fault {
            kind,
            message: Some(message.into()),
        }
    }

    pub fn custom(name: &str) -> Self {
        Fault::new(FaultKind::Custom(Symbol::intern(name)))
    }

    pub fn null_reference() -> Self {
        Fault::new(FaultKind::NullReference)
    }

    pub fn index_out_of_range() -> Self {
        Fault::new(FaultKind::IndexOutOfRange)
    }

    pub fn overflow() -> Self {
        Fault::new(FaultKind::Overflow)
    }

    pub fn divide_by_zero() -> Self {
        Fault::new(FaultKind::DivideByZero)
    }

    pub fn invalid_operation() -> Self {
        Fault::new(FaultKind::InvalidOperation)
    }

    pub fn invalid_cast() -> Self {
        Fault::new(FaultKind::InvalidCast)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FaultKind::NullReference => f.write_str("NullReference")?,
            FaultKind::IndexOutOfRange => f.write_str("IndexOutOfRange")?,
            FaultKind::Overflow => f.write_str("Overflow")?,
            FaultKind::DivideByZero => f.write_str("DivideByZero")?,
            FaultKind::InvalidOperation => f.write_str("InvalidOperation")?,
            FaultKind::InvalidCast => f.write_str("InvalidCast")?,
            FaultKind::Argument => f.write_str("Argument")?,
            FaultKind::Custom(name) => write!(f, "{}", name)?,
        }
        if let Some(message) = &self.message {
            write!(f, "({:?})", message)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    /// The result of members returning `Void`.
    Unit,
    Null,
    Bool(bool),
    Char(char),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(Arc<str>),
    Array(Arc<[Value]>),
    Fault(Fault),
    Object(ObjectRef),
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Arc::from(s))
    }

    pub fn array(elements: impl IntoIterator<Item = Value>) -> Value {
        Value::Array(elements.into_iter().collect())
    }

    pub fn object(object: impl ObjectValue) -> Value {
        Value::Object(Arc::new(object))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer kind and value of integer values.
    pub fn as_int(&self) -> Option<(IntKind, i128)> {
        Some(match *self {
            Value::I8(v) => (IntKind::I8, v.into()),
            Value::U8(v) => (IntKind::U8, v.into()),
            Value::I16(v) => (IntKind::I16, v.into()),
            Value::U16(v) => (IntKind::U16, v.into()),
            Value::I32(v) => (IntKind::I32, v.into()),
            Value::U32(v) => (IntKind::U32, v.into()),
            Value::I64(v) => (IntKind::I64, v.into()),
            Value::U64(v) => (IntKind::U64, v.into()),
            _ => return None,
        })
    }

    /// Build an integer value of the given kind. Returns `None` if `value` is
    /// out of range.
    pub fn from_int(kind: IntKind, value: i128) -> Option<Value> {
        Some(match kind {
            IntKind::I8 => Value::I8(value.try_into().ok()?),
            IntKind::U8 => Value::U8(value.try_into().ok()?),
            IntKind::I16 => Value::I16(value.try_into().ok()?),
            IntKind::U16 => Value::U16(value.try_into().ok()?),
            IntKind::I32 => Value::I32(value.try_into().ok()?),
            IntKind::U32 => Value::U32(value.try_into().ok()?),
            IntKind::I64 => Value::I64(value.try_into().ok()?),
            IntKind::U64 => Value::U64(value.try_into().ok()?),
        })
    }

    pub fn as_float(&self) -> Option<f64> {
        match *self {
            Value::F32(v) => Some(v.into()),
            Value::F64(v) => Some(v),
            _ => None,
        }
    }

    /// The default value of a type: zero, `false` or `null`. User-defined
    /// value types and `Void` have no literal default.
    pub fn default_for(ty: &TyKind) -> Option<Value> {
        Some(match ty {
            TyKind::Bool => Value::Bool(false),
            TyKind::Char => Value::Char('\0'),
            TyKind::Int(kind) => Value::from_int(*kind, 0)?,
            TyKind::Float(FloatKind::F32) => Value::F32(0.0),
            TyKind::Float(FloatKind::F64) => Value::F64(0.0),
            TyKind::Named(named) if named.is_value_type => return None,
            TyKind::Void => return None,
            _ => Value::Null,
        })
    }

    /// Does this value inhabit the given static type?
    pub fn conforms_to(&self, ty: &TyKind) -> bool {
        match (self, ty) {
            (Value::Null, ty) => ty.admits_null(),
            (value, TyKind::Nullable(inner)) => value.conforms_to(inner),
            (Value::Unit, TyKind::Void) => true,
            (Value::Bool(_), TyKind::Bool) => true,
            (Value::Char(_), TyKind::Char) => true,
            (Value::F32(_), TyKind::Float(FloatKind::F32)) => true,
            (Value::F64(_), TyKind::Float(FloatKind::F64)) => true,
            (Value::Str(_), TyKind::Str) => true,
            (Value::Array(elements), TyKind::Array(element_ty)) => {
                elements.iter().all(|element| element.conforms_to(element_ty))
            }
            (Value::Fault(_), TyKind::Exception) => true,
            (Value::Object(object), ty) => &object.ty() == ty,
            (value, TyKind::Int(kind)) => value.as_int().map_or(false, |(k, _)| k == *kind),
            _ => false,
        }
    }
}

/// Structural equality. Floats compare by bit pattern so that folded trees
/// can be compared exactly; runtime equality lives in [`crate::interp`].
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a.to_bits() == b.to_bits(),
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Fault(a), Value::Fault(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b) || a.same_as(b.as_ref()),
            (a, b) => match (a.as_int(), b.as_int()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("()"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => b.fmt(f),
            Value::Char(c) => write!(f, "{:?}", c),
            Value::F32(v) => write!(f, "{:?}f32", v),
            Value::F64(v) => write!(f, "{:?}", v),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Array(elements) => {
                f.write_str("[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    element.fmt(f)?;
                }
                f.write_str("]")
            }
            Value::Fault(fault) => fault.fmt(f),
            Value::Object(object) => write!(f, "{:?}", object),
            value => match value.as_int() {
                Some((IntKind::I32, v)) => v.fmt(f),
                Some((kind, v)) => write!(f, "{}{}", v, kind.as_str().to_lowercase()),
                None => unreachable!(),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn float_equality_is_structural() {
        assert_eq!(Value::F64(f64::NAN), Value::F64(f64::NAN));
        assert_ne!(Value::F64(0.0), Value::F64(-0.0));
    }

    #[test]
    fn ints_of_different_width_differ() {
        assert_ne!(Value::I32(1), Value::I64(1));
        assert_eq!(Value::from_int(IntKind::U8, 255), Some(Value::U8(255)));
        assert_eq!(Value::from_int(IntKind::U8, 256), None);
    }

    #[test]
    fn defaults() {
        assert_eq!(
            Value::default_for(&TyKind::Int(IntKind::I16)),
            Some(Value::I16(0))
        );
        assert_eq!(
            Value::default_for(&TyKind::nullable(TyKind::Bool)),
            Some(Value::Null)
        );
        assert_eq!(Value::default_for(&TyKind::structure("Money")), None);
    }

    #[test]
    fn conformance() {
        let ty = TyKind::nullable(TyKind::Int(IntKind::I32));
        assert!(Value::I32(3).conforms_to(&ty));
        assert!(Value::Null.conforms_to(&ty));
        assert!(!Value::I64(3).conforms_to(&ty));
        assert!(!Value::Null.conforms_to(&TyKind::Int(IntKind::I32)));
    }
}
