//! Descriptors of callable members: methods, constructors and getters.
//!
//! A [`Member`] describes the signature of a callable and carries its native
//! implementation. Native implementations are ordinary Rust functions of up
//! to 17 typed arguments (an instance receiver plus 16 parameters); the
//! [`NativeFunction`] trait erases them into a uniform entry point over a
//! flat argument slice. Building fast invokers from descriptors is the job
//! of [`crate::cache::MemberCache`].

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::error::InvokeError;

use super::{Fault, ObjectRef, Symbol, TyKind, Value};

static NEXT_MEMBER_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of a member descriptor. Every built member gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberId(u64);

impl MemberId {
    fn fresh() -> Self {
        MemberId(NEXT_MEMBER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Method { is_static: bool },
    Constructor,
    /// A property getter or an indexer getter.
    Getter { is_static: bool },
}

impl MemberKind {
    /// Instance members take their receiver as the first argument.
    pub fn has_receiver(self) -> bool {
        matches!(
            self,
            MemberKind::Method { is_static: false } | MemberKind::Getter { is_static: false }
        )
    }
}

/// A formal parameter of a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: Symbol,
    pub ty: TyKind,
}

/// A reference to a formal parameter: the member and the position in its
/// parameter list (the receiver does not count).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParamRef {
    pub member: MemberId,
    pub position: usize,
}

pub type NativeEntry = Arc<dyn Fn(&[Value]) -> Result<Value, InvokeError> + Send + Sync>;

pub struct MemberData {
    pub id: MemberId,
    pub name: Symbol,
    pub kind: MemberKind,
    pub declaring_ty: TyKind,
    pub params: Vec<Param>,
    pub ret: TyKind,
    entry: NativeEntry,
}

pub type Member = Arc<MemberData>;

impl MemberData {
    /// Number of arguments the native entry takes, including the receiver.
    pub fn arity(&self) -> usize {
        self.params.len() + usize::from(self.kind.has_receiver())
    }

    pub fn param_ref(&self, position: usize) -> ParamRef {
        ParamRef {
            member: self.id,
            position,
        }
    }

    /// The static types of the flat argument list: receiver first.
    pub fn arg_tys(&self) -> impl Iterator<Item = &TyKind> {
        let receiver = if self.kind.has_receiver() {
            Some(&self.declaring_ty)
        } else {
            None
        };
        receiver
            .into_iter()
            .chain(self.params.iter().map(|param| &param.ty))
    }

    pub(crate) fn entry(&self) -> &NativeEntry {
        &self.entry
    }
}

impl PartialEq for MemberData {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MemberData {}

impl Hash for MemberData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl fmt::Debug for MemberData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}#{}", self.declaring_ty, self.name, self.id.0)
    }
}

/// Builder for [`Member`] descriptors.
///
/// ```
/// use exprfold::ast::{IntKind, MemberBuilder, TyKind, Fault};
///
/// let int = TyKind::Int(IntKind::I32);
/// let max = MemberBuilder::static_method("Max", TyKind::class("Math"))
///     .param("a", int.clone())
///     .param("b", int.clone())
///     .returns(int)
///     .build(|a: i32, b: i32| Ok::<_, Fault>(a.max(b)));
/// assert_eq!(max.arity(), 2);
/// ```
#[derive(Debug)]
pub struct MemberBuilder {
    name: Symbol,
    kind: MemberKind,
    declaring_ty: TyKind,
    params: Vec<Param>,
    ret: TyKind,
}

impl MemberBuilder {
    fn new(name: &str, kind: MemberKind, declaring_ty: TyKind) -> Self {
        MemberBuilder {
            name: Symbol::intern(name),
            kind,
            declaring_ty,
            params: vec![],
            ret: TyKind::Void,
        }
    }

    pub fn static_method(name: &str, declaring_ty: TyKind) -> Self {
        Self::new(name, MemberKind::Method { is_static: true }, declaring_ty)
    }

    pub fn instance_method(name: &str, declaring_ty: TyKind) -> Self {
        Self::new(name, MemberKind::Method { is_static: false }, declaring_ty)
    }

    /// A constructor returns a value of its declaring type.
    pub fn constructor(declaring_ty: TyKind) -> Self {
        let mut builder = Self::new(".ctor", MemberKind::Constructor, declaring_ty);
        builder.ret = builder.declaring_ty.clone();
        builder
    }

    pub fn getter(name: &str, declaring_ty: TyKind) -> Self {
        Self::new(name, MemberKind::Getter { is_static: false }, declaring_ty)
    }

    pub fn static_getter(name: &str, declaring_ty: TyKind) -> Self {
        Self::new(name, MemberKind::Getter { is_static: true }, declaring_ty)
    }

    pub fn param(mut self, name: &str, ty: TyKind) -> Self {
        self.params.push(Param {
            name: Symbol::intern(name),
            ty,
        });
        self
    }

    pub fn returns(mut self, ty: TyKind) -> Self {
        self.ret = ty;
        self
    }

    /// Finish the descriptor with its native implementation.
    ///
    /// Panics if the arity of `f` does not match the signature (receiver
    /// included).
    pub fn build<Args, F: NativeFunction<Args>>(self, f: F) -> Member {
        let arity = self.params.len() + usize::from(self.kind.has_receiver());
        assert_eq!(
            F::ARITY,
            arity,
            "native function arity does not match the signature of `{}`",
            self.name
        );
        let entry: NativeEntry = Arc::new(move |args: &[Value]| f.invoke(args));
        Arc::new(MemberData {
            id: MemberId::fresh(),
            name: self.name,
            kind: self.kind,
            declaring_ty: self.declaring_ty,
            params: self.params,
            ret: self.ret,
            entry,
        })
    }
}

/// Types that native functions accept as arguments.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

/// Types that native functions return.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

macro_rules! impl_value_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$variant(inner) => Some(inner.clone()),
                        _ => None,
                    }
                }
            }

            impl IntoValue for $ty {
                fn into_value(self) -> Value {
                    Value::$variant(self)
                }
            }
        )*
    };
}

impl_value_conversions!(
    bool => Bool,
    char => Char,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Arc<str> => Str,
    Arc<[Value]> => Array,
    Fault => Fault,
    ObjectRef => Object,
);

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(s) => Some(s.to_string()),
            _ => None,
        }
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Str(Arc::from(self))
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::str(self)
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for () {
    fn into_value(self) -> Value {
        Value::Unit
    }
}

/// `null` maps to `None`.
impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            value => T::from_value(value).map(Some),
        }
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(value) => value.into_value(),
            None => Value::Null,
        }
    }
}

/// A Rust function usable as the implementation of a member. `Args` is the
/// tuple of argument types; it only exists to make the impls below coherent.
pub trait NativeFunction<Args>: Send + Sync + 'static {
    const ARITY: usize;

    fn invoke(&self, args: &[Value]) -> Result<Value, InvokeError>;
}

macro_rules! count {
    () => { 0 };
    ($head:ident $($tail:ident)*) => { 1 + count!($($tail)*) };
}

macro_rules! impl_native_function {
    ($($ty:ident $var:ident),*) => {
        impl<Func, Ret, $($ty,)*> NativeFunction<($($ty,)*)> for Func
        where
            Func: Fn($($ty),*) -> Result<Ret, Fault> + Send + Sync + 'static,
            Ret: IntoValue,
            $($ty: FromValue,)*
        {
            const ARITY: usize = count!($($ty)*);

            #[allow(unused_variables, unused_mut, unused_assignments)]
            fn invoke(&self, args: &[Value]) -> Result<Value, InvokeError> {
                if args.len() != Self::ARITY {
                    return Err(InvokeError::Arity {
                        expected: Self::ARITY,
                        actual: args.len(),
                    });
                }
                let mut position = 0;
                $(
                    let $var = <$ty as FromValue>::from_value(&args[position])
                        .ok_or(InvokeError::ArgumentType { position })?;
                    position += 1;
                )*
                (self)($($var),*)
                    .map(IntoValue::into_value)
                    .map_err(InvokeError::Target)
            }
        }
    };
}

impl_native_function!();
impl_native_function!(A1 a1);
impl_native_function!(A1 a1, A2 a2);
impl_native_function!(A1 a1, A2 a2, A3 a3);
impl_native_function!(A1 a1, A2 a2, A3 a3, A4 a4);
impl_native_function!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
impl_native_function!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);
impl_native_function!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7);
impl_native_function!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7, A8 a8);
impl_native_function!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7, A8 a8, A9 a9);
impl_native_function!(
    A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7, A8 a8, A9 a9, A10 a10
);
impl_native_function!(
    A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7, A8 a8, A9 a9, A10 a10, A11 a11
);
impl_native_function!(
    A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7, A8 a8, A9 a9, A10 a10, A11 a11, A12 a12
);
impl_native_function!(
    A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7, A8 a8, A9 a9, A10 a10, A11 a11, A12 a12,
    A13 a13
);
impl_native_function!(
    A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7, A8 a8, A9 a9, A10 a10, A11 a11, A12 a12,
    A13 a13, A14 a14
);
impl_native_function!(
    A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7, A8 a8, A9 a9, A10 a10, A11 a11, A12 a12,
    A13 a13, A14 a14, A15 a15
);
impl_native_function!(
    A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7, A8 a8, A9 a9, A10 a10, A11 a11, A12 a12,
    A13 a13, A14 a14, A15 a15, A16 a16
);
impl_native_function!(
    A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7, A8 a8, A9 a9, A10 a10, A11 a11, A12 a12,
    A13 a13, A14 a14, A15 a15, A16 a16, A17 a17
);
