//! The member evaluation cache: builds and memoizes invokers for members, so
//! that operators and calls can be evaluated at optimization time.
//!
//! An invoker takes the flat argument list (receiver first for instance
//! members), checks it against the member's signature and calls the native
//! implementation. Errors raised by the member itself come out as
//! [`InvokeError::Target`] and carry the member's own [`Fault`].
//!
//! The cache is shared between threads. Invokers are built under the lock of
//! the map shard they are inserted into, so a thread either sees no invoker
//! for a member or the complete one, and racing first uses build it once.

use std::{fmt, sync::Arc};

use dashmap::DashMap;
use tracing::debug;

use crate::{
    ast::{Expr, ExprKind, Fault, Member, MemberData, MemberId, TyKind, Value},
    error::{CacheError, InvokeError},
};

type InvokeFn = dyn Fn(&[Value]) -> Result<Value, InvokeError> + Send + Sync;

/// A callable built for one member.
#[derive(Clone)]
pub struct Invoker {
    member: MemberId,
    invoke: Arc<InvokeFn>,
}

impl Invoker {
    pub fn invoke(&self, args: &[Value]) -> Result<Value, InvokeError> {
        (self.invoke)(args)
    }

    pub fn member(&self) -> MemberId {
        self.member
    }

    fn compile(member: &MemberData) -> Self {
        let arity = member.arity();
        let has_receiver = member.kind.has_receiver();
        let arg_tys: Vec<TyKind> = member.arg_tys().cloned().collect();
        let ret = member.ret.clone();
        let entry = member.entry().clone();
        let invoke = move |args: &[Value]| {
            if args.len() != arity {
                return Err(InvokeError::Arity {
                    expected: arity,
                    actual: args.len(),
                });
            }
            if has_receiver && args[0].is_null() {
                return Err(InvokeError::Target(Fault::null_reference()));
            }
            if let Some(position) = args
                .iter()
                .zip(&arg_tys)
                .position(|(arg, ty)| !arg.conforms_to(ty))
            {
                return Err(InvokeError::ArgumentType { position });
            }
            let res = entry(args)?;
            if ret.is_void() {
                Ok(Value::Unit)
            } else if res.conforms_to(&ret) {
                Ok(res)
            } else {
                Err(InvokeError::ReturnType {
                    expected: ret.clone(),
                })
            }
        };
        Invoker {
            member: member.id,
            invoke: Arc::new(invoke),
        }
    }
}

impl fmt::Debug for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoker")
            .field("member", &self.member)
            .finish_non_exhaustive()
    }
}

/// Invokers by member identity. Entries are never invalidated.
#[derive(Debug, Default)]
pub struct MemberCache {
    invokers: DashMap<MemberId, Invoker>,
}

impl MemberCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the invoker for a member unless it exists already. Registering
    /// a member twice returns the same invoker.
    pub fn register(&self, member: &MemberData) -> Invoker {
        if let Some(invoker) = self.invokers.get(&member.id) {
            return invoker.value().clone();
        }
        self.invokers
            .entry(member.id)
            .or_insert_with(|| {
                debug!(member = ?member, arity = member.arity(), "building invoker");
                Invoker::compile(member)
            })
            .value()
            .clone()
    }

    /// The invoker of a member, if it was registered.
    pub fn get(&self, member: &MemberData) -> Option<Invoker> {
        self.invokers
            .get(&member.id)
            .map(|invoker| invoker.value().clone())
    }

    /// The invoker of a member, building it on first use.
    pub fn get_invoker(&self, member: &MemberData) -> Invoker {
        self.register(member)
    }

    /// Register the member invoked by a sample expression: a call,
    /// construction or indexer access, an operator or conversion with a
    /// user-defined member, or a lambda whose body is one of these.
    pub fn register_call(&self, expr: &Expr) -> Result<Member, CacheError> {
        let member = invoked_member(expr).ok_or(CacheError::NotAnInvocation)?;
        self.register(&member);
        Ok(member)
    }

    pub fn len(&self) -> usize {
        self.invokers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invokers.is_empty()
    }
}

fn invoked_member(expr: &Expr) -> Option<Member> {
    match &expr.kind {
        ExprKind::Call(member, _) | ExprKind::New(member, _) | ExprKind::Index(member, _, _) => {
            Some(member.clone())
        }
        ExprKind::Unary(op, _) => op.method.clone(),
        ExprKind::Binary(op, _, _) => op.method.clone(),
        ExprKind::Convert(op, _) => op.method.clone(),
        ExprKind::Lambda(_, body) => invoked_member(body),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
    };

    use pretty_assertions::assert_eq;

    use super::MemberCache;
    use crate::{
        ast::{
            ExprBuilder, Fault, FaultKind, IntKind, MemberBuilder, ObjectValue, TyKind, Value,
        },
        error::{CacheError, InvokeError},
    };

    fn int() -> TyKind {
        TyKind::Int(IntKind::I32)
    }

    #[test]
    fn static_methods_of_every_arity() {
        let cache = MemberCache::new();
        let sum0 = MemberBuilder::static_method("Sum", TyKind::class("Sums"))
            .returns(int())
            .build(|| Ok(0i32));
        assert_eq!(cache.get_invoker(&sum0).invoke(&[]), Ok(Value::I32(0)));

        let mut builder = MemberBuilder::static_method("Sum", TyKind::class("Sums"));
        for i in 0..16 {
            builder = builder.param(&format!("a{}", i), int());
        }
        let sum16 = builder.returns(int()).build(
            |a0: i32, a1: i32, a2: i32, a3: i32, a4: i32, a5: i32, a6: i32, a7: i32,
             a8: i32, a9: i32, a10: i32, a11: i32, a12: i32, a13: i32, a14: i32, a15: i32| {
                Ok(a0 + a1 + a2 + a3 + a4 + a5 + a6 + a7 + a8 + a9 + a10 + a11 + a12 + a13 + a14 + a15)
            },
        );
        let args: Vec<Value> = (1..=16).map(Value::I32).collect();
        assert_eq!(cache.get_invoker(&sum16).invoke(&args), Ok(Value::I32(136)));
    }

    #[test]
    fn instance_members_take_the_receiver_first() {
        let cache = MemberCache::new();
        let char_at = MemberBuilder::getter("Chars", TyKind::Str)
            .param("index", int())
            .returns(TyKind::Char)
            .build(|s: Arc<str>, index: i32| {
                usize::try_from(index)
                    .ok()
                    .and_then(|index| s.chars().nth(index))
                    .ok_or_else(Fault::index_out_of_range)
            });
        let invoker = cache.get_invoker(&char_at);
        assert_eq!(
            invoker.invoke(&[Value::str("bar"), Value::I32(1)]),
            Ok(Value::Char('a'))
        );
        assert_eq!(
            invoker.invoke(&[Value::str("bar"), Value::I32(7)]),
            Err(InvokeError::Target(Fault::index_out_of_range()))
        );
        assert_eq!(
            invoker.invoke(&[Value::Null, Value::I32(0)]),
            Err(InvokeError::Target(Fault::null_reference()))
        );
        assert_eq!(
            invoker.invoke(&[Value::str("bar")]),
            Err(InvokeError::Arity {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            invoker.invoke(&[Value::str("bar"), Value::I64(0)]),
            Err(InvokeError::ArgumentType { position: 1 })
        );
    }

    #[derive(Debug)]
    struct Point(i32, i32);

    impl ObjectValue for Point {
        fn ty(&self) -> TyKind {
            TyKind::class("Point")
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn constructors_and_void_methods() {
        let cache = MemberCache::new();
        let ctor = MemberBuilder::constructor(TyKind::class("Point"))
            .param("x", int())
            .param("y", int())
            .build(|x: i32, y: i32| Ok(Value::object(Point(x, y))));
        let point = cache
            .get_invoker(&ctor)
            .invoke(&[Value::I32(1), Value::I32(2)])
            .unwrap();
        assert!(point.conforms_to(&TyKind::class("Point")));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let touch = MemberBuilder::static_method("Touch", TyKind::class("Log")).build(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(cache.get_invoker(&touch).invoke(&[]), Ok(Value::Unit));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn member_errors_are_not_wrapped() {
        let cache = MemberCache::new();
        let fail = MemberBuilder::static_method("Fail", TyKind::class("C"))
            .returns(int())
            .build(|| Err::<i32, _>(Fault::custom("Custom")));
        match cache.get_invoker(&fail).invoke(&[]) {
            Err(InvokeError::Target(fault)) => {
                assert!(matches!(fault.kind, FaultKind::Custom(_)))
            }
            res => panic!("unexpected result {:?}", res),
        }
    }

    #[test]
    fn registration_is_idempotent() {
        let cache = MemberCache::new();
        let id = MemberBuilder::static_method("Id", TyKind::class("C"))
            .param("x", int())
            .returns(int())
            .build(|x: i32| Ok(x));
        assert!(cache.get(&id).is_none());
        let first = cache.register(&id);
        let second = cache.register(&id);
        assert_eq!(first.member(), second.member());
        assert_eq!(cache.len(), 1);

        let b = ExprBuilder::new();
        let sample = b.lambda(
            vec![],
            b.call(&id, [b.i32_lit(3)]),
        );
        assert_eq!(cache.register_call(&sample), Ok(id));
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.register_call(&b.i32_lit(3)),
            Err(CacheError::NotAnInvocation)
        );
    }

    #[test]
    fn concurrent_first_use() {
        let cache = Arc::new(MemberCache::new());
        let members: Vec<_> = (0..8)
            .map(|i| {
                MemberBuilder::static_method("Const", TyKind::class("C"))
                    .returns(int())
                    .build(move || Ok(i as i32))
            })
            .collect();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let members = members.clone();
                thread::spawn(move || {
                    for (i, member) in members.iter().enumerate() {
                        let res = cache.get_invoker(member).invoke(&[]);
                        assert_eq!(res, Ok(Value::I32(i as i32)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), members.len());
    }
}
