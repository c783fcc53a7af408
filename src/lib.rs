//! Semantics-preserving simplification of typed expression trees.
//!
//! The [`Optimizer`] rewrites a tree bottom-up: it folds operators and pure
//! member calls over literals, propagates `throw`s, elides lifted operators
//! over `null`, short-circuits logical operators and prunes blocks. Which
//! members may be evaluated early is decided by a [`SemanticProvider`];
//! members are invoked through a shared [`MemberCache`].
//!
//! ```
//! use std::sync::Arc;
//!
//! use exprfold::{
//!     ast::{BinOpKind, ExprBuilder},
//!     DefaultSemanticProvider, MemberCache, Optimizer,
//! };
//!
//! let b = ExprBuilder::new();
//! let sum = b.binary(BinOpKind::Add, b.i32_lit(1), b.i32_lit(2));
//! let expr = b.binary(BinOpKind::Mul, sum, b.i32_lit(4));
//! let optimizer = Optimizer::new(
//!     Arc::new(DefaultSemanticProvider::new()),
//!     Arc::new(MemberCache::new()),
//! );
//! assert_eq!(optimizer.optimize(&expr).unwrap(), b.i32_lit(12));
//! ```

// clippy (correctly) tells us that we can sometimes elide lifetimes, but many
// of these cases make the declarations way more clear than with implicit
// lifetimes.
#![allow(clippy::needless_lifetimes)]

pub mod ast;
pub mod cache;
pub mod error;
pub mod interp;
pub mod opt;
pub mod pretty;
pub mod scope_map;
pub mod semantics;
pub mod timing;

pub use cache::{Invoker, MemberCache};
pub use error::{CacheError, EvalError, InvokeError, OptError, RegistryError};
pub use opt::{Optimizer, OptimizerOptions};
pub use semantics::{params::ParameterTable, Builtin, DefaultSemanticProvider, SemanticProvider};
