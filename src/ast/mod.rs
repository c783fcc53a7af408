//! Types for expression trees: nodes, types, values and member descriptors.

pub mod shared;
pub mod stats;
pub mod util;
pub mod visit;
pub use shared::*;
pub mod symbol;
pub use symbol::*;
pub mod ty;
pub use ty::*;
pub mod value;
pub use value::*;
pub mod member;
pub use member::*;
pub mod expr;
pub use expr::*;
