//! # lazet-core
//!
//! lazet-core is a lazy tensor expression engine. Expressions are trees of
//! typed nodes that compute nothing until they are assigned into a container.
//! Nodes whose elements can not be computed one at a time (products, pooling,
//! convolution) are temporaries, evaluated once into a result buffer.
//! Assignment checks whether the destination is read by the expression and
//! evaluates through a copy when it is. Storages track whether their host or
//! device copy is current so that offloaded operators copy data only when needed.
//!
//! ```
//! use lazet_core::prelude::*;
//!
//! let a = DynMatrix::from_vec([2, 2], vec![1., 2., 3., 4.])?;
//! let b = DynMatrix::filled([2, 2], 1.)?;
//! let c = DynMatrix::zeros([2, 2])?;
//! c.assign(&a * (&b + scalar(1.)))?;
//! assert_eq!(c.to_vec()?, [6., 6., 14., 14.]);
//! assert_eq!(sum(&c)?, 40.);
//! # Ok::<(), LazetError>(())
//! ```
#![forbid(unsafe_code)]
#![forbid(rustdoc::broken_intra_doc_links)]
#![forbid(rustdoc::private_intra_doc_links)]
#![forbid(missing_docs)]
#![forbid(rustdoc::missing_crate_level_docs)]
#![forbid(rustdoc::private_doc_tests)]
#![forbid(rustdoc::invalid_codeblock_attributes)]
#![forbid(rustdoc::invalid_html_tags)]
#![forbid(rustdoc::invalid_rust_codeblocks)]
#![forbid(rustdoc::bare_urls)]
#![forbid(rustdoc::unescaped_backticks)]
#![forbid(rustdoc::redundant_explicit_links)]

extern crate alloc;

/// See [BinaryExpr](binary::BinaryExpr)
pub mod binary;
pub mod broadcast;
pub mod config;
pub mod container;
pub mod counters;
/// See [DType](dtype::DType)
pub mod dtype;
/// See [LazetError](error::LazetError)
pub mod error;
pub mod evaluate;
pub mod generator;
pub mod gpu;
pub mod ops;
pub mod overload;
/// See [Pack](pack::Pack)
pub mod pack;
/// See [Scalar](scalar::Scalar)
pub mod scalar;
/// See [Shape](shape::Shape)
pub mod shape;
pub mod storage;
pub mod temporary;
pub mod traits;
/// See [UnaryExpr](unary::UnaryExpr)
pub mod unary;
/// See [SubView](view::SubView)
pub mod view;

pub use container::{Assign, Container, DynMatrix, FastMatrix};
pub use error::LazetError;
pub use traits::{Expr, FastExpr, Traits};

/// Everything needed to build and evaluate expressions
pub mod prelude {
    pub use crate::binary::{add, div, sub, times};
    pub use crate::broadcast::{rep_append, rep_append_dyn, rep_prepend, rep_prepend_dyn};
    pub use crate::container::{Assign, Container, DynMatrix, FastMatrix};
    pub use crate::error::LazetError;
    pub use crate::evaluate::{materialize, mean, sum};
    pub use crate::generator::{normal, scalar, sequence, uniform};
    pub use crate::ops::{
        avg_pool_2d, conv_2d, conv_2d_valid, matmul, max_pool_2d, pool_2d, transpose,
    };
    pub use crate::scalar::Scalar;
    pub use crate::shape::{Order, Sh1, Sh2, Sh3, Sh4, Shape};
    pub use crate::traits::{Expr, FastExpr};
    pub use crate::unary::{abs, exp, minus};
    pub use crate::view::sub as slice;
}
