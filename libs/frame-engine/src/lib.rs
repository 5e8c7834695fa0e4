//! Row-to-column conversion for document query results.
//!
//! Rows arrive one at a time from a row source; each value is classified,
//! routed to its column's accumulator, and the accumulator widens or falls
//! back to text as needed. Once the source is exhausted, [`FrameBuilder::finish`]
//! yields a [`Frame`] whose columns all have one entry per row.

mod column;
mod error;
mod frame;
mod kind;
mod value;

pub use column::{Column, ColumnAccumulator, ColumnValues, value_text};
pub use error::ConvertError;
pub use frame::{Frame, FrameBuilder, Row};
pub use kind::Kind;
pub use value::Value;
