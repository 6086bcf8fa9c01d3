//! Per-area handles borrowed from a [`crate::CrmClient`].
//!
//! Every method follows the same steps: build a [`crate::Request`] tagged
//! with its resource type, fold in the caller's options, dispatch, decode,
//! and pass any failure through [`crate::error::classify`] with the
//! identifier the method was called with.

mod associations;
mod lists;
mod objects;
mod schemas;

pub use associations::Associations;
pub use lists::Lists;
pub use objects::Objects;
pub use schemas::Schemas;
