//! Canonical event model and the table-driven normalizer.

pub mod canonical;
pub mod normalizer;
pub mod queqiao;

pub use canonical::{CanonicalEvent, CanonicalField};
pub use normalizer::{FieldMap, FieldPath, Normalizer};
