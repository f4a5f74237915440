//! Relation module for parent/child relationships.
//!
//! # Architecture
//!
//! - **Def**: Relation definition types (`RelationDef`, `RelationType`)
//! - **Traits**: `Related`, the name → definition registry on a parent model

// Relation definitions
pub mod def;
#[doc(inline)]
pub use def::{RelationDef, RelationType};

// Core traits
pub mod traits;
#[doc(inline)]
pub use traits::Related;
