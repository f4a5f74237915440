//! Core trait for resolving relations by name.

use crate::active_model::ActiveModelTrait;
use crate::relation::def::RelationDef;

/// Registry of the relations a parent model exposes to child type `C`
///
/// The binder resolves its relation by name on every load, so one parent type
/// may expose several relations to the same child type.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use tabular::{ActiveModelTrait, RelationDef, Related};
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct Invoice { id: Option<i64> }
/// impl ActiveModelTrait for Invoice { type Id = i64; }
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct InvoiceLine { id: Option<i64>, invoice_id: Option<i64> }
/// impl ActiveModelTrait for InvoiceLine { type Id = i64; }
///
/// impl Related<InvoiceLine> for Invoice {
///     fn relation(name: &str) -> Option<RelationDef<InvoiceLine>> {
///         match name {
///             "lines" => Some(RelationDef::has_many("lines", "invoice_id")),
///             _ => None,
///         }
///     }
/// }
///
/// assert!(Invoice::relation("lines").is_some());
/// assert!(Invoice::relation("payments").is_none());
/// ```
pub trait Related<C: ActiveModelTrait>: ActiveModelTrait {
    /// Look up a relation by name
    fn relation(name: &str) -> Option<RelationDef<C>>;
}
