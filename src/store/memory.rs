//! In-memory store with snapshot transactions.
//!
//! Parents and children live in two ordered tables behind a shared mutex.
//! `begin` snapshots both tables; `rollback` restores the snapshot and `commit`
//! discards it. Nested transactions push further snapshots and behave like
//! savepoints. Integer-like primary keys are assigned on insert.

use crate::active_model::{ActiveModelBehavior, ActiveModelError, ActiveModelTrait};
use crate::executor::{Executor, TabularError};
use crate::relation::RelationDef;
use crate::transaction::{IsolationLevel, TransactionError, TransactionHandle, TransactionManager};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Operations that can be made to fail with [`MemoryStore::fail_next`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Find,
    FindRelated,
    SaveRoot,
    Delete,
    Link,
    Begin,
    Commit,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOperation::Find => "find",
            StoreOperation::FindRelated => "find_related",
            StoreOperation::SaveRoot => "save_root",
            StoreOperation::Delete => "delete",
            StoreOperation::Link => "link",
            StoreOperation::Begin => "begin",
            StoreOperation::Commit => "commit",
        };
        f.write_str(name)
    }
}

struct Tables<P: ActiveModelTrait, C: ActiveModelTrait> {
    roots: BTreeMap<P::Id, P>,
    children: BTreeMap<C::Id, C>,
}

impl<P: ActiveModelTrait, C: ActiveModelTrait> Clone for Tables<P, C> {
    fn clone(&self) -> Self {
        Self {
            roots: self.roots.clone(),
            children: self.children.clone(),
        }
    }
}

struct MemoryState<P: ActiveModelTrait, C: ActiveModelTrait> {
    tables: Tables<P, C>,
    savepoints: Vec<Tables<P, C>>,
    next_root_id: i64,
    next_child_id: i64,
    faults: Vec<StoreOperation>,
    commits: usize,
    rollbacks: usize,
}

impl<P: ActiveModelTrait, C: ActiveModelTrait> MemoryState<P, C> {
    fn check_fault(&mut self, operation: StoreOperation) -> Result<(), TabularError> {
        if let Some(position) = self.faults.iter().position(|fault| *fault == operation) {
            self.faults.remove(position);
            return Err(TabularError::Database(format!(
                "injected {operation} failure"
            )));
        }
        Ok(())
    }

    fn find(&mut self, id: &C::Id) -> Result<Option<C>, TabularError> {
        self.check_fault(StoreOperation::Find)?;
        Ok(self.tables.children.get(id).cloned())
    }

    fn find_related(&mut self, parent: &P, relation: &RelationDef<C>) -> Result<Vec<C>, TabularError> {
        self.check_fault(StoreOperation::FindRelated)?;
        Ok(self
            .tables
            .children
            .values()
            .filter(|child| relation.is_linked(child, parent))
            .cloned()
            .collect())
    }

    fn save_root(&mut self, parent: &mut P) -> Result<(), TabularError>
    where
        P: ActiveModelBehavior,
    {
        self.check_fault(StoreOperation::SaveRoot)?;
        let insert = match parent.primary_key() {
            Some(id) => !self.tables.roots.contains_key(&id),
            None => true,
        };
        parent.before_save(insert)?;
        let id = match parent.primary_key() {
            Some(id) => id,
            None => {
                let id = next_key::<P>(&mut self.next_root_id, |id| {
                    self.tables.roots.contains_key(id)
                })?;
                parent.set_attribute(P::primary_key_attribute(), serde_json::to_value(&id).map_err(ActiveModelError::from)?)?;
                id
            }
        };
        self.tables.roots.insert(id, parent.clone());
        parent.after_save(insert)?;
        Ok(())
    }

    fn delete(&mut self, child: &C) -> Result<(), TabularError>
    where
        C: ActiveModelBehavior,
    {
        self.check_fault(StoreOperation::Delete)?;
        let id = child
            .primary_key()
            .ok_or(ActiveModelError::PrimaryKeyRequired)?;
        child.before_delete()?;
        if self.tables.children.remove(&id).is_none() {
            log::debug!("delete of {:?} affected no rows", id);
        }
        child.after_delete()?;
        Ok(())
    }

    fn link(&mut self, child: &mut C, relation: &RelationDef<C>, parent: &P) -> Result<(), TabularError>
    where
        C: ActiveModelBehavior,
    {
        self.check_fault(StoreOperation::Link)?;
        relation.assign_foreign_key(child, parent)?;
        let insert = match child.primary_key() {
            Some(id) => !self.tables.children.contains_key(&id),
            None => true,
        };
        child.before_save(insert)?;
        let id = match child.primary_key() {
            Some(id) => id,
            None => {
                let id = next_key::<C>(&mut self.next_child_id, |id| {
                    self.tables.children.contains_key(id)
                })?;
                child.set_attribute(C::primary_key_attribute(), serde_json::to_value(&id).map_err(ActiveModelError::from)?)?;
                id
            }
        };
        self.tables.children.insert(id, child.clone());
        child.after_save(insert)?;
        Ok(())
    }
}

/// Next free integer key, converted into the model's key type
fn next_key<M: ActiveModelTrait>(
    counter: &mut i64,
    taken: impl Fn(&M::Id) -> bool,
) -> Result<M::Id, TabularError> {
    loop {
        *counter += 1;
        let id = serde_json::from_value::<M::Id>(JsonValue::from(*counter)).map_err(|e| {
            TabularError::Database(format!(
                "cannot generate a key for {}: {}",
                M::form_name(),
                e
            ))
        })?;
        if !taken(&id) {
            return Ok(id);
        }
    }
}

fn lock<P: ActiveModelTrait, C: ActiveModelTrait>(
    state: &Mutex<MemoryState<P, C>>,
) -> Result<MutexGuard<'_, MemoryState<P, C>>, TabularError> {
    state
        .lock()
        .map_err(|_| TabularError::Database("memory store lock poisoned".to_string()))
}

/// Shared in-memory store of parents `P` and children `C`
///
/// Cloning the store yields another handle on the same tables.
///
/// # Examples
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use tabular::store::MemoryStore;
/// use tabular::{ActiveModelBehavior, ActiveModelTrait, Executor, RelationDef};
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct Invoice { id: Option<i64> }
/// impl ActiveModelTrait for Invoice { type Id = i64; }
/// impl ActiveModelBehavior for Invoice {}
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct InvoiceLine { id: Option<i64>, invoice_id: Option<i64> }
/// impl ActiveModelTrait for InvoiceLine { type Id = i64; }
/// impl ActiveModelBehavior for InvoiceLine {}
///
/// let store = MemoryStore::<Invoice, InvoiceLine>::new();
/// let invoice = store.seed_root(Invoice::default())?;
/// let relation = RelationDef::has_many("lines", "invoice_id");
/// store.link(&mut InvoiceLine::default(), &relation, &invoice)?;
/// assert_eq!(store.find_related(&invoice, &relation)?.len(), 1);
/// # Ok::<(), tabular::TabularError>(())
/// ```
pub struct MemoryStore<P: ActiveModelTrait, C: ActiveModelTrait> {
    state: Arc<Mutex<MemoryState<P, C>>>,
}

impl<P: ActiveModelTrait, C: ActiveModelTrait> Clone for MemoryStore<P, C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<P: ActiveModelTrait, C: ActiveModelTrait> Default for MemoryStore<P, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ActiveModelTrait, C: ActiveModelTrait> fmt::Debug for MemoryStore<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.lock() {
            Ok(state) => f
                .debug_struct("MemoryStore")
                .field("roots", &state.tables.roots.len())
                .field("children", &state.tables.children.len())
                .field("open_transactions", &state.savepoints.len())
                .finish(),
            Err(_) => f.write_str("MemoryStore { <poisoned> }"),
        }
    }
}

impl<P: ActiveModelTrait, C: ActiveModelTrait> MemoryStore<P, C> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                tables: Tables {
                    roots: BTreeMap::new(),
                    children: BTreeMap::new(),
                },
                savepoints: Vec::new(),
                next_root_id: 0,
                next_child_id: 0,
                faults: Vec::new(),
                commits: 0,
                rollbacks: 0,
            })),
        }
    }

    /// Store a parent as-is, assigning a key when it has none
    pub fn seed_root(&self, mut parent: P) -> Result<P, TabularError> {
        let mut state = lock(&self.state)?;
        let id = match parent.primary_key() {
            Some(id) => id,
            None => {
                let MemoryState {
                    tables,
                    next_root_id,
                    ..
                } = &mut *state;
                let id = next_key::<P>(next_root_id, |id| tables.roots.contains_key(id))?;
                parent.set_attribute(P::primary_key_attribute(), serde_json::to_value(&id).map_err(ActiveModelError::from)?)?;
                id
            }
        };
        state.tables.roots.insert(id, parent.clone());
        Ok(parent)
    }

    /// Store a child as-is, assigning a key when it has none
    pub fn seed_child(&self, mut child: C) -> Result<C, TabularError> {
        let mut state = lock(&self.state)?;
        let id = match child.primary_key() {
            Some(id) => id,
            None => {
                let MemoryState {
                    tables,
                    next_child_id,
                    ..
                } = &mut *state;
                let id = next_key::<C>(next_child_id, |id| tables.children.contains_key(id))?;
                child.set_attribute(C::primary_key_attribute(), serde_json::to_value(&id).map_err(ActiveModelError::from)?)?;
                id
            }
        };
        state.tables.children.insert(id, child.clone());
        Ok(child)
    }

    pub fn root(&self, id: &P::Id) -> Option<P> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.tables.roots.get(id).cloned())
    }

    pub fn child(&self, id: &C::Id) -> Option<C> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.tables.children.get(id).cloned())
    }

    /// Every stored child in key order
    pub fn children(&self) -> Vec<C> {
        self.state
            .lock()
            .map(|state| state.tables.children.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Make the next `operation` fail with a database error
    pub fn fail_next(&self, operation: StoreOperation) {
        if let Ok(mut state) = self.state.lock() {
            state.faults.push(operation);
        }
    }

    /// Top-level transactions committed so far
    pub fn commit_count(&self) -> usize {
        self.state.lock().map(|state| state.commits).unwrap_or(0)
    }

    /// Top-level transactions rolled back so far
    pub fn rollback_count(&self) -> usize {
        self.state.lock().map(|state| state.rollbacks).unwrap_or(0)
    }

    pub fn in_transaction(&self) -> bool {
        self.state
            .lock()
            .map(|state| !state.savepoints.is_empty())
            .unwrap_or(false)
    }
}

impl<P, C> Executor<P, C> for MemoryStore<P, C>
where
    P: ActiveModelBehavior,
    C: ActiveModelBehavior,
{
    fn find(&self, id: &C::Id) -> Result<Option<C>, TabularError> {
        lock(&self.state)?.find(id)
    }

    fn find_related(&self, parent: &P, relation: &RelationDef<C>) -> Result<Vec<C>, TabularError> {
        lock(&self.state)?.find_related(parent, relation)
    }

    fn save_root(&self, parent: &mut P) -> Result<(), TabularError> {
        lock(&self.state)?.save_root(parent)
    }

    fn delete(&self, child: &C) -> Result<(), TabularError> {
        lock(&self.state)?.delete(child)
    }

    fn link(&self, child: &mut C, relation: &RelationDef<C>, parent: &P) -> Result<(), TabularError> {
        lock(&self.state)?.link(child, relation, parent)
    }
}

impl<P, C> TransactionManager<P, C> for MemoryStore<P, C>
where
    P: ActiveModelBehavior,
    C: ActiveModelBehavior,
{
    type Transaction = MemoryTransaction<P, C>;

    fn begin_with_isolation(
        &self,
        isolation_level: IsolationLevel,
    ) -> Result<MemoryTransaction<P, C>, TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        let mut state = self
            .state
            .lock()
            .map_err(|_| TransactionError::BeginFailed("memory store lock poisoned".to_string()))?;
        if !state.savepoints.is_empty() {
            return Err(TransactionError::NestedTransactionError(
                "a transaction is already open on this store; use begin_nested".to_string(),
            ));
        }
        state
            .check_fault(StoreOperation::Begin)
            .map_err(|e| TransactionError::BeginFailed(e.to_string()))?;

        // Every level is serializable here: the mutex admits one writer at a time
        log::trace!("memory store begin ({})", isolation_level.as_sql());
        let snapshot = state.tables.clone();
        state.savepoints.push(snapshot);

        Ok(MemoryTransaction {
            state: Arc::clone(&self.state),
            depth: 1,
            closed: false,
        })
    }
}

/// Open transaction (or savepoint) on a [`MemoryStore`]
///
/// Dropping an open transaction rolls it back.
pub struct MemoryTransaction<P: ActiveModelTrait, C: ActiveModelTrait> {
    state: Arc<Mutex<MemoryState<P, C>>>,
    depth: usize,
    closed: bool,
}

impl<P: ActiveModelTrait, C: ActiveModelTrait> fmt::Debug for MemoryTransaction<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransaction")
            .field("depth", &self.depth)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<P: ActiveModelTrait, C: ActiveModelTrait> MemoryTransaction<P, C> {
    /// Nesting level, 1 for a top-level transaction
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Start a nested transaction (savepoint)
    ///
    /// The nested transaction must be committed or rolled back before its parent.
    pub fn begin_nested(&mut self) -> Result<MemoryTransaction<P, C>, TransactionError> {
        if self.closed {
            return Err(TransactionError::TransactionClosed);
        }
        let mut state = self.lock_for_transaction()?;
        if state.savepoints.len() != self.depth {
            return Err(TransactionError::NestedTransactionError(
                "only the innermost transaction can open a savepoint".to_string(),
            ));
        }
        let snapshot = state.tables.clone();
        state.savepoints.push(snapshot);

        Ok(MemoryTransaction {
            state: Arc::clone(&self.state),
            depth: self.depth + 1,
            closed: false,
        })
    }

    fn lock_for_transaction(&self) -> Result<MutexGuard<'_, MemoryState<P, C>>, TransactionError> {
        self.state
            .lock()
            .map_err(|_| TransactionError::Other("memory store lock poisoned".to_string()))
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState<P, C>>, TabularError> {
        if self.closed {
            return Err(TransactionError::TransactionClosed.into());
        }
        lock(&self.state)
    }

    fn finish(&mut self, commit: bool) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::TransactionClosed);
        }
        let depth = self.depth;
        let mut state = self.lock_for_transaction()?;
        if state.savepoints.len() != depth {
            return Err(TransactionError::NestedTransactionError(format!(
                "savepoint {} is still open",
                state.savepoints.len()
            )));
        }
        if commit {
            if let Err(e) = state.check_fault(StoreOperation::Commit) {
                return Err(TransactionError::Other(e.to_string()));
            }
        }
        let snapshot = state
            .savepoints
            .pop()
            .ok_or(TransactionError::TransactionClosed)?;
        if commit {
            if depth == 1 {
                state.commits += 1;
            }
        } else {
            state.tables = snapshot;
            if depth == 1 {
                state.rollbacks += 1;
            }
        }
        drop(state);
        self.closed = true;
        Ok(())
    }
}

impl<P: ActiveModelTrait, C: ActiveModelTrait> TransactionHandle for MemoryTransaction<P, C> {
    fn commit(mut self) -> Result<(), TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();

        self.finish(true)
    }

    fn rollback(mut self) -> Result<(), TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span().entered();

        self.finish(false)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<P: ActiveModelTrait, C: ActiveModelTrait> Drop for MemoryTransaction<P, C> {
    fn drop(&mut self) {
        if !self.closed {
            log::warn!(
                "memory transaction at depth {} dropped without commit, rolling back",
                self.depth
            );
            if let Err(e) = self.finish(false) {
                log::error!("rollback on drop failed: {}", e);
            }
        }
    }
}

impl<P, C> Executor<P, C> for MemoryTransaction<P, C>
where
    P: ActiveModelBehavior,
    C: ActiveModelBehavior,
{
    fn find(&self, id: &C::Id) -> Result<Option<C>, TabularError> {
        self.state()?.find(id)
    }

    fn find_related(&self, parent: &P, relation: &RelationDef<C>) -> Result<Vec<C>, TabularError> {
        self.state()?.find_related(parent, relation)
    }

    fn save_root(&self, parent: &mut P) -> Result<(), TabularError> {
        self.state()?.save_root(parent)
    }

    fn delete(&self, child: &C) -> Result<(), TabularError> {
        self.state()?.delete(child)
    }

    fn link(&self, child: &mut C, relation: &RelationDef<C>, parent: &P) -> Result<(), TabularError> {
        self.state()?.link(child, relation, parent)
    }
}
