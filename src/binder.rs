//! Tabular form binder.
//!
//! [`TabularForm`] binds a parent model to the rows of one of its has-many
//! relations posted in a form:
//!
//! 1. [`load`](TabularForm::load) builds one child per posted row, reusing the
//!    stored child when the row carries a known primary key;
//! 2. [`validate`](TabularForm::validate) runs the models' rules;
//! 3. [`save`](TabularForm::save) opens one transaction, optionally saves the
//!    parent, deletes the children that are no longer posted, links and saves the
//!    posted ones, and commits. Any failure rolls the whole transaction back.
//!
//! # Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//! use tabular::store::MemoryStore;
//! use tabular::{
//!     ActiveModelBehavior, ActiveModelTrait, FormData, RelationDef, Related, TabularForm,
//! };
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct Invoice { id: Option<i64> }
//! impl ActiveModelTrait for Invoice { type Id = i64; }
//! impl ActiveModelBehavior for Invoice {}
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct InvoiceLine { id: Option<i64>, invoice_id: Option<i64>, sku: String }
//! impl ActiveModelTrait for InvoiceLine { type Id = i64; }
//! impl ActiveModelBehavior for InvoiceLine {}
//!
//! impl Related<InvoiceLine> for Invoice {
//!     fn relation(name: &str) -> Option<RelationDef<InvoiceLine>> {
//!         (name == "lines").then(|| RelationDef::has_many("lines", "invoice_id"))
//!     }
//! }
//!
//! let store = MemoryStore::<Invoice, InvoiceLine>::new();
//! let invoice = store.seed_root(Invoice::default())?;
//!
//! let mut form = TabularForm::<Invoice, InvoiceLine>::new(invoice, "lines");
//! let data = FormData::from_json(json!({
//!     "InvoiceLine": { "0": { "sku": "A" }, "1": { "sku": "B" } }
//! }))?;
//!
//! assert!(form.load(&data, None, None, &store)?);
//! assert!(form.save(true, &store)?);
//! assert_eq!(store.children().len(), 2);
//! # Ok::<(), tabular::TabularError>(())
//! ```

use crate::active_model::{ActiveModelError, ActiveModelTrait};
use crate::config::TabularConfig;
use crate::event::{EventBus, TabularEvent, TabularEventKind};
use crate::executor::{Executor, TabularError};
use crate::form::FormData;
use crate::json_helpers::parse_key;
use crate::relation::{RelationDef, RelationType, Related};
use crate::transaction::{TransactionHandle, TransactionManager};
use crate::validation::ValidationErrors;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Instant;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Error key used when a bind failure cannot be pinned to one attribute
const ROW_ERROR_KEY: &str = "*";

/// Replaces the default delete phase. Receives the current children of the
/// relation, including those still posted as stored rows.
///
/// `Ok(None)` counts as success; `Ok(Some(false))` rolls the save back.
pub type DeleteCallback<P, C> =
    Box<dyn FnMut(&P, &[C], &dyn Executor<P, C>) -> Result<Option<bool>, TabularError>>;

/// Replaces the default save phase. Receives the bound rows.
///
/// `Ok(None)` counts as success; `Ok(Some(false))` rolls the save back.
pub type SaveCallback<P, C> = Box<
    dyn FnMut(&P, &mut [BoundModel<C>], &dyn Executor<P, C>) -> Result<Option<bool>, TabularError>,
>;

/// Replaces the relation accessor used to read the current children
pub type ModelsGetter<P, C> = Box<dyn Fn(&P, &dyn Executor<P, C>) -> Result<Vec<C>, TabularError>>;

/// Where a bound child came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelOrigin {
    /// Fetched by the primary key posted in its row
    Stored,
    /// Constructed for a row without a known primary key
    New,
}

/// One posted row and the child bound to it
#[derive(Debug, Clone)]
pub struct BoundModel<C> {
    /// Submission index of the row
    pub index: String,
    pub model: C,
    pub origin: ModelOrigin,
}

impl<C> BoundModel<C> {
    pub fn is_new(&self) -> bool {
        self.origin == ModelOrigin::New
    }
}

/// Binds a parent model to the posted rows of one of its has-many relations
pub struct TabularForm<P, C>
where
    P: Related<C>,
    C: ActiveModelTrait,
{
    root: P,
    relation_name: String,
    with_root: bool,
    run_validation: bool,
    clear_errors: bool,
    form_key: Option<String>,
    root_form_key: Option<String>,
    models: Option<Vec<BoundModel<C>>>,
    errors: BTreeMap<String, ValidationErrors>,
    bind_errors: BTreeMap<String, ValidationErrors>,
    root_errors: ValidationErrors,
    root_bind_errors: ValidationErrors,
    events: EventBus<C>,
    delete_callback: Option<DeleteCallback<P, C>>,
    save_callback: Option<SaveCallback<P, C>>,
    models_getter: Option<ModelsGetter<P, C>>,
}

impl<P, C> fmt::Debug for TabularForm<P, C>
where
    P: Related<C>,
    C: ActiveModelTrait,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabularForm")
            .field("root", &self.root)
            .field("relation_name", &self.relation_name)
            .field("with_root", &self.with_root)
            .field("form_key", &self.form_key)
            .field("root_form_key", &self.root_form_key)
            .field("models", &self.models)
            .field("errors", &self.errors)
            .field("events", &self.events)
            .field("delete_callback", &self.delete_callback.is_some())
            .field("save_callback", &self.save_callback.is_some())
            .field("models_getter", &self.models_getter.is_some())
            .finish()
    }
}

impl<P, C> TabularForm<P, C>
where
    P: Related<C>,
    C: ActiveModelTrait,
{
    /// Bind `relation_name` of `root` with default settings
    pub fn new(root: P, relation_name: &str) -> Self {
        Self {
            root,
            relation_name: relation_name.to_string(),
            with_root: false,
            run_validation: true,
            clear_errors: true,
            form_key: None,
            root_form_key: None,
            models: None,
            errors: BTreeMap::new(),
            bind_errors: BTreeMap::new(),
            root_errors: ValidationErrors::new(),
            root_bind_errors: ValidationErrors::new(),
            events: EventBus::new(),
            delete_callback: None,
            save_callback: None,
            models_getter: None,
        }
    }

    pub fn builder(root: P, relation_name: &str) -> TabularFormBuilder<P, C> {
        TabularFormBuilder {
            form: Self::new(root, relation_name),
        }
    }

    pub fn root(&self) -> &P {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut P {
        &mut self.root
    }

    pub fn into_root(self) -> P {
        self.root
    }

    pub fn relation_name(&self) -> &str {
        &self.relation_name
    }

    pub fn is_with_root(&self) -> bool {
        self.with_root
    }

    /// Whether a load has built binder state
    pub fn is_loaded(&self) -> bool {
        self.models.is_some()
    }

    /// Rows bound by the last successful load
    pub fn bound_models(&self) -> Option<&[BoundModel<C>]> {
        self.models.as_deref()
    }

    pub fn bound_models_mut(&mut self) -> Option<&mut [BoundModel<C>]> {
        self.models.as_deref_mut()
    }

    /// Validation errors per submission index
    pub fn errors(&self) -> &BTreeMap<String, ValidationErrors> {
        &self.errors
    }

    pub fn model_errors(&self, index: &str) -> Option<&ValidationErrors> {
        self.errors.get(index)
    }

    /// Parent validation errors in with-root mode
    pub fn root_errors(&self) -> &ValidationErrors {
        &self.root_errors
    }

    /// Whether any row or the parent currently has errors, binding errors included
    pub fn has_errors(&self) -> bool {
        !self.root_errors.is_empty()
            || !self.root_bind_errors.is_empty()
            || self.errors.values().any(|errors| !errors.is_empty())
            || self.bind_errors.values().any(|errors| !errors.is_empty())
    }

    /// Register a lifecycle observer
    pub fn on<F>(&mut self, kind: TabularEventKind, observer: F)
    where
        F: Fn(&TabularEvent<'_, C>) + 'static,
    {
        self.events.on(kind, observer);
    }

    pub fn events_mut(&mut self) -> &mut EventBus<C> {
        &mut self.events
    }

    fn resolve_relation(&self) -> Result<RelationDef<C>, TabularError> {
        let relation = P::relation(&self.relation_name)
            .ok_or_else(|| TabularError::UnknownRelation(self.relation_name.clone()))?;
        if relation.rel_type != RelationType::HasMany {
            return Err(TabularError::InvalidRelation {
                name: self.relation_name.clone(),
                reason: format!("expected a has-many relation, found {:?}", relation.rel_type),
            });
        }
        Ok(relation)
    }

    /// Build binder state from posted data
    ///
    /// `form_key` overrides the sub-form key (configured key, else
    /// `C::form_name()`); `root_form_key` overrides the parent's key in with-root
    /// mode. Posted fields are bound from `data` itself.
    ///
    /// Returns `Ok(false)` without touching any state when `data` has no
    /// sub-form section. Returns `Ok(true)` once every row is bound, even if
    /// some rows hold values that could not be bound; those surface as
    /// validation errors.
    pub fn load(
        &mut self,
        data: &FormData,
        form_key: Option<&str>,
        root_form_key: Option<&str>,
        executor: &dyn Executor<P, C>,
    ) -> Result<bool, TabularError> {
        let relation = self.resolve_relation()?;
        let form_key = form_key
            .map(str::to_string)
            .or_else(|| self.form_key.clone())
            .unwrap_or_else(C::form_name);

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::load_span(&self.relation_name, &form_key).entered();

        let Some(rows) = data.rows(&form_key)? else {
            log::debug!(
                "no {} section posted for relation {}",
                form_key,
                self.relation_name
            );
            return Ok(false);
        };

        // The parent is bound into a copy and only replaced once every row is built
        let mut staged_root = None;
        let mut root_bind_errors = ValidationErrors::new();
        if self.with_root {
            let root_key = root_form_key
                .map(str::to_string)
                .or_else(|| self.root_form_key.clone())
                .unwrap_or_else(P::form_name);
            let mut root = self.root.clone();
            if let Some(fields) = data.fields(&root_key)? {
                if let Err(e) = root.set_attributes(fields) {
                    root_bind_errors = bind_error(e);
                }
            }
            staged_root = Some(root);
        }
        let owner = staged_root.as_ref().unwrap_or(&self.root);

        let primary_key = C::primary_key_attribute();
        let mut models = Vec::with_capacity(rows.len());
        let mut bind_errors = BTreeMap::new();

        for row in rows {
            let posted_key = row
                .fields
                .get(primary_key)
                .and_then(|value| parse_key::<C::Id>(value));

            let stored = match posted_key {
                Some(id) => match executor.find(&id)? {
                    Some(child) if relation.is_linked(&child, owner) => Some(child),
                    Some(_) => {
                        log::warn!(
                            "row {}[{}] posted key {:?} owned by another parent, binding as new",
                            form_key,
                            row.index,
                            id
                        );
                        None
                    }
                    None => None,
                },
                None => None,
            };

            let (mut model, origin) = match stored {
                Some(child) => (child, ModelOrigin::Stored),
                None => (relation.new_model(), ModelOrigin::New),
            };

            if let Err(e) = model.set_attributes(row.fields) {
                log::debug!("row {}[{}] did not bind: {}", form_key, row.index, e);
                bind_errors.insert(row.index.clone(), bind_error(e));
            }

            models.push(BoundModel {
                index: row.index,
                model,
                origin,
            });
        }

        log::debug!(
            "loaded {} row(s) for relation {}",
            models.len(),
            self.relation_name
        );

        if let Some(root) = staged_root {
            self.root = root;
            self.root_bind_errors = root_bind_errors;
        }
        self.models = Some(models);
        self.bind_errors = bind_errors;
        self.errors.clear();

        #[cfg(feature = "metrics")]
        METRICS.record_load(&self.relation_name);

        Ok(true)
    }

    /// Validate the bound rows, and the parent in with-root mode
    ///
    /// The children are validated even when the parent fails. `attributes`
    /// restricts the rules run on each model. Returns `true` only when the parent
    /// (if applicable) and every row are free of errors.
    pub fn validate(&mut self, attributes: Option<&[&str]>, clear_errors: bool) -> bool {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::validate_span(&self.relation_name).entered();

        let mut result = true;

        if self.with_root {
            if clear_errors {
                self.root_errors.clear();
            }
            let mut errors = self.root.validate(attributes);
            errors.merge(self.root_bind_errors.clone());
            self.root_errors.merge(errors);
            result = self.root_errors.is_empty();
        }

        self.events.trigger(&TabularEvent::phase(
            TabularEventKind::BeforeValidate,
            &self.relation_name,
        ));

        if clear_errors {
            self.errors.clear();
        }

        let mut children_valid = true;
        if let Some(models) = &self.models {
            for bound in models {
                let mut errors = bound.model.validate(attributes);
                if let Some(bind_errors) = self.bind_errors.get(&bound.index) {
                    errors.merge(bind_errors.clone());
                }
                if !errors.is_empty() {
                    self.errors
                        .entry(bound.index.clone())
                        .or_default()
                        .merge(errors);
                }
                if self
                    .errors
                    .get(&bound.index)
                    .is_some_and(|errors| !errors.is_empty())
                {
                    children_valid = false;
                }
            }
        }

        self.events.trigger(&TabularEvent::phase(
            TabularEventKind::AfterValidate,
            &self.relation_name,
        ));

        result && children_valid
    }

    /// Persist the parent (with-root mode) and the bound rows in one transaction
    ///
    /// With `run_validation`, a failed [`validate`](Self::validate) returns
    /// `Ok(false)` before any transaction is opened. A phase error rolls the
    /// transaction back and is returned; a callback reporting `Some(false)` rolls
    /// back and returns `Ok(false)`. Without a prior load only the parent is saved.
    pub fn save<M>(&mut self, run_validation: bool, manager: &M) -> Result<bool, TabularError>
    where
        M: TransactionManager<P, C>,
    {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::save_span(&self.relation_name).entered();
        #[cfg(feature = "metrics")]
        METRICS.record_save_attempt(&self.relation_name);

        if run_validation && !self.validate(None, true) {
            log::debug!(
                "save of relation {} skipped: validation failed",
                self.relation_name
            );
            return Ok(false);
        }

        let relation = self.resolve_relation()?;
        let started = Instant::now();
        let transaction = manager.begin()?;

        match self.run_phases(&relation, &transaction) {
            Ok(true) => match transaction.commit() {
                Ok(()) => {
                    log::info!(
                        "saved relation {} in {:?}",
                        self.relation_name,
                        started.elapsed()
                    );
                    #[cfg(feature = "metrics")]
                    METRICS.record_commit(&self.relation_name, started.elapsed());
                    Ok(true)
                }
                Err(e) => {
                    // A handle whose commit failed is rolled back when dropped
                    log::warn!(
                        "commit of relation {} failed, rolled back: {}",
                        self.relation_name,
                        e
                    );
                    #[cfg(feature = "metrics")]
                    METRICS.record_rollback(&self.relation_name);
                    Err(e.into())
                }
            },
            Ok(false) => {
                log::warn!(
                    "save of relation {} reported failure, rolling back",
                    self.relation_name
                );
                self.roll_back(transaction);
                Ok(false)
            }
            Err(e) => {
                log::warn!(
                    "save of relation {} failed, rolling back: {}",
                    self.relation_name,
                    e
                );
                self.roll_back(transaction);
                Err(e)
            }
        }
    }

    /// Load with the configured keys, then save with the configured validation setting
    ///
    /// Returns `Ok(false)` when nothing was posted for the relation or the save
    /// did not proceed.
    pub fn submit<M>(&mut self, data: &FormData, manager: &M) -> Result<bool, TabularError>
    where
        M: TransactionManager<P, C>,
    {
        if !self.load(data, None, None, manager)? {
            return Ok(false);
        }
        self.save(self.run_validation, manager)
    }

    /// Validate with the configured `clear_errors` setting
    pub fn validate_all(&mut self) -> bool {
        self.validate(None, self.clear_errors)
    }

    fn roll_back<T: TransactionHandle>(&self, transaction: T) {
        if let Err(e) = transaction.rollback() {
            log::error!(
                "rollback of relation {} failed: {}",
                self.relation_name,
                e
            );
        }
        #[cfg(feature = "metrics")]
        METRICS.record_rollback(&self.relation_name);
    }

    fn run_phases(
        &mut self,
        relation: &RelationDef<C>,
        executor: &dyn Executor<P, C>,
    ) -> Result<bool, TabularError> {
        if self.with_root {
            executor.save_root(&mut self.root)?;
        }

        if self.models.is_none() {
            log::debug!(
                "relation {} not loaded, children left untouched",
                self.relation_name
            );
            return Ok(true);
        }

        if !self.delete_old_models(executor)? {
            return Ok(false);
        }
        self.save_new_models(relation, executor)
    }

    /// Delete phase
    ///
    /// A delete callback receives the whole current set. The default path deletes
    /// the current children whose key is not held by a stored row.
    fn delete_old_models(&mut self, executor: &dyn Executor<P, C>) -> Result<bool, TabularError> {
        self.events.trigger(&TabularEvent::phase(
            TabularEventKind::BeforeDelete,
            &self.relation_name,
        ));

        let current = self.models(true, executor)?;

        let result = match self.delete_callback.as_mut() {
            Some(callback) => callback(&self.root, &current, executor)?.unwrap_or(true),
            None => {
                let retained: HashSet<C::Id> = self
                    .models
                    .iter()
                    .flatten()
                    .filter(|bound| bound.origin == ModelOrigin::Stored)
                    .filter_map(|bound| bound.model.primary_key())
                    .collect();
                let removed: Vec<&C> = current
                    .iter()
                    .filter(|model| {
                        model
                            .primary_key()
                            .is_some_and(|id| !retained.contains(&id))
                    })
                    .collect();

                for model in removed.iter().copied() {
                    self.events.trigger(&TabularEvent::for_model(
                        TabularEventKind::BeforeModelDelete,
                        &self.relation_name,
                        None,
                        model,
                    ));

                    executor.delete(model)?;

                    self.events.trigger(&TabularEvent::for_model(
                        TabularEventKind::AfterModelDelete,
                        &self.relation_name,
                        None,
                        model,
                    ));
                }
                log::debug!(
                    "deleted {} child(ren) of relation {}",
                    removed.len(),
                    self.relation_name
                );
                #[cfg(feature = "metrics")]
                METRICS.record_models_deleted(&self.relation_name, removed.len());
                true
            }
        };

        self.events.trigger(&TabularEvent::phase(
            TabularEventKind::AfterDelete,
            &self.relation_name,
        ));

        Ok(result)
    }

    /// Link every bound row to the parent and persist it
    fn save_new_models(
        &mut self,
        relation: &RelationDef<C>,
        executor: &dyn Executor<P, C>,
    ) -> Result<bool, TabularError> {
        self.events.trigger(&TabularEvent::phase(
            TabularEventKind::BeforeSave,
            &self.relation_name,
        ));

        let models = self
            .models
            .as_deref_mut()
            .unwrap_or_default();

        let result = match self.save_callback.as_mut() {
            Some(callback) => callback(&self.root, models, executor)?.unwrap_or(true),
            None => {
                for bound in models.iter_mut() {
                    self.events.trigger(&TabularEvent::for_model(
                        TabularEventKind::BeforeModelSave,
                        &self.relation_name,
                        Some(bound.index.as_str()),
                        &bound.model,
                    ));

                    executor.link(&mut bound.model, relation, &self.root)?;

                    self.events.trigger(&TabularEvent::for_model(
                        TabularEventKind::AfterModelSave,
                        &self.relation_name,
                        Some(bound.index.as_str()),
                        &bound.model,
                    ));
                }
                #[cfg(feature = "metrics")]
                METRICS.record_models_saved(&self.relation_name, models.len());
                true
            }
        };

        self.events.trigger(&TabularEvent::phase(
            TabularEventKind::AfterSave,
            &self.relation_name,
        ));

        Ok(result)
    }

    /// Children of the relation
    ///
    /// Returns the bound rows' models, or the live set from storage (custom
    /// getter, else the relation accessor) when `current` is set or nothing was
    /// loaded yet.
    pub fn models(
        &self,
        current: bool,
        executor: &dyn Executor<P, C>,
    ) -> Result<Vec<C>, TabularError> {
        if let (Some(models), false) = (&self.models, current) {
            return Ok(models.iter().map(|bound| bound.model.clone()).collect());
        }
        match &self.models_getter {
            Some(getter) => getter(&self.root, executor),
            None => {
                let relation = self.resolve_relation()?;
                executor.find_related(&self.root, &relation)
            }
        }
    }
}

fn bind_error(err: ActiveModelError) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    match &err {
        ActiveModelError::InvalidValueType { attribute, .. } => {
            errors.add(attribute.clone(), err.to_string())
        }
        _ => errors.add(ROW_ERROR_KEY, err.to_string()),
    }
    errors
}

/// Builder for [`TabularForm`]
pub struct TabularFormBuilder<P, C>
where
    P: Related<C>,
    C: ActiveModelTrait,
{
    form: TabularForm<P, C>,
}

impl<P, C> TabularFormBuilder<P, C>
where
    P: Related<C>,
    C: ActiveModelTrait,
{
    /// Apply loaded configuration defaults
    #[must_use]
    pub fn config(mut self, config: &TabularConfig) -> Self {
        self.form.with_root = config.with_root;
        self.form.run_validation = config.run_validation;
        self.form.clear_errors = config.clear_errors;
        self.form.form_key = config.form_key.clone();
        self.form.root_form_key = config.root_form_key.clone();
        self
    }

    /// Also bind, validate and save the parent's own fields
    #[must_use]
    pub fn with_root(mut self, with_root: bool) -> Self {
        self.form.with_root = with_root;
        self
    }

    #[must_use]
    pub fn form_key(mut self, key: &str) -> Self {
        self.form.form_key = Some(key.to_string());
        self
    }

    #[must_use]
    pub fn root_form_key(mut self, key: &str) -> Self {
        self.form.root_form_key = Some(key.to_string());
        self
    }

    #[must_use]
    pub fn run_validation(mut self, run_validation: bool) -> Self {
        self.form.run_validation = run_validation;
        self
    }

    #[must_use]
    pub fn delete_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&P, &[C], &dyn Executor<P, C>) -> Result<Option<bool>, TabularError> + 'static,
    {
        self.form.delete_callback = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn save_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&P, &mut [BoundModel<C>], &dyn Executor<P, C>) -> Result<Option<bool>, TabularError>
            + 'static,
    {
        self.form.save_callback = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn models_getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(&P, &dyn Executor<P, C>) -> Result<Vec<C>, TabularError> + 'static,
    {
        self.form.models_getter = Some(Box::new(getter));
        self
    }

    /// Register a lifecycle observer
    #[must_use]
    pub fn on<F>(mut self, kind: TabularEventKind, observer: F) -> Self
    where
        F: Fn(&TabularEvent<'_, C>) + 'static,
    {
        self.form.events.on(kind, observer);
        self
    }

    pub fn build(self) -> TabularForm<P, C> {
        self.form
    }
}
