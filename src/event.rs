//! Lifecycle events fired by the tabular binder.
//!
//! Observers are registered per event kind and invoked synchronously in
//! registration order. They cannot influence the binder: nothing they return
//! flows back into control flow.

use std::fmt;

/// Hook points of the binder lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TabularEventKind {
    BeforeValidate,
    AfterValidate,
    /// Before the delete phase
    BeforeDelete,
    /// After the delete phase
    AfterDelete,
    /// Before the save phase
    BeforeSave,
    /// After the save phase
    AfterSave,
    /// Before a single child is deleted
    BeforeModelDelete,
    /// After a single child was deleted
    AfterModelDelete,
    /// Before a single child is linked and saved
    BeforeModelSave,
    /// After a single child was linked and saved
    AfterModelSave,
}

impl TabularEventKind {
    /// Event name as used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            TabularEventKind::BeforeValidate => "beforeValidate",
            TabularEventKind::AfterValidate => "afterValidate",
            TabularEventKind::BeforeDelete => "beforeDelete",
            TabularEventKind::AfterDelete => "afterDelete",
            TabularEventKind::BeforeSave => "beforeSave",
            TabularEventKind::AfterSave => "afterSave",
            TabularEventKind::BeforeModelDelete => "beforeModelDelete",
            TabularEventKind::AfterModelDelete => "afterModelDelete",
            TabularEventKind::BeforeModelSave => "beforeModelSave",
            TabularEventKind::AfterModelSave => "afterModelSave",
        }
    }
}

impl fmt::Display for TabularEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload handed to observers
#[derive(Debug)]
pub struct TabularEvent<'a, C> {
    pub kind: TabularEventKind,
    /// Relation name of the binder that fired the event
    pub relation: &'a str,
    /// Submission index of the row, for per-model save events
    pub index: Option<&'a str>,
    /// Child concerned, for per-model events
    pub model: Option<&'a C>,
}

impl<'a, C> TabularEvent<'a, C> {
    pub fn phase(kind: TabularEventKind, relation: &'a str) -> Self {
        Self {
            kind,
            relation,
            index: None,
            model: None,
        }
    }

    pub fn for_model(
        kind: TabularEventKind,
        relation: &'a str,
        index: Option<&'a str>,
        model: &'a C,
    ) -> Self {
        Self {
            kind,
            relation,
            index,
            model: Some(model),
        }
    }
}

type Observer<C> = Box<dyn Fn(&TabularEvent<'_, C>)>;

/// Registry of lifecycle observers
pub struct EventBus<C> {
    observers: Vec<(TabularEventKind, Observer<C>)>,
}

impl<C> Default for EventBus<C> {
    fn default() -> Self {
        Self {
            observers: Vec::new(),
        }
    }
}

impl<C> fmt::Debug for EventBus<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl<C> EventBus<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for one event kind
    pub fn on<F>(&mut self, kind: TabularEventKind, observer: F)
    where
        F: Fn(&TabularEvent<'_, C>) + 'static,
    {
        self.observers.push((kind, Box::new(observer)));
    }

    /// Remove every observer of one event kind, returning how many were removed
    pub fn off(&mut self, kind: TabularEventKind) -> usize {
        let before = self.observers.len();
        self.observers.retain(|(registered, _)| *registered != kind);
        before - self.observers.len()
    }

    pub fn has_observers(&self, kind: TabularEventKind) -> bool {
        self.observers.iter().any(|(registered, _)| *registered == kind)
    }

    /// Invoke the observers registered for `event.kind`
    pub fn trigger(&self, event: &TabularEvent<'_, C>) {
        log::trace!("tabular event {} on {}", event.kind, event.relation);
        for (kind, observer) in &self.observers {
            if *kind == event.kind {
                observer(event);
            }
        }
    }
}
