//! Shared fixtures: an invoice with its lines, persisted in a memory store.

#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::rc::Rc;
use tabular::store::MemoryStore;
use tabular::{
    ActiveModelBehavior, ActiveModelError, ActiveModelTrait, FormData, RelationDef, RelationType,
    Related, TabularEvent, TabularEventKind, TabularForm, ValidationErrors,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Option<i64>,
    pub number: String,
    pub customer: String,
}

impl ActiveModelTrait for Invoice {
    type Id = i64;

    fn validate(&self, attributes: Option<&[&str]>) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        if self.number.trim().is_empty() {
            errors.add("number", "Number cannot be blank.");
        }
        if let Some(attributes) = attributes {
            errors.retain_attributes(attributes);
        }
        errors
    }
}

impl ActiveModelBehavior for Invoice {}

impl Related<InvoiceLine> for Invoice {
    fn relation(name: &str) -> Option<RelationDef<InvoiceLine>> {
        match name {
            "lines" => Some(RelationDef::has_many("lines", "invoice_id")),
            "primary_line" => Some(RelationDef::new(
                RelationType::HasOne,
                "primary_line",
                "invoice_id",
                InvoiceLine::default,
            )),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub id: Option<i64>,
    pub invoice_id: Option<i64>,
    pub sku: String,
    #[serde(deserialize_with = "tabular::json_helpers::deserialize_form_i64")]
    pub quantity: i64,
    pub discount: Option<i64>,
    pub gift_wrap: Option<bool>,
}

impl InvoiceLine {
    pub fn new(sku: &str, quantity: i64) -> Self {
        Self {
            sku: sku.to_string(),
            quantity,
            ..Default::default()
        }
    }
}

impl ActiveModelTrait for InvoiceLine {
    type Id = i64;

    fn validate(&self, attributes: Option<&[&str]>) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        if self.sku.trim().is_empty() {
            errors.add("sku", "Sku cannot be blank.");
        }
        if self.quantity < 0 {
            errors.add("quantity", "Quantity must be no less than 0.");
        }
        if let Some(attributes) = attributes {
            errors.retain_attributes(attributes);
        }
        errors
    }
}

impl ActiveModelBehavior for InvoiceLine {
    fn before_save(&mut self, _insert: bool) -> Result<(), ActiveModelError> {
        self.sku = self.sku.to_uppercase();
        Ok(())
    }
}

pub type Store = MemoryStore<Invoice, InvoiceLine>;
pub type InvoiceForm = TabularForm<Invoice, InvoiceLine>;

/// A store holding invoice 1 with lines 1 (`a`) and 2 (`b`), and invoice 2
/// with line 3 (`z`)
pub fn seeded_store() -> (Store, Invoice) {
    let store = Store::new();
    let invoice = store
        .seed_root(Invoice {
            id: None,
            number: "INV-1".to_string(),
            customer: "ACME".to_string(),
        })
        .unwrap();
    let other = store
        .seed_root(Invoice {
            id: None,
            number: "INV-2".to_string(),
            customer: "Initech".to_string(),
        })
        .unwrap();

    for (owner, sku) in [(&invoice, "a"), (&invoice, "b"), (&other, "z")] {
        store
            .seed_child(InvoiceLine {
                invoice_id: owner.id,
                ..InvoiceLine::new(sku, 1)
            })
            .unwrap();
    }
    (store, invoice)
}

pub fn form_data(value: JsonValue) -> FormData {
    FormData::from_json(value).unwrap()
}

/// Stored skus of the invoice's lines in key order
pub fn line_skus(store: &Store, invoice: &Invoice) -> Vec<String> {
    store
        .children()
        .into_iter()
        .filter(|line| line.invoice_id == invoice.id)
        .map(|line| line.sku)
        .collect()
}

/// Record every event fired by `form` as `"kind"` or `"kind:index"`
pub fn record_events(form: &mut InvoiceForm) -> Rc<RefCell<Vec<String>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    for kind in [
        TabularEventKind::BeforeValidate,
        TabularEventKind::AfterValidate,
        TabularEventKind::BeforeDelete,
        TabularEventKind::AfterDelete,
        TabularEventKind::BeforeSave,
        TabularEventKind::AfterSave,
        TabularEventKind::BeforeModelDelete,
        TabularEventKind::AfterModelDelete,
        TabularEventKind::BeforeModelSave,
        TabularEventKind::AfterModelSave,
    ] {
        let seen = Rc::clone(&seen);
        form.on(kind, move |event: &TabularEvent<'_, InvoiceLine>| {
            let label = match (event.index, event.model) {
                (Some(index), _) => format!("{}:{}", event.kind, index),
                (None, Some(model)) => format!("{}:#{}", event.kind, model.id.unwrap_or_default()),
                (None, None) => event.kind.to_string(),
            };
            seen.borrow_mut().push(label);
        });
    }
    seen
}
