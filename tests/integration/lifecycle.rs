//! Integration tests for binder events, phase callbacks and with-root mode

mod common;

use common::{
    form_data, line_skus, record_events, seeded_store, Invoice, InvoiceForm, InvoiceLine,
};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use tabular::store::StoreOperation;
use tabular::{Executor, Related, TabularError, TabularEventKind};

fn replace_lines() -> serde_json::Value {
    json!({
        "InvoiceLine": {
            "0": { "id": 1, "sku": "a2" },
            "1": { "sku": "c" }
        }
    })
}

// ============================================================================
// events
// ============================================================================

#[test]
fn test_events_fire_in_lifecycle_order() {
    let (store, invoice) = seeded_store();
    let mut form = InvoiceForm::new(invoice, "lines");
    let seen = record_events(&mut form);

    form.load(&form_data(replace_lines()), None, None, &store)
        .unwrap();
    assert!(seen.borrow().is_empty());

    assert!(form.save(true, &store).unwrap());
    assert_eq!(
        *seen.borrow(),
        vec![
            "beforeValidate",
            "afterValidate",
            "beforeDelete",
            "beforeModelDelete:#2",
            "afterModelDelete:#2",
            "afterDelete",
            "beforeSave",
            "beforeModelSave:0",
            "afterModelSave:0",
            "beforeModelSave:1",
            "afterModelSave:1",
            "afterSave",
        ]
    );
}

#[test]
fn test_failed_validation_fires_only_validation_events() {
    let (store, invoice) = seeded_store();
    let mut form = InvoiceForm::new(invoice, "lines");
    let seen = record_events(&mut form);

    form.load(
        &form_data(json!({ "InvoiceLine": { "0": { "sku": "" } } })),
        None,
        None,
        &store,
    )
    .unwrap();
    assert!(!form.save(true, &store).unwrap());
    assert_eq!(*seen.borrow(), vec!["beforeValidate", "afterValidate"]);
}

#[test]
fn test_observers_see_saved_models() {
    let (store, invoice) = seeded_store();
    let saved = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&saved);

    let mut form = InvoiceForm::builder(invoice, "lines")
        .on(TabularEventKind::AfterModelSave, move |event| {
            if let Some(line) = event.model {
                sink.borrow_mut().push((line.id, line.sku.clone()));
            }
        })
        .build();

    form.load(&form_data(replace_lines()), None, None, &store)
        .unwrap();
    form.save(true, &store).unwrap();

    assert_eq!(
        *saved.borrow(),
        vec![(Some(1), "A2".to_string()), (Some(4), "C".to_string())]
    );
}

#[test]
fn test_removed_observers_stop_firing() {
    let (store, invoice) = seeded_store();
    let mut form = InvoiceForm::new(invoice, "lines");
    let seen = record_events(&mut form);
    assert_eq!(form.events_mut().off(TabularEventKind::BeforeModelSave), 1);
    assert_eq!(form.events_mut().off(TabularEventKind::AfterModelSave), 1);

    form.load(
        &form_data(json!({ "InvoiceLine": { "0": { "id": 1, "sku": "a" }, "1": { "id": 2, "sku": "b" } } })),
        None,
        None,
        &store,
    )
    .unwrap();
    form.save(false, &store).unwrap();

    assert_eq!(
        *seen.borrow(),
        vec!["beforeDelete", "afterDelete", "beforeSave", "afterSave"]
    );
}

// ============================================================================
// callbacks
// ============================================================================

#[test]
fn test_delete_callback_replaces_default_deletion() {
    let (store, invoice) = seeded_store();
    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&received);

    let mut form = InvoiceForm::builder(invoice.clone(), "lines")
        .delete_callback(move |_, current, _| {
            sink.borrow_mut()
                .extend(current.iter().filter_map(|line| line.id));
            Ok(None)
        })
        .build();
    let seen = record_events(&mut form);

    form.load(&form_data(replace_lines()), None, None, &store)
        .unwrap();
    assert!(form.save(true, &store).unwrap());

    // The callback sees every current line, including line 1 which is still posted
    assert_eq!(*received.borrow(), vec![1, 2]);
    // Nothing was deleted; the posted rows were still saved
    assert_eq!(line_skus(&store, &invoice), vec!["A2", "b", "C"]);
    assert!(!seen
        .borrow()
        .iter()
        .any(|event| event.starts_with("beforeModelDelete")));
}

#[test]
fn test_delete_callback_can_use_the_transaction() {
    let (store, invoice) = seeded_store();
    let mut form = InvoiceForm::builder(invoice.clone(), "lines")
        .delete_callback(|_, current, executor| {
            for line in current.iter().filter(|line| line.sku != "a") {
                executor.delete(line)?;
            }
            Ok(Some(true))
        })
        .build();

    form.load(&form_data(replace_lines()), None, None, &store)
        .unwrap();
    assert!(form.save(true, &store).unwrap());
    assert_eq!(line_skus(&store, &invoice), vec!["A2", "C"]);
}

#[test]
fn test_delete_callback_failure_rolls_back() {
    let (store, invoice) = seeded_store();
    let mut form = InvoiceForm::builder(invoice.clone(), "lines")
        .delete_callback(|_, current, executor| {
            for line in current {
                executor.delete(line)?;
            }
            Ok(Some(false))
        })
        .build();
    let seen = record_events(&mut form);

    form.load(&form_data(replace_lines()), None, None, &store)
        .unwrap();
    assert!(!form.save(true, &store).unwrap());

    assert_eq!(store.commit_count(), 0);
    assert_eq!(store.rollback_count(), 1);
    assert_eq!(line_skus(&store, &invoice), vec!["a", "b"]);
    // The save phase never ran
    assert!(!seen.borrow().iter().any(|event| event == "beforeSave"));
}

#[test]
fn test_save_callback_replaces_default_linking() {
    let (store, invoice) = seeded_store();
    let relation = Invoice::relation("lines").unwrap();

    let mut form = InvoiceForm::builder(invoice.clone(), "lines")
        .save_callback(move |invoice, rows, executor| {
            for row in rows.iter_mut() {
                row.model.quantity = 10;
                executor.link(&mut row.model, &relation, invoice)?;
            }
            Ok(None)
        })
        .build();

    form.load(&form_data(replace_lines()), None, None, &store)
        .unwrap();
    assert!(form.save(true, &store).unwrap());

    let lines: Vec<InvoiceLine> = store
        .children()
        .into_iter()
        .filter(|line| line.invoice_id == invoice.id)
        .collect();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|line| line.quantity == 10));
    assert_eq!(form.bound_models().unwrap()[1].model.id, Some(4));
}

#[test]
fn test_save_callback_failure_rolls_back_deletions() {
    let (store, invoice) = seeded_store();
    let mut form = InvoiceForm::builder(invoice.clone(), "lines")
        .save_callback(|_, _, _| Ok(Some(false)))
        .build();

    form.load(&form_data(replace_lines()), None, None, &store)
        .unwrap();
    assert!(!form.save(true, &store).unwrap());
    assert_eq!(line_skus(&store, &invoice), vec!["a", "b"]);
    assert_eq!(store.rollback_count(), 1);
}

#[test]
fn test_callback_error_is_returned_after_rollback() {
    let (store, invoice) = seeded_store();
    let mut form = InvoiceForm::builder(invoice.clone(), "lines")
        .save_callback(|_, _, _| Err(TabularError::Callback("ledger closed".to_string())))
        .build();

    form.load(&form_data(replace_lines()), None, None, &store)
        .unwrap();
    let err = form.save(true, &store).unwrap_err();
    assert!(matches!(err, TabularError::Callback(message) if message == "ledger closed"));
    assert_eq!(line_skus(&store, &invoice), vec!["a", "b"]);
    assert_eq!(store.rollback_count(), 1);
}

#[test]
fn test_models_getter_limits_deletions() {
    let (store, invoice) = seeded_store();
    let relation = Invoice::relation("lines").unwrap();

    let mut form = InvoiceForm::builder(invoice.clone(), "lines")
        .models_getter(move |invoice, executor| {
            Ok(executor
                .find_related(invoice, &relation)?
                .into_iter()
                .filter(|line| line.sku == "a")
                .collect())
        })
        .build();

    assert_eq!(form.models(true, &store).unwrap().len(), 1);

    form.load(&form_data(json!({ "InvoiceLine": "" })), None, None, &store)
        .unwrap();
    assert!(form.save(true, &store).unwrap());
    assert_eq!(line_skus(&store, &invoice), vec!["b"]);
}

// ============================================================================
// with-root mode
// ============================================================================

#[test]
fn test_with_root_saves_parent_first() {
    let (store, _) = seeded_store();
    let mut form = InvoiceForm::builder(Invoice::default(), "lines")
        .with_root(true)
        .build();
    assert!(form.is_with_root());

    let data = form_data(json!({
        "Invoice": { "number": "INV-9", "customer": "Globex" },
        "InvoiceLine": { "0": { "sku": "n", "quantity": "2" } }
    }));
    assert!(form.load(&data, None, None, &store).unwrap());
    assert!(form.save(true, &store).unwrap());

    let invoice = form.root().clone();
    assert_eq!(invoice.id, Some(3));
    assert_eq!(store.root(&3).unwrap().customer, "Globex");
    assert_eq!(line_skus(&store, &invoice), vec!["N"]);
    assert_eq!(store.commit_count(), 1);
}

#[test]
fn test_with_root_validates_parent_and_children() {
    let (store, invoice) = seeded_store();
    let mut form = InvoiceForm::builder(invoice, "lines")
        .with_root(true)
        .build();
    let data = form_data(json!({
        "Invoice": { "number": "" },
        "InvoiceLine": { "0": { "sku": "" } }
    }));

    form.load(&data, None, None, &store).unwrap();
    assert!(!form.save(true, &store).unwrap());

    assert!(form.root_errors().has("number"));
    assert!(form.model_errors("0").unwrap().has("sku"));
    assert_eq!(store.commit_count(), 0);
}

#[test]
fn test_with_root_bind_errors_and_root_key_override() {
    let (store, invoice) = seeded_store();
    let mut form = InvoiceForm::builder(invoice, "lines")
        .with_root(true)
        .build();
    let data = form_data(json!({
        "Header": { "number": ["INV", "1"] },
        "InvoiceLine": {}
    }));

    form.load(&data, None, Some("Header"), &store).unwrap();
    assert_eq!(form.root().number, "INV-1");
    assert!(!form.validate(None, true));
    assert!(form.root_errors().has("number"));
}

#[test]
fn test_with_root_needs_child_section() {
    let (store, invoice) = seeded_store();
    let mut form = InvoiceForm::builder(invoice, "lines")
        .with_root(true)
        .build();
    let data = form_data(json!({ "Invoice": { "customer": "Globex" } }));

    assert!(!form.load(&data, None, None, &store).unwrap());
    assert_eq!(form.root().customer, "ACME");
}

#[test]
fn test_with_root_parent_failure_rolls_back() {
    let (store, invoice) = seeded_store();
    let mut form = InvoiceForm::builder(invoice.clone(), "lines")
        .with_root(true)
        .build();
    let data = form_data(json!({
        "Invoice": { "customer": "Globex" },
        "InvoiceLine": {}
    }));
    form.load(&data, None, None, &store).unwrap();

    store.fail_next(StoreOperation::SaveRoot);
    assert!(form.save(true, &store).is_err());
    assert_eq!(store.root(&1).unwrap().customer, "ACME");
    assert_eq!(line_skus(&store, &invoice), vec!["a", "b"]);
}
