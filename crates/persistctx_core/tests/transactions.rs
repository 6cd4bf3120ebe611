mod common;

use common::{billing_store, count_rows, Invoice, InvoiceLine, RecordingStore};
use persistctx_core::{
    CommandExecutor, CommitReceipt, ContextError, EntityRef, EntityState, PersistenceContext,
    SqliteStore, Store, StoreError,
};
use std::cell::RefCell;
use std::rc::Rc;
use uuid::Uuid;

#[derive(Default)]
struct ReceiptLog {
    receipts: RefCell<Vec<CommitReceipt>>,
}

impl CommandExecutor for ReceiptLog {
    fn on_committed(&self, receipt: &CommitReceipt) {
        self.receipts.borrow_mut().push(receipt.clone());
    }
}

fn logged_context(log: &Rc<ReceiptLog>) -> PersistenceContext<SqliteStore> {
    let shared = Rc::clone(log);
    PersistenceContext::builder(billing_store())
        .command_executor(move || Rc::clone(&shared) as Rc<dyn CommandExecutor>)
        .build()
}

#[test]
fn joined_saves_commit_together() {
    let log = Rc::new(ReceiptLog::default());
    let mut ctx = logged_context(&log);

    let total = ctx
        .with_transaction(|ctx| {
            ctx.add(Some(EntityRef::new(Invoice::new("acme", 1))), None)?;
            let first = ctx.save()?;
            ctx.add(Some(EntityRef::new(Invoice::new("globex", 2))), None)?;
            let second = ctx.save()?;
            assert!(log.receipts.borrow().is_empty());
            Ok(first + second)
        })
        .unwrap();

    assert_eq!(total, 2);
    assert!(!ctx.store().in_transaction());
    assert_eq!(count_rows(ctx.store(), "invoices"), 2);
    assert_eq!(log.receipts.borrow().len(), 2);
}

#[test]
fn closure_error_rolls_back_every_joined_save() {
    let log = Rc::new(ReceiptLog::default());
    let mut ctx = logged_context(&log);

    let err = ctx
        .with_transaction(|ctx| -> Result<(), ContextError> {
            ctx.add(Some(EntityRef::new(Invoice::new("acme", 1))), None)?;
            ctx.save()?;
            Err(ContextError::Instantiation {
                type_name: "caller gave up",
            })
        })
        .unwrap_err();

    assert!(matches!(err, ContextError::Instantiation { .. }));
    assert!(!ctx.store().in_transaction());
    assert_eq!(count_rows(ctx.store(), "invoices"), 0);
    assert!(log.receipts.borrow().is_empty());
}

#[test]
fn swallowed_save_failure_still_aborts_the_scope() {
    let mut ctx = PersistenceContext::new(billing_store());

    let err = ctx
        .with_transaction(|ctx| {
            ctx.add(Some(EntityRef::new(Invoice::new("acme", 1))), None)?;
            ctx.save()?;

            let orphan = EntityRef::new(InvoiceLine::new(Uuid::new_v4(), 1, "ghost", 1));
            ctx.add(Some(orphan.clone()), None)?;
            let failed = ctx.save();
            assert!(matches!(failed, Err(ContextError::Store(StoreError::Sqlite(_)))));
            ctx.remove(&orphan)?;
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, ContextError::TransactionAborted));
    assert_eq!(count_rows(ctx.store(), "invoices"), 0);
}

#[test]
fn nested_scope_joins_the_outer_one() {
    let mut ctx = PersistenceContext::new(RecordingStore::default());

    ctx.with_transaction(|ctx| {
        ctx.with_transaction(|ctx| {
            ctx.add(Some(EntityRef::new(Invoice::new("acme", 1))), None)?;
            ctx.save()
        })?;
        ctx.add(Some(EntityRef::new(Invoice::new("globex", 2))), None)?;
        ctx.save()
    })
    .unwrap();

    assert_eq!(ctx.store().begins, 1);
    assert_eq!(ctx.store().commits, 1);
    assert_eq!(ctx.store().rows.len(), 2);
}

#[test]
fn failing_inner_scope_dooms_the_outer_one() {
    let mut ctx = PersistenceContext::new(RecordingStore::default());

    let err = ctx
        .with_transaction(|ctx| {
            let inner: Result<(), ContextError> = ctx.with_transaction(|_| {
                Err(ContextError::Instantiation {
                    type_name: "Invoice",
                })
            });
            assert!(inner.is_err());
            ctx.add(Some(EntityRef::new(Invoice::new("acme", 1))), None)?;
            ctx.save()
        })
        .unwrap_err();

    assert!(matches!(err, ContextError::TransactionAborted));
    assert_eq!(ctx.store().rollbacks, 1);
    assert_eq!(ctx.store().commits, 0);
    assert!(ctx.store().rows.is_empty());
}

#[test]
fn save_joins_a_transaction_opened_on_the_store() {
    let log = Rc::new(ReceiptLog::default());
    let mut ctx = logged_context(&log);
    ctx.store_mut().begin().unwrap();

    let invoice = EntityRef::new(Invoice::new("acme", 1));
    ctx.add(Some(invoice.clone()), None).unwrap();
    assert_eq!(ctx.save().unwrap(), 1);

    assert!(ctx.store().in_transaction());
    assert_eq!(ctx.state_of(&invoice), EntityState::Unchanged);
    assert!(log.receipts.borrow().is_empty());

    ctx.store_mut().rollback().unwrap();
    assert_eq!(count_rows(ctx.store(), "invoices"), 0);
}

#[test]
fn with_transaction_leaves_external_transaction_open() {
    let mut ctx = PersistenceContext::new(billing_store());
    ctx.store_mut().begin().unwrap();

    ctx.with_transaction(|ctx| {
        ctx.add(Some(EntityRef::new(Invoice::new("acme", 1))), None)?;
        ctx.save()
    })
    .unwrap();

    assert!(ctx.store().in_transaction());
    ctx.store_mut().commit().unwrap();
    assert_eq!(count_rows(ctx.store(), "invoices"), 1);
}

#[test]
fn store_refuses_to_begin_twice() {
    let mut store = billing_store();
    store.begin().unwrap();

    let err = store.begin().unwrap_err();

    assert!(matches!(err, StoreError::Transaction(_)));
    store.rollback().unwrap();
    store.rollback().unwrap();
    assert!(!store.in_transaction());
}
