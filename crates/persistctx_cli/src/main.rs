//! CLI smoke entry point.
//!
//! # Responsibility
//! - Run one add/save/update/save cycle against an in-memory database.
//! - Print affected counts and audit stamps for quick local sanity checks.
//!
//! Set `PERSISTCTX_LOG_DIR` to an absolute path to also write a log file.

mod invoice;

use invoice::{Invoice, MIGRATIONS};
use log::info;
use persistctx_core::{EntityRef, PersistenceContext, SqliteStore, Value};
use std::error::Error;

fn main() {
    if let Err(err) = run() {
        eprintln!("persistctx error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    if let Ok(log_dir) = std::env::var("PERSISTCTX_LOG_DIR") {
        persistctx_core::init_logging(persistctx_core::default_log_level(), &log_dir)?;
    }
    println!("persistctx_core version={}", persistctx_core::core_version());

    let mut ctx = PersistenceContext::new(SqliteStore::open_in_memory(MIGRATIONS)?);
    let invoice = EntityRef::new(Invoice::new("acme", 1_250));
    let id = invoice.borrow().id;

    ctx.add(Some(invoice.clone()), Some("cli"))?;
    let inserted = ctx.save()?;
    println!("insert affected={inserted}");

    invoice.borrow_mut().total_cents = 1_500;
    ctx.update(Some(invoice.clone()), Some("cli-review"))?;
    let updated = ctx.save()?;
    println!("update affected={updated}");

    let mut reader = PersistenceContext::new(ctx.into_store());
    let Some(loaded) = reader.get::<Invoice>(&[Value::from(id)])? else {
        return Err(format!("invoice {id} vanished after commit").into());
    };
    let loaded = loaded.borrow();
    println!(
        "reloaded total_cents={} created_by={} modified_by={} created_on={} modified_on={}",
        loaded.total_cents,
        loaded.audit.created_by.as_deref().unwrap_or("-"),
        loaded.audit.modified_by.as_deref().unwrap_or("-"),
        loaded.audit.created_on.unwrap_or_default(),
        loaded.audit.modified_on.unwrap_or_default(),
    );
    info!("event=cli_smoke module=cli status=ok inserted={inserted} updated={updated}");
    Ok(())
}
