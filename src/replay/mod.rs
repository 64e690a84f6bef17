//! The event replayer: transforms the raw event journal into the projection,
//! one driver event per transaction.
//!
//! Driver events are consumed in strict `sequence_index` order. A NOTIFY on
//! the `driver_events` channel is only a wake-up; every wake-up drains the
//! full unprocessed backlog, so missed notifications are harmless and a
//! restart resumes exactly where the last commit left off.

pub mod clearing;
pub mod decode;
pub mod forward;
pub mod reverse;

use sqlx::postgres::PgListener;
use sqlx::{Postgres, Transaction};
use tracing::{info, warn};

use crate::db::{journal, Db};
use crate::errors::IndexerError;
use crate::models::{DriverEvent, DriverEventKind, Event};

pub struct Replayer {
    db: Db,
    db_url: String,
}

impl Replayer {
    pub fn new(db: Db, db_url: String) -> Self {
        Self { db, db_url }
    }

    /// Process the backlog, then block on the `driver_events` channel.
    /// Returns only on a fatal error; the caller exits so the operator can
    /// intervene without the replayer skipping ahead.
    pub async fn run(&self) -> Result<(), IndexerError> {
        self.drain_pending().await?;

        let mut listener = PgListener::connect(&self.db_url).await?;
        listener.listen("driver_events").await?;
        info!("waiting for driver events");

        loop {
            listener.recv().await?;
            self.drain_pending().await?;
        }
    }

    /// Drain unprocessed driver events in sequence order until none remain.
    pub async fn drain_pending(&self) -> Result<(), IndexerError> {
        loop {
            let pending = journal::get_unprocessed_driver_events(self.db.pool()).await?;
            if pending.is_empty() {
                return Ok(());
            }
            for driver in &pending {
                self.process_driver_event(driver).await?;
            }
        }
    }

    /// One driver event, one transaction. On success the event is marked
    /// processed inside the same commit; on failure everything rolls back
    /// and the event stays pending.
    pub async fn process_driver_event(&self, driver: &DriverEvent) -> Result<(), IndexerError> {
        info!(
            id = driver.id,
            sequence = driver.sequence_index,
            kind = driver.kind.as_str(),
            "processing driver event"
        );
        let mut tx = self.db.begin().await?;
        match self.run_driver_event(&mut tx, driver).await {
            Ok(()) => {
                journal::mark_driver_event_processed(&mut tx, driver.id).await?;
                tx.commit().await?;
                Ok(())
            }
            Err(err) => {
                tx.rollback().await.ok();
                Err(err)
            }
        }
    }

    async fn run_driver_event(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        driver: &DriverEvent,
    ) -> Result<(), IndexerError> {
        match driver.kind {
            DriverEventKind::StartBlock => {
                let block_hash = required(driver, &driver.block_hash, "block_hash")?;
                let events = journal::get_events_by_block_hash(tx, block_hash, true).await?;
                for event in &events {
                    apply_forward(tx, event).await?;
                }
                Ok(())
            }
            DriverEventKind::RevertBlock => {
                let block_hash = required(driver, &driver.block_hash, "block_hash")?;
                let events = journal::get_events_by_block_hash(tx, block_hash, false).await?;
                for event in &events {
                    apply_reverse(tx, event).await?;
                }
                Ok(())
            }
            DriverEventKind::CatchupVault => {
                let vault = required(driver, &driver.vault_address, "vault_address")?;
                let start_hash = required(driver, &driver.start_block_hash, "start_block_hash")?;
                let end_hash = required(driver, &driver.end_block_hash, "end_block_hash")?;

                let start = journal::get_block(&mut **tx, start_hash).await?.ok_or_else(|| {
                    IndexerError::Invariant(format!("catchup start block {start_hash} not journaled"))
                })?;
                let end = journal::get_block(&mut **tx, end_hash).await?.ok_or_else(|| {
                    IndexerError::Invariant(format!("catchup end block {end_hash} not journaled"))
                })?;

                let events =
                    journal::get_events_for_vault(tx, vault, start.block_number, end.block_number)
                        .await?;
                for event in &events {
                    apply_forward(tx, event).await?;
                }
                journal::update_vault_registry_last_processed(tx, vault, end_hash).await
            }
        }
    }
}

fn required<'a>(
    driver: &DriverEvent,
    field: &'a Option<String>,
    name: &str,
) -> Result<&'a str, IndexerError> {
    field.as_deref().ok_or_else(|| {
        IndexerError::Invariant(format!(
            "{} driver event {} is missing {name}",
            driver.kind.as_str(),
            driver.id
        ))
    })
}

/// Forward-apply one event, skipping payloads that do not decode. The raw
/// journal is trusted; an undecodable payload is logged and dropped rather
/// than blocking the replayer forever.
async fn apply_forward(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
) -> Result<(), IndexerError> {
    match forward::apply_event(tx, event).await {
        Err(IndexerError::MalformedPayload(msg)) => {
            warn!(
                name = %event.event_name,
                tx_hash = %event.transaction_hash,
                "skipping malformed event payload: {msg}"
            );
            Ok(())
        }
        other => other,
    }
}

/// Reverse counterpart of [`apply_forward`]: a payload the forward pass
/// skipped must not wedge the revert either.
async fn apply_reverse(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
) -> Result<(), IndexerError> {
    match reverse::revert_event(tx, event).await {
        Err(IndexerError::MalformedPayload(msg)) => {
            warn!(
                name = %event.event_name,
                tx_hash = %event.transaction_hash,
                "skipping malformed event payload on revert: {msg}"
            );
            Ok(())
        }
        other => other,
    }
}
