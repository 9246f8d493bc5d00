// src/operation/adapters.rs

//! Router handlers that keep one [`Operation`] in sync with the remote run.
//!
//! Each handler identifier is a fixed prefix plus the operation id, so
//! registering the same operation twice on one router fails loudly with
//! `DuplicateHandler` instead of silently doubling updates.

use std::sync::Arc;

use tracing::trace;

use crate::errors::Result;
use crate::protocol::{catalog, RemoteEvent, RowDirection};
use crate::router::MessageRouter;

use super::Operation;

pub const STATUS_ADAPTER_PREFIX: &str = "status-adapter-";
pub const METRICS_ADAPTER_PREFIX: &str = "metrics-adapter-";
pub const ROWS_ADAPTER_PREFIX: &str = "rows-adapter-";

/// Identifiers of the handlers registered for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationAdapters {
    pub status: String,
    pub metrics: String,
    pub rows: String,
}

impl OperationAdapters {
    pub fn identifiers_for(operation_id: &str) -> Self {
        Self {
            status: format!("{STATUS_ADAPTER_PREFIX}{operation_id}"),
            metrics: format!("{METRICS_ADAPTER_PREFIX}{operation_id}"),
            rows: format!("{ROWS_ADAPTER_PREFIX}{operation_id}"),
        }
    }

    /// Register the status, metrics and rows handlers for `operation`.
    pub fn register(router: &MessageRouter, operation: &Arc<Operation>) -> Result<Self> {
        let id = operation.id().to_string();
        let adapters = Self::identifiers_for(&id);

        let op = Arc::clone(operation);
        router.register(catalog::operation_status(&id), adapters.status.clone(), move |event| {
            if let RemoteEvent::Status { status, .. } = event {
                op.apply_remote_status(*status);
            }
            Ok(())
        })?;

        let op = Arc::clone(operation);
        router.register(
            catalog::operation_metrics(&id),
            adapters.metrics.clone(),
            move |event| {
                if let RemoteEvent::Metrics {
                    rows_in, rows_out, ..
                } = event
                {
                    op.record_metrics(*rows_in, *rows_out);
                }
                Ok(())
            },
        )?;

        let op = Arc::clone(operation);
        router.register(catalog::operation_rows(&id), adapters.rows.clone(), move |event| {
            let RemoteEvent::Rows {
                direction, rows, ..
            } = event
            else {
                return Ok(());
            };
            if *direction != RowDirection::Out {
                trace!(operation = %op.id(), "ignoring inbound row batch");
                return Ok(());
            }
            for row in rows {
                op.put_row(row)?;
            }
            Ok(())
        })?;

        Ok(adapters)
    }
}
