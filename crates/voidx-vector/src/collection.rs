//! Collection housekeeping helpers.
//!
//! ensure-* helpers that make the collection, its indexes, its partitions
//! and its load state match what the caller wants, skipping whatever is
//! already in place. Each backend call races the cancellation token.
//! Losing a create race to a concurrent caller (`Conflict` from the
//! backend) counts as the thing already being in place.

use std::time::Duration;

use voidx_core::cancel::{cancellable, sleep, CancellationToken};
use voidx_core::{Error, Result};

use crate::client::{LoadState, VectorClient};
use crate::index::{IndexSpec, IndexState};
use crate::schema::CreateCollection;

/// Creates the collection unless it exists. Returns whether it was created.
pub async fn ensure_collection(
    client: &dyn VectorClient,
    req: &CreateCollection,
    token: &CancellationToken,
) -> Result<bool> {
    if cancellable(token, client.has_collection(&req.name)).await? {
        tracing::debug!(collection = %req.name, "collection exists");
        return Ok(false);
    }
    match cancellable(token, client.create_collection(req)).await {
        Ok(()) => {
            let columns = req.schema.columns.len();
            tracing::info!(collection = %req.name, columns, "created collection");
            Ok(true)
        }
        Err(Error::Conflict(msg)) => {
            if !cancellable(token, client.has_collection(&req.name)).await? {
                return Err(Error::Conflict(msg));
            }
            tracing::debug!(collection = %req.name, %msg, "collection created concurrently");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Creates each missing index and waits for it to finish building.
/// Returns how many were created.
pub async fn ensure_indexes(
    client: &dyn VectorClient,
    collection: &str,
    specs: &[IndexSpec],
    poll: Duration,
    token: &CancellationToken,
) -> Result<usize> {
    let existing = cancellable(token, client.list_indexes(collection)).await?;
    let mut created = 0;
    for spec in specs {
        if existing.contains(&spec.index_name) {
            continue;
        }
        match cancellable(token, client.create_index(collection, spec)).await {
            Ok(()) => {
                let kind = &spec.config.index_type;
                tracing::info!(collection, index = %spec.index_name, %kind, "building index");
                created += 1;
            }
            // another caller started the same build; wait for it like our own
            Err(Error::Conflict(msg)) => {
                let index = &spec.index_name;
                tracing::debug!(collection, %index, %msg, "index created concurrently");
            }
            Err(e) => return Err(e),
        }
        wait_for_index(client, collection, &spec.index_name, poll, token).await?;
    }
    Ok(created)
}

pub async fn wait_for_index(
    client: &dyn VectorClient,
    collection: &str,
    index_name: &str,
    poll: Duration,
    token: &CancellationToken,
) -> Result<()> {
    loop {
        match cancellable(token, client.index_state(collection, index_name)).await? {
            IndexState::Finished => return Ok(()),
            IndexState::Failed(reason) => {
                return Err(Error::backend(format!("build index {index_name}"), reason));
            }
            IndexState::InProgress => sleep(token, poll).await?,
        }
    }
}

/// Brings the collection to `Loaded`.
///
/// Returns `Ok(false)` when there is nothing to serve (the collection is
/// missing or being released) and `Error::Transient` when a load started by
/// someone else is still running.
pub async fn ensure_loaded(
    client: &dyn VectorClient,
    collection: &str,
    poll: Duration,
    token: &CancellationToken,
) -> Result<bool> {
    match cancellable(token, client.load_state(collection)).await? {
        LoadState::Loaded => return Ok(true),
        LoadState::Loading => {
            return Err(Error::Transient(format!("collection '{collection}' is loading")));
        }
        LoadState::NotExist => return Ok(false),
        LoadState::Unloading => {
            tracing::warn!(collection, "collection is being released");
            return Ok(false);
        }
        LoadState::NotLoad => {}
    }

    cancellable(token, client.load_collection(collection)).await?;
    tracing::info!(collection, "loading collection");
    loop {
        match cancellable(token, client.load_state(collection)).await? {
            LoadState::Loaded => return Ok(true),
            LoadState::Loading | LoadState::NotLoad => sleep(token, poll).await?,
            LoadState::NotExist | LoadState::Unloading => return Ok(false),
        }
    }
}

/// Creates the partition on first use.
pub async fn ensure_partition(
    client: &dyn VectorClient,
    collection: &str,
    partition: &str,
    token: &CancellationToken,
) -> Result<()> {
    if cancellable(token, client.has_partition(collection, partition)).await? {
        return Ok(());
    }
    match cancellable(token, client.create_partition(collection, partition)).await {
        Ok(()) => {
            tracing::debug!(collection, partition, "created partition");
            Ok(())
        }
        Err(Error::Conflict(msg)) => {
            if cancellable(token, client.has_partition(collection, partition)).await? {
                Ok(())
            } else {
                Err(Error::Conflict(msg))
            }
        }
        Err(e) => Err(e),
    }
}
