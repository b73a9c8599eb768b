//! Test utilities for spinning up a real Postgres instance via testcontainers.

use anyhow::Context;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;

use crate::PgLedger;

/// Start a Postgres container, migrate it and return the handle plus a ledger.
///
/// The container stops when `ContainerAsync` is dropped, so callers must hold
/// it for the duration of the test. Errors when Docker is unavailable; tests
/// treat that as a skip.
pub async fn postgres_container() -> anyhow::Result<(ContainerAsync<Postgres>, PgLedger)> {
    let container = Postgres::default()
        .with_tag("16")
        .start()
        .await
        .context("Failed to start Postgres container")?;

    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432).await?;
    let url = format!("postgresql://postgres:postgres@{host}:{port}/postgres");

    let ledger = PgLedger::connect(&url)
        .await
        .context("Failed to connect to Postgres")?;
    ledger.migrate().await.context("Failed to run migrations")?;

    Ok((container, ledger))
}
