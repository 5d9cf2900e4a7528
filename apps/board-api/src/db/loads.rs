//! Load persistence, including the atomic `available -> booked` write.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use diesel::sql_types::{Double, Nullable};
use parking_lot::Mutex;

use super::pool::DbPool;
use super::schema::loads;
use super::StoreError;
use crate::models::load::{BillingStatus, Load, LoadStatus, NewLoad};

diesel::define_sql_function!(fn coalesce(x: Nullable<Double>, y: Double) -> Nullable<Double>);

/// Fields written by a successful booking.
#[derive(Debug, Clone)]
pub struct BookingWrite {
    pub carrier_id: String,
    /// Already filtered to a positive value; `None` falls back to the posted rate.
    pub proposed_rate: Option<f64>,
    pub notes: Option<String>,
    pub booked_at: DateTime<Utc>,
}

#[async_trait]
pub trait LoadStore: Send + Sync {
    async fn find_load(&self, load_id: &str) -> Result<Option<Load>, StoreError>;

    async fn insert_load(&self, load: NewLoad) -> Result<Load, StoreError>;

    /// Conditional update keyed on `(load_id, status = available)`.
    ///
    /// Returns the updated row, or `None` when nothing matched. The check and
    /// the write are a single store operation.
    async fn book_if_available(
        &self,
        load_id: &str,
        write: &BookingWrite,
    ) -> Result<Option<Load>, StoreError>;
}

pub struct PgLoadStore {
    pool: DbPool,
}

impl PgLoadStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoadStore for PgLoadStore {
    async fn find_load(&self, load_id: &str) -> Result<Option<Load>, StoreError> {
        let mut conn = self.pool.get().await?;
        let load = diesel_async::RunQueryDsl::get_result(
            loads::table.find(load_id).select(Load::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(load)
    }

    async fn insert_load(&self, load: NewLoad) -> Result<Load, StoreError> {
        let mut conn = self.pool.get().await?;
        let load = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(loads::table)
                .values(&load)
                .returning(Load::as_returning()),
            &mut conn,
        )
        .await?;
        Ok(load)
    }

    async fn book_if_available(
        &self,
        load_id: &str,
        write: &BookingWrite,
    ) -> Result<Option<Load>, StoreError> {
        let mut conn = self.pool.get().await?;

        let target = loads::table
            .filter(loads::id.eq(load_id))
            .filter(loads::status.eq(LoadStatus::Available.as_str()));

        let query = diesel::update(target)
            .set((
                loads::status.eq(LoadStatus::Booked.as_str()),
                loads::booked_by.eq(&write.carrier_id),
                loads::booked_at.eq(write.booked_at),
                loads::agreed_rate.eq(coalesce(write.proposed_rate, loads::rate)),
                loads::billing_status.eq(BillingStatus::Ready.as_str()),
                loads::booking_notes.eq(write.notes.as_deref()),
                loads::updated_at.eq(write.booked_at),
            ))
            .returning(Load::as_returning());

        let load = diesel_async::RunQueryDsl::get_result(query, &mut conn)
            .await
            .optional()?;
        Ok(load)
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (local development / tests)
// ---------------------------------------------------------------------------

/// Map-backed store. The conditional update runs under one lock, which gives
/// the same single-step guarantee as the SQL `UPDATE ... WHERE status = ...`.
#[derive(Default)]
pub struct MemoryLoadStore {
    loads: Mutex<HashMap<String, Load>>,
}

impl MemoryLoadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or overwrite a load directly.
    pub fn put(&self, load: Load) {
        self.loads.lock().insert(load.id.clone(), load);
    }
}

#[async_trait]
impl LoadStore for MemoryLoadStore {
    async fn find_load(&self, load_id: &str) -> Result<Option<Load>, StoreError> {
        Ok(self.loads.lock().get(load_id).cloned())
    }

    async fn insert_load(&self, load: NewLoad) -> Result<Load, StoreError> {
        let load = load.into_load();
        self.loads.lock().insert(load.id.clone(), load.clone());
        Ok(load)
    }

    async fn book_if_available(
        &self,
        load_id: &str,
        write: &BookingWrite,
    ) -> Result<Option<Load>, StoreError> {
        let mut loads = self.loads.lock();
        let Some(load) = loads.get_mut(load_id) else {
            return Ok(None);
        };
        if load.status != LoadStatus::Available.as_str() {
            return Ok(None);
        }

        load.status = LoadStatus::Booked.as_str().to_string();
        load.booked_by = Some(write.carrier_id.clone());
        load.booked_at = Some(write.booked_at);
        load.agreed_rate = Some(write.proposed_rate.unwrap_or(load.rate));
        load.billing_status = BillingStatus::Ready.as_str().to_string();
        load.booking_notes = write.notes.clone();
        load.updated_at = write.booked_at;
        Ok(Some(load.clone()))
    }
}
