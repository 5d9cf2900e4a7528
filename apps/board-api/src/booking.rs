//! The `available -> booked` transition.
//!
//! Preconditions (account type, MC authority) are checked first; the
//! transition itself is a single conditional write in the load store, so two
//! carriers racing for the same load cannot both win. A successful booking is
//! broadcast to the load's room afterwards, and that broadcast can never undo
//! or fail the booking.

use std::sync::Arc;

use chrono::Utc;

use crate::db::loads::{BookingWrite, LoadStore};
use crate::db::users::UserDirectory;
use crate::db::StoreError;
use crate::gateway::events::LoadUpdate;
use crate::gateway::Dispatcher;
use crate::models::load::Load;
use crate::models::user::{AccountType, Role};

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Only carriers can book loads")]
    NotCarrier,
    #[error("Carrier account not found")]
    CallerNotFound,
    #[error("Load not found")]
    NotFound,
    #[error(
        "MC number required for interstate loads. Carriers with only USDOT can book intrastate loads only."
    )]
    Authority,
    #[error("Load already booked or not available")]
    AlreadyBooked,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A booking attempt on behalf of an authenticated caller.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub load_id: String,
    pub carrier_id: String,
    pub account_type: AccountType,
    pub role: Role,
    pub proposed_rate: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct BookingService {
    loads: Arc<dyn LoadStore>,
    users: Arc<dyn UserDirectory>,
    dispatcher: Dispatcher,
}

impl BookingService {
    pub fn new(
        loads: Arc<dyn LoadStore>,
        users: Arc<dyn UserDirectory>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            loads,
            users,
            dispatcher,
        }
    }

    pub async fn book_load(&self, request: BookingRequest) -> Result<Load, BookingError> {
        if request.account_type != AccountType::Carrier && !request.role.is_admin() {
            return Err(BookingError::NotCarrier);
        }

        let load = self
            .loads
            .find_load(&request.load_id)
            .await?
            .ok_or(BookingError::NotFound)?;

        if load.is_interstate {
            let carrier = self
                .users
                .find_user(&request.carrier_id)
                .await?
                .ok_or(BookingError::CallerNotFound)?;
            if !carrier.has_mc {
                tracing::debug!(
                    load_id = %request.load_id,
                    carrier_id = %request.carrier_id,
                    "interstate booking rejected without MC authority"
                );
                return Err(BookingError::Authority);
            }
        }

        let write = BookingWrite {
            carrier_id: request.carrier_id.clone(),
            proposed_rate: request.proposed_rate.filter(|r| r.is_finite() && *r > 0.0),
            notes: request
                .notes
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            booked_at: Utc::now(),
        };

        let booked = self
            .loads
            .book_if_available(&request.load_id, &write)
            .await?
            .ok_or_else(|| {
                tracing::debug!(load_id = %request.load_id, carrier_id = %request.carrier_id, "load no longer available");
                BookingError::AlreadyBooked
            })?;

        tracing::info!(
            load_id = %booked.id,
            carrier_id = %request.carrier_id,
            agreed_rate = ?booked.agreed_rate,
            "load booked"
        );
        self.dispatcher.notify_load_updated(LoadUpdate::booked(&booked));

        Ok(booked)
    }
}
