use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::user::UnknownVariant;
use crate::db::schema::loads;

/// Load lifecycle. Transitions only move forward; `Available -> Booked` is the
/// one guarded by the booking state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Available,
    Booked,
    InTransit,
    Delivered,
    Cancelled,
}

impl LoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStatus::Available => "available",
            LoadStatus::Booked => "booked",
            LoadStatus::InTransit => "in_transit",
            LoadStatus::Delivered => "delivered",
            LoadStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(LoadStatus::Available),
            "booked" => Ok(LoadStatus::Booked),
            "in_transit" => Ok(LoadStatus::InTransit),
            "delivered" => Ok(LoadStatus::Delivered),
            "cancelled" => Ok(LoadStatus::Cancelled),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    Pending,
    Ready,
    Invoiced,
    Paid,
}

impl BillingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingStatus::Pending => "pending",
            BillingStatus::Ready => "ready",
            BillingStatus::Invoiced => "invoiced",
            BillingStatus::Paid => "paid",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RateType {
    #[default]
    PerMile,
    FlatRate,
}

impl RateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateType::PerMile => "per_mile",
            RateType::FlatRate => "flat_rate",
        }
    }
}

/// Row in the `loads` table.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = loads)]
#[serde(rename_all = "camelCase")]
pub struct Load {
    pub id: String,
    pub title: String,
    pub posted_by: String,
    pub status: String,
    pub rate: f64,
    pub rate_type: String,
    pub distance: Option<i32>,
    pub origin_state: String,
    pub destination_state: String,
    pub is_interstate: bool,
    pub booked_by: Option<String>,
    pub agreed_rate: Option<f64>,
    pub billing_status: String,
    pub booking_notes: Option<String>,
    pub booked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Load {
    pub fn status(&self) -> Result<LoadStatus, UnknownVariant> {
        self.status.parse()
    }

    /// Amount due for the line haul: per-mile loads multiply the agreed (or
    /// posted) rate by a known positive distance, everything else is flat.
    pub fn line_haul_total(&self) -> f64 {
        let rate = self.agreed_rate.unwrap_or(self.rate);
        match self.distance {
            Some(miles) if self.rate_type == RateType::PerMile.as_str() && miles > 0 => {
                rate * f64::from(miles)
            }
            _ => rate,
        }
    }
}

/// Insertable form for posting a new load.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = loads)]
pub struct NewLoad {
    pub id: String,
    pub title: String,
    pub posted_by: String,
    pub status: String,
    pub rate: f64,
    pub rate_type: String,
    pub distance: Option<i32>,
    pub origin_state: String,
    pub destination_state: String,
    pub is_interstate: bool,
    pub billing_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewLoad {
    /// Materialise the row as it reads back after insertion.
    pub fn into_load(self) -> Load {
        Load {
            id: self.id,
            title: self.title,
            posted_by: self.posted_by,
            status: self.status,
            rate: self.rate,
            rate_type: self.rate_type,
            distance: self.distance,
            origin_state: self.origin_state,
            destination_state: self.destination_state,
            is_interstate: self.is_interstate,
            booked_by: None,
            agreed_rate: None,
            billing_status: self.billing_status,
            booking_notes: None,
            booked_at: None,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A load crosses a state line when origin and destination differ.
pub fn is_interstate(origin_state: &str, destination_state: &str) -> bool {
    !origin_state
        .trim()
        .eq_ignore_ascii_case(destination_state.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(rate_type: RateType, rate: f64, agreed: Option<f64>, distance: Option<i32>) -> Load {
        let now = Utc::now();
        Load {
            id: "load_1".into(),
            title: "Dry van".into(),
            posted_by: "usr_broker".into(),
            status: "available".into(),
            rate,
            rate_type: rate_type.as_str().into(),
            distance,
            origin_state: "TX".into(),
            destination_state: "TX".into(),
            is_interstate: false,
            booked_by: None,
            agreed_rate: agreed,
            billing_status: BillingStatus::Pending.as_str().into(),
            booking_notes: None,
            booked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn per_mile_total_uses_distance() {
        let l = load(RateType::PerMile, 2.5, Some(3.0), Some(100));
        assert_eq!(l.line_haul_total(), 300.0);
    }

    #[test]
    fn per_mile_without_distance_is_flat() {
        let l = load(RateType::PerMile, 2.5, None, None);
        assert_eq!(l.line_haul_total(), 2.5);
    }

    #[test]
    fn flat_rate_ignores_distance() {
        let l = load(RateType::FlatRate, 1800.0, None, Some(500));
        assert_eq!(l.line_haul_total(), 1800.0);
    }

    #[test]
    fn interstate_compares_states_case_insensitively() {
        assert!(!is_interstate("tx", "TX"));
        assert!(is_interstate("TX", "OK"));
    }

    #[test]
    fn status_parses_every_variant() {
        for s in [
            LoadStatus::Available,
            LoadStatus::Booked,
            LoadStatus::InTransit,
            LoadStatus::Delivered,
            LoadStatus::Cancelled,
        ] {
            assert_eq!(s.as_str().parse::<LoadStatus>().unwrap(), s);
        }
    }
}
