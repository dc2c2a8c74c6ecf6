use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};

use super::vehicle::VehicleStatus;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Rental {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub vehicle_id: ObjectId,
    #[serde(default)]
    pub vehicle_name: Option<String>,
    #[serde(default)]
    pub owner_id: Option<ObjectId>,
    pub start_date: DateTime,
    pub end_date: DateTime,
    pub amount: f64,
    pub status: RentalStatus,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Rental {
    /// Matches active rentals whose end date has passed.
    pub fn overdue_filter(now: DateTime) -> Document {
        doc! {
            "status": RentalStatus::Active.as_str(),
            "end_date": { "$lt": now },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RentalStatus {
    Pending,
    Accepted,
    Active,
    Completed,
    Cancelled,
    Overdue,
}

impl RentalStatus {
    pub const ALL: [RentalStatus; 6] = [
        RentalStatus::Pending,
        RentalStatus::Accepted,
        RentalStatus::Active,
        RentalStatus::Completed,
        RentalStatus::Cancelled,
        RentalStatus::Overdue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RentalStatus::Pending => "pending",
            RentalStatus::Accepted => "accepted",
            RentalStatus::Active => "active",
            RentalStatus::Completed => "completed",
            RentalStatus::Cancelled => "cancelled",
            RentalStatus::Overdue => "overdue",
        }
    }

    /// Vehicle status implied by a rental entering this status, if any.
    pub fn vehicle_status(&self) -> Option<VehicleStatus> {
        match self {
            RentalStatus::Accepted | RentalStatus::Active | RentalStatus::Overdue => {
                Some(VehicleStatus::Rented)
            }
            RentalStatus::Completed | RentalStatus::Cancelled => Some(VehicleStatus::Available),
            RentalStatus::Pending => None,
        }
    }

    /// Counts toward revenue figures.
    pub fn is_billable(&self) -> bool {
        !matches!(self, RentalStatus::Pending | RentalStatus::Cancelled)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateRentalStatusDto {
    pub status: RentalStatus,
}

/// Date bounds are `YYYY-MM-DD`, inclusive on both ends.
#[derive(Debug, Deserialize, Default)]
pub struct RentalQuery {
    pub status: Option<RentalStatus>,
    pub from: Option<String>,
    pub to: Option<String>,
}
