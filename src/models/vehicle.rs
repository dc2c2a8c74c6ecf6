use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Vehicle {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub plate_number: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub seats: Option<i32>,
    #[serde(default)]
    pub transmission: Option<String>,
    pub daily_rate: f64,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub status: VehicleStatus,
    pub owner_id: ObjectId,
    #[serde(default)]
    pub images: Vec<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Vehicle {
    pub fn display_name(&self) -> String {
        format!("{} {} ({})", self.brand, self.model, self.plate_number)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleStatus {
    Available,
    Verified,
    #[serde(rename = "Not Verified")]
    NotVerified,
    Rented,
    Maintenance,
    #[serde(rename = "Out of Service")]
    OutOfService,
}

impl Default for VehicleStatus {
    fn default() -> Self {
        VehicleStatus::Available
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVehicleDto {
    #[validate(length(min = 1, max = 50, message = "Brand is required"))]
    pub brand: String,
    #[validate(length(min = 1, max = 50, message = "Model is required"))]
    pub model: String,
    #[validate(range(min = 1950, max = 2100, message = "Year is out of range"))]
    pub year: i32,
    #[validate(custom = "validate_plate")]
    pub plate_number: String,
    pub color: Option<String>,
    #[validate(range(min = 1, max = 60))]
    pub seats: Option<i32>,
    pub transmission: Option<String>,
    #[validate(range(min = 0.0, message = "Daily rate cannot be negative"))]
    pub daily_rate: f64,
    pub location: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub status: Option<VehicleStatus>,
    /// Required when an admin lists a vehicle on an owner's behalf.
    pub owner_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateVehicleDto {
    #[validate(length(min = 1, max = 50))]
    pub brand: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub model: Option<String>,
    #[validate(range(min = 1950, max = 2100))]
    pub year: Option<i32>,
    #[validate(custom = "validate_plate")]
    pub plate_number: Option<String>,
    pub color: Option<String>,
    #[validate(range(min = 1, max = 60))]
    pub seats: Option<i32>,
    pub transmission: Option<String>,
    #[validate(range(min = 0.0))]
    pub daily_rate: Option<f64>,
    pub location: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVehicleStatusDto {
    pub status: VehicleStatus,
}

#[derive(Debug, Deserialize)]
pub struct VehicleQuery {
    pub status: Option<VehicleStatus>,
    pub owner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveImageDto {
    pub url: String,
}

fn validate_plate(plate: &str) -> Result<(), ValidationError> {
    let trimmed = plate.trim();
    let valid = (2..=12).contains(&trimmed.len())
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ' ');
    if valid {
        Ok(())
    } else {
        let mut err = ValidationError::new("plate_number");
        err.message = Some("Plate number must be 2-12 letters, digits, spaces or dashes".into());
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_keep_their_display_names() {
        assert_eq!(
            serde_json::to_value(VehicleStatus::NotVerified).unwrap(),
            "Not Verified"
        );
        assert_eq!(
            serde_json::to_value(VehicleStatus::OutOfService).unwrap(),
            "Out of Service"
        );
        let status: VehicleStatus = serde_json::from_str("\"Maintenance\"").unwrap();
        assert_eq!(status, VehicleStatus::Maintenance);
    }

    #[test]
    fn plate_validation() {
        assert!(validate_plate("ABC 1234").is_ok());
        assert!(validate_plate("NBC-42").is_ok());
        assert!(validate_plate("X").is_err());
        assert!(validate_plate("AB#12").is_err());
    }
}
