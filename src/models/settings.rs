use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const SETTINGS_ID: &str = "general";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    #[serde(rename = "_id")]
    pub id: String,
    pub company_name: String,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub currency: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    pub updated_at: DateTime,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            id: SETTINGS_ID.to_string(),
            company_name: "Car Rental".to_string(),
            contact_email: None,
            contact_phone: None,
            address: None,
            currency: "PHP".to_string(),
            logo_url: None,
            updated_at: DateTime::now(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSettingsDto {
    #[validate(length(min = 1, max = 100, message = "Company name cannot be empty"))]
    pub company_name: Option<String>,
    #[validate(email(message = "Invalid contact email"))]
    pub contact_email: Option<String>,
    #[validate(length(min = 7, max = 20))]
    pub contact_phone: Option<String>,
    #[validate(length(max = 200))]
    pub address: Option<String>,
    #[validate(length(equal = 3, message = "Currency must be a 3-letter code"))]
    pub currency: Option<String>,
}
