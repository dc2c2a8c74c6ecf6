use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Admin {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Serialize)]
pub struct AdminView {
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    pub role: &'static str,
    pub profile_image_url: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl From<Admin> for AdminView {
    fn from(admin: Admin) -> Self {
        Self {
            id: admin.id.map(|id| id.to_hex()),
            name: admin.name,
            email: admin.email,
            role: "admin",
            profile_image_url: admin.profile_image_url,
            created_at: admin.created_at,
            updated_at: admin.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAdminDto {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Admin passwords must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAdminProfileDto {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
}
