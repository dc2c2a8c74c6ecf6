use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub role: UserRole,
    pub status: AccountStatus,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub business_permit_url: Option<String>,
    #[serde(default)]
    pub business_registration_url: Option<String>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Owner,
    Admin,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Pending,
    Approved,
    Rejected,
}

/// What the API hands out for a user; never carries the password hash.
#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub business_name: Option<String>,
    pub address: Option<String>,
    pub role: UserRole,
    pub status: AccountStatus,
    pub is_verified: bool,
    pub business_permit_url: Option<String>,
    pub business_registration_url: Option<String>,
    pub profile_image_url: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id.map(|id| id.to_hex()),
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            phone: user.phone,
            business_name: user.business_name,
            address: user.address,
            role: user.role,
            status: user.status,
            is_verified: user.is_verified,
            business_permit_url: user.business_permit_url,
            business_registration_url: user.business_registration_url,
            profile_image_url: user.profile_image_url,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ArchivedUser {
    #[serde(flatten)]
    pub user: User,
    pub archived_at: DateTime,
    pub archived_by: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOwnerDto {
    #[validate(length(min = 1, max = 50, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50, message = "Last name is required"))]
    pub last_name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 7, max = 20))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub business_name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserDto {
    #[validate(length(min = 1, max = 50))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub last_name: Option<String>,
    #[validate(length(min = 7, max = 20))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub business_name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusDto {
    pub status: AccountStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginDto {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    pub role: UserRole,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordDto {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_and_statuses_use_lowercase_names() {
        assert_eq!(serde_json::to_value(UserRole::Owner).unwrap(), "owner");
        assert_eq!(serde_json::to_value(AccountStatus::Rejected).unwrap(), "rejected");
        let status: AccountStatus = serde_json::from_str("\"approved\"").unwrap();
        assert_eq!(status, AccountStatus::Approved);
    }

    #[test]
    fn login_requires_known_role() {
        let parsed = serde_json::from_str::<LoginDto>(
            r#"{"email":"a@b.com","password":"x","role":"customer"}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn create_owner_validation_reports_bad_fields() {
        let dto = CreateOwnerDto {
            first_name: String::new(),
            last_name: "Reyes".to_string(),
            email: "not-an-email".to_string(),
            password: "12345".to_string(),
            phone: None,
            business_name: Some("Reyes Rentals".to_string()),
            address: None,
        };
        let errors = dto.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("first_name"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
        assert!(!fields.contains_key("last_name"));
    }
}
