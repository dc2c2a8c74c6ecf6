use mongodb::bson::oid::ObjectId;
use serde_json::Value;

use super::{
    admin::{Admin, AdminView},
    user::{User, UserRole, UserView},
};

/// A signed-in principal, tagged by the collection it was found in.
#[derive(Debug, Clone)]
pub enum Account {
    Admin(Admin),
    User(User),
}

impl Account {
    pub fn id(&self) -> Option<&ObjectId> {
        match self {
            Account::Admin(admin) => admin.id.as_ref(),
            Account::User(user) => user.id.as_ref(),
        }
    }

    pub fn email(&self) -> &str {
        match self {
            Account::Admin(admin) => &admin.email,
            Account::User(user) => &user.email,
        }
    }

    pub fn password_hash(&self) -> &str {
        match self {
            Account::Admin(admin) => &admin.password,
            Account::User(user) => &user.password,
        }
    }

    /// The role follows the collection: `admins` holds admins and `users`
    /// holds owners, whatever the stored `role` field says.
    pub fn role(&self) -> UserRole {
        match self {
            Account::Admin(_) => UserRole::Admin,
            Account::User(_) => UserRole::Owner,
        }
    }

    pub fn profile_image_url(&self) -> Option<&str> {
        match self {
            Account::Admin(admin) => admin.profile_image_url.as_deref(),
            Account::User(user) => user.profile_image_url.as_deref(),
        }
    }

    pub fn into_json(self) -> Value {
        match self {
            Account::Admin(admin) => serde_json::to_value(AdminView::from(admin)),
            Account::User(user) => serde_json::to_value(UserView::from(user)),
        }
        .unwrap_or(Value::Null)
    }
}

/// Why a correctly authenticated account may not sign in with the chosen role.
pub fn role_mismatch_message(actual: UserRole, selected: UserRole) -> Option<String> {
    match (actual, selected) {
        (UserRole::Admin, UserRole::Owner) => Some(
            "This account is registered as an admin. Please select the Admin role to log in."
                .to_string(),
        ),
        (UserRole::Owner, UserRole::Admin) => Some(
            "This account is registered as a business owner and has no admin access. Please select the Owner role to log in."
                .to_string(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::AccountStatus;
    use mongodb::bson::DateTime;

    fn user_record(role: UserRole) -> User {
        User {
            id: Some(ObjectId::new()),
            first_name: "Mara".to_string(),
            last_name: "Dizon".to_string(),
            email: "mara@example.com".to_string(),
            password: "hash".to_string(),
            phone: None,
            business_name: None,
            address: None,
            role,
            status: AccountStatus::Approved,
            is_verified: true,
            business_permit_url: None,
            business_registration_url: None,
            profile_image_url: None,
            created_at: DateTime::from_millis(0),
            updated_at: DateTime::from_millis(0),
        }
    }

    #[test]
    fn users_collection_records_never_sign_in_as_admin() {
        let account = Account::User(user_record(UserRole::Admin));
        assert_eq!(account.role(), UserRole::Owner);
        assert!(role_mismatch_message(account.role(), UserRole::Admin).is_some());
    }

    #[test]
    fn matching_roles_have_no_message() {
        assert_eq!(role_mismatch_message(UserRole::Admin, UserRole::Admin), None);
        assert_eq!(role_mismatch_message(UserRole::Owner, UserRole::Owner), None);
    }

    #[test]
    fn mismatches_explain_the_registered_role() {
        let admin_as_owner = role_mismatch_message(UserRole::Admin, UserRole::Owner).unwrap();
        assert!(admin_as_owner.contains("registered as an admin"));
        let owner_as_admin = role_mismatch_message(UserRole::Owner, UserRole::Admin).unwrap();
        assert!(owner_as_admin.contains("registered as a business owner"));
    }
}
