use futures::stream::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime, Document},
    options::{FindOptions, IndexOptions},
    Collection, Database, IndexModel,
};
use serde::de::DeserializeOwned;

use crate::{
    error::AppError,
    models::{
        admin::Admin, notification::Notification, rental::Rental, review::Review,
        settings::Settings, user::{ArchivedUser, User}, vehicle::Vehicle,
    },
};

pub const USERS: &str = "users";
pub const ADMINS: &str = "admins";
pub const ARCHIVED_USERS: &str = "archived_users";
pub const VEHICLES: &str = "vehicles";
pub const RENTALS: &str = "rentals";
pub const NOTIFICATIONS: &str = "notifications";
pub const REVIEWS: &str = "reviews";
pub const SETTINGS: &str = "settings";

pub fn users(db: &Database) -> Collection<User> {
    db.collection(USERS)
}

pub fn admins(db: &Database) -> Collection<Admin> {
    db.collection(ADMINS)
}

pub fn archived_users(db: &Database) -> Collection<ArchivedUser> {
    db.collection(ARCHIVED_USERS)
}

pub fn vehicles(db: &Database) -> Collection<Vehicle> {
    db.collection(VEHICLES)
}

pub fn rentals(db: &Database) -> Collection<Rental> {
    db.collection(RENTALS)
}

pub fn notifications(db: &Database) -> Collection<Notification> {
    db.collection(NOTIFICATIONS)
}

pub fn reviews(db: &Database) -> Collection<Review> {
    db.collection(REVIEWS)
}

pub fn settings(db: &Database) -> Collection<Settings> {
    db.collection(SETTINGS)
}

fn unique_index(field: &str) -> IndexModel {
    IndexModel::builder()
        .keys(doc! { field: 1 })
        .options(
            IndexOptions::builder()
                .unique(true)
                .name(format!("{}_unique", field))
                .build(),
        )
        .build()
}

/// Unique indexes backing the email and plate-number checks in the handlers.
pub async fn ensure_indexes(db: &Database) -> mongodb::error::Result<()> {
    users(db).create_index(unique_index("email"), None).await?;
    admins(db).create_index(unique_index("email"), None).await?;
    vehicles(db)
        .create_index(unique_index("plate_number"), None)
        .await?;
    log::info!("Unique indexes ensured on {}, {} and {}", USERS, ADMINS, VEHICLES);
    Ok(())
}

pub fn now() -> DateTime {
    DateTime::now()
}

pub fn parse_id(raw: &str, what: &'static str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(raw.trim()).map_err(|_| AppError::bad_request(format!("Invalid {} ID", what)))
}

/// Runs a find sorted by newest first and collects the cursor.
pub async fn find_newest<T>(collection: &Collection<T>, filter: Document) -> Result<Vec<T>, AppError>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let options = FindOptions::builder().sort(doc! { "created_at": -1 }).build();
    let cursor = collection.find(filter, options).await?;
    Ok(cursor.try_collect().await?)
}

/// Case-insensitive exact match on an email field.
pub fn email_filter(email: &str) -> Document {
    doc! {
        "email": {
            "$regex": format!("^{}$", escape_regex(email.trim())),
            "$options": "i",
        }
    }
}

pub fn escape_regex(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if "\\.^$|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_metacharacters_are_escaped() {
        assert_eq!(escape_regex("a.b+c@x.com"), "a\\.b\\+c@x\\.com");
    }

    #[test]
    fn email_filter_is_anchored() {
        let filter = email_filter(" Owner@Example.com ");
        let inner = filter.get_document("email").unwrap();
        assert_eq!(inner.get_str("$regex").unwrap(), "^Owner@Example\\.com$");
        assert_eq!(inner.get_str("$options").unwrap(), "i");
    }

    #[test]
    fn unique_index_is_named_after_its_field() {
        let index = unique_index("plate_number");
        assert_eq!(index.keys.get_i32("plate_number").unwrap(), 1);
        let options = index.options.unwrap();
        assert_eq!(options.unique, Some(true));
        assert_eq!(options.name.as_deref(), Some("plate_number_unique"));
    }

    #[test]
    fn bad_ids_are_client_errors() {
        let err = parse_id("not-an-id", "vehicle").unwrap_err();
        assert_eq!(err.to_string(), "Invalid vehicle ID");
    }
}
