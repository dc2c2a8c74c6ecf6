use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    /// `None` addresses every dashboard user.
    #[serde(default)]
    pub user_id: Option<ObjectId>,
    pub created_at: DateTime,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        user_id: Option<ObjectId>,
    ) -> Self {
        Self {
            id: None,
            kind,
            title: title.into(),
            message: message.into(),
            read: false,
            user_id,
            created_at: DateTime::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AccountStatus,
    Vehicle,
    Booking,
    System,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateNotificationDto {
    pub kind: Option<NotificationKind>,
    #[validate(length(min = 1, max = 120, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, max = 1000, message = "Message is required"))]
    pub message: String,
    pub user_id: Option<String>,
}
