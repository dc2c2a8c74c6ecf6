use actix_web::{delete, get, post, put, web, HttpMessage, HttpRequest, HttpResponse};
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    Database,
};
use serde_json::json;
use validator::Validate;

use crate::{
    db,
    error::AppError,
    middleware::auth::{require_admin, require_auth},
    models::notification::{CreateNotificationDto, Notification, NotificationKind},
};

/// Notifications addressed to `user_id` plus global ones.
pub fn visible_to(user_id: ObjectId) -> Document {
    doc! {
        "$or": [
            { "user_id": user_id },
            { "user_id": null },
            { "user_id": { "$exists": false } },
        ]
    }
}

#[get("/notifications")]
pub async fn list_notifications(
    req: HttpRequest,
    db: web::Data<Database>,
) -> Result<HttpResponse, AppError> {
    let user = require_auth(&req.extensions())?;
    let notifications =
        db::find_newest(&db::notifications(&db), visible_to(user.object_id()?)).await?;
    let unread = notifications.iter().filter(|n| !n.read).count();
    Ok(HttpResponse::Ok().json(json!({
        "unread": unread,
        "notifications": notifications,
    })))
}

#[post("/notifications")]
pub async fn create_notification(
    req: HttpRequest,
    db: web::Data<Database>,
    notification_data: web::Json<CreateNotificationDto>,
) -> Result<HttpResponse, AppError> {
    require_admin(&req.extensions())?;
    notification_data.validate()?;
    let data = notification_data.into_inner();

    let user_id = data
        .user_id
        .as_deref()
        .map(|id| db::parse_id(id, "user"))
        .transpose()?;
    let notification = Notification::new(
        data.kind.unwrap_or(NotificationKind::System),
        data.title.trim(),
        data.message.trim(),
        user_id,
    );

    db::notifications(&db).insert_one(notification, None).await?;
    Ok(HttpResponse::Created().json("Notification sent"))
}

#[put("/notifications/read-all")]
pub async fn mark_all_read(req: HttpRequest, db: web::Data<Database>) -> Result<HttpResponse, AppError> {
    let user = require_auth(&req.extensions())?;
    let mut filter = visible_to(user.object_id()?);
    filter.insert("read", false);

    let result = db::notifications(&db)
        .update_many(filter, doc! { "$set": { "read": true } }, None)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "updated": result.modified_count })))
}

#[put("/notifications/{id}/read")]
pub async fn mark_read(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let user = require_auth(&req.extensions())?;
    let mut filter = visible_to(user.object_id()?);
    filter.insert("_id", db::parse_id(&id, "notification")?);

    let result = db::notifications(&db)
        .update_one(filter, doc! { "$set": { "read": true } }, None)
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::NotFound("Notification"));
    }
    Ok(HttpResponse::Ok().json("Notification marked as read"))
}

#[delete("/notifications/{id}")]
pub async fn delete_notification(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    require_admin(&req.extensions())?;
    let notification_id = db::parse_id(&id, "notification")?;

    let result = db::notifications(&db)
        .delete_one(doc! { "_id": notification_id }, None)
        .await?;
    if result.deleted_count == 0 {
        return Err(AppError::NotFound("Notification"));
    }
    Ok(HttpResponse::Ok().json("Notification deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_includes_global_notifications() {
        let id = ObjectId::new();
        let filter = visible_to(id);
        let clauses = filter.get_array("$or").unwrap();
        assert_eq!(clauses.len(), 3);
        let own = clauses[0].as_document().unwrap();
        assert_eq!(own.get_object_id("user_id").unwrap(), id);
    }
}
