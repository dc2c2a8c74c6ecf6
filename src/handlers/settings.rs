use actix_web::{get, post, put, web, HttpMessage, HttpRequest, HttpResponse};
use mongodb::{
    bson::{doc, Document},
    options::UpdateOptions,
    Database,
};
use serde_json::json;
use validator::Validate;

use crate::{
    config::AppConfig,
    db,
    error::AppError,
    middleware::auth::{require_admin, require_auth},
    models::settings::{Settings, UpdateSettingsDto, SETTINGS_ID},
    services::storage::{ObjectPath, ObjectStore, Upload},
};

pub async fn load_settings(db: &Database) -> Result<Settings, AppError> {
    Ok(db::settings(db)
        .find_one(doc! { "_id": SETTINGS_ID }, None)
        .await?
        .unwrap_or_default())
}

/// Upserts the single settings document with the given fields.
async fn save_fields(db: &Database, mut fields: Document) -> Result<(), AppError> {
    fields.insert("updated_at", db::now());
    let defaults = Settings::default();

    // A field may only appear in one of $set / $setOnInsert.
    let mut on_insert = Document::new();
    if !fields.contains_key("company_name") {
        on_insert.insert("company_name", defaults.company_name);
    }
    if !fields.contains_key("currency") {
        on_insert.insert("currency", defaults.currency);
    }

    let mut update = doc! { "$set": fields };
    if !on_insert.is_empty() {
        update.insert("$setOnInsert", on_insert);
    }

    db::settings(db)
        .update_one(
            doc! { "_id": SETTINGS_ID },
            update,
            UpdateOptions::builder().upsert(true).build(),
        )
        .await?;
    Ok(())
}

pub fn settings_changes(update: &UpdateSettingsDto) -> Document {
    let mut set = Document::new();
    let fields = [
        ("company_name", &update.company_name),
        ("contact_email", &update.contact_email),
        ("contact_phone", &update.contact_phone),
        ("address", &update.address),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            set.insert(name, value.trim());
        }
    }
    if let Some(currency) = &update.currency {
        set.insert("currency", currency.trim().to_uppercase());
    }
    set
}

#[get("/settings")]
pub async fn get_settings(req: HttpRequest, db: web::Data<Database>) -> Result<HttpResponse, AppError> {
    require_auth(&req.extensions())?;
    Ok(HttpResponse::Ok().json(load_settings(&db).await?))
}

#[put("/settings")]
pub async fn update_settings(
    req: HttpRequest,
    db: web::Data<Database>,
    update: web::Json<UpdateSettingsDto>,
) -> Result<HttpResponse, AppError> {
    require_admin(&req.extensions())?;
    update.validate()?;

    let changes = settings_changes(&update);
    if changes.is_empty() {
        return Err(AppError::bad_request("No changes supplied"));
    }
    save_fields(&db, changes).await?;
    Ok(HttpResponse::Ok().json(load_settings(&db).await?))
}

#[post("/settings/logo")]
pub async fn upload_logo(
    req: HttpRequest,
    db: web::Data<Database>,
    store: web::Data<ObjectStore>,
    config: web::Data<AppConfig>,
    upload: web::Json<Upload>,
) -> Result<HttpResponse, AppError> {
    require_admin(&req.extensions())?;
    upload.validate()?;
    upload.require_image()?;
    let bytes = upload.decode(config.max_upload_bytes)?;

    let previous = load_settings(&db).await?.logo_url;
    let extension = upload.extension().unwrap_or_else(|| "png".to_string());
    let path = ObjectPath::settings_logo(db::now().timestamp_millis(), &extension)?;
    let url = store.put(&path, &bytes).await?;

    save_fields(&db, doc! { "logo_url": url.as_str() }).await?;
    store.discard_url(previous.as_deref()).await;

    Ok(HttpResponse::Ok().json(json!({ "url": url })))
}
