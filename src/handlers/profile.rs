use actix_web::{get, post, put, web, HttpMessage, HttpRequest, HttpResponse};
use bcrypt::{hash, verify, DEFAULT_COST};
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    Database,
};
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    config::AppConfig,
    db,
    error::AppError,
    handlers::{auth::load_session_account, users::user_changes},
    middleware::auth::require_auth,
    models::{
        account::Account,
        admin::UpdateAdminProfileDto,
        user::{ChangePasswordDto, UpdateUserDto},
    },
    services::storage::{unique_file_name, ObjectPath, ObjectStore, Upload},
};

/// Applies a `$set` to whichever collection holds the account.
async fn update_account(db: &Database, account: &Account, set: Document) -> Result<(), AppError> {
    let id: ObjectId = account.id().copied().ok_or(AppError::NotFound("Account"))?;
    let filter = doc! { "_id": id };
    let update = doc! { "$set": set };
    match account {
        Account::Admin(_) => db::admins(db).update_one(filter, update, None).await?,
        Account::User(_) => db::users(db).update_one(filter, update, None).await?,
    };
    Ok(())
}

fn parse_body<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, AppError> {
    serde_json::from_value(body).map_err(|e| AppError::bad_request(format!("Invalid profile data: {}", e)))
}

#[get("/profile")]
pub async fn get_profile(req: HttpRequest, db: web::Data<Database>) -> Result<HttpResponse, AppError> {
    let auth_user = require_auth(&req.extensions())?;
    let account = load_session_account(&db, &auth_user).await?;
    Ok(HttpResponse::Ok().json(account.into_json()))
}

#[put("/profile")]
pub async fn update_profile(
    req: HttpRequest,
    db: web::Data<Database>,
    body: web::Json<Value>,
) -> Result<HttpResponse, AppError> {
    let auth_user = require_auth(&req.extensions())?;
    let account = load_session_account(&db, &auth_user).await?;

    let changes = match &account {
        Account::Admin(_) => {
            let dto: UpdateAdminProfileDto = parse_body(body.into_inner())?;
            dto.validate()?;
            let mut set = Document::new();
            if let Some(name) = dto.name {
                set.insert("name", name.trim());
                set.insert("updated_at", db::now());
            }
            set
        }
        Account::User(_) => {
            let dto: UpdateUserDto = parse_body(body.into_inner())?;
            dto.validate()?;
            user_changes(&dto)
        }
    };
    if changes.is_empty() {
        return Err(AppError::bad_request("No changes supplied"));
    }

    update_account(&db, &account, changes).await?;
    let refreshed = load_session_account(&db, &auth_user).await?;
    Ok(HttpResponse::Ok().json(refreshed.into_json()))
}

#[put("/profile/password")]
pub async fn change_password(
    req: HttpRequest,
    db: web::Data<Database>,
    passwords: web::Json<ChangePasswordDto>,
) -> Result<HttpResponse, AppError> {
    let auth_user = require_auth(&req.extensions())?;
    passwords.validate()?;
    let account = load_session_account(&db, &auth_user).await?;

    if !verify(&passwords.current_password, account.password_hash()).unwrap_or(false) {
        return Err(AppError::bad_request("Current password is incorrect"));
    }
    if passwords.current_password == passwords.new_password {
        return Err(AppError::bad_request("New password must differ from the current one"));
    }

    let hashed = hash(passwords.new_password.as_bytes(), DEFAULT_COST)?;
    update_account(
        &db,
        &account,
        doc! { "password": hashed, "updated_at": db::now() },
    )
    .await?;

    log::info!("{} changed their password", account.email());
    Ok(HttpResponse::Ok().json("Password updated successfully"))
}

#[post("/profile/image")]
pub async fn upload_profile_image(
    req: HttpRequest,
    db: web::Data<Database>,
    store: web::Data<ObjectStore>,
    config: web::Data<AppConfig>,
    upload: web::Json<Upload>,
) -> Result<HttpResponse, AppError> {
    let auth_user = require_auth(&req.extensions())?;
    upload.validate()?;
    upload.require_image()?;
    let bytes = upload.decode(config.max_upload_bytes)?;

    let account = load_session_account(&db, &auth_user).await?;
    let file_name = unique_file_name(&upload.file_name, db::now().timestamp_millis());
    let path = ObjectPath::profile_image(&auth_user.id, &file_name)?;
    let url = store.put(&path, &bytes).await?;

    update_account(
        &db,
        &account,
        doc! { "profile_image_url": url.as_str(), "updated_at": db::now() },
    )
    .await?;
    // Only now is the old image unreferenced.
    store.discard_url(account.profile_image_url()).await;

    Ok(HttpResponse::Ok().json(json!({ "url": url })))
}
