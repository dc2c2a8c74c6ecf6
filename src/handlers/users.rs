use actix_web::{delete, get, post, put, web, HttpMessage, HttpRequest, HttpResponse};
use bcrypt::{hash, DEFAULT_COST};
use mongodb::{
    bson::{doc, Document},
    Database,
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::{
    config::AppConfig,
    db,
    error::AppError,
    middleware::auth::{require_admin, require_auth},
    models::{
        admin::{Admin, AdminView, CreateAdminDto},
        notification::{Notification, NotificationKind},
        user::{
            AccountStatus, ArchivedUser, CreateOwnerDto, UpdateStatusDto, UpdateUserDto, User,
            UserRole, UserView,
        },
    },
    services::{
        approval::check_owner_eligibility,
        storage::{ObjectPath, ObjectStore, Upload},
    },
};

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub role: Option<UserRole>,
    pub status: Option<AccountStatus>,
    pub search: Option<String>,
}

fn user_filter(query: &UserQuery) -> Result<Document, AppError> {
    let mut filter = Document::new();
    if let Some(role) = query.role {
        filter.insert("role", mongodb::bson::to_bson(&role)?);
    }
    if let Some(status) = query.status {
        filter.insert("status", mongodb::bson::to_bson(&status)?);
    }
    if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let pattern = db::escape_regex(term);
        let fields = ["first_name", "last_name", "email", "business_name"];
        let clauses: Vec<Document> = fields
            .iter()
            .map(|field| doc! { *field: { "$regex": pattern.as_str(), "$options": "i" } })
            .collect();
        filter.insert("$or", clauses);
    }
    Ok(filter)
}

async fn email_taken(db: &Database, email: &str) -> Result<bool, AppError> {
    let filter = db::email_filter(email);
    Ok(db::users(db).find_one(filter.clone(), None).await?.is_some()
        || db::admins(db).find_one(filter, None).await?.is_some())
}

pub async fn find_user(db: &Database, id: &str) -> Result<User, AppError> {
    let id = db::parse_id(id, "user")?;
    db::users(db)
        .find_one(doc! { "_id": id }, None)
        .await?
        .ok_or(AppError::NotFound("User"))
}

#[get("/users")]
pub async fn list_users(
    req: HttpRequest,
    db: web::Data<Database>,
    query: web::Query<UserQuery>,
) -> Result<HttpResponse, AppError> {
    require_admin(&req.extensions())?;

    let users = db::find_newest(&db::users(&db), user_filter(&query)?).await?;
    let users: Vec<UserView> = users.into_iter().map(UserView::from).collect();
    Ok(HttpResponse::Ok().json(users))
}

#[post("/users")]
pub async fn create_owner(
    req: HttpRequest,
    db: web::Data<Database>,
    user_data: web::Json<CreateOwnerDto>,
) -> Result<HttpResponse, AppError> {
    require_admin(&req.extensions())?;
    user_data.validate()?;

    if email_taken(&db, &user_data.email).await? {
        return Err(AppError::Conflict("Email already exists".to_string()));
    }

    let user_data = user_data.into_inner();
    let now = db::now();
    let new_user = User {
        id: None,
        first_name: user_data.first_name,
        last_name: user_data.last_name,
        email: user_data.email.trim().to_lowercase(),
        password: hash(user_data.password.as_bytes(), DEFAULT_COST)?,
        phone: user_data.phone,
        business_name: user_data.business_name,
        address: user_data.address,
        role: UserRole::Owner,
        status: AccountStatus::Pending,
        is_verified: false,
        business_permit_url: None,
        business_registration_url: None,
        profile_image_url: None,
        created_at: now,
        updated_at: now,
    };

    let result = db::users(&db).insert_one(&new_user, None).await?;
    Ok(HttpResponse::Created().json(json!({
        "message": "Owner created successfully",
        "id": result.inserted_id.as_object_id().map(|id| id.to_hex()),
    })))
}

#[get("/users/{id}")]
pub async fn get_user(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    require_admin(&req.extensions())?;
    let user = find_user(&db, &id).await?;
    Ok(HttpResponse::Ok().json(UserView::from(user)))
}

#[put("/users/{id}")]
pub async fn update_user(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<String>,
    update: web::Json<UpdateUserDto>,
) -> Result<HttpResponse, AppError> {
    require_admin(&req.extensions())?;
    update.validate()?;

    let user_id = db::parse_id(&id, "user")?;
    let changes = user_changes(&update);
    if changes.is_empty() {
        return Err(AppError::bad_request("No changes supplied"));
    }

    let result = db::users(&db)
        .update_one(doc! { "_id": user_id }, doc! { "$set": changes }, None)
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::NotFound("User"));
    }
    Ok(HttpResponse::Ok().json("User updated successfully"))
}

/// `$set` document for the supplied fields, stamped with `updated_at`.
pub fn user_changes(update: &UpdateUserDto) -> Document {
    let mut set = Document::new();
    let fields = [
        ("first_name", &update.first_name),
        ("last_name", &update.last_name),
        ("phone", &update.phone),
        ("business_name", &update.business_name),
        ("address", &update.address),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            set.insert(name, value.trim());
        }
    }
    if !set.is_empty() {
        set.insert("updated_at", db::now());
    }
    set
}

#[put("/users/{id}/status")]
pub async fn update_user_status(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<String>,
    status_data: web::Json<UpdateStatusDto>,
) -> Result<HttpResponse, AppError> {
    let admin = require_admin(&req.extensions())?;
    let user = find_user(&db, &id).await?;
    let user_id = user.id.ok_or(AppError::NotFound("User"))?;
    let status = status_data.status;

    db::users(&db)
        .update_one(
            doc! { "_id": user_id },
            doc! { "$set": {
                "status": mongodb::bson::to_bson(&status)?,
                "is_verified": status == AccountStatus::Approved,
                "updated_at": db::now(),
            } },
            None,
        )
        .await?;

    let message = match status {
        AccountStatus::Approved => "Your business account has been approved. You can now list vehicles.",
        AccountStatus::Rejected => "Your business account application was rejected. Please contact support for details.",
        AccountStatus::Pending => "Your business account has been returned to pending review.",
    };
    db::notifications(&db)
        .insert_one(
            Notification::new(
                NotificationKind::AccountStatus,
                "Account status updated",
                message,
                Some(user_id),
            ),
            None,
        )
        .await?;

    log::info!("{} set account {} to {:?}", admin.email, user.email, status);
    Ok(HttpResponse::Ok().json(json!({
        "message": "User status updated",
        "status": status,
    })))
}

#[get("/users/{id}/eligibility")]
pub async fn owner_eligibility(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    require_admin(&req.extensions())?;
    let user = find_user(&db, &id).await?;

    let body = match check_owner_eligibility(&user) {
        Ok(()) => json!({ "eligible": true }),
        Err(reason) => json!({
            "eligible": false,
            "reason": reason.code(),
            "message": reason.to_string(),
        }),
    };
    Ok(HttpResponse::Ok().json(body))
}

#[post("/users/{id}/archive")]
pub async fn archive_user(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let admin = require_admin(&req.extensions())?;
    let user = find_user(&db, &id).await?;
    let user_id = user.id.ok_or(AppError::NotFound("User"))?;
    let email = user.email.clone();

    // Copy first so a failed insert leaves the live record in place.
    db::archived_users(&db)
        .insert_one(
            ArchivedUser {
                user,
                archived_at: db::now(),
                archived_by: admin.email.clone(),
            },
            None,
        )
        .await?;
    db::users(&db)
        .delete_one(doc! { "_id": user_id }, None)
        .await?;

    log::info!("{} archived user {}", admin.email, email);
    Ok(HttpResponse::Ok().json("User archived successfully"))
}

#[delete("/users/{id}")]
pub async fn delete_user(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let admin = require_admin(&req.extensions())?;
    let user_id = db::parse_id(&id, "user")?;

    let result = db::users(&db)
        .delete_one(doc! { "_id": user_id }, None)
        .await?;
    if result.deleted_count == 0 {
        return Err(AppError::NotFound("User"));
    }

    log::info!("{} deleted user {}", admin.email, user_id);
    Ok(HttpResponse::Ok().json("User deleted successfully"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    BusinessPermit,
    BusinessRegistration,
}

impl DocumentKind {
    fn field(&self) -> &'static str {
        match self {
            DocumentKind::BusinessPermit => "business_permit_url",
            DocumentKind::BusinessRegistration => "business_registration_url",
        }
    }

    fn path(&self, uid: &str) -> Result<ObjectPath, AppError> {
        Ok(match self {
            DocumentKind::BusinessPermit => ObjectPath::business_permit(uid)?,
            DocumentKind::BusinessRegistration => ObjectPath::business_registration(uid)?,
        })
    }
}

#[post("/users/{id}/documents/{kind}")]
pub async fn upload_document(
    req: HttpRequest,
    db: web::Data<Database>,
    store: web::Data<ObjectStore>,
    config: web::Data<AppConfig>,
    path: web::Path<(String, DocumentKind)>,
    upload: web::Json<Upload>,
) -> Result<HttpResponse, AppError> {
    let auth_user = require_auth(&req.extensions())?;
    let (id, kind) = path.into_inner();
    if !auth_user.is_admin() && auth_user.id != id {
        return Err(AppError::forbidden("You can only upload documents for your own account"));
    }

    upload.validate()?;
    upload.require_document()?;
    let bytes = upload.decode(config.max_upload_bytes)?;

    let user = find_user(&db, &id).await?;
    let user_id = user.id.ok_or(AppError::NotFound("User"))?;
    let url = store.put(&kind.path(&user_id.to_hex())?, &bytes).await?;

    db::users(&db)
        .update_one(
            doc! { "_id": user_id },
            doc! { "$set": { kind.field(): url.as_str(), "updated_at": db::now() } },
            None,
        )
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "url": url })))
}

#[get("/admins")]
pub async fn list_admins(req: HttpRequest, db: web::Data<Database>) -> Result<HttpResponse, AppError> {
    require_admin(&req.extensions())?;
    let admins = db::find_newest(&db::admins(&db), Document::new()).await?;
    let admins: Vec<AdminView> = admins.into_iter().map(AdminView::from).collect();
    Ok(HttpResponse::Ok().json(admins))
}

#[post("/admins")]
pub async fn create_admin(
    req: HttpRequest,
    db: web::Data<Database>,
    admin_data: web::Json<CreateAdminDto>,
) -> Result<HttpResponse, AppError> {
    let creator = require_admin(&req.extensions())?;
    admin_data.validate()?;

    if email_taken(&db, &admin_data.email).await? {
        return Err(AppError::Conflict("Email already exists".to_string()));
    }

    let admin_data = admin_data.into_inner();
    let now = db::now();
    let admin = Admin {
        id: None,
        name: admin_data.name,
        email: admin_data.email.trim().to_lowercase(),
        password: hash(admin_data.password.as_bytes(), DEFAULT_COST)?,
        profile_image_url: None,
        created_at: now,
        updated_at: now,
    };
    db::admins(&db).insert_one(&admin, None).await?;

    log::info!("{} created admin {}", creator.email, admin.email);
    Ok(HttpResponse::Created().json("Admin created successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_combines_role_status_and_search() {
        let filter = user_filter(&UserQuery {
            role: Some(UserRole::Owner),
            status: Some(AccountStatus::Pending),
            search: Some(" Santos ".to_string()),
        })
        .unwrap();
        assert_eq!(filter.get_str("role").unwrap(), "owner");
        assert_eq!(filter.get_str("status").unwrap(), "pending");
        let clauses = filter.get_array("$or").unwrap();
        assert_eq!(clauses.len(), 4);
    }

    #[test]
    fn empty_search_is_ignored() {
        let filter = user_filter(&UserQuery {
            role: None,
            status: None,
            search: Some("   ".to_string()),
        })
        .unwrap();
        assert!(filter.is_empty());
    }

    #[test]
    fn changes_only_cover_supplied_fields() {
        let changes = user_changes(&UpdateUserDto {
            first_name: Some(" Lito ".to_string()),
            last_name: None,
            phone: None,
            business_name: Some("Santos Car Hire".to_string()),
            address: None,
        });
        assert_eq!(changes.get_str("first_name").unwrap(), "Lito");
        assert!(changes.contains_key("updated_at"));
        assert!(!changes.contains_key("last_name"));

        let none = user_changes(&UpdateUserDto {
            first_name: None,
            last_name: None,
            phone: None,
            business_name: None,
            address: None,
        });
        assert!(none.is_empty());
    }

    #[test]
    fn document_kinds_parse_from_path_segments() {
        let kind: DocumentKind = serde_json::from_str("\"business-permit\"").unwrap();
        assert_eq!(kind, DocumentKind::BusinessPermit);
        assert_eq!(
            kind.path("abc").unwrap().as_str(),
            "business-permits/abc"
        );
        assert_eq!(
            DocumentKind::BusinessRegistration.field(),
            "business_registration_url"
        );
    }
}
