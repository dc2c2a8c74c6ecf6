use actix_web::{get, http::header, web, HttpMessage, HttpRequest, HttpResponse};

use crate::{
    error::AppError,
    middleware::auth::{get_current_user, AuthenticatedUser},
    services::storage::{content_type_for, ObjectPath, ObjectStore},
};

const PRIVATE_PREFIXES: [&str; 2] = ["business-permits/", "business-registrations/"];

/// Business documents are readable by admins and the owner they belong to;
/// everything else (vehicle photos, avatars, the logo) is public.
fn may_read(path: &ObjectPath, user: Option<&AuthenticatedUser>) -> bool {
    let Some(prefix) = PRIVATE_PREFIXES
        .iter()
        .find(|prefix| path.as_str().starts_with(*prefix))
    else {
        return true;
    };

    match user {
        Some(user) if user.is_admin() => true,
        Some(user) => path.as_str()[prefix.len()..] == user.id,
        None => false,
    }
}

#[get("/files/{path:.*}")]
pub async fn serve_file(
    req: HttpRequest,
    store: web::Data<ObjectStore>,
    raw_path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let path = ObjectPath::parse(&raw_path)?;
    let user = get_current_user(&req.extensions());
    if !may_read(&path, user.as_ref()) {
        return Err(AppError::forbidden("You do not have access to this file"));
    }

    let bytes = store.read(&path).await?;
    let content_type = match content_type_for(&path) {
        "application/octet-stream" if bytes.starts_with(b"%PDF") => "application/pdf",
        other => other,
    };

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, content_type))
        .insert_header((header::CACHE_CONTROL, "private, max-age=300"))
        .body(bytes))
}
