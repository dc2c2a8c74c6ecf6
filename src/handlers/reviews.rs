use actix_web::{delete, get, web, HttpMessage, HttpRequest, HttpResponse};
use mongodb::{
    bson::{doc, Document},
    Database,
};

use crate::{
    db,
    error::AppError,
    middleware::auth::{require_admin, require_auth},
    models::review::ReviewQuery,
    services::reports::{average_by_business, filter_doc_for_business},
};

#[get("/reviews")]
pub async fn list_reviews(
    req: HttpRequest,
    db: web::Data<Database>,
    query: web::Query<ReviewQuery>,
) -> Result<HttpResponse, AppError> {
    require_auth(&req.extensions())?;
    let filter = filter_doc_for_business(query.business_name.as_deref());
    let reviews = db::find_newest(&db::reviews(&db), filter).await?;
    Ok(HttpResponse::Ok().json(reviews))
}

#[get("/reviews/summary")]
pub async fn review_summary(req: HttpRequest, db: web::Data<Database>) -> Result<HttpResponse, AppError> {
    require_auth(&req.extensions())?;
    let reviews = db::find_newest(&db::reviews(&db), Document::new()).await?;
    Ok(HttpResponse::Ok().json(average_by_business(&reviews)))
}

#[delete("/reviews/{id}")]
pub async fn delete_review(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let admin = require_admin(&req.extensions())?;
    let review_id = db::parse_id(&id, "review")?;

    let result = db::reviews(&db)
        .delete_one(doc! { "_id": review_id }, None)
        .await?;
    if result.deleted_count == 0 {
        return Err(AppError::NotFound("Review"));
    }

    log::info!("{} removed review {}", admin.email, review_id);
    Ok(HttpResponse::Ok().json("Review deleted"))
}
