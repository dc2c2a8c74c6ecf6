use actix_web::{delete, get, http::header, post, put, web, HttpMessage, HttpRequest, HttpResponse};
use chrono::Utc;
use mongodb::{bson::doc, Database};
use serde_json::json;

use crate::{
    db,
    error::AppError,
    middleware::auth::require_admin,
    models::rental::{Rental, RentalQuery, RentalStatus, UpdateRentalStatusDto},
    services::reports::{rental_filter, rentals_csv, summarize_rentals},
};

async fn query_rentals(db: &Database, query: &RentalQuery) -> Result<Vec<Rental>, AppError> {
    let filter = rental_filter(query).map_err(AppError::BadRequest)?;
    db::find_newest(&db::rentals(db), filter).await
}

#[get("/rentals")]
pub async fn list_rentals(
    req: HttpRequest,
    db: web::Data<Database>,
    query: web::Query<RentalQuery>,
) -> Result<HttpResponse, AppError> {
    require_admin(&req.extensions())?;
    Ok(HttpResponse::Ok().json(query_rentals(&db, &query).await?))
}

#[get("/rentals/{id}")]
pub async fn get_rental(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    require_admin(&req.extensions())?;
    let rental_id = db::parse_id(&id, "rental")?;
    let rental = db::rentals(&db)
        .find_one(doc! { "_id": rental_id }, None)
        .await?
        .ok_or(AppError::NotFound("Rental"))?;
    Ok(HttpResponse::Ok().json(rental))
}

#[put("/rentals/{id}/status")]
pub async fn update_rental_status(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<String>,
    status_data: web::Json<UpdateRentalStatusDto>,
) -> Result<HttpResponse, AppError> {
    let admin = require_admin(&req.extensions())?;
    let rental_id = db::parse_id(&id, "rental")?;
    let status = status_data.status;

    let rental = db::rentals(&db)
        .find_one(doc! { "_id": rental_id }, None)
        .await?
        .ok_or(AppError::NotFound("Rental"))?;

    db::rentals(&db)
        .update_one(
            doc! { "_id": rental_id },
            doc! { "$set": { "status": status.as_str(), "updated_at": db::now() } },
            None,
        )
        .await?;

    // Keep the vehicle's availability in step with its booking.
    if let Some(vehicle_status) = status.vehicle_status() {
        db::vehicles(&db)
            .update_one(
                doc! { "_id": rental.vehicle_id },
                doc! { "$set": {
                    "status": mongodb::bson::to_bson(&vehicle_status)?,
                    "updated_at": db::now(),
                } },
                None,
            )
            .await?;
    }

    log::info!(
        "{} moved rental {} from {} to {}",
        admin.email,
        rental_id,
        rental.status.as_str(),
        status.as_str()
    );
    Ok(HttpResponse::Ok().json(json!({ "message": "Rental status updated", "status": status })))
}

#[post("/rentals/mark-overdue")]
pub async fn mark_overdue(req: HttpRequest, db: web::Data<Database>) -> Result<HttpResponse, AppError> {
    require_admin(&req.extensions())?;

    let result = db::rentals(&db)
        .update_many(
            Rental::overdue_filter(db::now()),
            doc! { "$set": { "status": RentalStatus::Overdue.as_str(), "updated_at": db::now() } },
            None,
        )
        .await?;

    if result.modified_count > 0 {
        log::info!("Marked {} rentals overdue", result.modified_count);
    }
    Ok(HttpResponse::Ok().json(json!({ "updated": result.modified_count })))
}

#[delete("/rentals/{id}")]
pub async fn delete_rental(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let admin = require_admin(&req.extensions())?;
    let rental_id = db::parse_id(&id, "rental")?;

    let result = db::rentals(&db)
        .delete_one(doc! { "_id": rental_id }, None)
        .await?;
    if result.deleted_count == 0 {
        return Err(AppError::NotFound("Rental"));
    }

    log::info!("{} deleted rental {}", admin.email, rental_id);
    Ok(HttpResponse::Ok().json("Rental deleted successfully"))
}

#[get("/reports/summary")]
pub async fn rental_summary(
    req: HttpRequest,
    db: web::Data<Database>,
    query: web::Query<RentalQuery>,
) -> Result<HttpResponse, AppError> {
    require_admin(&req.extensions())?;
    let rentals = query_rentals(&db, &query).await?;
    Ok(HttpResponse::Ok().json(summarize_rentals(&rentals)))
}

#[get("/reports/rentals.csv")]
pub async fn export_rentals_csv(
    req: HttpRequest,
    db: web::Data<Database>,
    query: web::Query<RentalQuery>,
) -> Result<HttpResponse, AppError> {
    require_admin(&req.extensions())?;
    let rentals = query_rentals(&db, &query).await?;

    let filename = format!("rentals-{}.csv", Utc::now().format("%Y%m%d"));
    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/csv"))
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ))
        .body(rentals_csv(&rentals)))
}
