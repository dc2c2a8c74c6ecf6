use std::collections::BTreeMap;

use actix_web::{get, web, HttpMessage, HttpRequest, HttpResponse};
use futures::future::try_join_all;
use mongodb::{
    bson::{doc, Document},
    Collection, Database,
};
use serde::Serialize;

use crate::{
    db,
    error::AppError,
    middleware::auth::require_admin,
    models::{
        user::{AccountStatus, UserRole},
        vehicle::VehicleStatus,
    },
    services::reports::summarize_rentals,
};

const VEHICLE_STATUSES: [VehicleStatus; 6] = [
    VehicleStatus::Available,
    VehicleStatus::Verified,
    VehicleStatus::NotVerified,
    VehicleStatus::Rented,
    VehicleStatus::Maintenance,
    VehicleStatus::OutOfService,
];

const ACCOUNT_STATUSES: [AccountStatus; 3] = [
    AccountStatus::Pending,
    AccountStatus::Approved,
    AccountStatus::Rejected,
];

#[derive(Debug, Serialize)]
struct DashboardStats {
    vehicles: BTreeMap<String, u64>,
    owners: BTreeMap<String, u64>,
    rentals: BTreeMap<&'static str, usize>,
    total_revenue: f64,
    unread_notifications: u64,
    reviews: u64,
}

/// Counts documents per serialized status value.
async fn count_by_status<T, S>(
    collection: &Collection<T>,
    base: Document,
    statuses: &[S],
) -> Result<BTreeMap<String, u64>, AppError>
where
    T: Send + Sync,
    S: Serialize,
{
    let mut labelled = Vec::with_capacity(statuses.len());
    for status in statuses {
        let value = mongodb::bson::to_bson(status)?;
        let label = value.as_str().unwrap_or_default().to_string();
        let mut filter = base.clone();
        filter.insert("status", value);
        labelled.push((label, filter));
    }

    let counts = try_join_all(
        labelled
            .iter()
            .map(|(_, filter)| collection.count_documents(filter.clone(), None)),
    )
    .await?;

    Ok(labelled
        .into_iter()
        .map(|(label, _)| label)
        .zip(counts)
        .collect())
}

#[get("/dashboard")]
pub async fn dashboard(req: HttpRequest, db: web::Data<Database>) -> Result<HttpResponse, AppError> {
    require_admin(&req.extensions())?;

    let vehicles = count_by_status(&db::vehicles(&db), Document::new(), &VEHICLE_STATUSES).await?;
    let owners = count_by_status(
        &db::users(&db),
        doc! { "role": mongodb::bson::to_bson(&UserRole::Owner)? },
        &ACCOUNT_STATUSES,
    )
    .await?;

    let rentals = db::find_newest(&db::rentals(&db), Document::new()).await?;
    let summary = summarize_rentals(&rentals);

    let unread_notifications = db::notifications(&db)
        .count_documents(doc! { "read": false }, None)
        .await?;
    let reviews = db::reviews(&db).count_documents(doc! {}, None).await?;

    Ok(HttpResponse::Ok().json(DashboardStats {
        vehicles,
        owners,
        rentals: summary.by_status,
        total_revenue: summary.total_revenue,
        unread_notifications,
        reviews,
    }))
}
