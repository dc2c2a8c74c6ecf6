use actix_web::{delete, get, post, put, web, HttpMessage, HttpRequest, HttpResponse};
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    Database,
};
use serde_json::json;
use validator::Validate;

use crate::{
    config::AppConfig,
    db,
    error::AppError,
    handlers::users::find_user,
    middleware::auth::{require_auth, AuthenticatedUser},
    models::vehicle::{
        CreateVehicleDto, RemoveImageDto, UpdateVehicleDto, UpdateVehicleStatusDto, Vehicle,
        VehicleQuery, VehicleStatus,
    },
    services::{
        approval::check_owner_eligibility,
        storage::{unique_file_name, ObjectPath, ObjectStore, Upload},
    },
};

async fn find_vehicle(db: &Database, id: &str) -> Result<Vehicle, AppError> {
    let id = db::parse_id(id, "vehicle")?;
    db::vehicles(db)
        .find_one(doc! { "_id": id }, None)
        .await?
        .ok_or(AppError::NotFound("Vehicle"))
}

/// Admins reach every vehicle; owners only their own.
fn ensure_can_manage(user: &AuthenticatedUser, vehicle: &Vehicle) -> Result<(), AppError> {
    if user.is_admin() || vehicle.owner_id.to_hex() == user.id {
        Ok(())
    } else {
        Err(AppError::forbidden("You can only manage your own vehicles"))
    }
}

fn vehicle_filter(user: &AuthenticatedUser, query: &VehicleQuery) -> Result<Document, AppError> {
    let mut filter = Document::new();
    if let Some(status) = query.status {
        filter.insert("status", mongodb::bson::to_bson(&status)?);
    }
    if user.is_admin() {
        if let Some(owner_id) = query.owner_id.as_deref() {
            filter.insert("owner_id", db::parse_id(owner_id, "owner")?);
        }
    } else {
        filter.insert("owner_id", user.object_id()?);
    }
    Ok(filter)
}

#[get("/vehicles")]
pub async fn list_vehicles(
    req: HttpRequest,
    db: web::Data<Database>,
    query: web::Query<VehicleQuery>,
) -> Result<HttpResponse, AppError> {
    let user = require_auth(&req.extensions())?;
    let vehicles = db::find_newest(&db::vehicles(&db), vehicle_filter(&user, &query)?).await?;
    Ok(HttpResponse::Ok().json(vehicles))
}

#[get("/vehicles/{id}")]
pub async fn get_vehicle(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let user = require_auth(&req.extensions())?;
    let vehicle = find_vehicle(&db, &id).await?;
    ensure_can_manage(&user, &vehicle)?;
    Ok(HttpResponse::Ok().json(vehicle))
}

#[post("/vehicles")]
pub async fn create_vehicle(
    req: HttpRequest,
    db: web::Data<Database>,
    vehicle_data: web::Json<CreateVehicleDto>,
) -> Result<HttpResponse, AppError> {
    let user = require_auth(&req.extensions())?;
    vehicle_data.validate()?;
    let vehicle_data = vehicle_data.into_inner();

    let owner_id = match (user.is_admin(), vehicle_data.owner_id.as_deref()) {
        (true, Some(owner_id)) => owner_id.to_string(),
        (true, None) => return Err(AppError::bad_request("Select a business owner for this vehicle")),
        (false, _) => user.id.clone(),
    };

    // The owner must be approved and document-complete before listing anything.
    let owner = find_user(&db, &owner_id).await?;
    check_owner_eligibility(&owner)?;
    let owner_id = owner.id.ok_or(AppError::NotFound("User"))?;

    let plate_number = vehicle_data.plate_number.trim().to_uppercase();
    if db::vehicles(&db)
        .find_one(doc! { "plate_number": plate_number.as_str() }, None)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(format!(
            "A vehicle with plate number {} already exists",
            plate_number
        )));
    }

    // Owner listings wait for an admin to verify them.
    let default_status = if user.is_admin() {
        VehicleStatus::Available
    } else {
        VehicleStatus::NotVerified
    };
    let status = match vehicle_data.status {
        Some(status) if user.is_admin() => status,
        _ => default_status,
    };

    let now = db::now();
    let vehicle = Vehicle {
        id: None,
        brand: vehicle_data.brand.trim().to_string(),
        model: vehicle_data.model.trim().to_string(),
        year: vehicle_data.year,
        plate_number,
        color: vehicle_data.color,
        seats: vehicle_data.seats,
        transmission: vehicle_data.transmission,
        daily_rate: vehicle_data.daily_rate,
        location: vehicle_data.location,
        description: vehicle_data.description,
        status,
        owner_id,
        images: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    let result = db::vehicles(&db).insert_one(&vehicle, None).await?;
    log::info!("{} listed {} for owner {}", user.email, vehicle.display_name(), owner.email);

    Ok(HttpResponse::Created().json(json!({
        "message": "Vehicle created successfully",
        "id": result.inserted_id.as_object_id().map(|id| id.to_hex()),
    })))
}

pub fn vehicle_changes(update: &UpdateVehicleDto) -> Result<Document, AppError> {
    let mut set = Document::new();
    let text_fields = [
        ("brand", &update.brand),
        ("model", &update.model),
        ("color", &update.color),
        ("transmission", &update.transmission),
        ("location", &update.location),
        ("description", &update.description),
    ];
    for (name, value) in text_fields {
        if let Some(value) = value {
            set.insert(name, value.trim());
        }
    }
    if let Some(plate) = &update.plate_number {
        set.insert("plate_number", plate.trim().to_uppercase());
    }
    if let Some(year) = update.year {
        set.insert("year", year);
    }
    if let Some(seats) = update.seats {
        set.insert("seats", seats);
    }
    if let Some(rate) = update.daily_rate {
        set.insert("daily_rate", rate);
    }
    if set.is_empty() {
        return Err(AppError::bad_request("No changes supplied"));
    }
    set.insert("updated_at", db::now());
    Ok(set)
}

#[put("/vehicles/{id}")]
pub async fn update_vehicle(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<String>,
    update: web::Json<UpdateVehicleDto>,
) -> Result<HttpResponse, AppError> {
    let user = require_auth(&req.extensions())?;
    update.validate()?;

    let vehicle = find_vehicle(&db, &id).await?;
    ensure_can_manage(&user, &vehicle)?;

    let changes = vehicle_changes(&update)?;
    if let Ok(plate) = changes.get_str("plate_number") {
        let clash = db::vehicles(&db)
            .find_one(doc! { "plate_number": plate, "_id": { "$ne": vehicle.id } }, None)
            .await?;
        if clash.is_some() {
            return Err(AppError::Conflict(format!(
                "A vehicle with plate number {} already exists",
                plate
            )));
        }
    }

    db::vehicles(&db)
        .update_one(doc! { "_id": vehicle.id }, doc! { "$set": changes }, None)
        .await?;
    Ok(HttpResponse::Ok().json("Vehicle updated successfully"))
}

#[put("/vehicles/{id}/status")]
pub async fn update_vehicle_status(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<String>,
    status_data: web::Json<UpdateVehicleStatusDto>,
) -> Result<HttpResponse, AppError> {
    let user = require_auth(&req.extensions())?;
    let vehicle = find_vehicle(&db, &id).await?;
    ensure_can_manage(&user, &vehicle)?;

    let status = status_data.status;
    if !user.is_admin() && matches!(status, VehicleStatus::Verified | VehicleStatus::NotVerified) {
        return Err(AppError::forbidden("Only admins can change verification status"));
    }

    db::vehicles(&db)
        .update_one(
            doc! { "_id": vehicle.id },
            doc! { "$set": { "status": mongodb::bson::to_bson(&status)?, "updated_at": db::now() } },
            None,
        )
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Vehicle status updated", "status": status })))
}

#[post("/vehicles/{id}/images")]
pub async fn upload_vehicle_image(
    req: HttpRequest,
    db: web::Data<Database>,
    store: web::Data<ObjectStore>,
    config: web::Data<AppConfig>,
    id: web::Path<String>,
    upload: web::Json<Upload>,
) -> Result<HttpResponse, AppError> {
    let user = require_auth(&req.extensions())?;
    upload.validate()?;
    upload.require_image()?;

    let vehicle = find_vehicle(&db, &id).await?;
    ensure_can_manage(&user, &vehicle)?;
    let vehicle_id = vehicle.id.ok_or(AppError::NotFound("Vehicle"))?;

    let bytes = upload.decode(config.max_upload_bytes)?;
    let file_name = unique_file_name(&upload.file_name, db::now().timestamp_millis());
    let path = ObjectPath::vehicle_image(&vehicle.owner_id.to_hex(), &vehicle_id.to_hex(), &file_name)?;
    let url = store.put(&path, &bytes).await?;

    db::vehicles(&db)
        .update_one(
            doc! { "_id": vehicle_id },
            doc! { "$push": { "images": url.as_str() }, "$set": { "updated_at": db::now() } },
            None,
        )
        .await?;
    Ok(HttpResponse::Created().json(json!({ "url": url })))
}

#[delete("/vehicles/{id}/images")]
pub async fn remove_vehicle_image(
    req: HttpRequest,
    db: web::Data<Database>,
    store: web::Data<ObjectStore>,
    id: web::Path<String>,
    image: web::Json<RemoveImageDto>,
) -> Result<HttpResponse, AppError> {
    let user = require_auth(&req.extensions())?;
    let vehicle = find_vehicle(&db, &id).await?;
    ensure_can_manage(&user, &vehicle)?;

    if !vehicle.images.iter().any(|url| url == &image.url) {
        return Err(AppError::NotFound("Image"));
    }

    db::vehicles(&db)
        .update_one(
            doc! { "_id": vehicle.id },
            doc! { "$pull": { "images": image.url.as_str() }, "$set": { "updated_at": db::now() } },
            None,
        )
        .await?;
    store.discard_url(Some(&image.url)).await;

    Ok(HttpResponse::Ok().json("Image removed successfully"))
}

#[delete("/vehicles/{id}")]
pub async fn delete_vehicle(
    req: HttpRequest,
    db: web::Data<Database>,
    store: web::Data<ObjectStore>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let user = require_auth(&req.extensions())?;
    let vehicle = find_vehicle(&db, &id).await?;
    ensure_can_manage(&user, &vehicle)?;
    let vehicle_id: ObjectId = vehicle.id.ok_or(AppError::NotFound("Vehicle"))?;

    db::vehicles(&db)
        .delete_one(doc! { "_id": vehicle_id }, None)
        .await?;

    let dir = ObjectPath::vehicle_dir(&vehicle.owner_id.to_hex(), &vehicle_id.to_hex())?;
    if let Err(e) = store.delete_dir(&dir).await {
        log::warn!("Vehicle {} deleted but its images remain: {}", vehicle_id, e);
    }

    log::info!("{} deleted vehicle {}", user.email, vehicle.display_name());
    Ok(HttpResponse::Ok().json("Vehicle deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserRole;
    use mongodb::bson::DateTime;

    fn caller(role: UserRole, id: &ObjectId) -> AuthenticatedUser {
        AuthenticatedUser {
            id: id.to_hex(),
            email: "someone@example.com".to_string(),
            role,
        }
    }

    fn vehicle(owner_id: ObjectId) -> Vehicle {
        Vehicle {
            id: Some(ObjectId::new()),
            brand: "Toyota".to_string(),
            model: "Vios".to_string(),
            year: 2021,
            plate_number: "ABC 1234".to_string(),
            color: None,
            seats: Some(5),
            transmission: None,
            daily_rate: 1800.0,
            location: None,
            description: None,
            status: VehicleStatus::Available,
            owner_id,
            images: Vec::new(),
            created_at: DateTime::from_millis(0),
            updated_at: DateTime::from_millis(0),
        }
    }

    #[test]
    fn owners_manage_only_their_vehicles() {
        let owner = ObjectId::new();
        let stranger = ObjectId::new();
        let car = vehicle(owner);
        assert!(ensure_can_manage(&caller(UserRole::Owner, &owner), &car).is_ok());
        assert!(ensure_can_manage(&caller(UserRole::Owner, &stranger), &car).is_err());
        assert!(ensure_can_manage(&caller(UserRole::Admin, &stranger), &car).is_ok());
    }

    #[test]
    fn owner_listing_is_scoped_to_the_caller() {
        let owner = ObjectId::new();
        let query = VehicleQuery {
            status: Some(VehicleStatus::Rented),
            owner_id: Some(ObjectId::new().to_hex()),
        };
        let filter = vehicle_filter(&caller(UserRole::Owner, &owner), &query).unwrap();
        assert_eq!(filter.get_object_id("owner_id").unwrap(), owner);
        assert_eq!(filter.get_str("status").unwrap(), "Rented");
    }

    #[test]
    fn admin_listing_honours_owner_filter() {
        let wanted = ObjectId::new();
        let query = VehicleQuery {
            status: None,
            owner_id: Some(wanted.to_hex()),
        };
        let filter = vehicle_filter(&caller(UserRole::Admin, &ObjectId::new()), &query).unwrap();
        assert_eq!(filter.get_object_id("owner_id").unwrap(), wanted);
    }

    #[test]
    fn vehicle_changes_normalise_plate_and_require_something() {
        let update = UpdateVehicleDto {
            brand: None,
            model: None,
            year: None,
            plate_number: Some(" abc 1234 ".to_string()),
            color: None,
            seats: None,
            transmission: None,
            daily_rate: Some(2100.0),
            location: None,
            description: None,
        };
        let set = vehicle_changes(&update).unwrap();
        assert_eq!(set.get_str("plate_number").unwrap(), "ABC 1234");
        assert_eq!(set.get_f64("daily_rate").unwrap(), 2100.0);

        let empty = UpdateVehicleDto {
            plate_number: None,
            daily_rate: None,
            ..update
        };
        assert!(vehicle_changes(&empty).is_err());
    }
}
