mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;

use std::io;

use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use handlers::{
    auth::{lockout_status, login, session},
    dashboard::dashboard,
    files::serve_file,
    notifications::{
        create_notification, delete_notification, list_notifications, mark_all_read, mark_read,
    },
    profile::{change_password, get_profile, update_profile, upload_profile_image},
    rentals::{
        delete_rental, export_rentals_csv, get_rental, list_rentals, mark_overdue, rental_summary,
        update_rental_status,
    },
    reviews::{delete_review, list_reviews, review_summary},
    settings::{get_settings, update_settings, upload_logo},
    users::{
        archive_user, create_admin, create_owner, delete_user, get_user, list_admins, list_users,
        owner_eligibility, update_user, update_user_status, upload_document,
    },
    vehicles::{
        create_vehicle, delete_vehicle, get_vehicle, list_vehicles, remove_vehicle_image,
        update_vehicle, update_vehicle_status, upload_vehicle_image,
    },
};
use middleware::{Authentication, JwtKeys};
use services::{
    login_guard::{LockoutPolicy, LoginGuard},
    storage::ObjectStore,
};

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = config::AppConfig::from_env()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let database = config::init_database(&config)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    let keys = JwtKeys::new(&config.jwt_secret, config.jwt_ttl_hours);
    let store = web::Data::new(ObjectStore::new(
        config.storage_root.clone(),
        config.public_base_url.clone(),
    ));

    let mut policy = LockoutPolicy::default();
    policy.reset_on_expiry = config.login_reset_on_expiry;
    // Shared across workers so every worker sees the same attempt counts.
    let login_guard = web::Data::new(LoginGuard::new(policy));

    // base64 inflates uploads by a third, plus the JSON envelope.
    let json_limit = config.max_upload_bytes * 4 / 3 + 64 * 1024;

    // 1 request per second with a burst of 60
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(1)
        .burst_size(60)
        .finish()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid rate limit configuration"))?;

    let bind = (config.host.clone(), config.port);
    log::info!("Starting server on {}:{}", bind.0, bind.1);
    let config = web::Data::new(config);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&config.frontend_url)
            .allow_any_method()
            .allow_any_header();

        // The last wrap runs first: Cors sees every response, including 401s and 429s.
        App::new()
            .wrap(Authentication::new(keys.clone()))
            .wrap(Governor::new(&governor_conf))
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(web::Data::new(database.clone()))
            .app_data(web::Data::new(keys.clone()))
            .app_data(login_guard.clone())
            .app_data(store.clone())
            .app_data(config.clone())
            .app_data(web::JsonConfig::default().limit(json_limit))
            .service(
                web::scope("/api")
                    .service(login)
                    .service(lockout_status)
                    .service(session)
                    .service(dashboard)
                    .service(list_vehicles)
                    .service(get_vehicle)
                    .service(create_vehicle)
                    .service(update_vehicle)
                    .service(update_vehicle_status)
                    .service(upload_vehicle_image)
                    .service(remove_vehicle_image)
                    .service(delete_vehicle)
                    .service(list_users)
                    .service(create_owner)
                    .service(get_user)
                    .service(update_user)
                    .service(update_user_status)
                    .service(owner_eligibility)
                    .service(archive_user)
                    .service(delete_user)
                    .service(upload_document)
                    .service(list_admins)
                    .service(create_admin)
                    .service(list_rentals)
                    .service(mark_overdue)
                    .service(get_rental)
                    .service(update_rental_status)
                    .service(delete_rental)
                    .service(rental_summary)
                    .service(export_rentals_csv)
                    .service(list_notifications)
                    .service(create_notification)
                    .service(mark_all_read)
                    .service(mark_read)
                    .service(delete_notification)
                    .service(review_summary)
                    .service(list_reviews)
                    .service(delete_review)
                    .service(get_settings)
                    .service(update_settings)
                    .service(upload_logo)
                    .service(get_profile)
                    .service(update_profile)
                    .service(change_password)
                    .service(upload_profile_image)
                    .service(serve_file),
            )
    })
    .bind(bind)?
    .run()
    .await
}
