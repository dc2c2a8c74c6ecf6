use actix_web::{get, post, web, HttpMessage, HttpRequest, HttpResponse};
use bcrypt::verify;
use chrono::Utc;
use mongodb::{bson::doc, Database};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::{
    db,
    error::AppError,
    middleware::auth::{require_auth, AuthenticatedUser, JwtKeys},
    models::{
        account::{role_mismatch_message, Account},
        user::{LoginDto, UserRole},
    },
    services::login_guard::{FailureOutcome, LoginGuard},
};

#[derive(Serialize)]
struct AuthResponse {
    token: String,
    user: Value,
}

#[derive(Deserialize)]
pub struct LockoutQuery {
    pub email: String,
}

/// Looks the email up in `admins` first, then `users`.
pub async fn find_account(db: &Database, email: &str) -> Result<Option<Account>, AppError> {
    let filter = db::email_filter(email);

    if let Some(admin) = db::admins(db).find_one(filter.clone(), None).await? {
        return Ok(Some(Account::Admin(admin)));
    }

    Ok(db::users(db)
        .find_one(filter, None)
        .await?
        .map(Account::User))
}

/// Re-reads the signed-in account from the collection its role points at.
pub async fn load_session_account(
    db: &Database,
    auth_user: &AuthenticatedUser,
) -> Result<Account, AppError> {
    let id = auth_user.object_id()?;
    let account = match auth_user.role {
        UserRole::Admin => db::admins(db)
            .find_one(doc! { "_id": id }, None)
            .await?
            .map(Account::Admin),
        UserRole::Owner => db::users(db)
            .find_one(doc! { "_id": id }, None)
            .await?
            .map(Account::User),
    };

    account
        .filter(|account| account.role() == auth_user.role)
        .ok_or_else(|| AppError::unauthorized("Session is no longer valid. Please log in again."))
}

fn failure_error(outcome: FailureOutcome) -> AppError {
    match outcome {
        FailureOutcome::Blocked { duration } => AppError::TooManyAttempts {
            message: outcome.message(),
            retry_after_secs: duration.num_seconds(),
        },
        FailureOutcome::Warned { .. } => AppError::Unauthorized(outcome.message()),
    }
}

#[post("/auth/login")]
pub async fn login(
    db: web::Data<Database>,
    guard: web::Data<LoginGuard>,
    keys: web::Data<JwtKeys>,
    login_data: web::Json<LoginDto>,
) -> Result<HttpResponse, AppError> {
    login_data.validate()?;

    let key = LoginGuard::key(&login_data.email);
    let ticket = guard
        .begin_attempt(&key, Utc::now())
        .await
        .map_err(|blocked| AppError::TooManyAttempts {
            message: blocked.message(),
            retry_after_secs: blocked.remaining_secs(),
        })?;

    // Unknown emails and wrong passwords count alike and share one message.
    let account = match find_account(&db, &login_data.email).await? {
        Some(account) if verify(&login_data.password, account.password_hash()).unwrap_or(false) => {
            account
        }
        _ => return Err(failure_error(guard.record_failure(ticket))),
    };

    // A correct password clears the counter even if the role is wrong.
    guard.record_success(ticket).await;

    if let Some(message) = role_mismatch_message(account.role(), login_data.role) {
        return Err(AppError::Forbidden(message));
    }

    let id = account
        .id()
        .copied()
        .ok_or_else(|| AppError::unauthorized("Account has no ID"))?;
    let token = keys.issue(&id, account.email(), account.role())?;
    log::info!("{} signed in as {:?}", account.email(), account.role());

    Ok(HttpResponse::Ok().json(AuthResponse {
        token,
        user: account.into_json(),
    }))
}

#[get("/auth/lockout")]
pub async fn lockout_status(
    guard: web::Data<LoginGuard>,
    query: web::Query<LockoutQuery>,
) -> HttpResponse {
    let status = guard
        .status(&LoginGuard::key(&query.email), Utc::now())
        .await;
    HttpResponse::Ok().json(status)
}

#[get("/auth/session")]
pub async fn session(req: HttpRequest, db: web::Data<Database>) -> Result<HttpResponse, AppError> {
    let auth_user = require_auth(&req.extensions())?;
    let account = load_session_account(&db, &auth_user).await?;
    Ok(HttpResponse::Ok().json(account.into_json()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::login_guard::{AttemptRecord, LockoutPolicy};
    use actix_web::{http::StatusCode, test, App};
    use chrono::Duration;
    use mongodb::Client;

    async fn lazy_database() -> Database {
        // No server is contacted until the first operation.
        Client::with_uri_str("mongodb://127.0.0.1:1")
            .await
            .unwrap()
            .database("fleet_admin_test")
    }

    #[actix_web::test]
    async fn blocked_account_is_refused_before_any_lookup() {
        let guard = web::Data::new(LoginGuard::new(LockoutPolicy::default()));
        guard
            .seed(
                "owner@example.com",
                AttemptRecord {
                    attempts: 5,
                    block_end: Some(Utc::now() + Duration::seconds(45)),
                },
            )
            .await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_database().await))
                .app_data(guard.clone())
                .app_data(web::Data::new(JwtKeys::new("secret", 1)))
                .service(login)
                .service(lockout_status),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(serde_json::json!({
                "email": "Owner@Example.com",
                "password": "whatever",
                "role": "owner",
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Account temporarily blocked. Try again in 0:4"));
        assert!(body["retry_after_secs"].as_i64().unwrap() <= 45);

        let req = test::TestRequest::get()
            .uri("/auth/lockout?email=owner@example.com")
            .to_request();
        let status: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(status["blocked"], true);
        assert_eq!(status["attempts"], 5);
    }

    #[actix_web::test]
    async fn invalid_payload_is_rejected_before_the_guard() {
        let guard = web::Data::new(LoginGuard::new(LockoutPolicy::default()));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_database().await))
                .app_data(guard.clone())
                .app_data(web::Data::new(JwtKeys::new("secret", 1)))
                .service(login),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(serde_json::json!({
                "email": "not-an-email",
                "password": "",
                "role": "admin",
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(guard.status("not-an-email", Utc::now()).await.attempts, 0);
    }
}
