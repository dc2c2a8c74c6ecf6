use std::{
    future::{ready, Ready},
    rc::Rc,
    sync::Arc,
};

use actix_web::{
    dev::{forward_ready, Extensions, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    Error, HttpMessage,
};
use chrono::Utc;
use futures::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::{error::AppError, models::user::UserRole};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // account id (hex)
    pub email: String,
    pub role: UserRole,
    pub exp: usize,
}

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: String,
    pub role: UserRole,
}

impl AuthenticatedUser {
    pub fn object_id(&self) -> Result<ObjectId, AppError> {
        ObjectId::parse_str(&self.id).map_err(|_| AppError::unauthorized("Invalid session"))
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Clone)]
pub struct JwtKeys {
    secret: Arc<[u8]>,
    ttl_hours: i64,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            secret: Arc::from(secret.as_bytes()),
            ttl_hours,
        }
    }

    pub fn issue(&self, id: &ObjectId, email: &str, role: UserRole) -> Result<String, AppError> {
        let claims = Claims {
            sub: id.to_hex(),
            email: email.to_string(),
            role,
            exp: (Utc::now().timestamp() + self.ttl_hours * 3600) as usize,
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )?)
    }

    pub fn validate(&self, token: &str) -> Result<TokenData<Claims>, AppError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::default(),
        )
        .map_err(|_| AppError::unauthorized("Invalid token"))
    }
}

fn bearer_token(req: &ServiceRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|auth_header| auth_header.to_str().ok())
        .and_then(|auth_str| auth_str.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

/// Attaches an [`AuthenticatedUser`] to requests carrying a valid bearer token.
///
/// Requests without a token pass through untouched so public routes keep
/// working; handlers decide with [`require_auth`] / [`require_admin`]. An
/// invalid token leaves the request anonymous, so a client holding a stale
/// token can still sign in, while protected handlers answer 401.
pub struct Authentication {
    keys: JwtKeys,
}

impl Authentication {
    pub fn new(keys: JwtKeys) -> Self {
        Self { keys }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthenticationMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthenticationMiddleware {
            service: Rc::new(service),
            keys: self.keys.clone(),
        }))
    }
}

pub struct AuthenticationMiddleware<S> {
    service: Rc<S>,
    keys: JwtKeys,
}

impl<S, B> Service<ServiceRequest> for AuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(token) = bearer_token(&req) {
            match self.keys.validate(&token) {
                Ok(data) => {
                    req.extensions_mut().insert(AuthenticatedUser {
                        id: data.claims.sub,
                        email: data.claims.email,
                        role: data.claims.role,
                    });
                }
                Err(e) => {
                    log::debug!("Ignoring bearer token on {}: {}", req.path(), e);
                    req.extensions_mut().insert(RejectedToken);
                }
            }
        }

        let service = Rc::clone(&self.service);
        Box::pin(async move { service.call(req).await })
    }
}

/// Marks a request whose bearer token failed validation.
#[derive(Debug, Clone, Copy)]
struct RejectedToken;

pub fn get_current_user(extensions: &Extensions) -> Option<AuthenticatedUser> {
    extensions.get::<AuthenticatedUser>().cloned()
}

// Helper function to require authentication and get user
pub fn require_auth(extensions: &Extensions) -> Result<AuthenticatedUser, AppError> {
    get_current_user(extensions).ok_or_else(|| {
        if extensions.get::<RejectedToken>().is_some() {
            AppError::unauthorized("Invalid or expired token")
        } else {
            AppError::unauthorized("Authentication required")
        }
    })
}

// Helper function to require admin role
pub fn require_admin(extensions: &Extensions) -> Result<AuthenticatedUser, AppError> {
    let user = require_auth(extensions)?;
    if user.is_admin() {
        Ok(user)
    } else {
        Err(AppError::forbidden("Admin access required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{get, http::StatusCode, test, App, HttpRequest, HttpResponse};

    #[get("/me")]
    async fn me(req: HttpRequest) -> Result<HttpResponse, AppError> {
        let user = require_auth(&req.extensions())?;
        Ok(HttpResponse::Ok().body(user.email))
    }

    #[get("/public")]
    async fn public() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    #[get("/admin-only")]
    async fn admin_only(req: HttpRequest) -> Result<HttpResponse, AppError> {
        let admin = require_admin(&req.extensions())?;
        Ok(HttpResponse::Ok().body(admin.email))
    }

    fn keys() -> JwtKeys {
        JwtKeys::new("test-secret", 1)
    }

    #[actix_web::test]
    async fn missing_token_reaches_handler_as_anonymous() {
        let app = test::init_service(
            App::new()
                .wrap(Authentication::new(keys()))
                .service(me),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/me").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn valid_token_identifies_the_caller() {
        let app = test::init_service(
            App::new()
                .wrap(Authentication::new(keys()))
                .service(me)
                .service(admin_only),
        )
        .await;
        let token = keys()
            .issue(&ObjectId::new(), "owner@example.com", UserRole::Owner)
            .unwrap();

        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "owner@example.com");

        let req = test::TestRequest::get()
            .uri("/admin-only")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn token_signed_with_another_secret_is_rejected() {
        let app = test::init_service(
            App::new()
                .wrap(Authentication::new(keys()))
                .service(me)
                .service(public),
        )
        .await;
        let forged = JwtKeys::new("other-secret", 1)
            .issue(&ObjectId::new(), "admin@example.com", UserRole::Admin)
            .unwrap();

        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", forged)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Invalid or expired token");

        // Public routes stay reachable with a stale token.
        let req = test::TestRequest::get()
            .uri("/public")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", forged)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
