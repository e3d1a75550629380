use std::{future::Future, pin::Pin, rc::Rc, sync::Arc};

use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use common::{
    error::AppError,
    jwt::{self, JwtClaims},
};
use db::{
    Store,
    models::user::{Role, User},
};
use futures::future::{Ready, ok};

/// Guards the management surface.
///
/// Expects the extraction middleware to have parked `Res<JwtClaims>` in the
/// request extensions. The account behind the token must still exist and be
/// active; when `require_admin` is set its stored role must be admin. On
/// success the authoritative `User` and `JwtClaims` are inserted for
/// `web::ReqData` extraction.
pub struct AuthMiddleware {
    store: Arc<dyn Store>,
    require_admin: bool,
}

impl AuthMiddleware {
    pub fn new(store: Arc<dyn Store>, require_admin: bool) -> Self {
        AuthMiddleware {
            store,
            require_admin,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Rc::new(service),
            store: self.store.clone(),
            require_admin: self.require_admin,
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    store: Arc<dyn Store>,
    require_admin: bool,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let claims = match jwt::get_jwt_claims_or_error(&req) {
            Ok(claims) => claims,
            Err(response) => {
                return Box::pin(async move { Ok(req.into_response(response)) });
            }
        };

        let store = self.store.clone();
        let require_admin = self.require_admin;
        let srv = Rc::clone(&self.service);

        Box::pin(async move {
            let user = match authorize(&*store, &claims, require_admin).await {
                Ok(user) => user,
                Err(e) => return Ok(req.into_response(e.to_http_response())),
            };

            // the stored role wins over whatever the token was minted with
            let claims = JwtClaims {
                role: user.role.as_str().to_string(),
                ..claims
            };
            req.extensions_mut().insert(claims);
            req.extensions_mut().insert(user);

            srv.call(req).await.map(|res| res.map_into_boxed_body())
        })
    }
}

async fn authorize(
    store: &dyn Store,
    claims: &JwtClaims,
    require_admin: bool,
) -> Result<User, AppError> {
    let user = store
        .get_user_by_id(claims.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Unknown account".to_string()))?;

    if !user.is_active {
        log::info!("Suspended account {} tried the management API", user.id);
        return Err(AppError::Forbidden("Account is suspended".to_string()));
    }
    if require_admin && user.role != Role::Admin {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }
    Ok(user)
}
