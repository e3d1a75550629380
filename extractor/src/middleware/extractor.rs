use std::{future::Future, pin::Pin, rc::Rc};

use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use futures::future::{Ready, ok};

use common::{
    error::Res,
    jwt::{self, JwtClaims},
    key::ApiKeyHeader,
};

pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Pulls credentials out of the headers and parks them in the request
/// extensions: `Res<JwtClaims>` for a bearer token, `ApiKeyHeader` for an
/// API key. Nothing is rejected here.
pub struct ExtractionMiddleware {
    jwt_secret: Rc<str>,
}

impl ExtractionMiddleware {
    pub fn new(jwt_secret: &str) -> Self {
        Self {
            jwt_secret: Rc::from(jwt_secret),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ExtractionMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = ExtractionMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(ExtractionMiddlewareService {
            service: Rc::new(service),
            jwt_secret: self.jwt_secret.clone(),
        })
    }
}

pub struct ExtractionMiddlewareService<S> {
    service: Rc<S>,
    jwt_secret: Rc<str>,
}

impl<S, B> Service<ServiceRequest> for ExtractionMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // retrieve token from authorization header
        let auth_header = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|auth_value| auth_value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_owned());
        // raw "prefix.secret"; validated by the gatekeeper
        let api_key = req
            .headers()
            .get(API_KEY_HEADER)
            .map(|v| v.to_str().unwrap_or_default().trim().to_string());

        let jwt_secret = self.jwt_secret.clone();
        let srv = Rc::clone(&self.service);

        Box::pin(async move {
            if let Some(token) = auth_header {
                let claims_res = jwt::validate_jwt(&token, &jwt_secret);
                req.extensions_mut().insert::<Res<JwtClaims>>(claims_res);
            }
            if let Some(key) = api_key {
                req.extensions_mut().insert(ApiKeyHeader(key));
            }
            srv.call(req).await.map(|res| res.map_into_boxed_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, HttpRequest, HttpResponse, test, web};
    use common::jwt::{ROLE_CLIENT, testing};

    async fn echo(req: HttpRequest) -> HttpResponse {
        let extensions = req.extensions();
        let user = match extensions.get::<Res<JwtClaims>>() {
            Some(Ok(claims)) => claims.user_id.to_string(),
            Some(Err(_)) => "invalid".to_string(),
            None => "none".to_string(),
        };
        let key = extensions
            .get::<ApiKeyHeader>()
            .map(|header| header.0.clone())
            .unwrap_or_default();
        HttpResponse::Ok().body(format!("{}|{}", user, key))
    }

    #[actix_web::test]
    async fn credentials_land_in_extensions() {
        let user_id = uuid::Uuid::new_v4();
        let token = testing::mint(user_id, ROLE_CLIENT, "extract-secret");

        let app = test::init_service(
            App::new()
                .wrap(ExtractionMiddleware::new("extract-secret"))
                .route("/", web::get().to(echo)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .insert_header((API_KEY_HEADER, "abcd1234.secret"))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, format!("{}|abcd1234.secret", user_id).as_bytes());

        let req = test::TestRequest::get()
            .uri("/")
            .insert_header(("Authorization", "Bearer garbage"))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "invalid|".as_bytes());
    }
}
