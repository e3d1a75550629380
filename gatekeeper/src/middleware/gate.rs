use std::{future::Future, pin::Pin, rc::Rc, sync::Arc};

use actix_web::{
    Error, HttpMessage,
    body::BoxBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use common::key::ApiKeyHeader;
use futures::future::{Ready, ok};

use crate::pipeline::{Gatekeeper, Handled};

/// Puts the gatekeeper in front of a scope of protected handlers.
///
/// The endpoint identifier is the path segment after `v1`, so
/// `/api/v1/weather?city=Paris` is checked against the `weather` scope.
/// The credential comes from the `ApiKeyHeader` the extraction middleware
/// parked in the request; without one the call is rejected as malformed.
pub struct GateMiddleware {
    gatekeeper: Arc<Gatekeeper>,
}

impl GateMiddleware {
    pub fn new(gatekeeper: Arc<Gatekeeper>) -> Self {
        Self { gatekeeper }
    }
}

impl<S, B> Transform<S, ServiceRequest> for GateMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = GateMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(GateMiddlewareService {
            service: Rc::new(service),
            gatekeeper: self.gatekeeper.clone(),
        })
    }
}

pub struct GateMiddlewareService<S> {
    service: Rc<S>,
    gatekeeper: Arc<Gatekeeper>,
}

/// Why a forwarded call did not succeed.
enum DownstreamFailure<B> {
    /// The handler answered with a 4xx/5xx; handed back to the caller as is.
    Status(ServiceResponse<B>),
    Error(Error),
}

impl<S, B> Service<ServiceRequest> for GateMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let endpoint = endpoint_of(req.path());
        let token = req
            .extensions()
            .get::<ApiKeyHeader>()
            .map(|header| header.0.clone())
            .unwrap_or_default();

        let gatekeeper = self.gatekeeper.clone();
        let srv = Rc::clone(&self.service);

        Box::pin(async move {
            let admission = match gatekeeper.authenticate(&token, &endpoint).await {
                Ok(Ok(admission)) => admission,
                Ok(Err(rejection)) => return Ok(req.into_response(rejection.to_http_response())),
                Err(e) => return Ok(req.into_response(e.to_http_response())),
            };

            // No clone of the request may be alive while the scope routes it.
            req.extensions_mut().insert(admission.clone());

            let call = async move {
                match srv.call(req).await {
                    Ok(res) if res.status().is_client_error() || res.status().is_server_error() => {
                        Err(DownstreamFailure::Status(res))
                    }
                    Ok(res) => Ok(res),
                    Err(e) => Err(DownstreamFailure::Error(e)),
                }
            };

            // Failures without a response in hand go back as errors and are
            // rendered by actix.
            match gatekeeper.forward(&admission, call).await? {
                Handled::Completed(res) | Handled::Failed(DownstreamFailure::Status(res)) => {
                    Ok(res.map_into_boxed_body())
                }
                Handled::Failed(DownstreamFailure::Error(e)) => Err(e),
                Handled::Rejected(rejection) => Err(rejection.into()),
            }
        })
    }
}

/// `/api/v1/currency/latest` -> `currency`.
fn endpoint_of(path: &str) -> String {
    path.split('/')
        .skip_while(|segment| *segment != "v1")
        .nth(1)
        .unwrap_or_default()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_segment_after_version() {
        assert_eq!(endpoint_of("/api/v1/weather"), "weather");
        assert_eq!(endpoint_of("/api/v1/Random-Fact/extra"), "random-fact");
        assert_eq!(endpoint_of("/api/v1"), "");
        assert_eq!(endpoint_of("/api/dashboard/keys"), "");
    }
}
