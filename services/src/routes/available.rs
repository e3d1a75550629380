use actix_web::{Responder, get};
use common::{error::Res, http::Success};
use serde::Serialize;

use crate::{SERVICES, ServiceInfo};

#[derive(Serialize)]
struct Catalogue {
    services: &'static [ServiceInfo],
}

#[get("/available")]
pub async fn get_available() -> Res<impl Responder> {
    Success::ok(Catalogue { services: SERVICES })
}
