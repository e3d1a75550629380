use actix_web::web;
use serde::Serialize;

pub mod routes {
    pub mod available;
    pub mod demo;
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub endpoint: &'static str,
    pub description: &'static str,
}

/// Everything reachable behind the gatekeeper. `name` is the identifier used
/// in key and plan scopes.
pub const SERVICES: &[ServiceInfo] = &[
    ServiceInfo {
        name: "weather",
        endpoint: "/api/v1/weather",
        description: "Get weather data",
    },
    ServiceInfo {
        name: "currency",
        endpoint: "/api/v1/currency",
        description: "Currency exchange rates",
    },
    ServiceInfo {
        name: "random-fact",
        endpoint: "/api/v1/random-fact",
        description: "Get random facts",
    },
    ServiceInfo {
        name: "ip-lookup",
        endpoint: "/api/v1/ip-lookup",
        description: "IP geolocation lookup",
    },
];

/// Public catalogue, no credentials needed.
pub fn mount_catalogue() -> actix_web::Scope {
    web::scope("/services").service(routes::available::get_available)
}

/// The protected handlers. Mount under the gatekeeper.
pub fn mount_v1() -> actix_web::Scope {
    web::scope("/v1")
        .service(routes::demo::get_weather)
        .service(routes::demo::get_currency)
        .service(routes::demo::get_random_fact)
        .service(routes::demo::get_ip_lookup)
}
