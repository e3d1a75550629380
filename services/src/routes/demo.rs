use actix_web::{Responder, get, web};
use common::{error::Res, http::Success};
use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
struct Weather {
    city: String,
    temp: i32,
    condition: &'static str,
}

const WEATHER: &[(&str, i32, &str)] = &[
    ("New York", 72, "Sunny"),
    ("London", 58, "Cloudy"),
    ("Tokyo", 68, "Rainy"),
    ("Sydney", 82, "Clear"),
    ("Paris", 65, "Partly Cloudy"),
];

/// Units per USD.
const RATES: &[(&str, f64)] = &[
    ("USD", 1.0),
    ("EUR", 0.85),
    ("GBP", 0.73),
    ("JPY", 110.0),
    ("AUD", 1.35),
    ("CAD", 1.25),
    ("CHF", 0.92),
    ("CNY", 6.45),
    ("INR", 74.5),
    ("MXN", 20.1),
];

const FACTS: &[&str] = &[
    "Honey never spoils.",
    "Octopuses have three hearts.",
    "Bananas are berries, but strawberries aren't.",
    "A day on Venus is longer than a year on Venus.",
    "The Eiffel Tower can grow 6 inches in summer.",
];

#[derive(Deserialize)]
pub struct WeatherQuery {
    city: Option<String>,
}

#[derive(Deserialize)]
pub struct CurrencyQuery {
    base: Option<String>,
    target: Option<String>,
}

#[derive(Deserialize)]
pub struct IpQuery {
    ip: Option<String>,
}

fn known_weather(&(city, temp, condition): &(&str, i32, &'static str)) -> Weather {
    Weather {
        city: city.to_string(),
        temp,
        condition,
    }
}

fn rate_of(code: &str) -> f64 {
    RATES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, rate)| *rate)
        .unwrap_or(1.0)
}

#[get("/weather")]
pub async fn get_weather(query: web::Query<WeatherQuery>) -> Res<impl Responder> {
    let mut rng = rand::thread_rng();
    let weather = match query.city.as_deref() {
        Some(city) => WEATHER
            .iter()
            .find(|(known, _, _)| known.eq_ignore_ascii_case(city))
            .map(known_weather)
            .unwrap_or_else(|| Weather {
                city: city.to_string(),
                temp: rng.gen_range(50..=90),
                condition: ["Sunny", "Cloudy", "Rainy"]
                    .choose(&mut rng)
                    .copied()
                    .unwrap_or("Sunny"),
            }),
        None => WEATHER
            .choose(&mut rng)
            .map(known_weather)
            .unwrap_or_else(|| known_weather(&WEATHER[0])),
    };
    Success::ok(weather)
}

/// Unknown currency codes are priced like USD.
#[get("/currency")]
pub async fn get_currency(query: web::Query<CurrencyQuery>) -> Res<impl Responder> {
    let base = query.base.as_deref().unwrap_or("USD").to_uppercase();
    let target = query.target.as_deref().unwrap_or("EUR").to_uppercase();
    let rate = rate_of(&target) / rate_of(&base);

    Success::ok(serde_json::json!({
        "base": base,
        "target": target,
        "rate": (rate * 10_000.0).round() / 10_000.0,
    }))
}

#[get("/random-fact")]
pub async fn get_random_fact() -> Res<impl Responder> {
    let fact = FACTS.choose(&mut rand::thread_rng()).copied().unwrap_or(FACTS[0]);
    Success::ok(serde_json::json!({ "fact": fact }))
}

/// Canned answer; there is no geolocation database behind it.
#[get("/ip-lookup")]
pub async fn get_ip_lookup(query: web::Query<IpQuery>) -> Res<impl Responder> {
    Success::ok(serde_json::json!({
        "ip": query.ip.as_deref().unwrap_or("8.8.8.8"),
        "country": "United States",
        "city": "Mountain View",
        "isp": "Google LLC",
        "timezone": "America/Los_Angeles",
    }))
}
