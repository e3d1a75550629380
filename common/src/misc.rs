/// Service scopes: an empty list means every service.
pub fn scope_allows(scopes: &[String], endpoint: &str) -> bool {
    scopes.is_empty() || scopes.iter().any(|service| service == endpoint)
}

/// Trims, lowercases and de-duplicates service identifiers.
pub fn normalize_scopes(scopes: Vec<String>) -> Vec<String> {
    let mut normalized: Vec<String> = scopes
        .into_iter()
        .map(|service| service.trim().to_lowercase())
        .filter(|service| !service.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}
