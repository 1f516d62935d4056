use {
    axum::http::{HeaderMap, header::AUTHORIZATION},
    secrecy::{ExposeSecret, Secret},
};

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Constant-time string comparison (prevents timing attacks).
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let diff = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}

// ── Bearer check ─────────────────────────────────────────────────────────────

/// Whether the request carries `Authorization: Bearer <expected>`.
///
/// With no token configured every request is allowed.
pub fn bearer_authorized(headers: &HeaderMap, expected: Option<&Secret<String>>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    let Some(given) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    match given.strip_prefix("Bearer ") {
        Some(token) => safe_equal(token, expected.expose_secret()),
        None => false,
    }
}
