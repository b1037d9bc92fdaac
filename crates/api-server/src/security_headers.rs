use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};

/// Generated reports inline their styles, import web fonts and embed charts
/// as SVG, so they get a looser policy than the JSON API.
const REPORT_CSP: &str = "default-src 'none'; style-src 'self' 'unsafe-inline' https://fonts.googleapis.com; \
font-src https://fonts.gstatic.com; img-src 'self' data:; frame-ancestors 'self'";
const API_CSP: &str = "default-src 'none'; frame-ancestors 'none'";

fn is_report_path(path: &str) -> bool {
    path == "/reports" || path.starts_with("/reports/")
}

fn apply(headers: &mut HeaderMap, report: bool) {
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-xss-protection", HeaderValue::from_static("0"));
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    if report {
        headers.insert("x-frame-options", HeaderValue::from_static("SAMEORIGIN"));
        headers.insert("content-security-policy", HeaderValue::from_static(REPORT_CSP));
        // Reports are overwritten in place when regenerated.
        headers.insert("cache-control", HeaderValue::from_static("no-cache"));
    } else {
        headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
        headers.insert("content-security-policy", HeaderValue::from_static(API_CSP));
        headers.insert("cache-control", HeaderValue::from_static("no-store"));
    }
}

pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let report = is_report_path(request.uri().path());
    let mut response = next.run(request).await;
    apply(response.headers_mut(), report);
    response
}
