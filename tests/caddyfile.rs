use caddyfile_rs::{parse, tokenize};
use gantry::caddyfile;
use gantry::{App, Caddy};

fn two_tier() -> Caddy {
    let api = App::new("api").expose(8000);
    Caddy::new()
        .route("/api/*", api.upstream())
        .static_site("/srv/www", "/index.html")
}

#[test]
fn routing_contract() {
    // Requests to /api/* reach the API upstream; every other path
    // serves static content with the entry-document fallback.
    let result = caddyfile::render(&two_tier(), "demo.example.com");

    assert!(result.contains("demo.example.com {"));
    assert!(result.contains("reverse_proxy /api/* api:8000"));
    assert!(result.contains("root * /srv/www"));
    assert!(result.contains("try_files {path} /index.html"));
    assert!(result.contains("file_server"));
}

#[test]
fn api_route_precedes_fallback() {
    let result = caddyfile::render(&two_tier(), "demo.example.com");

    let proxy_at = result.find("reverse_proxy /api/*").unwrap();
    let root_at = result.find("root * /srv/www").unwrap();
    assert!(proxy_at < root_at);
}

#[test]
fn bare_address_as_site() {
    let result = caddyfile::render(&two_tier(), "203.0.113.10");

    assert!(result.contains("203.0.113.10 {"));
}

#[test]
fn gzip_and_security_headers() {
    let caddy = two_tier().gzip().security_headers();

    let result = caddyfile::render(&caddy, "demo.example.com");

    assert!(result.contains("encode gzip"));
    assert!(result.contains("X-Content-Type-Options \"nosniff\""));
    assert!(result.contains("X-Frame-Options \"DENY\""));
}

#[test]
fn extra_directives_pass_through() {
    let caddy = two_tier().directive("log").directive("tls internal");

    let result = caddyfile::render(&caddy, "local.dev");

    assert!(result.contains("\tlog"));
    assert!(result.contains("\ttls internal"));
}

#[test]
fn unprefixed_upstream_route() {
    let web = App::new("web").expose(3000);
    let caddy = Caddy::new().route("", web.upstream());

    let result = caddyfile::render(&caddy, "spa.dev");

    assert!(result.contains("reverse_proxy web:3000"));
}

#[test]
fn rendered_upstream_site_parses_back() {
    let web = App::new("web").expose(3000);
    let caddy = Caddy::new().route("", web.upstream()).gzip();

    let result = caddyfile::render(&caddy, "spa.dev");

    let tokens = tokenize(&result).expect("tokenize failed");
    let parsed = parse(&tokens).expect("parse failed");
    assert_eq!(parsed.sites.len(), 1);
}
