use caddyfile_rs::{Caddyfile, Directive, SiteBlock, format};

use crate::caddy::{Caddy, RouteTarget};

/// Render the route table to a complete Caddyfile for the given
/// site address.
///
/// Prefixed upstream routes render as path-matched
/// `reverse_proxy` directives, which preserve the Host and
/// X-Forwarded-* headers toward the upstream. The static
/// catch-all renders as `root` + `try_files` + `file_server` so
/// unknown paths serve the entry document instead of erroring.
#[must_use]
pub fn render(caddy: &Caddy, site: &str) -> String {
    let mut block = SiteBlock::new(site);

    for route in &caddy.routes {
        match &route.target {
            RouteTarget::Upstream(upstream) => {
                if route.prefix.is_empty() {
                    block = block.reverse_proxy(&upstream.to_string());
                } else {
                    block = block.directive(Directive::new(&format!(
                        "reverse_proxy {} {upstream}",
                        route.prefix
                    )));
                }
            }
            RouteTarget::Static { root, fallback } => {
                block = block.directive(Directive::new(&format!("root * {root}")));
                block = block.directive(Directive::new(&format!(
                    "try_files {{path}} {fallback}"
                )));
                block = block.directive(Directive::new("file_server"));
            }
        }
    }

    if caddy.gzip {
        block = block.encode_gzip();
    }

    if caddy.security_headers {
        block = block.security_headers();
    }

    for d in &caddy.extra_directives {
        block = block.directive(Directive::new(d));
    }

    let caddyfile = Caddyfile::new().site(block);
    format(&caddyfile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;

    fn two_tier() -> Caddy {
        let api = App::new("api").expose(8000);
        Caddy::new()
            .route("/api/*", api.upstream())
            .static_site("/srv/www", "/index.html")
    }

    #[test]
    fn api_prefix_is_forwarded() {
        let result = render(&two_tier(), "demo.example.com");

        assert!(result.contains("demo.example.com {"));
        assert!(result.contains("reverse_proxy /api/* api:8000"));
    }

    #[test]
    fn unknown_paths_fall_back_to_entry_document() {
        let result = render(&two_tier(), "demo.example.com");

        assert!(result.contains("root * /srv/www"));
        assert!(result.contains("try_files {path} /index.html"));
        assert!(result.contains("file_server"));
    }

    #[test]
    fn route_order_is_preserved() {
        let result = render(&two_tier(), "demo.example.com");

        let proxy_at = result.find("reverse_proxy /api/*").unwrap();
        let root_at = result.find("root *").unwrap();
        assert!(proxy_at < root_at);
    }

    #[test]
    fn bare_address_site() {
        let result = render(&two_tier(), "203.0.113.10");

        assert!(result.contains("203.0.113.10 {"));
    }

    #[test]
    fn gzip_and_headers() {
        let caddy = two_tier().gzip().security_headers();

        let result = render(&caddy, "demo.example.com");

        assert!(result.contains("encode gzip"));
        assert!(result.contains("X-Frame-Options"));
    }

    #[test]
    fn extra_directives() {
        let caddy = two_tier().directive("log").directive("tls internal");

        let result = render(&caddy, "local.dev");

        assert!(result.contains("\tlog"));
        assert!(result.contains("\ttls internal"));
    }
}
