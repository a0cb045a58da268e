use crate::app::{App, Upstream};
use crate::error::{DeployError, DeployResult};

/// Where a matched request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    /// Forward to an internal service address.
    Upstream(Upstream),
    /// Serve static files with a fallback entry document for
    /// client-side routing.
    Static { root: String, fallback: String },
}

/// One route table entry. An empty prefix is the catch-all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub prefix: String,
    pub target: RouteTarget,
}

impl Route {
    /// Whether this entry's prefix pattern covers a declared
    /// prefix. A trailing `*` in the pattern matches any suffix.
    #[must_use]
    pub fn covers(&self, declared: &str) -> bool {
        if self.prefix.is_empty() {
            return true;
        }
        let stem = self.prefix.strip_suffix('*').unwrap_or(&self.prefix);
        declared.starts_with(stem)
    }
}

/// The reverse proxy configuration, owning the route table.
///
/// Routes are matched in declaration order; declare specific
/// prefixes before the catch-all.
///
/// # Example
///
/// ```
/// use gantry::{App, Caddy};
///
/// let api = App::new("api").expose(8000).route_prefix("/api/");
///
/// let caddy = Caddy::new()
///     .route("/api/*", api.upstream())
///     .static_site("/srv/www", "/index.html")
///     .gzip();
///
/// assert!(caddy.validate_routes(&[api]).is_ok());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Caddy {
    pub routes: Vec<Route>,
    pub gzip: bool,
    pub security_headers: bool,
    pub extra_directives: Vec<String>,
}

impl Caddy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward requests matching `prefix` to an upstream.
    #[must_use]
    pub fn route(mut self, prefix: &str, upstream: Upstream) -> Self {
        self.routes.push(Route {
            prefix: prefix.to_string(),
            target: RouteTarget::Upstream(upstream),
        });
        self
    }

    /// Catch-all: serve static files from `root`, falling back to
    /// `fallback` for paths that do not exist on disk.
    #[must_use]
    pub fn static_site(mut self, root: &str, fallback: &str) -> Self {
        self.routes.push(Route {
            prefix: String::new(),
            target: RouteTarget::Static {
                root: root.to_string(),
                fallback: fallback.to_string(),
            },
        });
        self
    }

    #[must_use]
    pub const fn gzip(mut self) -> Self {
        self.gzip = true;
        self
    }

    #[must_use]
    pub const fn security_headers(mut self) -> Self {
        self.security_headers = true;
        self
    }

    #[must_use]
    pub fn directive(mut self, raw: &str) -> Self {
        self.extra_directives.push(raw.to_string());
        self
    }

    #[must_use]
    pub fn has_catch_all(&self) -> bool {
        self.routes
            .iter()
            .any(|r| r.prefix.is_empty() || r.prefix == "/*")
    }

    /// Startup-time route table validation: every prefix any app
    /// declares must be covered, and a catch-all must exist.
    /// A gap here would otherwise surface as a silent empty
    /// response at request time.
    pub fn validate_routes(&self, apps: &[App]) -> DeployResult<()> {
        for app in apps {
            for declared in &app.route_prefixes {
                // Catch-all entries do not count as coverage: the
                // fallback serves the entry document, it does not
                // forward API calls.
                let covered = self
                    .routes
                    .iter()
                    .filter(|r| !r.prefix.is_empty() && r.prefix != "/*")
                    .any(|r| r.covers(declared));
                if !covered {
                    return Err(DeployError::RoutingGap {
                        prefix: declared.clone(),
                    });
                }
            }
        }

        if !self.has_catch_all() {
            return Err(DeployError::NoCatchAll);
        }

        Ok(())
    }
}
