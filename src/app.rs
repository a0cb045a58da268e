use std::fmt;

/// Defines one component container: build inputs, environment,
/// volumes, health check, exposed ports, and the URL prefixes it
/// answers on.
///
/// # Example
///
/// ```
/// use gantry::App;
///
/// let api = App::new("api")
///     .context("backend")
///     .dockerfile("backend/Dockerfile")
///     .route_prefix("/api/")
///     .healthcheck("curl -f http://localhost:8000/api/hello/")
///     .expose(8000);
///
/// assert_eq!(api.name, "api");
/// assert_eq!(api.upstream().to_string(), "api:8000");
/// ```
#[derive(Debug, Clone)]
pub struct App {
    pub name: String,
    pub context: String,
    pub dockerfile: String,
    pub platform: String,
    pub build_args: Vec<(String, String)>,
    pub env: Vec<(String, String)>,
    pub volumes: Vec<(String, String)>,
    pub expose: Vec<u16>,
    pub healthcheck: Option<String>,
    pub route_prefixes: Vec<String>,
}

/// Internal address of a service, as the proxy reaches it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub service: String,
    pub port: u16,
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.port)
    }
}

impl App {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            context: ".".to_string(),
            dockerfile: "Dockerfile".to_string(),
            platform: "linux/amd64".to_string(),
            build_args: Vec::new(),
            env: Vec::new(),
            volumes: Vec::new(),
            expose: Vec::new(),
            healthcheck: None,
            route_prefixes: Vec::new(),
        }
    }

    /// Build context directory, relative to the working tree.
    #[must_use]
    pub fn context(mut self, dir: &str) -> Self {
        self.context = dir.to_string();
        self
    }

    #[must_use]
    pub fn dockerfile(mut self, path: &str) -> Self {
        self.dockerfile = path.to_string();
        self
    }

    #[must_use]
    pub fn platform(mut self, platform: &str) -> Self {
        self.platform = platform.to_string();
        self
    }

    #[must_use]
    pub fn build_arg(mut self, key: &str, value: &str) -> Self {
        self.build_args.push((key.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn volume(mut self, name: &str, mount: &str) -> Self {
        self.volumes.push((name.to_string(), mount.to_string()));
        self
    }

    #[must_use]
    pub fn expose(mut self, port: u16) -> Self {
        self.expose.push(port);
        self
    }

    #[must_use]
    pub fn healthcheck(mut self, cmd: &str) -> Self {
        self.healthcheck = Some(cmd.to_string());
        self
    }

    /// Declare a URL prefix this component answers on. Activation
    /// refuses to proceed unless the route table covers every
    /// declared prefix.
    #[must_use]
    pub fn route_prefix(mut self, prefix: &str) -> Self {
        self.route_prefixes.push(prefix.to_string());
        self
    }

    /// Address of this component on the internal network, using
    /// the first exposed port.
    #[must_use]
    pub fn upstream(&self) -> Upstream {
        Upstream {
            service: self.name.clone(),
            port: self.expose.first().copied().unwrap_or(80),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let app = App::new("api");

        assert_eq!(app.name, "api");
        assert_eq!(app.context, ".");
        assert_eq!(app.dockerfile, "Dockerfile");
        assert_eq!(app.platform, "linux/amd64");
        assert!(app.build_args.is_empty());
        assert!(app.env.is_empty());
        assert!(app.volumes.is_empty());
        assert!(app.expose.is_empty());
        assert!(app.healthcheck.is_none());
        assert!(app.route_prefixes.is_empty());
    }

    #[test]
    fn upstream_uses_first_exposed_port() {
        let app = App::new("api").expose(8000).expose(9090);

        assert_eq!(
            app.upstream(),
            Upstream {
                service: "api".into(),
                port: 8000
            }
        );
    }

    #[test]
    fn upstream_without_expose_defaults_to_80() {
        assert_eq!(App::new("web").upstream().port, 80);
    }
}
