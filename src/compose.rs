use docker_compose_types::{
    Compose, ComposeNetworks, ComposeVolume, DependsCondition, DependsOnOptions, Environment,
    Healthcheck, HealthcheckTest, Labels, MapOrEmpty, NetworkSettings, Networks, Ports, Service,
    Services, TopLevelVolumes, Volumes,
};
use indexmap::IndexMap;

use crate::app::App;
use crate::config::ResolvedConfig;
use crate::release::ReleaseManifest;

/// Render the two-service topology as `docker-compose.yml`.
///
/// Both services run the manifest's immutable image tags, so the
/// file itself pins the revision. The resolved runtime
/// configuration is injected into the API service environment; the
/// proxy carries no configuration beyond its mounted Caddyfile.
#[must_use]
pub fn render(api: &App, manifest: &ReleaseManifest, resolved: &ResolvedConfig) -> String {
    let mut services = IndexMap::new();
    services.insert("proxy".to_string(), Some(proxy_service(api, manifest)));
    services.insert(api.name.clone(), Some(api_service(api, manifest, resolved)));

    let compose = Compose {
        services: Services(services),
        volumes: top_level_volumes(api),
        networks: network(api),
        ..Default::default()
    };

    serde_yaml::to_string(&compose).expect("failed to serialize compose")
}

fn proxy_service(api: &App, manifest: &ReleaseManifest) -> Service {
    let mut depends = IndexMap::new();
    depends.insert(api.name.clone(), DependsCondition::service_healthy());

    Service {
        image: Some(manifest.proxy.image()),
        container_name: Some("proxy".to_string()),
        restart: Some("unless-stopped".to_string()),
        ports: Ports::Short(vec!["80:80".to_string(), "443:443".to_string()]),
        volumes: vec![
            Volumes::Simple("./Caddyfile:/etc/caddy/Caddyfile:ro".to_string()),
            Volumes::Simple("caddy-data:/data".to_string()),
            Volumes::Simple("caddy-config:/config".to_string()),
        ],
        depends_on: DependsOnOptions::Conditional(depends),
        networks: Networks::Simple(vec![net_name(api)]),
        ..Default::default()
    }
}

fn api_service(api: &App, manifest: &ReleaseManifest, resolved: &ResolvedConfig) -> Service {
    let expose: Vec<String> = api.expose.iter().map(ToString::to_string).collect();

    // Resolved configuration first; app-level env entries follow
    // but never shadow a resolved key.
    let mut env = resolved.to_env();
    for (key, value) in &api.env {
        if resolved.get(key).is_none() {
            env.push((key.clone(), value.clone()));
        }
    }
    let environment =
        Environment::List(env.iter().map(|(k, v)| format!("{k}={v}")).collect());

    let volumes: Vec<Volumes> = api
        .volumes
        .iter()
        .map(|(name, mount)| Volumes::Simple(format!("{name}:{mount}")))
        .collect();

    let healthcheck = api.healthcheck.as_ref().map(|cmd| Healthcheck {
        test: Some(HealthcheckTest::Multiple(vec![
            "CMD".to_string(),
            "sh".to_string(),
            "-c".to_string(),
            cmd.clone(),
        ])),
        interval: Some("30s".to_string()),
        timeout: Some("10s".to_string()),
        retries: 3,
        start_period: Some("10s".to_string()),
        ..Default::default()
    });

    Service {
        image: Some(manifest.api.image()),
        container_name: Some(api.name.clone()),
        restart: Some("unless-stopped".to_string()),
        expose,
        environment,
        volumes,
        healthcheck,
        networks: Networks::Simple(vec![net_name(api)]),
        ..Default::default()
    }
}

fn local_volume() -> ComposeVolume {
    ComposeVolume {
        driver: Some("local".to_string()),
        driver_opts: IndexMap::new(),
        external: None,
        labels: Labels::default(),
        name: None,
    }
}

fn top_level_volumes(api: &App) -> TopLevelVolumes {
    let mut vols = IndexMap::new();

    for (name, _) in &api.volumes {
        vols.insert(name.clone(), MapOrEmpty::Map(local_volume()));
    }

    let local = MapOrEmpty::Map(local_volume());
    vols.insert("caddy-data".to_string(), local.clone());
    vols.insert("caddy-config".to_string(), local);

    TopLevelVolumes(vols)
}

fn network(api: &App) -> ComposeNetworks {
    let mut nets = IndexMap::new();
    nets.insert(
        net_name(api),
        MapOrEmpty::Map(NetworkSettings {
            driver: Some("bridge".to_string()),
            ..Default::default()
        }),
    );
    ComposeNetworks(nets)
}

fn net_name(api: &App) -> String {
    format!("{}-net", api.name)
}
