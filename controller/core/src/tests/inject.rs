use super::*;
use crate::{check, inject, tokenx, MissingArtifact, Scope};

fn orders_scope(tokenx: bool) -> Scope {
    Scope::from_config(mk_config("ns1", "orders-sec", "orders", tokenx))
}

fn init_containers(pod: &Pod) -> Vec<Container> {
    pod.spec
        .as_ref()
        .and_then(|s| s.init_containers.clone())
        .unwrap_or_default()
}

fn container<'p>(pod: &'p Pod, name: &str) -> &'p Container {
    pod.spec
        .as_ref()
        .unwrap()
        .containers
        .iter()
        .find(|c| c.name == name)
        .unwrap()
}

#[test]
fn injects_sidecar_and_url() {
    let pod = mk_pod("ns1", Some("orders"));
    let injected = inject(&pod, &orders_scope(true));

    let init = init_containers(&injected);
    assert_eq!(init.len(), 1);
    let sidecar = &init[0];
    assert_eq!(sidecar.name, "texas");
    assert_eq!(sidecar.image.as_deref(), Some("ghcr.io/nais/texas:latest"));
    assert_eq!(sidecar.restart_policy.as_deref(), Some("Always"));
    assert_eq!(
        sidecar
            .ports
            .iter()
            .flatten()
            .map(|p| p.container_port)
            .collect::<Vec<_>>(),
        vec![3000]
    );
    let env = sidecar
        .env
        .iter()
        .flatten()
        .map(|v| (v.name.as_str(), v.value.as_deref().unwrap_or_default()))
        .collect::<Vec<_>>();
    assert_eq!(
        env,
        vec![
            ("TOKEN_X_ENABLED", "true"),
            ("MASKINPORTEN_ENABLED", "false"),
            ("AZURE_ENABLED", "false"),
            ("IDPORTEN_ENABLED", "false"),
        ]
    );
    let env_from = serde_json::to_value(&sidecar.env_from).unwrap();
    assert_eq!(
        env_from,
        serde_json::json!([{ "secretRef": { "name": "orders-sec-jwker-secret" } }])
    );

    let app = container(&injected, "orders");
    let url = app
        .env
        .iter()
        .flatten()
        .filter(|v| v.name == tokenx::URL_ENV_VAR)
        .collect::<Vec<_>>();
    assert_eq!(url.len(), 1);
    assert_eq!(url[0].value.as_deref(), Some("http://localhost:3000"));

    // Other containers are left alone.
    assert_eq!(container(&injected, "istio-proxy").env, None);
}

#[test]
fn leaves_input_untouched() {
    let pod = mk_pod("ns1", Some("orders"));
    let before = pod.clone();
    let _ = inject(&pod, &orders_scope(true));
    assert_eq!(pod, before);
}

#[test]
fn tokenx_disabled_is_a_no_op() {
    let pod = mk_pod("ns1", Some("orders"));
    assert_eq!(inject(&pod, &orders_scope(false)), pod);

    let mut sc = mk_config("ns1", "orders-sec", "orders", false);
    sc.spec.tokenx = None;
    assert_eq!(inject(&pod, &Scope::from_config(sc)), pod);
}

#[test]
fn injection_is_idempotent() {
    let pod = mk_pod("ns1", Some("orders"));
    let scope = orders_scope(true);
    let once = inject(&pod, &scope);
    let twice = inject(&once, &scope);
    assert_eq!(once, twice);
    assert_eq!(init_containers(&twice).len(), 1);
}

#[test]
fn repairs_stale_artifacts_in_place() {
    let mut pod = mk_pod("ns1", Some("orders"));
    {
        let spec = pod.spec.as_mut().unwrap();
        spec.init_containers = Some(vec![
            Container {
                name: "migrate".to_string(),
                ..Default::default()
            },
            Container {
                name: "texas".to_string(),
                image: Some("ghcr.io/nais/texas:old".to_string()),
                ..Default::default()
            },
        ]);
        spec.containers[0].env = Some(vec![accesserator_controller_k8s_api::EnvVar {
            name: "TEXAS_URL".to_string(),
            value: Some("http://localhost:1".to_string()),
            ..Default::default()
        }]);
    }

    let injected = inject(&pod, &orders_scope(true));
    let init = init_containers(&injected);
    assert_eq!(
        init.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        vec!["migrate", "texas"]
    );
    assert_eq!(init[1].image.as_deref(), Some(tokenx::IMAGE));
    let env = container(&injected, "orders").env.clone().unwrap();
    assert_eq!(env.len(), 1);
    assert_eq!(env[0].value.as_deref(), Some("http://localhost:3000"));
}

#[test]
fn injected_pods_validate() {
    let scope = orders_scope(true);
    let pod = mk_pod("ns1", Some("orders"));
    assert!(check(&inject(&pod, &scope), &scope).is_ok());
}

#[test]
fn rejects_sidecar_without_url() {
    let scope = orders_scope(true);
    let mut pod = inject(&mk_pod("ns1", Some("orders")), &scope);
    pod.spec.as_mut().unwrap().containers[0].env = None;

    let error = check(&pod, &scope).expect_err("must reject");
    assert_eq!(
        error,
        MissingArtifact::UrlEnvVar {
            container: "orders".to_string()
        }
    );
    assert_eq!(
        error.to_string(),
        "TokenX is enabled but container 'orders' is missing environment variable 'TEXAS_URL'"
    );
}

#[test]
fn rejects_url_without_sidecar() {
    let scope = orders_scope(true);
    let mut pod = inject(&mk_pod("ns1", Some("orders")), &scope);
    pod.spec.as_mut().unwrap().init_containers = Some(vec![]);

    let error = check(&pod, &scope).expect_err("must reject");
    assert_eq!(error, MissingArtifact::Sidecar);
    assert_eq!(
        error.to_string(),
        "TokenX is enabled but init container 'texas' is missing"
    );
}

#[test]
fn rejects_missing_application_container() {
    let scope = Scope::from_config(mk_config("ns1", "orders-sec", "billing", true));
    let pod = inject(&mk_pod("ns1", Some("orders")), &scope);

    assert_eq!(
        check(&pod, &scope),
        Err(MissingArtifact::UrlEnvVar {
            container: "billing".to_string()
        })
    );
}

#[test]
fn disabled_scope_accepts_anything() {
    let scope = orders_scope(false);
    assert_eq!(check(&mk_pod("ns1", Some("orders")), &scope), Ok(()));
}
