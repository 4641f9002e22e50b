use crate::{naming, tokenx, Scope};
use accesserator_controller_k8s_api::{
    Container, ContainerPort, EnvFromSource, EnvVar, Pod, SecretEnvSource,
};

/// Returns `pod` with the token exchange sidecar injected as `scope` requires.
///
/// Injection is idempotent: a sidecar or URL variable that is already present
/// is replaced in place rather than appended again.
pub fn inject(pod: &Pod, scope: &Scope) -> Pod {
    let mut pod = pod.clone();
    if !scope.tokenx_enabled() {
        return pod;
    }

    if let Some(spec) = pod.spec.as_mut() {
        let sidecar = sidecar(scope);
        let init = spec.init_containers.get_or_insert_with(Vec::new);
        match init.iter_mut().find(|c| c.name == tokenx::CONTAINER_NAME) {
            Some(existing) => *existing = sidecar,
            None => init.push(sidecar),
        }

        for container in spec
            .containers
            .iter_mut()
            .filter(|c| c.name == scope.app_name)
        {
            set_env(container, tokenx::URL_ENV_VAR, tokenx::local_url());
        }
    }

    pod
}

fn sidecar(scope: &Scope) -> Container {
    let secret = naming::jwker_secret_name(&naming::jwker_name(&scope.config_name()));
    Container {
        name: tokenx::CONTAINER_NAME.to_string(),
        image: Some(tokenx::IMAGE.to_string()),
        ports: Some(vec![ContainerPort {
            container_port: tokenx::PORT,
            ..Default::default()
        }]),
        restart_policy: Some(tokenx::RESTART_ALWAYS.to_string()),
        env: Some(
            tokenx::FEATURE_FLAGS
                .iter()
                .map(|(name, value)| EnvVar {
                    name: name.to_string(),
                    value: Some(value.to_string()),
                    ..Default::default()
                })
                .collect(),
        ),
        env_from: Some(vec![EnvFromSource {
            secret_ref: Some(SecretEnvSource {
                name: secret,
                ..Default::default()
            }),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn set_env(container: &mut Container, name: &str, value: String) {
    let var = EnvVar {
        name: name.to_string(),
        value: Some(value),
        ..Default::default()
    };
    let env = container.env.get_or_insert_with(Vec::new);
    match env.iter_mut().find(|v| v.name == name) {
        Some(existing) => *existing = var,
        None => env.push(var),
    }
}
