use crate::{
    admission::{Admission, AdmissionMetrics},
    core::Target,
    k8s::{self, Resource},
    lease, reconcile,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use tokio::{sync::mpsc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

// The maximum number of NetworkPolicy updates buffered between the index and
// the controller. A full queue drops updates until the next resync.
const UPDATE_QUEUE_SIZE: usize = 1_000;

#[derive(Debug, Parser)]
#[clap(
    name = "accesserator",
    about = "Injects and enforces TokenX sidecars for SecurityConfig workloads"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "accesserator=info,warn",
        env = "ACCESSERATOR_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Disables the admission controller server.
    #[clap(long)]
    admission_controller_disabled: bool,

    /// Namespace the controller runs in. Derived NetworkPolicies and the
    /// leader-election Lease live here.
    #[clap(long, default_value = "accesserator-system")]
    controller_namespace: String,

    #[clap(long, default_value = "accesserator-controller")]
    controller_deployment_name: String,

    /// Value of the `app` label on the TokenX service's pods.
    #[clap(long, default_value = "tokenx")]
    tokenx_name: String,

    #[clap(long, default_value = "10")]
    reconcile_period_secs: u64,

    #[clap(long, default_value = "5000")]
    patch_timeout_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            server,
            admission_controller_disabled,
            controller_namespace,
            controller_deployment_name,
            tokenx_name,
            reconcile_period_secs,
            patch_timeout_ms,
        } = self;

        let server = if admission_controller_disabled {
            None
        } else {
            Some(server)
        };

        let mut prom = <Registry>::default();
        let admission_metrics = AdmissionMetrics::register(prom.sub_registry_with_prefix("admission"));
        let reconcile_reg = prom.sub_registry_with_prefix("reconcile");
        let controller_metrics = reconcile::ControllerMetrics::register(reconcile_reg);
        let index_metrics = reconcile::IndexMetrics::register(reconcile_reg);
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_optional_server(server)
            .build()
            .await?;

        let hostname =
            std::env::var("HOSTNAME").context("failed to read the HOSTNAME environment variable")?;

        let claims = lease::init(
            &runtime,
            &controller_namespace,
            &controller_deployment_name,
            &hostname,
        )
        .await?;

        // Store calls are abandoned once the process starts shutting down.
        let cancel = CancellationToken::new();
        let shutdown = runtime.shutdown_handle();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                let _release = shutdown.signaled().await;
                info!("Shutting down");
                cancel.cancel();
            }
        });

        if !api_resource_exists::<k8s::Application>(&runtime.client()).await {
            tracing::warn!(
                "applications.skiperator.kartverket.no resource kind not found; \
                 Pods labelled with an app name will fail lookup and be denied by validation"
            );
        }

        let target = Target {
            namespace: controller_namespace.clone(),
            tokenx_name,
        };
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_QUEUE_SIZE);
        let index = reconcile::Index::shared(
            hostname,
            claims,
            updates_tx,
            target,
            index_metrics,
        );

        let configs = runtime.watch_all::<k8s::SecurityConfig>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), configs)
                .instrument(info_span!("securityconfigs")),
        );

        tokio::spawn(
            reconcile::Index::run(index, Duration::from_secs(reconcile_period_secs))
                .instrument(info_span!("reconcile_index")),
        );

        let controller = reconcile::Controller::new(
            runtime.client(),
            controller_namespace,
            updates_rx,
            Duration::from_millis(patch_timeout_ms),
            cancel.clone(),
            controller_metrics,
        );
        tokio::spawn(
            controller
                .run()
                .instrument(info_span!("reconcile_controller")),
        );

        let store = runtime.client();
        let runtime =
            runtime.spawn_server(move || Admission::new(store, cancel, admission_metrics));

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

async fn api_resource_exists<T>(client: &k8s::Client) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    client
        .list_api_group_resources(&T::api_version(&dt))
        .await
        .ok()
        .iter()
        .flat_map(|r| r.resources.iter())
        .any(|r| r.kind == T::kind(&dt))
}
