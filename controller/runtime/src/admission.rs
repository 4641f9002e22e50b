use crate::{
    core::{self, Resolution},
    k8s::{ConfigLookup, Pod, ResourceExt},
};
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use kube::core::{admission::Operation, DynamicObject};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Serves the Pod defaulting (`/mutate`) and validating (`/validate`)
/// webhooks.
#[derive(Clone)]
pub struct Admission<S> {
    store: S,
    cancel: CancellationToken,
    metrics: AdmissionMetrics,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug)]
pub struct AdmissionMetrics {
    requests: Family<RequestLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RequestLabels {
    hook: &'static str,
    outcome: &'static str,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Hook {
    Mutate,
    Validate,
}

type Review = kube::core::admission::AdmissionReview<Pod>;
type AdmissionRequest = kube::core::admission::AdmissionRequest<Pod>;
type AdmissionResponse = kube::core::admission::AdmissionResponse;
type AdmissionReview = kube::core::admission::AdmissionReview<DynamicObject>;

type Body = http_body_util::Full<bytes::Bytes>;

// === impl Admission ===

impl<S> tower::Service<Request<hyper::body::Incoming>> for Admission<S>
where
    S: ConfigLookup + Clone + 'static,
{
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<hyper::body::Incoming>) -> Self::Future {
        trace!(?req);
        let hook = match Hook::from_path(req.uri().path()) {
            Some(hook) if req.method() == http::Method::POST => hook,
            _ => {
                return Box::pin(future::ok(
                    Response::builder()
                        .status(http::StatusCode::NOT_FOUND)
                        .body(Body::default())
                        .expect("not found response must be valid"),
                ))
            }
        };

        let admission = self.clone();
        Box::pin(async move {
            let bytes = req.into_body().collect().await?.to_bytes();
            let rsp = admission.review(hook, &bytes).await;
            json_response(rsp.into_review())
        })
    }
}

impl<S: ConfigLookup> Admission<S> {
    pub fn new(store: S, cancel: CancellationToken, metrics: AdmissionMetrics) -> Self {
        Self {
            store,
            cancel,
            metrics,
        }
    }

    /// Decodes an `AdmissionReview` body and answers it.
    async fn review(&self, hook: Hook, body: &[u8]) -> AdmissionResponse {
        let review: Review = match serde_json::from_slice(body) {
            Ok(review) => review,
            Err(error) => {
                warn!(%error, "Failed to parse request body");
                self.metrics.record(hook, "invalid");
                return AdmissionResponse::invalid(error);
            }
        };
        trace!(?review);

        let rsp = match review.try_into() {
            Ok(req) => {
                debug!(?req);
                self.admit(hook, req).await
            }
            Err(error) => {
                warn!(%error, "Invalid admission request");
                self.metrics.record(hook, "invalid");
                AdmissionResponse::invalid(error)
            }
        };
        debug!(?rsp);
        rsp
    }

    async fn admit(&self, hook: Hook, req: AdmissionRequest) -> AdmissionResponse {
        if !is_pod(&req) {
            self.metrics.record(hook, "invalid");
            return AdmissionResponse::invalid(format_args!(
                "unsupported resource type: {}.{}.{}",
                req.kind.group, req.kind.version, req.kind.kind
            ));
        }

        let rsp = AdmissionResponse::from(&req);
        if !matches!(req.operation, Operation::Create | Operation::Update) {
            self.metrics.record(hook, "allowed");
            return rsp;
        }
        let Some(pod) = req.object else {
            self.metrics.record(hook, "allowed");
            return rsp;
        };
        // Pods created through a controller may not carry a namespace yet.
        let ns = pod
            .namespace()
            .or(req.namespace)
            .unwrap_or_else(|| "default".to_string());

        match hook {
            Hook::Mutate => self.mutate(rsp, &ns, pod).await,
            Hook::Validate => self.validate(rsp, &ns, pod).await,
        }
    }

    /// Injects the TokenX sidecar. Defaulting never blocks admission: failures
    /// are logged and the Pod is admitted unchanged.
    async fn mutate(&self, rsp: AdmissionResponse, ns: &str, pod: Pod) -> AdmissionResponse {
        let scope = match core::resolve(&self.store, ns, &pod, &self.cancel).await {
            Ok(Resolution::Enabled(scope)) if scope.tokenx_enabled() => scope,
            Ok(_) => {
                self.metrics.record(Hook::Mutate, "allowed");
                return rsp;
            }
            Err(error) => {
                warn!(%error, %ns, pod = %pod.name_any(), "Skipping sidecar injection");
                self.metrics.record(Hook::Mutate, "error");
                return rsp;
            }
        };

        let mutated = core::inject(&pod, &scope);
        let patch = match (serde_json::to_value(&pod), serde_json::to_value(&mutated)) {
            (Ok(orig), Ok(mutated)) => json_patch::diff(&orig, &mutated),
            (Err(error), _) | (_, Err(error)) => {
                warn!(%error, %ns, "Failed to encode Pod");
                self.metrics.record(Hook::Mutate, "error");
                return rsp;
            }
        };
        if patch.is_empty() {
            self.metrics.record(Hook::Mutate, "allowed");
            return rsp;
        }

        info!(
            %ns,
            pod = %pod.name_any(),
            config = %scope.config_name(),
            "Injecting TokenX sidecar"
        );
        match rsp.clone().with_patch(patch) {
            Ok(rsp) => {
                self.metrics.record(Hook::Mutate, "patched");
                rsp
            }
            Err(error) => {
                warn!(%error, %ns, "Failed to encode patch");
                self.metrics.record(Hook::Mutate, "error");
                rsp
            }
        }
    }

    async fn validate(&self, rsp: AdmissionResponse, ns: &str, pod: Pod) -> AdmissionResponse {
        match core::validate::admit(&self.store, ns, &pod, &self.cancel).await {
            Ok(()) => {
                self.metrics.record(Hook::Validate, "allowed");
                rsp
            }
            Err(error) => {
                info!(%error, %ns, pod = %pod.name_any(), "Denied");
                self.metrics.record(Hook::Validate, "denied");
                rsp.deny(error)
            }
        }
    }
}

fn is_pod(req: &AdmissionRequest) -> bool {
    req.kind.group.is_empty() && req.kind.kind.eq_ignore_ascii_case("Pod")
}

fn json_response(rsp: AdmissionReview) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(&rsp)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("admission review response must be valid"))
}

// === impl Hook ===

impl Hook {
    fn from_path(path: &str) -> Option<Self> {
        match path {
            "/mutate" => Some(Self::Mutate),
            "/validate" => Some(Self::Validate),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Mutate => "mutate",
            Self::Validate => "validate",
        }
    }
}

// === impl AdmissionMetrics ===

impl AdmissionMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let requests = Family::default();
        reg.register(
            "requests",
            "Count of admission reviews by hook and outcome",
            requests.clone(),
        );
        Self { requests }
    }

    fn record(&self, hook: Hook, outcome: &'static str) {
        self.requests
            .get_or_create(&RequestLabels {
                hook: hook.as_str(),
                outcome,
            })
            .inc();
    }
}
