//! Resource templates for the children of a [`VsCode`](crate::types::VsCode).
//!
//! Everything here is pure: a descriptor spec and a [`RuntimeConfig`] go in,
//! fully formed objects come out. Nothing is submitted to the cluster and no
//! owner reference is set; linking ownership is the reconciler's job.
//!
//! Child names are fixed and independent of the descriptor, so a namespace
//! can host at most one workload.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvFromSource, HTTPGetAction, Pod, PodSpec, Probe,
    ResourceRequirements, SecretEnvSource, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::config::RuntimeConfig;
use crate::istio::{
    ClientTlsSettings, Destination, DestinationRule, DestinationRuleSpec, HttpMatchRequest,
    HttpRoute, HttpRouteDestination, PortSelector, StringMatch, TlsMode, TrafficPolicy,
    VirtualService, VirtualServiceSpec,
};
use crate::types::VsCodeSpec;

pub const POD_NAME: &str = "pod";
pub const CONTAINER_NAME: &str = "vscode";
pub const SECRET_NAME: &str = "secret";
pub const UI_SERVICE_NAME: &str = "ui";
pub const API_SERVICE_NAME: &str = "api";
pub const ROUTING_NAME: &str = "vscode";

pub const SERVICE_PORT: i32 = 80;
pub const UI_TARGET_PORT: i32 = 3000;
pub const API_TARGET_PORT: i32 = 3190;

const STARTUP_COMMAND: &str = "/startup.sh";
const BASE_PATH_FLAG: &str = "--server-base-path";
const HEALTH_PATH: &str = "/api/healthz";
const APP_LABEL: &str = "app";

const PROBE_INITIAL_DELAY_SECS: i32 = 30;
const PROBE_TIMEOUT_SECS: i32 = 5;
const PROBE_PERIOD_SECS: i32 = 5;
const PROBE_SUCCESS_THRESHOLD: i32 = 1;
const PROBE_FAILURE_THRESHOLD: i32 = 120;

/// TLS mode toward the UI service.
///
/// Traffic from the ingress gateway to the UI service travels in plain text.
/// This assumes the hop never leaves a trusted cluster network; revisit it if
/// the mesh spans untrusted links.
pub const UI_TLS_MODE: TlsMode = TlsMode::Disable;

/// The children a descriptor may own, in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChildKind {
    Pod,
    UiService,
    ApiService,
    VirtualService,
    DestinationRule,
}

impl ChildKind {
    /// Creation order. A kind is only created once every earlier kind exists.
    pub const ORDER: [Self; 5] = [
        Self::Pod,
        Self::UiService,
        Self::ApiService,
        Self::VirtualService,
        Self::DestinationRule,
    ];

    /// Fixed object name within the descriptor's namespace.
    pub const fn object_name(self) -> &'static str {
        match self {
            Self::Pod => POD_NAME,
            Self::UiService => UI_SERVICE_NAME,
            Self::ApiService => API_SERVICE_NAME,
            Self::VirtualService | Self::DestinationRule => ROUTING_NAME,
        }
    }

    /// Whether the kind belongs to the optional routing layer.
    pub const fn is_routing(self) -> bool {
        matches!(self, Self::VirtualService | Self::DestinationRule)
    }

    /// Kinds wanted under the given configuration, in creation order.
    pub fn desired(config: &RuntimeConfig) -> impl Iterator<Item = Self> {
        let routing = config.routing_enabled();
        Self::ORDER
            .into_iter()
            .filter(move |kind| routing || !kind.is_routing())
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Pod => "Pod",
            Self::UiService | Self::ApiService => "Service",
            Self::VirtualService => "VirtualService",
            Self::DestinationRule => "DestinationRule",
        };
        write!(f, "{kind}/{}", self.object_name())
    }
}

/// A fully formed child object ready to be submitted.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildResource {
    Pod(Pod),
    Service(ChildKind, Service),
    VirtualService(VirtualService),
    DestinationRule(DestinationRule),
}

impl ChildResource {
    /// Which child this is.
    pub const fn kind(&self) -> ChildKind {
        match self {
            Self::Pod(_) => ChildKind::Pod,
            Self::Service(kind, _) => *kind,
            Self::VirtualService(_) => ChildKind::VirtualService,
            Self::DestinationRule(_) => ChildKind::DestinationRule,
        }
    }

    pub const fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Pod(pod) => &pod.metadata,
            Self::Service(_, service) => &service.metadata,
            Self::VirtualService(vs) => &vs.metadata,
            Self::DestinationRule(dr) => &dr.metadata,
        }
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::Pod(pod) => &mut pod.metadata,
            Self::Service(_, service) => &mut service.metadata,
            Self::VirtualService(vs) => &mut vs.metadata,
            Self::DestinationRule(dr) => &mut dr.metadata,
        }
    }

    /// Make `owner` the controlling owner, for cascading deletion.
    pub fn set_owner(&mut self, owner: OwnerReference) {
        self.metadata_mut().owner_references = Some(vec![owner]);
    }

    /// Controlling owner, if linked.
    pub fn owner(&self) -> Option<&OwnerReference> {
        self.metadata()
            .owner_references
            .as_deref()
            .and_then(|refs| refs.iter().find(|r| r.controller == Some(true)))
    }
}

/// Build the object for `kind`.
///
/// Returns `None` for routing kinds when routing is disabled.
pub fn build(
    kind: ChildKind,
    namespace: &str,
    spec: &VsCodeSpec,
    config: &RuntimeConfig,
) -> Option<ChildResource> {
    match kind {
        ChildKind::Pod => Some(ChildResource::Pod(workload_pod(namespace, spec, config))),
        ChildKind::UiService => Some(ChildResource::Service(
            kind,
            service(namespace, UI_SERVICE_NAME, UI_TARGET_PORT),
        )),
        ChildKind::ApiService => Some(ChildResource::Service(
            kind,
            service(namespace, API_SERVICE_NAME, API_TARGET_PORT),
        )),
        ChildKind::VirtualService => config.routing_gateway.as_deref().map(|gateway| {
            ChildResource::VirtualService(virtual_service(
                namespace,
                spec,
                &config.root_domain,
                gateway,
            ))
        }),
        ChildKind::DestinationRule => config
            .routing_enabled()
            .then(|| ChildResource::DestinationRule(destination_rule(namespace))),
    }
}

/// Workload pod running the editor.
pub fn workload_pod(namespace: &str, spec: &VsCodeSpec, config: &RuntimeConfig) -> Pod {
    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(config.container_image.clone()),
        command: Some(vec![STARTUP_COMMAND.to_string()]),
        args: Some(vec![BASE_PATH_FLAG.to_string(), spec.derived_path()]),
        resources: Some(ResourceRequirements {
            requests: Some(resource_list("0.5", "1Gi")),
            limits: Some(resource_list("1", "2Gi")),
            ..ResourceRequirements::default()
        }),
        env_from: Some(vec![EnvFromSource {
            secret_ref: Some(SecretEnvSource {
                name: SECRET_NAME.to_string(),
                ..SecretEnvSource::default()
            }),
            ..EnvFromSource::default()
        }]),
        ports: Some(vec![
            container_port("http-ui", UI_TARGET_PORT),
            container_port("http-api", API_TARGET_PORT),
        ]),
        readiness_probe: Some(health_probe()),
        liveness_probe: Some(health_probe()),
        ..Container::default()
    };

    Pod {
        metadata: child_meta(namespace, POD_NAME, Some(POD_NAME)),
        spec: Some(PodSpec {
            containers: vec![container],
            ..PodSpec::default()
        }),
        ..Pod::default()
    }
}

/// Cluster-internal service forwarding [`SERVICE_PORT`] to `target_port` on
/// the workload pod.
pub fn service(namespace: &str, name: &str, target_port: i32) -> Service {
    Service {
        metadata: child_meta(namespace, name, Some(name)),
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: SERVICE_PORT,
                target_port: Some(IntOrString::Int(target_port)),
                ..ServicePort::default()
            }]),
            selector: Some(app_label(POD_NAME)),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

/// Routing rule sending the derived path on `root_domain` to the UI service.
pub fn virtual_service(
    namespace: &str,
    spec: &VsCodeSpec,
    root_domain: &str,
    gateway: &str,
) -> VirtualService {
    let mut vs = VirtualService::new(
        ROUTING_NAME,
        VirtualServiceSpec {
            hosts: vec![root_domain.to_string()],
            gateways: vec![gateway.to_string()],
            http: vec![HttpRoute {
                matches: vec![HttpMatchRequest {
                    uri: Some(StringMatch::Prefix(spec.derived_path())),
                }],
                route: vec![HttpRouteDestination {
                    destination: Destination {
                        host: ui_service_host(namespace),
                        port: Some(PortSelector {
                            number: SERVICE_PORT.unsigned_abs(),
                        }),
                    },
                }],
            }],
        },
    );
    vs.metadata = child_meta(namespace, ROUTING_NAME, None);
    vs
}

/// Traffic policy toward the UI service; see [`UI_TLS_MODE`].
pub fn destination_rule(namespace: &str) -> DestinationRule {
    let mut dr = DestinationRule::new(
        ROUTING_NAME,
        DestinationRuleSpec {
            host: ui_service_host(namespace),
            traffic_policy: Some(TrafficPolicy {
                tls: Some(ClientTlsSettings { mode: UI_TLS_MODE }),
            }),
        },
    );
    dr.metadata = child_meta(namespace, ROUTING_NAME, None);
    dr
}

/// Fully qualified in-cluster host of the UI service.
pub fn ui_service_host(namespace: &str) -> String {
    format!("{UI_SERVICE_NAME}.{namespace}.svc.cluster.local")
}

/// Probe policy shared by readiness and liveness.
///
/// 120 failures at a 5s period lets the workload stay unhealthy for ten
/// minutes before the kubelet acts.
fn health_probe() -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(HEALTH_PATH.to_string()),
            port: IntOrString::Int(API_TARGET_PORT),
            ..HTTPGetAction::default()
        }),
        initial_delay_seconds: Some(PROBE_INITIAL_DELAY_SECS),
        timeout_seconds: Some(PROBE_TIMEOUT_SECS),
        period_seconds: Some(PROBE_PERIOD_SECS),
        success_threshold: Some(PROBE_SUCCESS_THRESHOLD),
        failure_threshold: Some(PROBE_FAILURE_THRESHOLD),
        ..Probe::default()
    }
}

fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        ..ContainerPort::default()
    }
}

fn resource_list(cpu: &str, memory: &str) -> BTreeMap<String, Quantity> {
    BTreeMap::from([
        ("cpu".to_string(), Quantity(cpu.to_string())),
        ("memory".to_string(), Quantity(memory.to_string())),
    ])
}

fn app_label(value: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), value.to_string())])
}

fn child_meta(namespace: &str, name: &str, app: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: app.map(app_label),
        ..ObjectMeta::default()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]

    use super::*;

    fn spec() -> VsCodeSpec {
        VsCodeSpec::new("acme", "t-42")
    }

    fn config() -> RuntimeConfig {
        RuntimeConfig::new("registry.local/vscode:1", "example.com")
    }

    #[test]
    fn test_pod_container_shape() {
        let pod = workload_pod("ns1", &spec(), &config());
        assert_eq!(pod.metadata.name.as_deref(), Some("pod"));
        assert_eq!(pod.metadata.namespace.as_deref(), Some("ns1"));
        assert_eq!(
            pod.metadata.labels.as_ref().unwrap().get("app").map(String::as_str),
            Some("pod")
        );

        let containers = pod.spec.unwrap().containers;
        assert_eq!(containers.len(), 1);
        let c = &containers[0];
        assert_eq!(c.image.as_deref(), Some("registry.local/vscode:1"));
        assert_eq!(c.command.as_deref(), Some(&["/startup.sh".to_string()][..]));
        assert_eq!(
            c.args.as_deref(),
            Some(
                &[
                    "--server-base-path".to_string(),
                    "/tools/acme/t-42/code".to_string()
                ][..]
            )
        );

        let ports: Vec<_> = c
            .ports
            .as_ref()
            .unwrap()
            .iter()
            .map(|p| (p.name.clone().unwrap(), p.container_port))
            .collect();
        assert_eq!(
            ports,
            vec![("http-ui".to_string(), 3000), ("http-api".to_string(), 3190)]
        );
    }

    #[test]
    fn test_pod_resources() {
        let pod = workload_pod("ns1", &spec(), &config());
        let resources = pod.spec.unwrap().containers[0].resources.clone().unwrap();
        let requests = resources.requests.unwrap();
        let limits = resources.limits.unwrap();
        assert_eq!(requests["cpu"], Quantity("0.5".to_string()));
        assert_eq!(requests["memory"], Quantity("1Gi".to_string()));
        assert_eq!(limits["cpu"], Quantity("1".to_string()));
        assert_eq!(limits["memory"], Quantity("2Gi".to_string()));
    }

    #[test]
    fn test_pod_probes_share_policy() {
        let pod = workload_pod("ns1", &spec(), &config());
        let mut containers = pod.spec.unwrap().containers;
        let c = containers.remove(0);
        let readiness = c.readiness_probe.unwrap();
        assert_eq!(Some(readiness.clone()), c.liveness_probe);

        let http = readiness.http_get.unwrap();
        assert_eq!(http.path.as_deref(), Some("/api/healthz"));
        assert_eq!(http.port, IntOrString::Int(3190));
        assert_eq!(readiness.initial_delay_seconds, Some(30));
        assert_eq!(readiness.timeout_seconds, Some(5));
        assert_eq!(readiness.period_seconds, Some(5));
        assert_eq!(readiness.success_threshold, Some(1));
        assert_eq!(readiness.failure_threshold, Some(120));
    }

    #[test]
    fn test_pod_env_from_secret() {
        let pod = workload_pod("ns1", &spec(), &config());
        let env_from = pod.spec.unwrap().containers[0].env_from.clone().unwrap();
        assert_eq!(env_from.len(), 1);
        assert_eq!(env_from[0].secret_ref.as_ref().unwrap().name, "secret");
    }

    #[test]
    fn test_services_forward_to_pod() {
        for (name, target) in [("ui", 3000), ("api", 3190)] {
            let svc = service("ns1", name, target);
            assert_eq!(svc.metadata.name.as_deref(), Some(name));
            let svc_spec = svc.spec.unwrap();
            let port = &svc_spec.ports.unwrap()[0];
            assert_eq!(port.name.as_deref(), Some("http"));
            assert_eq!(port.port, 80);
            assert_eq!(port.target_port, Some(IntOrString::Int(target)));
            assert_eq!(svc_spec.selector.unwrap()["app"], "pod");
        }
    }

    #[test]
    fn test_virtual_service_routes_derived_path() {
        let vs = virtual_service("ns1", &spec(), "example.com", "gw1");
        assert_eq!(vs.metadata.name.as_deref(), Some("vscode"));
        assert_eq!(vs.metadata.namespace.as_deref(), Some("ns1"));
        assert_eq!(vs.spec.hosts, vec!["example.com".to_string()]);
        assert_eq!(vs.spec.gateways, vec!["gw1".to_string()]);

        let route = &vs.spec.http[0];
        assert_eq!(
            route.matches[0].uri,
            Some(StringMatch::Prefix("/tools/acme/t-42/code".to_string()))
        );
        let dest = &route.route[0].destination;
        assert_eq!(dest.host, "ui.ns1.svc.cluster.local");
        assert_eq!(dest.port, Some(PortSelector { number: 80 }));
    }

    #[test]
    fn test_destination_rule_disables_tls() {
        let dr = destination_rule("ns1");
        assert_eq!(dr.spec.host, "ui.ns1.svc.cluster.local");
        let tls = dr.spec.traffic_policy.unwrap().tls.unwrap();
        assert_eq!(tls.mode, TlsMode::Disable);
    }

    #[test]
    fn test_desired_kinds_follow_routing_flag() {
        let without: Vec<_> = ChildKind::desired(&config()).collect();
        assert_eq!(
            without,
            vec![ChildKind::Pod, ChildKind::UiService, ChildKind::ApiService]
        );

        let with: Vec<_> = ChildKind::desired(&config().with_routing_gateway("gw1")).collect();
        assert_eq!(with, ChildKind::ORDER.to_vec());
    }

    #[test]
    fn test_build_skips_routing_when_disabled() {
        assert!(build(ChildKind::VirtualService, "ns1", &spec(), &config()).is_none());
        assert!(build(ChildKind::DestinationRule, "ns1", &spec(), &config()).is_none());
        assert!(build(ChildKind::Pod, "ns1", &spec(), &config()).is_some());
    }

    #[test]
    fn test_build_reports_kind_and_name() {
        let config = config().with_routing_gateway("gw1");
        for kind in ChildKind::ORDER {
            let child = build(kind, "ns1", &spec(), &config).unwrap();
            assert_eq!(child.kind(), kind);
            assert_eq!(child.metadata().name.as_deref(), Some(kind.object_name()));
            assert!(child.owner().is_none());
        }
    }

    #[test]
    fn test_set_owner_marks_controller() {
        let mut child = build(ChildKind::Pod, "ns1", &spec(), &config()).unwrap();
        child.set_owner(OwnerReference {
            api_version: "tools.robot.dev/v1alpha1".to_string(),
            kind: "VsCode".to_string(),
            name: "workspace".to_string(),
            uid: "uid-1".to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        });
        assert_eq!(child.owner().map(|o| o.uid.as_str()), Some("uid-1"));
    }

    #[test]
    fn test_child_kind_display() {
        assert_eq!(ChildKind::Pod.to_string(), "Pod/pod");
        assert_eq!(ChildKind::ApiService.to_string(), "Service/api");
        assert_eq!(
            ChildKind::DestinationRule.to_string(),
            "DestinationRule/vscode"
        );
    }
}
