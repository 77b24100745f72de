//! Typed Istio networking resources.
//!
//! Only the fields this operator writes are modelled. Unknown fields on
//! objects read back from the cluster are ignored.

use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Routing rule binding hosts and gateways to destinations.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[kube(
    group = "networking.istio.io",
    version = "v1alpha3",
    kind = "VirtualService",
    plural = "virtualservices",
    namespaced,
    derive = "PartialEq",
    schema = "disabled"
)]
pub struct VirtualServiceSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http: Vec<HttpRoute>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRoute {
    #[serde(default, rename = "match", skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<HttpMatchRequest>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route: Vec<HttpRouteDestination>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpMatchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<StringMatch>,
}

/// URI match; Istio accepts exactly one of the variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StringMatch {
    Exact(String),
    Prefix(String),
    Regex(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRouteDestination {
    pub destination: Destination,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortSelector>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSelector {
    pub number: u32,
}

/// Policy applied to traffic toward a host after routing.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[kube(
    group = "networking.istio.io",
    version = "v1alpha3",
    kind = "DestinationRule",
    plural = "destinationrules",
    namespaced,
    derive = "PartialEq",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct DestinationRuleSpec {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_policy: Option<TrafficPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<ClientTlsSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTlsSettings {
    pub mode: TlsMode,
}

/// Client-side TLS mode toward the destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TlsMode {
    /// Plain text.
    #[default]
    Disable,
    Simple,
    Mutual,
    IstioMutual,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_virtual_service_wire_format() {
        let spec = VirtualServiceSpec {
            hosts: vec!["example.com".to_string()],
            gateways: vec!["gw1".to_string()],
            http: vec![HttpRoute {
                matches: vec![HttpMatchRequest {
                    uri: Some(StringMatch::Prefix("/tools/acme/t-42/code".to_string())),
                }],
                route: vec![HttpRouteDestination {
                    destination: Destination {
                        host: "ui.ns1.svc.cluster.local".to_string(),
                        port: Some(PortSelector { number: 80 }),
                    },
                }],
            }],
        };

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(
            json["http"][0]["match"][0]["uri"]["prefix"],
            "/tools/acme/t-42/code"
        );
        assert_eq!(
            json["http"][0]["route"][0]["destination"]["port"]["number"],
            80
        );
    }

    #[test]
    fn test_destination_rule_wire_format() {
        let spec = DestinationRuleSpec {
            host: "ui.ns1.svc.cluster.local".to_string(),
            traffic_policy: Some(TrafficPolicy {
                tls: Some(ClientTlsSettings {
                    mode: TlsMode::Disable,
                }),
            }),
        };

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["trafficPolicy"]["tls"]["mode"], "DISABLE");
    }

    #[test]
    fn test_istio_mutual_mode_name() {
        let json = serde_json::to_value(TlsMode::IstioMutual).unwrap();
        assert_eq!(json, "ISTIO_MUTUAL");
    }
}
