// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Kubeconfig documents.
//!
//! Typed model of the standard Kubernetes client configuration, enough to
//! generate configs for test clusters and to pull the CA bundle and client
//! credentials out of provider-issued configs.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A kubeconfig document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kubeconfig {
    /// Always `v1`.
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Always `Config`.
    pub kind: String,
    /// Known API servers.
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    /// Cluster/user pairings.
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    /// Credentials.
    #[serde(default)]
    pub users: Vec<NamedUser>,
    /// Context used by default.
    #[serde(rename = "current-context", default)]
    pub current_context: String,
}

/// Named API server entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCluster {
    /// Entry name.
    pub name: String,
    /// Endpoint settings.
    pub cluster: ClusterEndpoint,
}

/// API server endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEndpoint {
    /// API server URL.
    pub server: String,
    /// Base64 PEM CA bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,
    /// Skip TLS verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_skip_tls_verify: Option<bool>,
}

/// Named context entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedContext {
    /// Entry name.
    pub name: String,
    /// Context settings.
    pub context: Context,
}

/// Cluster/user pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Cluster entry name.
    pub cluster: String,
    /// User entry name.
    pub user: String,
    /// Default namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Named user entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedUser {
    /// Entry name.
    pub name: String,
    /// Credentials.
    pub user: UserCredentials,
}

/// User credentials. Any subset may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserCredentials {
    /// Base64 PEM client certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate_data: Option<String>,
    /// Base64 PEM client key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key_data: Option<String>,
    /// Bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Decoded credentials of the current context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeCredentials {
    /// API server URL.
    pub server: String,
    /// PEM CA bundle.
    pub ca_pem: Option<String>,
    /// PEM client certificate.
    pub client_cert_pem: Option<String>,
    /// PEM client key.
    pub client_key_pem: Option<String>,
    /// Bearer token.
    pub token: Option<String>,
}

impl Kubeconfig {
    /// Parse a YAML (or JSON) kubeconfig.
    pub fn parse(raw: &str) -> Result<Self> {
        let config: Kubeconfig = serde_yaml::from_str(raw)?;
        if config.clusters.is_empty() {
            return Err(Error::InvalidRequest(
                "kubeconfig does not define any cluster".to_string(),
            ));
        }
        Ok(config)
    }

    /// Single-context kubeconfig for `cluster_name` authenticating with a token.
    pub fn generate(cluster_name: &str, server: &str, ca_pem: Option<&str>, token: &str) -> Self {
        let user_name = format!("{}-admin", cluster_name);
        Self {
            api_version: "v1".to_string(),
            kind: "Config".to_string(),
            clusters: vec![NamedCluster {
                name: cluster_name.to_string(),
                cluster: ClusterEndpoint {
                    server: server.to_string(),
                    certificate_authority_data: ca_pem.map(|pem| STANDARD.encode(pem.as_bytes())),
                    insecure_skip_tls_verify: ca_pem.is_none().then_some(true),
                },
            }],
            contexts: vec![NamedContext {
                name: cluster_name.to_string(),
                context: Context {
                    cluster: cluster_name.to_string(),
                    user: user_name.clone(),
                    namespace: None,
                },
            }],
            users: vec![NamedUser {
                name: user_name,
                user: UserCredentials {
                    token: Some(token.to_string()),
                    ..Default::default()
                },
            }],
            current_context: cluster_name.to_string(),
        }
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Resolve the current context (or the first one when unset) and decode its
    /// credentials.
    pub fn credentials(&self) -> Result<KubeCredentials> {
        let context = if self.current_context.is_empty() {
            self.contexts.first()
        } else {
            self.contexts
                .iter()
                .find(|c| c.name == self.current_context)
        };

        let (cluster_name, user_name) = match context {
            Some(c) => (Some(c.context.cluster.as_str()), Some(c.context.user.as_str())),
            None => (None, None),
        };

        let cluster = match cluster_name {
            Some(name) => self.clusters.iter().find(|c| c.name == name),
            None => self.clusters.first(),
        }
        .ok_or_else(|| Error::InvalidRequest("kubeconfig context has no cluster".to_string()))?;

        let user = match user_name {
            Some(name) => self.users.iter().find(|u| u.name == name),
            None => self.users.first(),
        };

        Ok(KubeCredentials {
            server: cluster.cluster.server.clone(),
            ca_pem: decode(cluster.cluster.certificate_authority_data.as_deref())?,
            client_cert_pem: decode(user.and_then(|u| u.user.client_certificate_data.as_deref()))?,
            client_key_pem: decode(user.and_then(|u| u.user.client_key_data.as_deref()))?,
            token: user.and_then(|u| u.user.token.clone()),
        })
    }
}

fn decode(data: Option<&str>) -> Result<Option<String>> {
    data.map(|encoded| {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::InvalidRequest(format!("invalid base64 in kubeconfig: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| Error::InvalidRequest(format!("kubeconfig data is not UTF-8: {}", e)))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CA: &str = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

    #[test]
    fn test_generated_config_parses_back() {
        let config = Kubeconfig::generate("demo", "https://10.0.0.1:6443", Some(CA), "t0ken");
        let yaml = config.to_yaml().unwrap();

        assert!(yaml.contains("current-context: demo"));
        assert!(yaml.contains("certificate-authority-data"));

        let parsed = Kubeconfig::parse(&yaml).unwrap();
        assert_eq!(parsed, config);

        let creds = parsed.credentials().unwrap();
        assert_eq!(creds.server, "https://10.0.0.1:6443");
        assert_eq!(creds.ca_pem.as_deref(), Some(CA));
        assert_eq!(creds.token.as_deref(), Some("t0ken"));
        assert!(creds.client_cert_pem.is_none());
    }

    #[test]
    fn test_credentials_follow_current_context() {
        let cert = STANDARD.encode("CERT");
        let key = STANDARD.encode("KEY");
        let raw = format!(
            r#"
apiVersion: v1
kind: Config
clusters:
- name: staging
  cluster:
    server: https://staging:6443
- name: prod
  cluster:
    server: https://prod:6443
contexts:
- name: staging
  context: {{cluster: staging, user: staging-user}}
- name: prod
  context: {{cluster: prod, user: prod-user}}
users:
- name: staging-user
  user: {{token: abc}}
- name: prod-user
  user:
    client-certificate-data: {cert}
    client-key-data: {key}
current-context: prod
"#
        );

        let creds = Kubeconfig::parse(&raw).unwrap().credentials().unwrap();
        assert_eq!(creds.server, "https://prod:6443");
        assert_eq!(creds.client_cert_pem.as_deref(), Some("CERT"));
        assert_eq!(creds.client_key_pem.as_deref(), Some("KEY"));
        assert!(creds.token.is_none());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Kubeconfig::parse("not: [valid").is_err());
        assert!(Kubeconfig::parse("apiVersion: v1\nkind: Config\nclusters: []\n").is_err());
    }
}
