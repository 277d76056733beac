use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Path of the Weaviate discovery endpoint on a mock server.
#[allow(dead_code)]
pub const DISCOVERY_PATH: &str = "/v1/.well-known/openid-configuration";

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Full OIDC metadata document whose token endpoint lives on `base_uri`.
#[allow(dead_code)]
pub fn metadata_body(base_uri: &str) -> serde_json::Value {
    serde_json::json!({
        "issuer": base_uri,
        "token_endpoint": format!("{}/token", base_uri),
        "jwks_uri": format!("{}/jwks", base_uri),
        "grant_types_supported": ["client_credentials", "password", "refresh_token"]
    })
}

/// Mounts a discovery endpoint answering with a full metadata document.
#[allow(dead_code)]
pub async fn mount_discovery(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(metadata_body(&server.uri())))
        .mount(server)
        .await;
}

/// Token endpoint success body.
#[allow(dead_code)]
pub fn token_body(access: &str, refresh: Option<&str>, expires_in: u64) -> serde_json::Value {
    let mut body = serde_json::json!({
        "access_token": access,
        "token_type": "Bearer",
        "expires_in": expires_in,
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = serde_json::Value::String(refresh.to_string());
    }
    body
}

/// Responder issuing `token-1`, `token-2`, ... with a fixed lifetime.
#[allow(dead_code)]
#[derive(Clone)]
pub struct SequentialTokens {
    issued: Arc<AtomicUsize>,
    lifetime: u64,
}

#[allow(dead_code)]
impl SequentialTokens {
    pub fn new(lifetime: u64) -> Self {
        Self {
            issued: Arc::new(AtomicUsize::new(0)),
            lifetime,
        }
    }

    /// Number of tokens issued so far.
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

impl Respond for SequentialTokens {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        ResponseTemplate::new(200).set_body_json(token_body(
            &format!("token-{}", n),
            None,
            self.lifetime,
        ))
    }
}
