use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response, Url};

use pgbeacon_core::config::ConsulConfig;
use pgbeacon_core::error::{BeaconError, Result};
use pgbeacon_core::service::ServiceDescriptor;
use pgbeacon_core::traits::{BoxFuture, ServiceRegistry};

use super::payload::{AgentSelf, AgentServiceRegistration};

const TOKEN_HEADER: &str = "X-Consul-Token";

/// Client for the local Consul agent.
#[derive(Debug, Clone)]
pub struct ConsulClient {
    http: Client,
    base: Url,
}

impl ConsulClient {
    /// Create a client from configuration.
    pub fn new(config: &ConsulConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url()).map_err(|e| {
            BeaconError::Registry(format!("Invalid Consul endpoint {:?}: {}", config.endpoint, e))
        })?;

        let mut headers = HeaderMap::new();
        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(token)
                .map_err(|_| BeaconError::Registry("Consul token is not a valid header".into()))?;
            value.set_sensitive(true);
            headers.insert(TOKEN_HEADER, value);
        }

        let http = Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| BeaconError::Registry(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, base })
    }

    /// Base URL of the agent API.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| BeaconError::Registry(format!("Invalid Consul path {}: {}", path, e)))
    }

    fn maintenance_url(&self, service_id: &str) -> Result<Url> {
        let mut url = self.url("/v1/agent/service/maintenance/")?;
        url.path_segments_mut()
            .map_err(|_| BeaconError::Registry("Consul endpoint cannot be a base".into()))?
            .pop_if_empty()
            .push(service_id);
        Ok(url)
    }

    async fn set_maintenance(&self, service_id: &str, reason: Option<&str>) -> Result<()> {
        let mut url = self.maintenance_url(service_id)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("enable", if reason.is_some() { "true" } else { "false" });
            if let Some(reason) = reason {
                query.append_pair("reason", reason);
            }
        }

        let response = self
            .http
            .put(url)
            .send()
            .await
            .map_err(|e| BeaconError::RegistryPushFailed(e.to_string()))?;
        check_status(response)
            .await
            .map(|_| ())
            .map_err(BeaconError::RegistryPushFailed)
    }
}

impl ServiceRegistry for ConsulClient {
    fn agent_node_name(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let url = self.url("/v1/agent/self")?;
            let response = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|e| BeaconError::Registry(e.to_string()))?;
            let response = check_status(response).await.map_err(BeaconError::Registry)?;

            let agent: AgentSelf = response
                .json()
                .await
                .map_err(|e| BeaconError::Registry(format!("Invalid agent response: {}", e)))?;
            Ok(agent.config.node_name)
        })
    }

    fn upsert_service<'a>(&'a self, service: &'a ServiceDescriptor) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let url = self.url("/v1/agent/service/register")?;
            let body = AgentServiceRegistration::from(service);

            let response = self
                .http
                .put(url)
                .json(&body)
                .send()
                .await
                .map_err(|e| BeaconError::RegistryPushFailed(e.to_string()))?;
            check_status(response)
                .await
                .map(|_| ())
                .map_err(BeaconError::RegistryPushFailed)
        })
    }

    fn enable_maintenance<'a>(
        &'a self,
        service_id: &'a str,
        reason: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.set_maintenance(service_id, Some(reason)))
    }

    fn disable_maintenance<'a>(&'a self, service_id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.set_maintenance(service_id, None))
    }
}

async fn check_status(response: Response) -> std::result::Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(format!("agent returned {}: {}", status, body.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgbeacon_core::config::ServiceConfig;
    use pgbeacon_core::RoleState;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, token: Option<&str>) -> ConsulClient {
        let config = ConsulConfig {
            endpoint: server.uri(),
            token: token.map(str::to_string),
            ..Default::default()
        };
        ConsulClient::new(&config).unwrap()
    }

    #[test]
    fn test_bare_endpoint_gets_http_scheme() {
        let client = ConsulClient::new(&ConsulConfig::default()).unwrap();
        assert_eq!(client.base_url().as_str(), "http://127.0.0.1:8500/");
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let config = ConsulConfig {
            endpoint: "http://[::1".to_string(),
            ..Default::default()
        };
        assert!(matches!(ConsulClient::new(&config), Err(BeaconError::Registry(_))));
    }

    #[tokio::test]
    async fn test_agent_node_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/agent/self"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Config": { "NodeName": "db-node-1", "Datacenter": "dc1" },
                "Member": {}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let name = client_for(&server, None).agent_node_name().await.unwrap();
        assert_eq!(name, "db-node-1");
    }

    #[tokio::test]
    async fn test_upsert_service_sends_registration() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/agent/service/register"))
            .and(header("X-Consul-Token", "s3cret"))
            .and(body_json(serde_json::json!({
                "ID": "db1-postgres-main",
                "Name": "postgres-main",
                "Tags": ["replica"],
                "Port": 5432,
                "Check": {
                    "TCP": "127.0.0.1:5432",
                    "Interval": "30s",
                    "DeregisterCriticalServiceAfter": "90m"
                }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut service = ServiceDescriptor::new("db1", &ServiceConfig::default()).unwrap();
        service.apply_role(RoleState::Replica);

        client_for(&server, Some("s3cret"))
            .upsert_service(&service)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_upsert_service_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/agent/service/register"))
            .respond_with(ResponseTemplate::new(500).set_body_string("agent unavailable"))
            .mount(&server)
            .await;

        let service = ServiceDescriptor::new("db1", &ServiceConfig::default()).unwrap();
        let err = client_for(&server, None)
            .upsert_service(&service)
            .await
            .unwrap_err();

        assert!(matches!(err, BeaconError::RegistryPushFailed(_)));
        assert!(err.to_string().contains("agent unavailable"));
    }

    #[tokio::test]
    async fn test_maintenance_toggle() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/agent/service/maintenance/db1-postgres-main"))
            .and(query_param("enable", "true"))
            .and(query_param("reason", "lost database connection"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/agent/service/maintenance/db1-postgres-main"))
            .and(query_param("enable", "false"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        client
            .enable_maintenance("db1-postgres-main", "lost database connection")
            .await
            .unwrap();
        client.disable_maintenance("db1-postgres-main").await.unwrap();
    }
}
