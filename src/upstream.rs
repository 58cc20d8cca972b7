//! Client for the messaging-provider API.
//!
//! Every call targets one tenant's instance and carries the static `apikey`
//! header. Request timeouts come from configuration; the orchestrator adds no
//! timeout of its own on top.

use serde::Deserialize;
use tracing::error;

use crate::config::UpstreamConfig;
use crate::error::Result;

/// Raw contact entry as returned by `POST /chat/findContacts/{tenant}`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamContact {
    #[serde(rename = "remoteJid")]
    pub remote_jid: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "pushName")]
    pub push_name: Option<String>,
    #[serde(rename = "profilePicUrl")]
    pub profile_pic_url: Option<String>,
    #[serde(rename = "isBusiness", default)]
    pub is_business: bool,
    #[serde(rename = "isGroup", default)]
    pub is_group: bool,
}

/// Raw group entry as returned by `GET /group/fetchAllGroups/{tenant}`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamGroup {
    pub id: Option<String>,
    pub subject: Option<String>,
    pub size: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ConnectionStateResponse {
    instance: Option<InstanceState>,
}

#[derive(Debug, Deserialize)]
struct InstanceState {
    state: Option<String>,
}

/// HTTP client for the messaging-provider API.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Whether the tenant's instance is in a connected state.
    ///
    /// Connected iff the reported state case-insensitively equals "open" or
    /// "connected". A transport or decode failure counts as not connected.
    pub async fn is_connected(&self, tenant_id: &str) -> bool {
        match self.connection_state(tenant_id).await {
            Ok(Some(state)) => {
                state.eq_ignore_ascii_case("open") || state.eq_ignore_ascii_case("connected")
            }
            Ok(None) => false,
            Err(err) => {
                error!(tenant = %tenant_id, error = %err, "connection state check failed");
                false
            }
        }
    }

    async fn connection_state(&self, tenant_id: &str) -> Result<Option<String>> {
        let url = format!("{}/instance/connectionState/{}", self.base_url, tenant_id);
        let response: ConnectionStateResponse = self
            .http
            .get(url)
            .header("apikey", &self.api_key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.instance.and_then(|i| i.state))
    }

    /// Fetch the tenant's full contact list.
    pub async fn find_contacts(&self, tenant_id: &str) -> Result<Vec<UpstreamContact>> {
        let url = format!("{}/chat/findContacts/{}", self.base_url, tenant_id);
        let contacts = self
            .http
            .post(url)
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({}))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(contacts)
    }

    /// Fetch the tenant's groups without member lists.
    pub async fn fetch_all_groups(&self, tenant_id: &str) -> Result<Vec<UpstreamGroup>> {
        let url = format!("{}/group/fetchAllGroups/{}", self.base_url, tenant_id);
        let groups = self
            .http
            .get(url)
            .header("apikey", &self.api_key)
            .query(&[("getParticipants", "false")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(groups)
    }
}
