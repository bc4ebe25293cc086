//! Store client speaking the store's JSON gateway.
//!
//! Every call is a `POST /v3/<service>/<method>` with a JSON body. Keys and
//! values travel base64-encoded and 64-bit integers are encoded as strings.
//! Authenticated sessions exchange the user name and password for a token on
//! connect and send it as the `Authorization` header afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use keyscope_types::{Access, Identity, KeyValue, LeaseId, RolePermission};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use url::Url;

use crate::error::{StoreError, StoreResult};
use crate::tls::TlsConfig;
use crate::traits::{ClusterStatus, Connector, StoreClient};

/// Exclusive upper bound of the key range sharing `prefix`.
///
/// The last byte below `0xff` is incremented and everything after it
/// dropped. A prefix of only `0xff` bytes (or an empty prefix) maps to `\0`,
/// which the store reads as "to the end of the key space".
pub fn prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    vec![0]
}

/// Render a remote `(key, range_end)` permission as a glob pattern.
pub fn render_pattern(key: &[u8], range_end: &[u8]) -> String {
    let text = String::from_utf8_lossy(key).into_owned();
    if range_end.is_empty() {
        return text;
    }
    if key == [0] && range_end == [0] {
        return "*".into();
    }
    if range_end != prefix_end(key).as_slice() {
        tracing::warn!(
            key = %text,
            range_end = %String::from_utf8_lossy(range_end),
            "arbitrary permission range approximated as a prefix"
        );
    }
    format!("{text}*")
}

/// Normalize a user-supplied endpoint into a base URL. Endpoints without a
/// scheme get `https` when `secure`, `http` otherwise.
pub fn endpoint_url(endpoint: &str, secure: bool) -> StoreResult<Url> {
    let trimmed = endpoint.trim();
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else if secure {
        format!("https://{trimmed}")
    } else {
        format!("http://{trimmed}")
    };
    Url::parse(&with_scheme).map_err(|e| StoreError::Unreachable {
        endpoint: endpoint.to_string(),
        reason: format!("invalid endpoint: {e}"),
    })
}

fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

fn decode(text: &str) -> StoreResult<Vec<u8>> {
    STANDARD
        .decode(text)
        .map_err(|e| StoreError::Protocol(format!("invalid base64: {e}")))
}

fn transport_error(endpoint: &Url, err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout(format!("{endpoint}: {err}"))
    } else if err.is_connect() {
        StoreError::Unreachable {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
    } else {
        StoreError::Http(err)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct WireKeyValue {
    key: String,
    #[serde(default)]
    value: String,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default)]
    create_revision: i64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default)]
    mod_revision: i64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default)]
    lease: i64,
}

impl WireKeyValue {
    fn into_entry(self) -> StoreResult<KeyValue> {
        let key = String::from_utf8_lossy(&decode(&self.key)?).into_owned();
        Ok(KeyValue {
            key,
            value: Bytes::from(decode(&self.value)?),
            lease: (self.lease != 0).then_some(LeaseId(self.lease)),
            create_revision: self.create_revision,
            mod_revision: self.mod_revision,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct RangeResponse {
    #[serde(default)]
    kvs: Vec<WireKeyValue>,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
struct DeleteRangeResponse {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default)]
    deleted: u64,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct LeaseGrantResponse {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "ID")]
    id: i64,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct LeaseTtlResponse {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "TTL", default)]
    ttl: i64,
}

#[derive(Debug, Deserialize)]
struct AuthenticateResponse {
    token: String,
}

#[derive(Debug, Default, Deserialize)]
struct UserListResponse {
    #[serde(default)]
    users: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UserGetResponse {
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WirePermission {
    #[serde(rename = "permType", default)]
    perm_type: String,
    #[serde(default)]
    key: String,
    #[serde(default)]
    range_end: String,
}

#[derive(Debug, Default, Deserialize)]
struct RoleGetResponse {
    #[serde(default)]
    perm: Vec<WirePermission>,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    version: String,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "dbSize", default)]
    db_size: u64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default)]
    leader: u64,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct WireMember {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "ID", default)]
    id: u64,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct MemberListResponse {
    #[serde(default)]
    members: Vec<WireMember>,
}

#[derive(Serialize)]
struct RangeRequest {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    range_end: Option<String>,
    sort_order: &'static str,
    sort_target: &'static str,
}

fn parse_access(perm_type: &str) -> Access {
    match perm_type {
        "WRITE" => Access::Write,
        "READWRITE" => Access::ReadWrite,
        _ => Access::Read,
    }
}

/// Opens [`GatewayClient`] sessions.
#[derive(Clone, Debug)]
pub struct GatewayConnector {
    http: Client,
    connect_timeout: Duration,
    secure: bool,
}

impl GatewayConnector {
    /// Build a connector. `connect_timeout` bounds session establishment,
    /// `request_timeout` every individual call.
    pub fn new(
        connect_timeout: Duration,
        request_timeout: Duration,
        tls: &TlsConfig,
    ) -> StoreResult<Self> {
        let builder = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout);
        let http = tls.apply(builder)?.build()?;
        Ok(Self {
            http,
            connect_timeout,
            secure: tls.is_enabled(),
        })
    }
}

#[async_trait]
impl Connector for GatewayConnector {
    async fn connect(&self, identity: &Identity) -> StoreResult<Arc<dyn StoreClient>> {
        let base = endpoint_url(&identity.endpoint, self.secure)?;
        let mut client = GatewayClient {
            http: self.http.clone(),
            base,
            token: None,
            closed: AtomicBool::new(false),
        };

        let handshake = async {
            if identity.is_anonymous() {
                // Nothing to authenticate; make sure the endpoint answers.
                client.status().await.map(|_| None)
            } else {
                let body = json!({ "name": identity.username, "password": identity.secret });
                client
                    .call::<AuthenticateResponse>("v3/auth/authenticate", &body)
                    .await
                    .map(|resp| Some(resp.token))
                    .map_err(|e| match e {
                        StoreError::PermissionDenied(reason) | StoreError::Protocol(reason) => {
                            StoreError::AuthFailed {
                                username: identity.username.clone(),
                                reason,
                            }
                        }
                        other => other,
                    })
            }
        };

        let token = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| {
                StoreError::Timeout(format!(
                    "connect to {} exceeded {:?}",
                    identity.endpoint, self.connect_timeout
                ))
            })??;
        client.token = token;
        tracing::debug!(endpoint = %client.base, user = %identity.username, "gateway session opened");
        Ok(Arc::new(client))
    }
}

/// A session against the JSON gateway.
#[derive(Debug)]
pub struct GatewayClient {
    http: Client,
    base: Url,
    token: Option<String>,
    closed: AtomicBool,
}

impl GatewayClient {
    async fn call<R: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> StoreResult<R> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        let url = self
            .base
            .join(path)
            .map_err(|e| StoreError::Protocol(format!("invalid path {path}: {e}")))?;
        let mut request = self.http.post(url).json(body);
        if let Some(token) = &self.token {
            request = request.header(reqwest::header::AUTHORIZATION, token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(&self.base, e))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<R>()
                .await
                .map_err(|e| StoreError::Protocol(format!("{path}: {e}")));
        }

        let text = response.text().await.unwrap_or_default();
        let parsed: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
        let message = [parsed.message, parsed.error, text]
            .into_iter()
            .find(|m| !m.is_empty())
            .unwrap_or_else(|| status.to_string());
        let denied = status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || message.contains("permission denied");
        if denied {
            Err(StoreError::PermissionDenied(message))
        } else {
            Err(StoreError::Protocol(format!("{path} returned {status}: {message}")))
        }
    }

    async fn range(&self, key: &[u8], range_end: Option<Vec<u8>>) -> StoreResult<Vec<KeyValue>> {
        let request = RangeRequest {
            key: encode(key),
            range_end: range_end.as_deref().map(encode),
            sort_order: "ASCEND",
            sort_target: "KEY",
        };
        let resp: RangeResponse = self.call("v3/kv/range", &request).await?;
        resp.kvs.into_iter().map(WireKeyValue::into_entry).collect()
    }

    async fn delete_range(&self, key: &[u8], range_end: Option<Vec<u8>>) -> StoreResult<u64> {
        let mut body = json!({ "key": encode(key) });
        if let Some(end) = range_end {
            body["range_end"] = json!(encode(&end));
        }
        let resp: DeleteRangeResponse = self.call("v3/kv/deleterange", &body).await?;
        Ok(resp.deleted)
    }
}

/// Key and range end covering every key starting with `prefix`.
fn prefix_range(prefix: &str) -> (Vec<u8>, Vec<u8>) {
    if prefix.is_empty() {
        (vec![0], vec![0])
    } else {
        (prefix.as_bytes().to_vec(), prefix_end(prefix.as_bytes()))
    }
}

#[async_trait]
impl StoreClient for GatewayClient {
    async fn get(&self, key: &str) -> StoreResult<Option<KeyValue>> {
        Ok(self.range(key.as_bytes(), None).await?.into_iter().next())
    }

    async fn get_prefix(&self, prefix: &str) -> StoreResult<Vec<KeyValue>> {
        let (key, end) = prefix_range(prefix);
        self.range(&key, Some(end)).await
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
        lease_seconds: Option<i64>,
    ) -> StoreResult<KeyValue> {
        let mut body = json!({ "key": encode(key.as_bytes()), "value": encode(&value) });
        if let Some(seconds) = lease_seconds {
            let grant: LeaseGrantResponse = self
                .call("v3/lease/grant", &json!({ "TTL": seconds }))
                .await?;
            body["lease"] = json!(grant.id.to_string());
        }
        let _: serde_json::Value = self.call("v3/kv/put", &body).await?;
        self.get(key)
            .await?
            .ok_or_else(|| StoreError::Protocol(format!("{key} missing right after put")))
    }

    async fn delete(&self, key: &str) -> StoreResult<u64> {
        self.delete_range(key.as_bytes(), None).await
    }

    async fn delete_prefix(&self, prefix: &str) -> StoreResult<u64> {
        let (key, end) = prefix_range(prefix);
        self.delete_range(&key, Some(end)).await
    }

    async fn lease_time_to_live(&self, lease: LeaseId) -> StoreResult<i64> {
        let resp: LeaseTtlResponse = self
            .call("v3/lease/timetolive", &json!({ "ID": lease.0.to_string() }))
            .await?;
        Ok(resp.ttl)
    }

    async fn list_users(&self) -> StoreResult<Vec<String>> {
        let resp: UserListResponse = self.call("v3/auth/user/list", &json!({})).await?;
        Ok(resp.users)
    }

    async fn get_user(&self, name: &str) -> StoreResult<Vec<String>> {
        let resp: UserGetResponse = self
            .call("v3/auth/user/get", &json!({ "name": name }))
            .await?;
        Ok(resp.roles)
    }

    async fn get_role(&self, name: &str) -> StoreResult<Vec<RolePermission>> {
        let resp: RoleGetResponse = self
            .call("v3/auth/role/get", &json!({ "role": name }))
            .await?;
        resp.perm
            .into_iter()
            .map(|p| {
                let key = decode(&p.key)?;
                let range_end = decode(&p.range_end)?;
                Ok(RolePermission::new(
                    render_pattern(&key, &range_end),
                    parse_access(&p.perm_type),
                ))
            })
            .collect()
    }

    async fn status(&self) -> StoreResult<ClusterStatus> {
        let status: StatusResponse = self.call("v3/maintenance/status", &json!({})).await?;
        let members: MemberListResponse = self.call("v3/cluster/member/list", &json!({})).await?;
        let leader_name = members
            .members
            .into_iter()
            .find(|m| m.id == status.leader)
            .map(|m| m.name)
            .unwrap_or_default();
        Ok(ClusterStatus {
            version: status.version,
            db_size: status.db_size,
            leader_name,
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
