// src/client/http.rs

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{DelayRange, InstagramApi, MediaFeedQuery};
use crate::auth::{Credentials, SessionState};
use crate::error::ClientError;

const API_BASE: &str = "https://i.instagram.com/api/v1/";
const COOKIE_ORIGIN: &str = "https://i.instagram.com/";
const IG_APP_ID: &str = "567067343352427";
const DEFAULT_USER_AGENT: &str = "Instagram 269.0.0.18.75 Android (26/8.0.0; 480dpi; 1080x1920; OnePlus; 6T Dev; devitron; qcom; en_US; 314665256)";

const GRAPHQL_ENDPOINT: &str = "ads/graphql/";
const ACCOUNT_INSIGHTS_DOC_ID: &str = "2449243051851783";
const MEDIA_INSIGHTS_DOC_ID: &str = "2345520318892697";
const MEDIA_PAGE_SIZE: usize = 200;
const BUSINESS_MANAGER_POINTER: &str = "/data/shadow_instagram_user/business_manager";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct DeviceIds {
    phone_id: String,
    uuid: String,
    client_session_id: String,
    advertising_id: String,
    android_device_id: String,
}

impl DeviceIds {
    fn generate() -> Self {
        let android = Uuid::new_v4().simple().to_string();
        Self {
            phone_id: Uuid::new_v4().to_string(),
            uuid: Uuid::new_v4().to_string(),
            client_session_id: Uuid::new_v4().to_string(),
            advertising_id: Uuid::new_v4().to_string(),
            android_device_id: format!("android-{}", &android[..16]),
        }
    }
}

/// Instagram private API client over reqwest with a cookie store.
pub struct HttpInstagramClient {
    http: reqwest::Client,
    base_url: String,
    jar: Arc<Jar>,
    delay: DelayRange,
    device: DeviceIds,
    user_agent: String,
    authorization: Option<String>,
    user_id: Option<String>,
    last_login: Option<i64>,
}

impl HttpInstagramClient {
    pub fn new() -> Result<Self, ClientError> {
        let jar = Arc::new(Jar::default());
        Ok(Self {
            http: build_http(jar.clone())?,
            base_url: API_BASE.to_string(),
            jar,
            delay: DelayRange::DEFAULT,
            device: DeviceIds::generate(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            authorization: None,
            user_id: None,
            last_login: None,
        })
    }

    /// Points the client at another API root, e.g. a local test server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        self.base_url = base_url;
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    async fn pause(&self) {
        let delay = self.delay.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn require_user_id(&self) -> Result<&str, ClientError> {
        self.user_id.as_deref().ok_or(ClientError::NotAuthenticated)
    }

    async fn private_request(
        &self,
        endpoint: &str,
        form: Option<&[(&str, String)]>,
    ) -> Result<(HeaderMap, Value), ClientError> {
        self.pause().await;

        let url = format!("{}{}", self.base_url, endpoint);
        let mut request = match form {
            Some(form) => self.http.post(&url).form(form),
            None => self.http.get(&url),
        };
        request = request
            .header("User-Agent", self.user_agent.as_str())
            .header("X-IG-App-ID", IG_APP_ID)
            .header("X-IG-Device-ID", self.device.uuid.as_str())
            .header("X-IG-Android-ID", self.device.android_device_id.as_str());
        if let Some(auth) = &self.authorization {
            request = request.header(AUTHORIZATION, auth.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        debug!(endpoint, status = status.as_u16(), "Instagram response");

        let parsed: Option<Value> = serde_json::from_str(&body).ok();
        if !status.is_success() {
            let message = parsed
                .as_ref()
                .and_then(api_message)
                .unwrap_or_else(|| body.chars().take(200).collect());
            return Err(ClientError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let json = match parsed {
            Some(json) => json,
            None => serde_json::from_str(&body)?,
        };
        if json.get("status").and_then(Value::as_str) == Some("fail") {
            return Err(ClientError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                message: api_message(&json).unwrap_or_else(|| "request failed".to_string()),
            });
        }
        Ok((headers, json))
    }

    async fn insights_graphql(&self, surface: &str, doc_id: &str, query_params: Value) -> Result<Value, ClientError> {
        let form = [
            ("surface", surface.to_string()),
            ("doc_id", doc_id.to_string()),
            ("locale", "en_US".to_string()),
            ("vc_policy", "insights_policy".to_string()),
            ("strip_nulls", "false".to_string()),
            ("strip_defaults", "false".to_string()),
            ("query_params", query_params.to_string()),
        ];
        let (_, body) = self.private_request(GRAPHQL_ENDPOINT, Some(&form)).await?;
        body.pointer(BUSINESS_MANAGER_POINTER)
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| ClientError::UnexpectedResponse {
                endpoint: GRAPHQL_ENDPOINT.to_string(),
                field: "data.shadow_instagram_user.business_manager",
            })
    }

    fn cookie_map(&self) -> Map<String, Value> {
        let mut cookies = Map::new();
        let Ok(origin) = Url::parse(COOKIE_ORIGIN) else {
            return cookies;
        };
        let Some(header) = self.jar.cookies(&origin) else {
            return cookies;
        };
        if let Ok(header) = header.to_str() {
            for pair in header.split("; ") {
                if let Some((name, value)) = pair.split_once('=') {
                    cookies.insert(name.to_string(), Value::String(value.to_string()));
                }
            }
        }
        cookies
    }
}

fn build_http(jar: Arc<Jar>) -> Result<reqwest::Client, ClientError> {
    Ok(reqwest::Client::builder().cookie_provider(jar).build()?)
}

fn api_message(json: &Value) -> Option<String> {
    json.get("message")
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| json.get("error_type").and_then(Value::as_str).map(String::from))
}

/// `Bearer IGT:2:<base64 json>` carries the numeric user id.
fn user_id_from_authorization(authorization: &str) -> Option<String> {
    let encoded = authorization.rsplit(':').next()?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let payload: Value = serde_json::from_slice(&decoded).ok()?;
    payload.get("ds_user_id")?.as_str().map(String::from)
}

fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl InstagramApi for HttpInstagramClient {
    fn set_delay_range(&mut self, range: DelayRange) {
        self.delay = range;
    }

    fn set_settings(&mut self, settings: SessionState) -> Result<(), ClientError> {
        if let Some(uuids) = settings.get("uuids") {
            self.device = serde_json::from_value(uuids.clone())?;
        }
        if let Some(user_agent) = settings.get("user_agent").and_then(Value::as_str) {
            self.user_agent = user_agent.to_string();
        }
        self.authorization = settings
            .get("authorization")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from);
        self.user_id = settings
            .get("user_id")
            .and_then(id_to_string)
            .or_else(|| self.authorization.as_deref().and_then(user_id_from_authorization));
        self.last_login = settings.get("last_login").and_then(Value::as_i64);

        // A jar cannot be emptied in place, so swap in a fresh one.
        self.jar = Arc::new(Jar::default());
        self.http = build_http(self.jar.clone())?;
        if let Some(cookies) = settings.get("cookies").and_then(Value::as_object) {
            let origin = Url::parse(COOKIE_ORIGIN)
                .map_err(|e| ClientError::Session(format!("invalid cookie origin: {}", e)))?;
            for (name, value) in cookies {
                match value.as_str() {
                    Some(value) => self.jar.add_cookie_str(
                        &format!("{}={}; Domain=.instagram.com; Path=/", name, value),
                        &origin,
                    ),
                    None => warn!(cookie = %name, "Skipping non-string cookie in session settings"),
                }
            }
        }
        Ok(())
    }

    fn settings(&self) -> SessionState {
        let mut state = SessionState::default();
        state.insert("uuids", json!(self.device));
        state.insert("cookies", Value::Object(self.cookie_map()));
        state.insert("user_agent", json!(self.user_agent));
        if let Some(auth) = &self.authorization {
            state.insert("authorization", json!(auth));
        }
        if let Some(user_id) = &self.user_id {
            state.insert("user_id", json!(user_id));
        }
        if let Some(last_login) = self.last_login {
            state.insert("last_login", json!(last_login));
        }
        state
    }

    async fn login(&mut self, credentials: &Credentials) -> Result<(), ClientError> {
        if self.authorization.is_some() && self.user_id.is_some() {
            debug!("Reusing authorization from applied settings");
            return Ok(());
        }

        let jazoest: u32 = self.device.phone_id.bytes().map(u32::from).sum();
        let payload = json!({
            "jazoest": format!("2{}", jazoest),
            "country_codes": "[{\"country_code\":\"1\",\"source\":[\"default\"]}]",
            "phone_id": self.device.phone_id,
            "enc_password": format!("#PWD_INSTAGRAM:0:{}:{}", Utc::now().timestamp(), credentials.password()),
            "username": credentials.username(),
            "adid": self.device.advertising_id,
            "guid": self.device.uuid,
            "device_id": self.device.android_device_id,
            "google_tokens": "[]",
            "login_attempt_count": "0",
        });
        let form = [("signed_body", format!("SIGNATURE.{}", payload))];

        let (headers, body) = self
            .private_request("accounts/login/", Some(&form))
            .await
            .map_err(|e| match e {
                ClientError::Status {
                    status: 400 | 403,
                    message,
                    ..
                } => ClientError::LoginRejected(message),
                other => other,
            })?;

        let authorization = headers
            .get("ig-set-authorization")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(String::from);
        let user_id = body
            .pointer("/logged_in_user/pk")
            .and_then(id_to_string)
            .or_else(|| authorization.as_deref().and_then(user_id_from_authorization))
            .ok_or_else(|| ClientError::UnexpectedResponse {
                endpoint: "accounts/login/".to_string(),
                field: "logged_in_user.pk",
            })?;

        debug!(user_id = %user_id, "Credential login accepted");
        self.authorization = authorization;
        self.user_id = Some(user_id);
        self.last_login = Some(Utc::now().timestamp());
        Ok(())
    }

    async fn probe(&self) -> Result<(), ClientError> {
        self.require_user_id()?;
        let form = [
            ("reason", "cold_start_fetch".to_string()),
            ("is_pull_to_refresh", "0".to_string()),
            ("phone_id", self.device.phone_id.clone()),
            ("_uuid", self.device.uuid.clone()),
            ("device_id", self.device.android_device_id.clone()),
            ("timezone_offset", "0".to_string()),
        ];
        self.private_request("feed/timeline/", Some(&form)).await?;
        Ok(())
    }

    async fn logout(&mut self) -> Result<(), ClientError> {
        self.require_user_id()?;
        let form = [
            ("one_tap_app_login", "true".to_string()),
            ("phone_id", self.device.phone_id.clone()),
            ("_uuid", self.device.uuid.clone()),
            ("guid", self.device.uuid.clone()),
            ("device_id", self.device.android_device_id.clone()),
        ];
        let result = self.private_request("accounts/logout/", Some(&form)).await;
        self.authorization = None;
        self.user_id = None;
        result.map(|_| ())
    }

    async fn insights_account(&self) -> Result<Value, ClientError> {
        let user_id = self.require_user_id()?;
        let inner = json!({ "access_token": "", "id": user_id });
        let query_params = json!({
            "IgInsightsGridMediaImage_SIZE": 480,
            "activityTab": "true",
            "audienceTab": "true",
            "contentTab": "true",
            "query_params": inner.to_string(),
        });
        self.insights_graphql("account", ACCOUNT_INSIGHTS_DOC_ID, query_params)
            .await
    }

    async fn insights_media_feed_all(
        &self,
        query: &MediaFeedQuery,
    ) -> Result<Vec<Value>, ClientError> {
        let user_id = self.require_user_id()?;
        let mut medias: Vec<Value> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let query_params = json!({
                "IgInsightsGridMediaImage_SIZE": 480,
                "count": MEDIA_PAGE_SIZE,
                "cursor": cursor,
                "dataOrdering": query.data_ordering,
                "postType": query.post_type,
                "timeframe": query.time_frame,
                "search_base": "USER",
                "is_user": "true",
                "queryParams": { "access_token": "", "id": user_id },
            });
            let manager = self
                .insights_graphql("post_grid", MEDIA_INSIGHTS_DOC_ID, query_params)
                .await?;
            let posts = manager.pointer("/top_posts_unit/top_posts").ok_or_else(|| {
                ClientError::UnexpectedResponse {
                    endpoint: GRAPHQL_ENDPOINT.to_string(),
                    field: "top_posts_unit.top_posts",
                }
            })?;

            if let Some(edges) = posts.get("edges").and_then(Value::as_array) {
                medias.extend(
                    edges
                        .iter()
                        .map(|edge| edge.get("node").cloned().unwrap_or_else(|| edge.clone())),
                );
            }

            let has_next = posts
                .pointer("/page_info/has_next_page")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let next_cursor = posts
                .pointer("/page_info/end_cursor")
                .and_then(Value::as_str)
                .map(String::from);
            debug!(fetched = medias.len(), has_next, "Fetched media insights page");

            if !has_next || next_cursor.is_none() || (query.count > 0 && medias.len() >= query.count) {
                break;
            }
            if next_cursor == cursor {
                warn!(cursor = ?cursor, "Media insights cursor did not advance, stopping");
                break;
            }
            cursor = next_cursor;
        }

        if query.count > 0 {
            medias.truncate(query.count);
        }
        Ok(medias)
    }
}
