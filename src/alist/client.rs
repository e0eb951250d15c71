use super::request::{self, Response as ApiResponse};
use crate::{config::AlistConfig, error::Error};
use anyhow::{bail, Context, Result};
use reqwest::{header, Client, Response, StatusCode};
use serde::{de::DeserializeOwned, de::IgnoredAny, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone)]
pub struct Options {
    /// Offline download tool passed to `add_offline_download`
    pub tool: String,
    pub delete_policy: String,
    /// Per path segment
    pub ready_timeout: Duration,
    pub ready_poll: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            tool: "PikPak".to_string(),
            delete_policy: "delete_on_upload_succeed".to_string(),
            ready_timeout: Duration::from_secs(30),
            ready_poll: Duration::from_secs(1),
        }
    }
}

/// The bearer token. Empty until the first login; replaced whenever the
/// server answers 401. Refreshes are serialized so that concurrent callers
/// holding the same stale token log in only once.
#[derive(Debug, Default)]
pub struct Session {
    token: RwLock<String>,
    refresh: Mutex<()>,
}

impl Session {
    pub async fn token(&self) -> String {
        self.token.read().await.clone()
    }

    pub async fn set_token(&self, token: impl Into<String>) {
        *self.token.write().await = token.into();
    }
}

pub struct AlistClient {
    inner: Client,
    base_url: Arc<str>,
    username: String,
    password: String,
    session: Session,
    options: Options,
}

impl AlistClient {
    fn url(&self, api_name: &str, method_name: &str) -> String {
        format!("{}/api/{}/{}", self.base_url, api_name, method_name)
    }

    pub fn new(
        base_url: impl Into<Arc<str>>,
        username: &str,
        password: &str,
        options: Options,
    ) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static("no-cache"),
        );
        let client = reqwest::ClientBuilder::new()
            .timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()?;
        let base_url: Arc<str> = base_url.into();
        Ok(Self {
            inner: client,
            base_url: base_url.trim_end_matches('/').into(),
            username: username.to_string(),
            password: password.to_string(),
            session: Session::default(),
            options,
        })
    }

    pub fn from_config(config: &AlistConfig) -> Result<Self> {
        let options = Options {
            tool: config.tool.clone(),
            delete_policy: config.delete_policy.clone(),
            ready_timeout: Duration::from_secs(config.ready_timeout_s),
            ..Options::default()
        };
        Self::new(
            config.host.as_str(),
            &config.username,
            &config.password,
            options,
        )
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Logs in with the configured credentials and stores the new token.
    pub async fn login(&self) -> Result<(), Error> {
        info!("logging in to alist as {}", self.username);
        match self.request_token().await {
            Ok(token) => {
                self.session.set_token(token).await;
                info!("login success, token updated");
                Ok(())
            }
            Err(e) => {
                error!("login failed: {e:#}");
                Err(Error::Auth(format!("{e:#}")))
            }
        }
    }

    async fn request_token(&self) -> Result<String> {
        let resp = self
            .inner
            .post(self.url("auth", "login"))
            .json(&request::LoginRequest {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await?;
        let resp = decode::<request::LoginData>(resp).await?;
        if !resp.is_success() {
            bail!("code {}: {}", resp.code, resp.message);
        }
        Ok(resp.data.context("login response carries no token")?.token)
    }

    /// Replaces `stale` with a fresh token. Returns false if the login failed.
    pub async fn refresh(&self, stale: &str) -> bool {
        let _guard = self.session.refresh.lock().await;
        if self.session.token().await != stale {
            debug!("token already refreshed by another caller");
            return true;
        }
        self.login().await.is_ok()
    }

    async fn token(&self) -> String {
        let token = self.session.token().await;
        if !token.is_empty() {
            return token;
        }
        self.refresh(&token).await;
        self.session.token().await
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        url: &str,
        token: &str,
        body: &B,
    ) -> reqwest::Result<Response> {
        self.inner
            .post(url)
            .header(header::AUTHORIZATION, token)
            .json(body)
            .send()
            .await
    }

    /// Authorized POST. A 401 leads to one login and one retry, never more.
    async fn post<B: Serialize + ?Sized>(
        &self,
        api_name: &str,
        method_name: &str,
        body: &B,
    ) -> Result<Response> {
        let url = self.url(api_name, method_name);
        let token = self.token().await;
        let resp = self.send(&url, &token, body).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }
        warn!("{api_name}/{method_name}: token rejected, logging in again");
        if !self.refresh(&token).await {
            bail!(Error::Auth(format!(
                "re-login for {api_name}/{method_name} failed"
            )));
        }
        let token = self.session.token().await;
        Ok(self.send(&url, &token, body).await?)
    }

    /// Fail-closed: anything but a successful answer means "does not exist".
    pub async fn path_exists(&self, path: &str) -> bool {
        match self.try_path_exists(path).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!("fs/get {path} failed: {e:#}");
                false
            }
        }
    }

    async fn try_path_exists(&self, path: &str) -> Result<bool> {
        let resp = self
            .post("fs", "get", &request::PathRequest { path })
            .await?;
        let resp = decode::<IgnoredAny>(resp).await?;
        trace!("fs/get {path}: code {}", resp.code);
        Ok(resp.is_success())
    }

    /// Asks alist to re-read `path` from the storage. Failure has no
    /// observable effect on the caller.
    pub async fn refresh_listing(&self, path: &str) {
        let body = request::ListRequest {
            path,
            password: "",
            page: 1,
            per_page: 1,
            refresh: true,
        };
        match self.post("fs", "list", &body).await {
            Ok(resp) => debug!("fs/list {path} refreshed, status {}", resp.status()),
            Err(e) => warn!("fs/list refresh of {path} failed: {e:#}"),
        }
    }

    /// Only sends the request; whether the directory shows up is checked by
    /// polling `path_exists`.
    pub async fn mkdir(&self, path: &str) -> Result<()> {
        let resp = self
            .post("fs", "mkdir", &request::PathRequest { path })
            .await
            .with_context(|| format!("mkdir {path}"))?;
        debug!("fs/mkdir {path}: status {}", resp.status());
        Ok(())
    }

    pub async fn add_offline_download(&self, magnet: &str, path: &str) -> Result<(), Error> {
        let body = request::AddOfflineDownloadRequest {
            path,
            urls: vec![magnet],
            tool: &self.options.tool,
            delete_policy: &self.options.delete_policy,
        };
        let resp = self
            .post("fs", "add_offline_download", &body)
            .await
            .map_err(|e| Error::Api(format!("{e:#}")))?;
        let resp = decode::<IgnoredAny>(resp)
            .await
            .map_err(|e| Error::Api(format!("{e:#}")))?;
        if resp.is_success() {
            info!("offline download added, target {path}");
            Ok(())
        } else {
            Err(Error::Api(format!(
                "add_offline_download returned code {}: {}",
                resp.code, resp.message
            )))
        }
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<ApiResponse<T>> {
    let status = resp.status();
    if !status.is_success() {
        bail!("HTTP status {status}");
    }
    resp.json::<ApiResponse<T>>()
        .await
        .context("malformed alist response")
}
