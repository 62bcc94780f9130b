//! GCP 访问令牌来源
//!
//! 支持三种来源：
//! - 环境变量中的固定令牌（`gcloud auth print-access-token` 的输出）；
//! - GCE 元数据服务器（在 GKE 中以节点或 Workload Identity 服务账号运行时），
//!   令牌缓存到过期前一分钟；
//! - 本地运行时的应用默认凭据（`GOOGLE_APPLICATION_CREDENTIALS` 指定的服务账号
//!   密钥或 gcloud 用户凭据），由 `gcp_auth` 负责刷新。

use diskpolicy_common::{Error, Result};
use gcp_auth::TokenProvider;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 元数据服务器的令牌地址
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// 固定令牌所在的环境变量
pub const TOKEN_ENV_VAR: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// 应用默认凭据请求的权限范围
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// 令牌提前刷新的时间
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// 凭据类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// 固定令牌
    Static(String),
    /// GCE 元数据服务器
    Metadata,
    /// 应用默认凭据
    ApplicationDefault,
}

impl Credentials {
    /// 选择凭据：固定令牌优先，其次本地运行用应用默认凭据，集群内用元数据服务器
    pub fn select(env_token: Option<&str>, local: bool) -> Self {
        match env_token.map(str::trim) {
            Some(token) if !token.is_empty() => Credentials::Static(token.to_string()),
            _ if local => Credentials::ApplicationDefault,
            _ => Credentials::Metadata,
        }
    }
}

/// 元数据服务器返回的令牌
#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

/// 缓存的令牌
#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

enum TokenKind {
    Static(String),
    Metadata { url: String, http: reqwest::Client },
    ApplicationDefault(Arc<dyn TokenProvider>),
}

/// 访问令牌来源
pub struct TokenSource {
    kind: TokenKind,
    cached: RwLock<Option<CachedToken>>,
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            TokenKind::Static(_) => "static",
            TokenKind::Metadata { .. } => "metadata",
            TokenKind::ApplicationDefault(_) => "application-default",
        };
        f.debug_struct("TokenSource").field("kind", &kind).finish()
    }
}

impl TokenSource {
    fn with_kind(kind: TokenKind) -> Self {
        Self {
            kind,
            cached: RwLock::new(None),
        }
    }

    /// 使用固定令牌
    pub fn fixed(token: impl Into<String>) -> Self {
        Self::with_kind(TokenKind::Static(token.into()))
    }

    /// 使用指定地址的元数据服务器
    pub fn metadata_at(url: impl Into<String>, http: reqwest::Client) -> Self {
        Self::with_kind(TokenKind::Metadata { url: url.into(), http })
    }

    /// 使用应用默认凭据
    async fn application_default() -> Result<Self> {
        let provider = gcp_auth::provider()
            .await
            .map_err(|e| Error::provider("加载应用默认凭据失败", e))?;
        Ok(Self::with_kind(TokenKind::ApplicationDefault(provider)))
    }

    /// 根据凭据类型创建令牌来源
    pub async fn from_credentials(credentials: Credentials, http: reqwest::Client) -> Result<Self> {
        match credentials {
            Credentials::Static(token) => {
                info!("使用环境变量 {} 中的访问令牌", TOKEN_ENV_VAR);
                Ok(Self::fixed(token))
            }
            Credentials::Metadata => {
                info!("使用元数据服务器获取访问令牌");
                Ok(Self::metadata_at(METADATA_TOKEN_URL, http))
            }
            Credentials::ApplicationDefault => {
                info!("使用应用默认凭据获取访问令牌");
                Self::application_default().await
            }
        }
    }

    /// 读取环境变量并创建令牌来源
    pub async fn from_env(http: reqwest::Client, local: bool) -> Result<Self> {
        let env_token = std::env::var(TOKEN_ENV_VAR).ok();
        Self::from_credentials(Credentials::select(env_token.as_deref(), local), http).await
    }

    /// 获取可用的访问令牌
    pub async fn access_token(&self) -> Result<String> {
        match &self.kind {
            TokenKind::Static(token) => Ok(token.clone()),
            TokenKind::Metadata { url, http } => self.metadata_token(url, http).await,
            TokenKind::ApplicationDefault(provider) => {
                let token = provider
                    .token(&[CLOUD_PLATFORM_SCOPE])
                    .await
                    .map_err(|e| Error::provider("获取应用默认凭据令牌失败", e))?;
                Ok(token.as_str().to_string())
            }
        }
    }

    async fn metadata_token(&self, url: &str, http: &reqwest::Client) -> Result<String> {
        if let Some(cached) = self.cached.read().await.as_ref() {
            if Instant::now() < cached.expires_at {
                return Ok(cached.token.clone());
            }
        }

        let mut cached = self.cached.write().await;
        // 等待写锁期间可能已被其他任务刷新
        if let Some(entry) = cached.as_ref() {
            if Instant::now() < entry.expires_at {
                return Ok(entry.token.clone());
            }
        }

        let response = http
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| Error::provider("请求元数据服务器访问令牌失败", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(
                "获取访问令牌失败",
                format!("HTTP {}: {}", status, body),
            ));
        }

        let token: MetadataToken = response
            .json()
            .await
            .map_err(|e| Error::provider("解析访问令牌失败", e))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
        debug!("获取到新的访问令牌，有效期 {} 秒", lifetime.as_secs());

        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_metadata_token_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.token",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = TokenSource::metadata_at(format!("{}/token", server.uri()), reqwest::Client::new());
        assert_eq!(source.access_token().await.unwrap(), "ya29.token");
        assert_eq!(source.access_token().await.unwrap(), "ya29.token");
    }

    #[tokio::test]
    async fn test_metadata_failure_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let source = TokenSource::metadata_at(format!("{}/token", server.uri()), reqwest::Client::new());
        let err = source.access_token().await.unwrap_err();
        assert_eq!(err.kind(), "ProviderError");
        assert!(err.to_string().contains("403"));
    }

    #[rstest]
    #[case(Some("ya29.abc"), false, Credentials::Static("ya29.abc".to_string()))]
    #[case(Some(" ya29.abc\n"), true, Credentials::Static("ya29.abc".to_string()))]
    #[case(Some("  "), false, Credentials::Metadata)]
    #[case(None, false, Credentials::Metadata)]
    #[case(None, true, Credentials::ApplicationDefault)]
    #[case(Some(""), true, Credentials::ApplicationDefault)]
    fn test_select_credentials(#[case] env_token: Option<&str>, #[case] local: bool, #[case] expected: Credentials) {
        assert_eq!(Credentials::select(env_token, local), expected);
    }

    #[tokio::test]
    async fn test_static_credentials_skip_network() {
        let source = TokenSource::from_credentials(Credentials::Static("abc".to_string()), reqwest::Client::new())
            .await
            .unwrap();
        assert_eq!(source.access_token().await.unwrap(), "abc");
    }
}
