// OAuth 令牌端点客户端

use crate::auth::{DeviceCodeResponse, TokenResponse};
use crate::config::DriveConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// 设备码授权 grant_type
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// 令牌端点抽象
///
/// 凭证提供者与设备码登录通过此接口访问授权服务器
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// 使用 refresh_token 换取新令牌
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse>;

    /// 申请设备码
    async fn request_device_code(&self) -> Result<DeviceCodeResponse>;

    /// 用设备码轮询一次令牌端点
    async fn poll_device_code(&self, device_code: &str) -> Result<TokenResponse>;
}

/// Microsoft identity platform 令牌端点
#[derive(Debug, Clone)]
pub struct OAuthTokenEndpoint {
    client: Client,
    token_url: String,
    device_code_url: String,
    client_id: String,
    scope: String,
}

impl OAuthTokenEndpoint {
    pub fn new(config: &DriveConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        let base = format!(
            "{}/{}/oauth2/v2.0",
            config.login_base_url.trim_end_matches('/'),
            config.tenant_id
        );

        Ok(Self {
            client,
            token_url: format!("{}/token", base),
            device_code_url: format!("{}/devicecode", base),
            client_id: config.client_id.clone(),
            scope: config.scope.clone(),
        })
    }

    /// 提交表单并解析令牌端点响应
    ///
    /// 令牌端点在 pending/错误时也返回 JSON（4xx），统一按响应体解析
    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&str, &str)],
        what: &str,
    ) -> Result<T> {
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .with_context(|| format!("{}请求发送失败", what))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("读取{}响应失败", what))?;

        debug!("{}响应: status={}", what, status);

        serde_json::from_str(&body)
            .with_context(|| format!("解析{}响应失败: status={}, body={}", what, status, body))
    }
}

#[async_trait]
impl TokenEndpoint for OAuthTokenEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        info!("刷新访问令牌");
        let resp: TokenResponse = self
            .post_form(
                &self.token_url,
                &[
                    ("grant_type", "refresh_token"),
                    ("client_id", &self.client_id),
                    ("refresh_token", refresh_token),
                ],
                "刷新令牌",
            )
            .await?;

        if resp.access_token.is_empty() {
            anyhow::bail!(
                "刷新令牌失败: {} - {}，请重新运行 `onedrivecli auth`",
                resp.error.as_deref().unwrap_or("unknown"),
                resp.error_description.as_deref().unwrap_or("")
            );
        }

        Ok(resp)
    }

    async fn request_device_code(&self) -> Result<DeviceCodeResponse> {
        self.post_form(
            &self.device_code_url,
            &[("client_id", &self.client_id), ("scope", &self.scope)],
            "申请设备码",
        )
        .await
    }

    async fn poll_device_code(&self, device_code: &str) -> Result<TokenResponse> {
        self.post_form(
            &self.token_url,
            &[
                ("grant_type", DEVICE_CODE_GRANT),
                ("client_id", &self.client_id),
                ("device_code", device_code),
            ],
            "轮询令牌",
        )
        .await
    }
}
