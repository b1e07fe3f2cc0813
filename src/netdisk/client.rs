// 网盘客户端实现
//
// 所有认证请求经过 send_authorized：收到 401 时强制刷新令牌并重试一次

use crate::auth::TokenSource;
use crate::config::DriveConfig;
use crate::netdisk::{
    ByteStream, ChildrenResponse, DriveApi, DriveError, DriveInfoResponse, DriveItem, ItemRef,
    Quota, ShareLinkResponse, UploadSessionResponse,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 内容流连接超时（秒）
///
/// 文件内容的下载和分片上传耗时与大小相关，只限制建立连接的时间
const TRANSFER_CONNECT_TIMEOUT_SECS: u64 = 30;

/// 网盘客户端
#[derive(Clone)]
pub struct DriveClient {
    /// API 请求客户端（带整体超时）
    api: Client,
    /// 内容传输客户端（预签名地址，不带令牌）
    transfer: Client,
    /// drive 根地址，如 https://graph.microsoft.com/v1.0/me/drive
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl DriveClient {
    /// 创建新的网盘客户端
    pub fn new(config: &DriveConfig, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        let api = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        let transfer = Client::builder()
            .connect_timeout(Duration::from_secs(TRANSFER_CONNECT_TIMEOUT_SECS))
            .build()
            .context("Failed to create transfer HTTP client")?;

        info!("初始化网盘客户端: base_url={}", config.graph_base_url);

        Ok(Self {
            api,
            transfer,
            base_url: config.graph_base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn url(&self, segment: &str) -> String {
        format!("{}/{}", self.base_url, segment)
    }

    /// 携带访问令牌发送请求
    ///
    /// `build` 每次调用都必须构造完整的新请求：401 时会用新令牌再调用一次。
    /// 第二次仍为 401 则返回 `AuthExpired`，其余状态原样交给调用方处理。
    async fn send_authorized<F>(&self, build: F) -> Result<Response, DriveError>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let token = self
            .tokens
            .current_token()
            .await
            .map_err(|e| DriveError::Credential(format!("{:#}", e)))?;

        let response = build(&self.api).bearer_auth(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!("请求被拒绝 (401)，刷新令牌后重试: {}", response.url());
        let token = self
            .tokens
            .force_refresh()
            .await
            .map_err(|e| DriveError::Credential(format!("{:#}", e)))?;

        let response = build(&self.api).bearer_auth(&token).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(DriveError::AuthExpired);
        }
        Ok(response)
    }

    /// 读取并解析 JSON 响应
    ///
    /// 404 -> `NotFound`，其他非 2xx 或结构不符 -> `BadResponse`（附带原始响应体）
    async fn read_json<T: DeserializeOwned>(
        response: Response,
        context: &str,
        target: &str,
    ) -> Result<T, DriveError> {
        let status = response.status();
        let body = response.text().await?;

        debug!("{}响应: status={}, body_len={}", context, status, body.len());

        if status == StatusCode::NOT_FOUND {
            return Err(DriveError::NotFound {
                target: target.to_string(),
                body,
            });
        }
        if !status.is_success() {
            return Err(DriveError::BadResponse {
                context: format!("{}失败 ({})", context, target),
                status,
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| DriveError::BadResponse {
            context: format!("解析{}响应失败 ({}): {}", context, target, e),
            status,
            body,
        })
    }

    /// 为条目创建匿名只读分享链接
    pub async fn create_share_link(&self, remote_path: &str) -> Result<String, DriveError> {
        let item = ItemRef::path(remote_path);
        let url = self.url(&format!("{}/createLink", item.api_segment()));
        let body = serde_json::json!({ "type": "view", "scope": "anonymous" });

        let response = self
            .send_authorized(|c| c.post(&url).json(&body))
            .await?;
        let link: ShareLinkResponse = Self::read_json(response, "创建分享链接", remote_path).await?;
        Ok(link.link.web_url)
    }

    /// 查询存储配额
    pub async fn quota(&self) -> Result<Quota, DriveError> {
        let url = self.base_url.clone();
        let response = self.send_authorized(|c| c.get(&url)).await?;
        let info: DriveInfoResponse = Self::read_json(response, "查询存储配额", "drive").await?;
        Ok(info.quota)
    }
}

#[async_trait]
impl DriveApi for DriveClient {
    async fn get_item(&self, item: &ItemRef) -> Result<DriveItem, DriveError> {
        let url = self.url(&item.api_segment());
        debug!("获取条目元数据: {}", item);

        let response = self.send_authorized(|c| c.get(&url)).await?;
        Self::read_json(response, "获取条目", &item.to_string()).await
    }

    async fn list_children(&self, item: &ItemRef) -> Result<Vec<DriveItem>, DriveError> {
        let target = item.to_string();
        let mut next = Some(self.url(&item.children_segment()));
        let mut children = Vec::new();
        let mut pages = 0usize;

        while let Some(url) = next.take() {
            let response = self.send_authorized(|c| c.get(&url)).await?;
            let page: ChildrenResponse = Self::read_json(response, "列出子条目", &target).await?;

            pages += 1;
            children.extend(page.value);
            next = page.next_link;
        }

        debug!(
            "列出子条目完成: {}, 共 {} 项, {} 页",
            target,
            children.len(),
            pages
        );
        Ok(children)
    }

    async fn create_upload_session(&self, remote_path: &str) -> Result<String, DriveError> {
        let item = ItemRef::Path(remote_path.to_string());
        let url = self.url(&format!("{}/createUploadSession", item.api_segment()));
        let body = serde_json::json!({
            "item": { "@microsoft.graph.conflictBehavior": "replace" }
        });

        let response = self
            .send_authorized(|c| c.post(&url).json(&body))
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(DriveError::SessionCreation {
                remote_path: remote_path.to_string(),
                body: format!("status={}, {}", status, text),
            });
        }

        let session: UploadSessionResponse =
            serde_json::from_str(&text).map_err(|_| DriveError::SessionCreation {
                remote_path: remote_path.to_string(),
                body: text.clone(),
            })?;

        if session.upload_url.is_empty() {
            return Err(DriveError::SessionCreation {
                remote_path: remote_path.to_string(),
                body: text,
            });
        }

        debug!(
            "上传会话已创建: path={}, expiration={:?}",
            remote_path, session.expiration
        );
        Ok(session.upload_url)
    }

    async fn upload_range(
        &self,
        upload_url: &str,
        start: u64,
        end: u64,
        total: u64,
        data: Bytes,
    ) -> Result<(), DriveError> {
        let content_range = format!("bytes {}-{}/{}", start, end, total);

        let response = self
            .transfer
            .put(upload_url)
            .header(CONTENT_LENGTH, data.len())
            .header(CONTENT_RANGE, &content_range)
            .body(data)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DriveError::BadResponse {
            context: format!("上传分片失败 ({})", content_range),
            status,
            body,
        })
    }

    async fn open_download(&self, download_url: &str) -> Result<ByteStream, DriveError> {
        let response = self.transfer.get(download_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::BadResponse {
                context: "打开下载流失败".to_string(),
                status,
                body,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(DriveError::from))
            .boxed())
    }
}
