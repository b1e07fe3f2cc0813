// 凭证提供者
//
// 负责：
// 1. 从令牌文件加载访问令牌并缓存
// 2. 过期（扣除 30 秒余量）时刷新并持久化
// 3. 请求返回 401 时强制刷新

use crate::auth::{StoredToken, TokenEndpoint, TokenSource, TokenStore};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// 凭证提供者
///
/// 缓存锁在刷新期间保持，多个调用方同时发现过期时只会刷新一次
pub struct CredentialProvider<E: TokenEndpoint> {
    store: TokenStore,
    endpoint: E,
    cached: Mutex<Option<StoredToken>>,
}

impl<E: TokenEndpoint> CredentialProvider<E> {
    pub fn new(store: TokenStore, endpoint: E) -> Self {
        Self {
            store,
            endpoint,
            cached: Mutex::new(None),
        }
    }

    /// 刷新并持久化，返回新记录
    async fn refresh_with(&self, current: &StoredToken) -> Result<StoredToken> {
        let resp = self.endpoint.refresh(&current.refresh_token).await?;
        let now = chrono::Utc::now().timestamp();
        let token = StoredToken::from_response(resp, Some(&current.refresh_token), now);

        self.store.save(&token).await?;
        info!("访问令牌已刷新, 有效期 {} 秒", token.expires_in);
        Ok(token)
    }
}

#[async_trait]
impl<E: TokenEndpoint> TokenSource for CredentialProvider<E> {
    async fn current_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        let token = match cached.take() {
            Some(token) => token,
            None => self.store.load().await?,
        };

        let now = chrono::Utc::now().timestamp();
        let token = if token.is_expired_at(now) {
            info!("访问令牌已过期，正在刷新...");
            self.refresh_with(&token).await?
        } else {
            token
        };

        let access = token.access_token.clone();
        *cached = Some(token);
        Ok(access)
    }

    async fn force_refresh(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        let current = match cached.take() {
            Some(token) => token,
            None => self.store.load().await?,
        };

        warn!("访问令牌被拒绝，强制刷新");
        let token = self.refresh_with(&current).await?;
        let access = token.access_token.clone();
        *cached = Some(token);
        Ok(access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{DeviceCodeResponse, TokenResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// 只支持刷新的假令牌端点
    #[derive(Default)]
    struct CountingEndpoint {
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl TokenEndpoint for CountingEndpoint {
        async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            assert_eq!(refresh_token, "refresh-0");
            Ok(TokenResponse {
                access_token: format!("access-{}", n),
                refresh_token: format!("refresh-{}", n),
                token_type: "Bearer".into(),
                expires_in: 3600,
                ..Default::default()
            })
        }

        async fn request_device_code(&self) -> Result<DeviceCodeResponse> {
            unreachable!()
        }

        async fn poll_device_code(&self, _device_code: &str) -> Result<TokenResponse> {
            unreachable!()
        }
    }

    async fn provider_with(
        dir: &TempDir,
        obtained_at: i64,
    ) -> CredentialProvider<CountingEndpoint> {
        let store = TokenStore::new(dir.path().join("token.json"));
        store
            .save(&StoredToken {
                access_token: "access-0".into(),
                refresh_token: "refresh-0".into(),
                expires_in: 3600,
                token_type: "Bearer".into(),
                scope: String::new(),
                obtained_at,
            })
            .await
            .unwrap();
        CredentialProvider::new(store, CountingEndpoint::default())
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_once() {
        let dir = TempDir::new().unwrap();
        let now = chrono::Utc::now().timestamp();
        // obtained_at + expires_in - 30 已在过去
        let provider = provider_with(&dir, now - 3600).await;

        let token = provider.current_token().await.unwrap();
        assert_eq!(token, "access-1");
        assert_eq!(provider.endpoint.refreshes.load(Ordering::SeqCst), 1);

        // 新令牌已持久化
        let saved = TokenStore::new(dir.path().join("token.json"))
            .load()
            .await
            .unwrap();
        assert_eq!(saved.access_token, "access-1");
        assert_eq!(saved.refresh_token, "refresh-1");

        // 刷新后的令牌仍有效，不会再次刷新
        let again = provider.current_token().await.unwrap();
        assert_eq!(again, "access-1");
        assert_eq!(provider.endpoint.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fresh_token_no_refresh() {
        let dir = TempDir::new().unwrap();
        let now = chrono::Utc::now().timestamp();
        let provider = provider_with(&dir, now).await;

        assert_eq!(provider.current_token().await.unwrap(), "access-0");
        assert_eq!(provider.current_token().await.unwrap(), "access-0");
        assert_eq!(provider.endpoint.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_force_refresh() {
        let dir = TempDir::new().unwrap();
        let now = chrono::Utc::now().timestamp();
        let provider = provider_with(&dir, now).await;

        let token = provider.force_refresh().await.unwrap();
        assert_eq!(token, "access-1");
        assert_eq!(provider.endpoint.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_token_file() {
        let dir = TempDir::new().unwrap();
        let provider = CredentialProvider::new(
            TokenStore::new(dir.path().join("token.json")),
            CountingEndpoint::default(),
        );
        assert!(provider.current_token().await.is_err());
    }
}
