// 认证模块
//
// 设备码登录、令牌持久化和自动刷新

pub mod device_code;
pub mod oauth;
pub mod provider;
pub mod store;
pub mod types;

pub use device_code::{DeviceLogin, PollOutcome};
pub use oauth::{OAuthTokenEndpoint, TokenEndpoint};
pub use provider::CredentialProvider;
pub use store::TokenStore;
pub use types::{DeviceCodeResponse, StoredToken, TokenResponse, EXPIRY_MARGIN_SECS};

use anyhow::Result;
use async_trait::async_trait;

/// 访问令牌来源
///
/// 网盘客户端每次发起请求前借用一次令牌；收到 401 时调用 `force_refresh`
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// 当前有效的访问令牌（过期时自动刷新）
    async fn current_token(&self) -> Result<String>;

    /// 无条件刷新并返回新令牌
    async fn force_refresh(&self) -> Result<String>;
}
