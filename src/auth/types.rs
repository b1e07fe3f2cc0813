// 认证模块数据类型定义

use serde::{Deserialize, Serialize};

/// 过期判定的安全余量（秒）
pub const EXPIRY_MARGIN_SECS: i64 = 30;

/// 令牌端点响应（授权码轮询和刷新共用）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// 持久化的令牌记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    /// 获取时间（Unix 秒）
    pub obtained_at: i64,
}

impl StoredToken {
    /// 由令牌端点响应生成记录
    ///
    /// 刷新响应可能不带新的 refresh_token，此时沿用旧值
    pub fn from_response(resp: TokenResponse, previous_refresh: Option<&str>, now: i64) -> Self {
        let refresh_token = if resp.refresh_token.is_empty() {
            previous_refresh.unwrap_or_default().to_string()
        } else {
            resp.refresh_token
        };

        Self {
            access_token: resp.access_token,
            refresh_token,
            expires_in: resp.expires_in,
            token_type: resp.token_type,
            scope: resp.scope,
            obtained_at: now,
        }
    }

    /// 绝对过期时间（已扣除安全余量）
    pub fn expires_at(&self) -> i64 {
        self.obtained_at + self.expires_in - EXPIRY_MARGIN_SECS
    }

    /// 在 `now` 时刻是否已过期
    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.expires_at()
    }
}

/// 设备码响应
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    pub expires_in: u64,
    #[serde(default = "default_poll_interval")]
    pub interval: u64,
    #[serde(default)]
    pub message: String,
}

fn default_poll_interval() -> u64 {
    5
}
