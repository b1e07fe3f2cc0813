// 设备码登录
//
// 流程：申请设备码 -> 提示用户在浏览器中输入 user_code -> 轮询令牌端点 -> 保存令牌

use crate::auth::{StoredToken, TokenEndpoint, TokenResponse, TokenStore};
use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 最小轮询间隔（秒）
const MIN_POLL_INTERVAL_SECS: u64 = 5;

/// slow_down 时追加的间隔（秒）
const SLOW_DOWN_STEP_SECS: u64 = 5;

/// 单次轮询结果
#[derive(Debug)]
pub enum PollOutcome {
    /// 登录成功
    Token(TokenResponse),
    /// 用户尚未完成登录
    Pending,
    /// 服务端要求降低轮询频率
    SlowDown,
    /// 终止性错误（拒绝授权、设备码过期等）
    Failed(String),
}

impl PollOutcome {
    pub fn classify(resp: TokenResponse) -> Self {
        if !resp.access_token.is_empty() {
            return PollOutcome::Token(resp);
        }
        match resp.error.as_deref() {
            Some("authorization_pending") => PollOutcome::Pending,
            Some("slow_down") => PollOutcome::SlowDown,
            Some(code) => PollOutcome::Failed(format!(
                "{}: {}",
                code,
                resp.error_description.as_deref().unwrap_or("")
            )),
            None => PollOutcome::Failed("令牌端点返回空响应".to_string()),
        }
    }
}

/// 设备码登录
pub struct DeviceLogin<'a, E: TokenEndpoint> {
    endpoint: &'a E,
    store: &'a TokenStore,
    min_interval: Duration,
}

impl<'a, E: TokenEndpoint> DeviceLogin<'a, E> {
    pub fn new(endpoint: &'a E, store: &'a TokenStore) -> Self {
        Self {
            endpoint,
            store,
            min_interval: Duration::from_secs(MIN_POLL_INTERVAL_SECS),
        }
    }

    #[cfg(test)]
    fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// 执行登录，成功后返回已保存的令牌
    pub async fn run(&self) -> Result<StoredToken> {
        let dc = self.endpoint.request_device_code().await?;
        if dc.device_code.is_empty() {
            anyhow::bail!("申请设备码失败：响应中没有 device_code");
        }

        println!("{}", dc.message);
        println!(
            "验证地址: {}",
            dc.verification_uri_complete
                .as_deref()
                .unwrap_or(&dc.verification_uri)
        );
        info!("已获取设备码, user_code={}, 有效期 {} 秒", dc.user_code, dc.expires_in);

        let deadline = Instant::now() + Duration::from_secs(dc.expires_in);
        let mut interval = Duration::from_secs(dc.interval).max(self.min_interval);

        loop {
            if Instant::now() >= deadline {
                anyhow::bail!("设备码已过期，请重新运行 `onedrivecli auth`");
            }
            tokio::time::sleep(interval).await;

            let resp = match self.endpoint.poll_device_code(&dc.device_code).await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!("轮询令牌失败，稍后重试: {:#}", e);
                    continue;
                }
            };

            match PollOutcome::classify(resp) {
                PollOutcome::Token(resp) => {
                    let now = chrono::Utc::now().timestamp();
                    let token = StoredToken::from_response(resp, None, now);
                    self.store.save(&token).await?;
                    info!("登录成功，令牌已保存到 {:?}", self.store.path());
                    return Ok(token);
                }
                PollOutcome::Pending => {
                    debug!("等待用户完成登录...");
                }
                PollOutcome::SlowDown => {
                    interval += Duration::from_secs(SLOW_DOWN_STEP_SECS);
                    debug!("服务端要求降低轮询频率, interval={:?}", interval);
                }
                PollOutcome::Failed(reason) => {
                    anyhow::bail!("登录失败: {}", reason);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::DeviceCodeResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn pending() -> TokenResponse {
        TokenResponse {
            error: Some("authorization_pending".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_classify() {
        assert!(matches!(PollOutcome::classify(pending()), PollOutcome::Pending));

        let slow = TokenResponse {
            error: Some("slow_down".into()),
            ..Default::default()
        };
        assert!(matches!(PollOutcome::classify(slow), PollOutcome::SlowDown));

        let denied = TokenResponse {
            error: Some("authorization_declined".into()),
            error_description: Some("user said no".into()),
            ..Default::default()
        };
        match PollOutcome::classify(denied) {
            PollOutcome::Failed(msg) => assert!(msg.contains("user said no")),
            other => panic!("unexpected {:?}", other),
        }

        let ok = TokenResponse {
            access_token: "t".into(),
            ..Default::default()
        };
        assert!(matches!(PollOutcome::classify(ok), PollOutcome::Token(_)));
    }

    /// 前两次轮询返回 pending，第三次成功
    #[derive(Default)]
    struct ScriptedEndpoint {
        polls: AtomicUsize,
    }

    #[async_trait]
    impl TokenEndpoint for ScriptedEndpoint {
        async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse> {
            unreachable!()
        }

        async fn request_device_code(&self) -> Result<DeviceCodeResponse> {
            Ok(DeviceCodeResponse {
                device_code: "dev-code".into(),
                user_code: "ABCD-EFGH".into(),
                verification_uri: "https://microsoft.com/devicelogin".into(),
                verification_uri_complete: None,
                expires_in: 60,
                interval: 0,
                message: "请访问验证地址并输入代码".into(),
            })
        }

        async fn poll_device_code(&self, device_code: &str) -> Result<TokenResponse> {
            assert_eq!(device_code, "dev-code");
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                return Ok(pending());
            }
            Ok(TokenResponse {
                access_token: "access".into(),
                refresh_token: "refresh".into(),
                token_type: "Bearer".into(),
                expires_in: 3600,
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_device_login_polls_until_token() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        let endpoint = ScriptedEndpoint::default();

        let token = DeviceLogin::new(&endpoint, &store)
            .with_min_interval(Duration::from_millis(1))
            .run()
            .await
            .unwrap();

        assert_eq!(token.access_token, "access");
        assert_eq!(endpoint.polls.load(Ordering::SeqCst), 3);
        assert_eq!(store.load().await.unwrap().refresh_token, "refresh");
    }
}
