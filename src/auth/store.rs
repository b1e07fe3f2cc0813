// 令牌持久化

use crate::auth::StoredToken;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// 令牌文件存储（JSON）
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取令牌
    ///
    /// 文件不存在时提示用户先登录
    pub async fn load(&self) -> Result<StoredToken> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            anyhow::bail!(
                "未找到令牌文件 {:?}，请先运行 `onedrivecli auth` 登录",
                self.path
            );
        }

        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("读取令牌文件失败: {:?}", self.path))?;

        let token: StoredToken = serde_json::from_str(&content)
            .with_context(|| format!("解析令牌文件失败: {:?}", self.path))?;

        debug!("已加载令牌, obtained_at={}", token.obtained_at);
        Ok(token)
    }

    /// 保存令牌（覆盖写入）
    pub async fn save(&self, token: &StoredToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("创建令牌目录失败")?;
            }
        }

        let content = serde_json::to_string_pretty(token).context("序列化令牌失败")?;
        fs::write(&self.path, content)
            .await
            .with_context(|| format!("写入令牌文件失败: {:?}", self.path))?;

        debug!("令牌已保存到 {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("nested/token.json"));

        let token = StoredToken {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            expires_in: 3600,
            token_type: "Bearer".into(),
            scope: "Files.ReadWrite.All".into(),
            obtained_at: 1_700_000_000,
        };
        store.save(&token).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, token);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));

        let err = store.load().await.unwrap_err();
        assert!(err.to_string().contains("请先运行"));
    }
}
