// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

/// Graph 要求上传分片大小为 320 KiB 的整数倍
pub const UPLOAD_CHUNK_ALIGNMENT: u64 = 320 * 1024;

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
    /// 网盘接口配置
    #[serde(default)]
    pub drive: DriveConfig,
    /// 传输配置
    #[serde(default)]
    pub transfer: TransferConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
        }
    }
}

/// 网盘接口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    /// Graph drive 根地址
    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,
    /// 登录服务地址
    #[serde(default = "default_login_base_url")]
    pub login_base_url: String,
    /// 应用 client_id
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// 租户 ID
    #[serde(default = "default_tenant_id")]
    pub tenant_id: String,
    /// 授权范围
    #[serde(default = "default_scope")]
    pub scope: String,
    /// 令牌文件路径
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    /// 单次 API 请求超时（秒），不作用于文件内容流
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_graph_base_url() -> String {
    "https://graph.microsoft.com/v1.0/me/drive".to_string()
}

fn default_login_base_url() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_client_id() -> String {
    "59790544-ca0c-4b77-b338-26ff9d1b676f".to_string()
}

fn default_tenant_id() -> String {
    "0fd666e8-0b3d-41ea-a5ef-1c509130bd94".to_string()
}

fn default_scope() -> String {
    "offline_access Files.ReadWrite.All".to_string()
}

fn default_token_file() -> PathBuf {
    PathBuf::from("token.json")
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            graph_base_url: default_graph_base_url(),
            login_base_url: default_login_base_url(),
            client_id: default_client_id(),
            tenant_id: default_tenant_id(),
            scope: default_scope(),
            token_file: default_token_file(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// 传输配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// 上传分片大小 (MB)
    #[serde(default = "default_chunk_size_mb")]
    pub chunk_size_mb: u64,
    /// 上传并发 worker 数
    #[serde(default = "default_upload_workers")]
    pub upload_workers: usize,
    /// 单个分片最大重试次数（0 表示不重试）
    #[serde(default = "default_max_chunk_retries")]
    pub max_chunk_retries: u32,
    /// 存在失败分片时是否判定整个文件上传失败
    ///
    /// 关闭后为尽力上传：失败分片仅记录日志，需事后自行校验
    #[serde(default = "default_strict_chunks")]
    pub strict_chunks: bool,
    /// 下载写入缓冲大小 (KB)
    #[serde(default = "default_download_buffer_kb")]
    pub download_buffer_kb: usize,
    /// 进度刷新间隔（毫秒）
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    /// 上传文件夹时是否跟随符号链接
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_chunk_size_mb() -> u64 {
    10
}

fn default_upload_workers() -> usize {
    4
}

fn default_max_chunk_retries() -> u32 {
    3
}

fn default_strict_chunks() -> bool {
    true
}

fn default_download_buffer_kb() -> usize {
    32
}

fn default_progress_interval_ms() -> u64 {
    200
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size_mb: default_chunk_size_mb(),
            upload_workers: default_upload_workers(),
            max_chunk_retries: default_max_chunk_retries(),
            strict_chunks: default_strict_chunks(),
            download_buffer_kb: default_download_buffer_kb(),
            progress_interval_ms: default_progress_interval_ms(),
            follow_symlinks: false,
        }
    }
}

impl TransferConfig {
    /// 分片大小（字节）
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size_mb * 1024 * 1024
    }

    /// 下载缓冲大小（字节）
    pub fn download_buffer_size(&self) -> usize {
        self.download_buffer_kb * 1024
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// 校验传输参数
    pub fn validate(&self) -> Result<()> {
        let chunk_size = self.chunk_size();
        if chunk_size == 0 || chunk_size % UPLOAD_CHUNK_ALIGNMENT != 0 {
            anyhow::bail!(
                "chunk_size_mb={} 无效：分片大小必须是 320 KiB 的正整数倍",
                self.chunk_size_mb
            );
        }
        if self.upload_workers == 0 {
            anyhow::bail!("upload_workers 至少为 1");
        }
        if self.download_buffer_kb == 0 {
            anyhow::bail!("download_buffer_kb 至少为 1");
        }
        if self.progress_interval_ms == 0 {
            anyhow::bail!("progress_interval_ms 至少为 1");
        }
        Ok(())
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        config
            .transfer
            .validate()
            .context("配置文件中的传输参数校验失败")?;

        Ok(config)
    }
}
