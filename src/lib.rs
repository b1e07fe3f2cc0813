// OneDrive Rust Library
// OneDrive 命令行客户端核心库

// 认证模块
pub mod auth;

// 配置管理模块
pub mod config;

// 日志系统
pub mod logging;

// 网盘API模块
pub mod netdisk;

// 下载引擎模块
pub mod downloader;

// 上传引擎模块
pub mod uploader;

// 公共模块（进度上报）
pub mod common;

// 导出常用类型
pub use auth::{CredentialProvider, DeviceLogin, OAuthTokenEndpoint, TokenSource, TokenStore};
pub use common::{ProgressReporter, ProgressState};
pub use config::AppConfig;
pub use downloader::{DownloadEngine, RemoteTree, RemoteTreeResolver};
pub use netdisk::{DriveApi, DriveClient, DriveError};
pub use uploader::{ChunkScheduler, UploadEngine};
