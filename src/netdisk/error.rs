// 网盘操作错误类型

use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// 网盘传输错误
///
/// 除 `Chunk` 外均为致命错误，直接中止当前操作
#[derive(Debug, Error)]
pub enum DriveError {
    /// 网络/连接失败
    #[error("网络请求失败: {0}")]
    Transport(#[from] reqwest::Error),

    /// 刷新令牌后仍返回 401
    #[error("访问令牌已失效，刷新后仍被拒绝，请重新运行 `onedrivecli auth`")]
    AuthExpired,

    /// 获取访问令牌失败（本地令牌缺失或刷新失败）
    #[error("获取访问令牌失败: {0}")]
    Credential(String),

    /// 远程条目不存在
    #[error("远程条目不存在: {target}\n响应: {body}")]
    NotFound { target: String, body: String },

    /// 响应状态或结构不符合预期（附带原始响应体便于诊断）
    #[error("{context}: status={status}\n响应: {body}")]
    BadResponse {
        context: String,
        status: StatusCode,
        body: String,
    },

    /// 创建上传会话失败
    #[error("创建上传会话失败: {remote_path}\n响应: {body}")]
    SessionCreation { remote_path: String, body: String },

    /// 分片上传失败（队列排空后仍有缺失分片）
    #[error("文件 {remote_path} 有 {} 个分片上传失败: {failed:?}", .failed.len())]
    Chunk {
        remote_path: String,
        failed: Vec<usize>,
    },

    /// 本地文件系统错误
    #[error("本地文件操作失败: {path:?}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DriveError {
    /// 包装本地 I/O 错误
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DriveError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// 是否值得重试（仅用于分片上传）
    ///
    /// 网络错误、超时、限流、5xx 可重试；其余 4xx 重试无意义
    pub fn is_retriable(&self) -> bool {
        match self {
            DriveError::Transport(_) => true,
            DriveError::BadResponse { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::REQUEST_TIMEOUT
            }
            _ => false,
        }
    }

    /// 是否为服务端限流
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            DriveError::BadResponse { status, .. } if *status == StatusCode::TOO_MANY_REQUESTS
        )
    }
}
