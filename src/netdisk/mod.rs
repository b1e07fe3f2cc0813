// 网盘API模块

pub mod client;
pub mod error;
#[cfg(test)]
pub(crate) mod fake;
pub mod types;

pub use client::DriveClient;
pub use error::DriveError;
pub use types::*;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// 下载内容流
pub type ByteStream = BoxStream<'static, Result<Bytes, DriveError>>;

/// 传输引擎依赖的网盘操作
///
/// 需要认证的调用由实现方负责携带令牌并处理 401 重试
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// 获取条目元数据
    async fn get_item(&self, item: &ItemRef) -> Result<DriveItem, DriveError>;

    /// 列出文件夹的全部子条目（自动翻页，保持服务端顺序）
    async fn list_children(&self, item: &ItemRef) -> Result<Vec<DriveItem>, DriveError>;

    /// 为目标路径创建上传会话（同名覆盖），返回会话上传地址
    async fn create_upload_session(&self, remote_path: &str) -> Result<String, DriveError>;

    /// 上传一个分片，`start..=end` 为闭区间
    async fn upload_range(
        &self,
        upload_url: &str,
        start: u64,
        end: u64,
        total: u64,
        data: Bytes,
    ) -> Result<(), DriveError>;

    /// 打开预签名下载地址的内容流
    async fn open_download(&self, download_url: &str) -> Result<ByteStream, DriveError>;
}
