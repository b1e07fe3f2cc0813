// 下载引擎
//
// 解析远程目录树 -> 确定本地目标路径 -> 深度优先逐个文件流式写入
// 下载为串行执行，进度上报任务并行采样

use crate::common::{ProgressReporter, ProgressSink, ProgressState, TerminalSink};
use crate::config::TransferConfig;
use crate::downloader::resolver::RemoteTreeResolver;
use crate::downloader::tree::{NodeId, NodeKind, RemoteNode, RemoteTree};
use crate::netdisk::{DriveApi, DriveError, ItemRef};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

/// 下载结果统计
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    /// 实际写入的本地根路径
    pub target: PathBuf,
    pub files: usize,
    pub bytes: u64,
}

/// 下载引擎
pub struct DownloadEngine<A: DriveApi + ?Sized> {
    api: Arc<A>,
    buffer_size: usize,
    progress_interval: Duration,
    sink: Arc<dyn ProgressSink>,
}

impl<A: DriveApi + ?Sized> DownloadEngine<A> {
    pub fn new(api: Arc<A>, config: &TransferConfig) -> Self {
        Self {
            api,
            buffer_size: config.download_buffer_size().max(1),
            progress_interval: config.progress_interval(),
            sink: Arc::new(TerminalSink),
        }
    }

    /// 替换进度输出目标
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// 下载远程路径或条目 ID 到本地
    ///
    /// 遇到第一个错误即中止，已写完的文件保留在磁盘上
    pub async fn download(
        &self,
        remote: &str,
        destination: &Path,
    ) -> Result<DownloadSummary, DriveError> {
        info!("开始下载: {} -> {:?}", remote, destination);

        let tree = RemoteTreeResolver::new(self.api.as_ref())
            .resolve(remote)
            .await?;
        let root = tree.get(tree.root());
        let target = resolve_destination(destination, &root.name, root.is_folder()).await?;

        let total = tree.total_size();
        let state = ProgressState::new();
        let reporter =
            ProgressReporter::spawn(state.clone(), total, self.progress_interval, self.sink.clone());

        match self.write_tree(&tree, &target, &state).await {
            Ok(files) => {
                reporter.finish().await;
                info!(
                    "下载完成: {} -> {:?}, 文件 {} 个, 共 {} 字节, 耗时 {:.1}s",
                    remote,
                    target,
                    files,
                    state.transferred(),
                    state.elapsed().as_secs_f64()
                );
                Ok(DownloadSummary {
                    target,
                    files,
                    bytes: state.transferred(),
                })
            }
            Err(e) => {
                reporter.stop().await;
                Err(e)
            }
        }
    }

    /// 按深度优先顺序落盘，返回写入的文件数
    async fn write_tree(
        &self,
        tree: &RemoteTree,
        target: &Path,
        state: &ProgressState,
    ) -> Result<usize, DriveError> {
        let mut files = 0usize;
        let mut stack: Vec<(NodeId, PathBuf)> = vec![(tree.root(), target.to_path_buf())];

        while let Some((id, path)) = stack.pop() {
            let node = tree.get(id);
            match &node.kind {
                NodeKind::Folder { children } => {
                    fs::create_dir_all(&path)
                        .await
                        .map_err(|e| DriveError::fs(&path, e))?;
                    debug!("已创建目录: {:?}", path);

                    for child in children.iter().rev() {
                        stack.push((*child, path.join(&tree.get(*child).name)));
                    }
                }
                NodeKind::File { .. } => {
                    self.download_file(node, &path, state).await?;
                    files += 1;
                }
            }
        }

        Ok(files)
    }

    /// 下载单个文件
    async fn download_file(
        &self,
        node: &RemoteNode,
        path: &Path,
        state: &ProgressState,
    ) -> Result<(), DriveError> {
        let url = match node.download_url() {
            Some(url) => url.to_string(),
            None => self.fetch_download_url(node).await?,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DriveError::fs(parent, e))?;
        }

        let mut stream = self.api.open_download(&url).await?;
        let file = fs::File::create(path)
            .await
            .map_err(|e| DriveError::fs(path, e))?;
        let mut writer = BufWriter::with_capacity(self.buffer_size, file);

        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for piece in chunk.chunks(self.buffer_size) {
                writer
                    .write_all(piece)
                    .await
                    .map_err(|e| DriveError::fs(path, e))?;
                written += piece.len() as u64;
                state.add(piece.len() as u64);
            }
        }
        writer.flush().await.map_err(|e| DriveError::fs(path, e))?;

        if written != node.size {
            warn!(
                "文件大小与元数据不一致: {:?}, 期望 {} 字节, 实际 {} 字节",
                path, node.size, written
            );
        }
        debug!("文件下载完成: {:?} ({} 字节)", path, written);
        Ok(())
    }

    /// 列表结果未附带下载地址时，单独查询一次条目元数据
    async fn fetch_download_url(&self, node: &RemoteNode) -> Result<String, DriveError> {
        debug!("列表结果缺少下载地址，重新获取: {} (id={})", node.name, node.id);
        let mut item = self.api.get_item(&ItemRef::Id(node.id.clone())).await?;
        match item.download_url.take() {
            Some(url) => Ok(url),
            None => Err(DriveError::BadResponse {
                context: format!("条目 {} 没有下载地址", node.name),
                status: reqwest::StatusCode::OK,
                body: serde_json::to_string(&item).unwrap_or_default(),
            }),
        }
    }
}

/// 确定本地目标路径
///
/// - `.` 表示当前工作目录
/// - 已存在的目录：在其下追加远程根节点名
/// - 不存在的路径：根为文件夹时即为该目录；根为文件时作为目标文件路径（父目录会被创建）
pub async fn resolve_destination(
    destination: &Path,
    root_name: &str,
    root_is_folder: bool,
) -> Result<PathBuf, DriveError> {
    let destination = if destination == Path::new(".") {
        std::env::current_dir().map_err(|e| DriveError::fs(destination, e))?
    } else {
        destination.to_path_buf()
    };

    match fs::metadata(&destination).await {
        Ok(meta) if meta.is_dir() => Ok(destination.join(root_name)),
        Ok(_) if root_is_folder => Err(DriveError::fs(
            &destination,
            std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "目标已存在且不是目录，无法写入文件夹",
            ),
        )),
        Ok(_) => Ok(destination),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if root_is_folder {
                fs::create_dir_all(&destination)
                    .await
                    .map_err(|e| DriveError::fs(&destination, e))?;
            } else if let Some(parent) = destination.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)
                        .await
                        .map_err(|e| DriveError::fs(parent, e))?;
                }
            }
            Ok(destination)
        }
        Err(e) => Err(DriveError::fs(&destination, e)),
    }
}
