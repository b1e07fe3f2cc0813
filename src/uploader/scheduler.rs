// 分片上传调度器
//
// 有界队列 + 固定数量 worker：
// - 分片按序号升序入队，完成顺序不定
// - worker 对共享只读文件做定位读取，互不影响
// - 单个分片失败按退避重试，最终结果全部记入 ChunkReport，不中断其他分片

use crate::common::ProgressState;
use crate::config::TransferConfig;
use crate::netdisk::{DriveApi, DriveError};
use crate::uploader::chunk::{plan_chunks, ChunkJob};
use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

// =====================================================
// 重试配置
// =====================================================

/// 初始退避延迟（毫秒）
const INITIAL_BACKOFF_MS: u64 = 100;

/// 最大退避延迟（毫秒）
const MAX_BACKOFF_MS: u64 = 5000;

/// 限流时的额外等待时间（毫秒）
const RATE_LIMIT_BACKOFF_MS: u64 = 10000;

/// 计算指数退避延迟
///
/// 100ms, 200ms, 400ms ... 最大 5000ms；限流时至少 10s
fn backoff_delay(retry: u32, error: &DriveError) -> Duration {
    let delay = INITIAL_BACKOFF_MS
        .saturating_mul(2u64.saturating_pow(retry))
        .min(MAX_BACKOFF_MS);

    if error.is_rate_limited() {
        Duration::from_millis(delay.max(RATE_LIMIT_BACKOFF_MS))
    } else {
        Duration::from_millis(delay)
    }
}

// =====================================================
// 会话与结果
// =====================================================

/// 单个文件的上传会话
#[derive(Debug, Clone)]
pub struct TransferSession {
    pub remote_path: String,
    pub size: u64,
    pub upload_url: String,
}

/// 单个分片的最终结果
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub job: ChunkJob,
    /// 实际请求次数
    pub attempts: u32,
    /// 最后一次失败原因，成功为 None
    pub error: Option<String>,
}

impl ChunkResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// 一个文件全部分片的上传结果
#[derive(Debug, Clone, Default)]
pub struct ChunkReport {
    /// 计划分片数
    pub planned: usize,
    /// 按序号排序
    pub results: Vec<ChunkResult>,
}

impl ChunkReport {
    fn new(planned: usize, mut results: Vec<ChunkResult>) -> Self {
        results.sort_by_key(|r| r.job.index);
        Self { planned, results }
    }

    /// 未成功的分片序号（包括 worker 异常退出而没有结果的分片）
    pub fn failed_indices(&self) -> Vec<usize> {
        (0..self.planned)
            .filter(|index| {
                !self
                    .results
                    .iter()
                    .any(|r| r.job.index == *index && r.is_success())
            })
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failed_indices().is_empty()
    }

    /// 成功上传的字节数
    pub fn uploaded_bytes(&self) -> u64 {
        self.results
            .iter()
            .filter(|r| r.is_success())
            .map(|r| r.job.len())
            .sum()
    }
}

// =====================================================
// 调度器
// =====================================================

/// 分片上传调度器
pub struct ChunkScheduler<A: DriveApi + ?Sized + 'static> {
    api: Arc<A>,
    chunk_size: u64,
    workers: usize,
    max_retries: u32,
}

impl<A: DriveApi + ?Sized + 'static> ChunkScheduler<A> {
    pub fn new(api: Arc<A>, chunk_size: u64, workers: usize, max_retries: u32) -> Self {
        Self {
            api,
            chunk_size: chunk_size.max(1),
            workers: workers.max(1),
            max_retries,
        }
    }

    pub fn from_config(api: Arc<A>, config: &TransferConfig) -> Self {
        Self::new(
            api,
            config.chunk_size(),
            config.upload_workers,
            config.max_chunk_retries,
        )
    }

    /// 上传单个本地文件
    ///
    /// 打开文件 -> 创建上传会话（同名覆盖）-> 并发上传全部分片
    pub async fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
        progress: &ProgressState,
    ) -> Result<ChunkReport, DriveError> {
        let file = tokio::fs::File::open(local_path)
            .await
            .map_err(|e| DriveError::fs(local_path, e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| DriveError::fs(local_path, e))?
            .len();
        let file = Arc::new(file.into_std().await);

        let upload_url = self.api.create_upload_session(remote_path).await?;
        let session = TransferSession {
            remote_path: remote_path.to_string(),
            size,
            upload_url,
        };

        info!("🚀 开始上传: {:?} -> {} ({} 字节)", local_path, remote_path, size);
        Ok(self.run(session, local_path, file, progress).await)
    }

    /// 在已创建的会话上上传全部分片，等待队列排空后返回
    pub async fn run(
        &self,
        session: TransferSession,
        local_path: &Path,
        file: Arc<std::fs::File>,
        progress: &ProgressState,
    ) -> ChunkReport {
        let jobs = plan_chunks(session.size, self.chunk_size);
        let planned = jobs.len();
        if planned == 0 {
            debug!("空文件，无需上传分片: {}", session.remote_path);
            return ChunkReport::default();
        }

        let worker_count = self.workers.min(planned);
        let (tx, rx) = mpsc::channel::<ChunkJob>(worker_count * 2);
        let rx = Arc::new(Mutex::new(rx));
        let session = Arc::new(session);

        let mut join_set = JoinSet::new();
        for worker_id in 0..worker_count {
            let worker = ChunkWorker {
                id: worker_id,
                api: self.api.clone(),
                session: session.clone(),
                local_path: local_path.to_path_buf(),
                file: file.clone(),
                progress: progress.clone(),
                max_retries: self.max_retries,
            };
            let rx = rx.clone();
            join_set.spawn(async move { worker.run(rx).await });
        }

        for job in jobs {
            if tx.send(job).await.is_err() {
                error!("所有上传 worker 已退出，停止派发分片");
                break;
            }
        }
        drop(tx);

        let mut results = Vec::with_capacity(planned);
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(worker_results) => results.extend(worker_results),
                Err(e) => error!("上传 worker 异常退出: {}", e),
            }
        }

        let report = ChunkReport::new(planned, results);
        debug!(
            "分片上传结束: {}, 成功 {}/{}",
            session.remote_path,
            planned - report.failed_indices().len(),
            planned
        );
        report
    }
}

/// 上传 worker
struct ChunkWorker<A: DriveApi + ?Sized> {
    id: usize,
    api: Arc<A>,
    session: Arc<TransferSession>,
    local_path: PathBuf,
    file: Arc<std::fs::File>,
    progress: ProgressState,
    max_retries: u32,
}

impl<A: DriveApi + ?Sized> ChunkWorker<A> {
    /// 从共享队列取分片直到队列关闭
    async fn run(self, rx: Arc<Mutex<mpsc::Receiver<ChunkJob>>>) -> Vec<ChunkResult> {
        let mut results = Vec::new();
        loop {
            // 锁只在取任务期间持有
            let job = rx.lock().await.recv().await;
            let Some(job) = job else {
                break;
            };
            results.push(self.upload_with_retry(job).await);
        }
        debug!("worker #{} 退出, 处理分片 {} 个", self.id, results.len());
        results
    }

    async fn upload_with_retry(&self, job: ChunkJob) -> ChunkResult {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.upload_once(job).await {
                Ok(()) => {
                    self.progress.add(job.len());
                    debug!(
                        "分片 #{} 上传成功 ({}), worker #{}",
                        job.index,
                        job.content_range(self.session.size),
                        self.id
                    );
                    return ChunkResult {
                        job,
                        attempts,
                        error: None,
                    };
                }
                Err(e) => {
                    let retries = attempts - 1;
                    if !e.is_retriable() || retries >= self.max_retries {
                        warn!(
                            "分片 #{} 上传失败 (共尝试 {} 次): {}",
                            job.index, attempts, e
                        );
                        return ChunkResult {
                            job,
                            attempts,
                            error: Some(e.to_string()),
                        };
                    }

                    let delay = backoff_delay(retries, &e);
                    warn!(
                        "分片 #{} 上传失败，{}ms 后重试 ({}/{}): {}",
                        job.index,
                        delay.as_millis(),
                        retries + 1,
                        self.max_retries,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn upload_once(&self, job: ChunkJob) -> Result<(), DriveError> {
        let data = read_range(self.file.clone(), &self.local_path, job).await?;
        self.api
            .upload_range(
                &self.session.upload_url,
                job.start,
                job.end,
                self.session.size,
                data,
            )
            .await
    }
}

/// 在阻塞线程上按偏移读取分片内容
async fn read_range(
    file: Arc<std::fs::File>,
    path: &Path,
    job: ChunkJob,
) -> Result<Bytes, DriveError> {
    let len = job.len() as usize;
    let offset = job.start;

    let joined = tokio::task::spawn_blocking(move || {
        let mut buf = vec![0u8; len];
        read_exact_at(&file, &mut buf, offset)?;
        Ok::<_, io::Error>(buf)
    })
    .await;

    match joined {
        Ok(Ok(buf)) => Ok(Bytes::from(buf)),
        Ok(Err(e)) => Err(DriveError::fs(path, e)),
        Err(e) => Err(DriveError::fs(
            path,
            io::Error::new(io::ErrorKind::Other, e.to_string()),
        )),
    }
}

#[cfg(unix)]
fn read_exact_at(file: &std::fs::File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &std::fs::File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                buf = &mut std::mem::take(&mut buf)[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
