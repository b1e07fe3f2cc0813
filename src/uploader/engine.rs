// 上传引擎
//
// 单文件直接上传到远程路径；文件夹递归扫描后逐个文件交给分片调度器，
// 所有文件共用一个进度计数器

use crate::common::{ProgressReporter, ProgressSink, ProgressState, TerminalSink};
use crate::config::TransferConfig;
use crate::netdisk::{DriveApi, DriveError};
use crate::uploader::folder::{join_remote, normalize_remote, FolderScanner};
use crate::uploader::scheduler::ChunkScheduler;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 上传计划中的单个文件
#[derive(Debug, Clone)]
struct PlannedFile {
    local_path: PathBuf,
    remote_path: String,
    size: u64,
}

/// 上传结果统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub files: usize,
    /// 实际上传成功的字节数
    pub bytes: u64,
    /// 存在失败分片的文件（仅非严格模式下出现）
    pub incomplete: Vec<(String, Vec<usize>)>,
}

/// 上传引擎
pub struct UploadEngine<A: DriveApi + ?Sized + 'static> {
    scheduler: ChunkScheduler<A>,
    strict_chunks: bool,
    follow_symlinks: bool,
    progress_interval: Duration,
    sink: Arc<dyn ProgressSink>,
}

impl<A: DriveApi + ?Sized + 'static> UploadEngine<A> {
    pub fn new(api: Arc<A>, config: &TransferConfig) -> Self {
        Self {
            scheduler: ChunkScheduler::from_config(api, config),
            strict_chunks: config.strict_chunks,
            follow_symlinks: config.follow_symlinks,
            progress_interval: config.progress_interval(),
            sink: Arc::new(TerminalSink),
        }
    }

    /// 替换分片调度器（测试中使用小分片）
    pub fn with_scheduler(mut self, scheduler: ChunkScheduler<A>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// 替换进度输出目标
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// 上传本地文件或文件夹
    ///
    /// - 文件：上传到 `remote`
    /// - 文件夹：每个文件上传到 `remote/<相对路径>`
    /// - `local` 为 `.` 时表示当前工作目录
    pub async fn upload(&self, remote: &str, local: &Path) -> Result<UploadSummary, DriveError> {
        let local = if local == Path::new(".") {
            std::env::current_dir().map_err(|e| DriveError::fs(local, e))?
        } else {
            local.to_path_buf()
        };

        let plan = self.plan(remote, &local).await?;
        let total: u64 = plan.iter().map(|f| f.size).sum();
        info!(
            "开始上传: {:?} -> {}, 文件 {} 个, 共 {} 字节",
            local,
            remote,
            plan.len(),
            total
        );

        let state = ProgressState::new();
        let reporter =
            ProgressReporter::spawn(state.clone(), total, self.progress_interval, self.sink.clone());

        match self.upload_all(&plan, &state).await {
            Ok(summary) => {
                if summary.incomplete.is_empty() {
                    reporter.finish().await;
                } else {
                    reporter.stop().await;
                }
                info!(
                    "上传结束: {} 个文件, 共 {} 字节, 耗时 {:.1}s",
                    summary.files,
                    summary.bytes,
                    state.elapsed().as_secs_f64()
                );
                Ok(summary)
            }
            Err(e) => {
                reporter.stop().await;
                Err(e)
            }
        }
    }

    async fn plan(&self, remote: &str, local: &Path) -> Result<Vec<PlannedFile>, DriveError> {
        let meta = tokio::fs::metadata(local)
            .await
            .map_err(|e| DriveError::fs(local, e))?;

        if !meta.is_dir() {
            return Ok(vec![PlannedFile {
                local_path: local.to_path_buf(),
                remote_path: normalize_remote(remote),
                size: meta.len(),
            }]);
        }

        let root = local.to_path_buf();
        let scanner = FolderScanner::new().follow_symlinks(self.follow_symlinks);
        let scanned = tokio::task::spawn_blocking(move || scanner.scan(&root))
            .await
            .map_err(|e| {
                DriveError::fs(
                    local,
                    std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
                )
            })??;

        Ok(scanned
            .into_iter()
            .map(|file| PlannedFile {
                remote_path: join_remote(remote, &file.relative_path),
                local_path: file.local_path,
                size: file.size,
            })
            .collect())
    }

    async fn upload_all(
        &self,
        plan: &[PlannedFile],
        state: &ProgressState,
    ) -> Result<UploadSummary, DriveError> {
        let mut summary = UploadSummary::default();

        for file in plan {
            let report = self
                .scheduler
                .upload_file(&file.local_path, &file.remote_path, state)
                .await?;

            summary.files += 1;
            summary.bytes += report.uploaded_bytes();

            let failed = report.failed_indices();
            if failed.is_empty() {
                continue;
            }

            if self.strict_chunks {
                return Err(DriveError::Chunk {
                    remote_path: file.remote_path.clone(),
                    failed,
                });
            }

            warn!(
                "尽力上传模式: {} 有 {} 个分片失败 {:?}，远程文件可能不完整，请事后校验",
                file.remote_path,
                failed.len(),
                failed
            );
            summary.incomplete.push((file.remote_path.clone(), failed));
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::progress::NullSink;
    use crate::netdisk::fake::FakeDrive;
    use std::fs;
    use tempfile::TempDir;

    fn engine(drive: Arc<FakeDrive>, strict: bool) -> UploadEngine<FakeDrive> {
        engine_with(
            drive,
            TransferConfig {
                strict_chunks: strict,
                ..Default::default()
            },
        )
    }

    fn engine_with(drive: Arc<FakeDrive>, config: TransferConfig) -> UploadEngine<FakeDrive> {
        let config = TransferConfig {
            progress_interval_ms: 5,
            ..config
        };
        UploadEngine::new(drive.clone(), &config)
            .with_scheduler(ChunkScheduler::new(drive, 4, 2, 0))
            .with_sink(Arc::new(NullSink))
    }

    #[tokio::test]
    async fn test_upload_single_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.txt");
        fs::write(&path, b"hello world").unwrap();

        let drive = Arc::new(FakeDrive::new());
        let summary = engine(drive.clone(), true)
            .upload("docs/report.txt", &path)
            .await
            .unwrap();

        assert_eq!(summary.files, 1);
        assert_eq!(summary.bytes, 11);
        assert_eq!(drive.uploaded("/docs/report.txt").unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_upload_folder_joins_relative_paths() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"aaaaaa").unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("b c.txt"), b"bbbbbbbbb").unwrap();
        fs::write(dir.path().join("sub").join("empty.txt"), b"").unwrap();

        let drive = Arc::new(FakeDrive::new());
        let summary = engine(drive.clone(), true)
            .upload("/backup", dir.path())
            .await
            .unwrap();

        assert_eq!(summary.files, 3);
        assert_eq!(summary.bytes, 15);
        assert_eq!(
            drive.session_paths(),
            vec!["/backup/a.txt", "/backup/sub/b c.txt", "/backup/sub/empty.txt"]
        );
        assert_eq!(drive.uploaded("/backup/sub/b c.txt").unwrap(), b"bbbbbbbbb");
        assert_eq!(drive.uploaded("/backup/sub/empty.txt").unwrap(), b"");
    }

    #[tokio::test]
    async fn test_strict_mode_fails_on_missing_chunk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        fs::write(&path, b"0123456789").unwrap();

        let drive = Arc::new(FakeDrive::new());
        drive.fail_chunk(4, 1, 400);

        let err = engine(drive, true)
            .upload("/data.bin", &path)
            .await
            .unwrap_err();
        match err {
            DriveError::Chunk {
                remote_path,
                failed,
            } => {
                assert_eq!(remote_path, "/data.bin");
                assert_eq!(failed, vec![1]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_best_effort_mode_continues() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        fs::write(&path, b"0123456789").unwrap();

        let drive = Arc::new(FakeDrive::new());
        drive.fail_chunk(8, 1, 400);

        let summary = engine(drive, false)
            .upload("/data.bin", &path)
            .await
            .unwrap();
        assert_eq!(summary.bytes, 8);
        assert_eq!(summary.incomplete, vec![("/data.bin".to_string(), vec![2])]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_folder_follows_config() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("linked.txt"), b"linked").unwrap();

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("shared")).unwrap();

        let drive = Arc::new(FakeDrive::new());
        engine(drive.clone(), true)
            .upload("/plain", dir.path())
            .await
            .unwrap();
        assert_eq!(drive.session_paths(), vec!["/plain/a.txt"]);

        let drive = Arc::new(FakeDrive::new());
        let config = TransferConfig {
            follow_symlinks: true,
            ..Default::default()
        };
        engine_with(drive.clone(), config)
            .upload("/followed", dir.path())
            .await
            .unwrap();
        assert_eq!(
            drive.session_paths(),
            vec!["/followed/a.txt", "/followed/shared/linked.txt"]
        );
        assert_eq!(drive.uploaded("/followed/shared/linked.txt").unwrap(), b"linked");
    }

    #[tokio::test]
    async fn test_missing_local_path() {
        let dir = TempDir::new().unwrap();
        let drive = Arc::new(FakeDrive::new());
        let err = engine(drive, true)
            .upload("/x", &dir.path().join("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::Filesystem { .. }));
    }
}
