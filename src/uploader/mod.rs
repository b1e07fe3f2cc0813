// 上传模块
//
// - 本地文件夹递归扫描
// - 固定分片 + 有界 worker 池并发上传
// - 分片级指数退避重试，失败分片汇总到 ChunkReport

pub mod chunk;
pub mod engine;
pub mod folder;
pub mod scheduler;

pub use chunk::{chunk_count, plan_chunks, ChunkJob, CHUNK_ALIGNMENT, DEFAULT_CHUNK_SIZE};
pub use engine::{UploadEngine, UploadSummary};
pub use folder::{join_remote, normalize_remote, FolderScanner, ScannedFile};
pub use scheduler::{ChunkReport, ChunkResult, ChunkScheduler, TransferSession};
