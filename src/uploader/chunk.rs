// 上传分片划分

use crate::config::UPLOAD_CHUNK_ALIGNMENT;

/// 默认分片大小: 10MB
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// 分片对齐粒度: 320KB（Graph 上传会话要求）
pub const CHUNK_ALIGNMENT: u64 = UPLOAD_CHUNK_ALIGNMENT;

/// 单个分片任务
///
/// `start..=end` 为闭区间，与 Content-Range 的写法一致
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkJob {
    /// 分片序号（从 0 开始）
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl ChunkJob {
    /// 分片字节数
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Content-Range 头的值
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// 分片数量: ceil(size / chunk_size)
pub fn chunk_count(size: u64, chunk_size: u64) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    size.div_ceil(chunk_size) as usize
}

/// 把 `[0, size)` 连续划分为分片
///
/// 最后一片为 `size % chunk_size`（整除时为完整分片）；空文件没有分片
pub fn plan_chunks(size: u64, chunk_size: u64) -> Vec<ChunkJob> {
    let count = chunk_count(size, chunk_size);
    (0..count)
        .map(|index| {
            let start = index as u64 * chunk_size;
            let end = (start + chunk_size).min(size) - 1;
            ChunkJob { index, start, end }
        })
        .collect()
}
