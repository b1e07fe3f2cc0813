//! 本地文件夹扫描
//!
//! 递归收集常规文件，并把相对路径拼接到远程前缀上

use crate::netdisk::DriveError;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// 文件扫描结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// 本地文件路径
    pub local_path: PathBuf,
    /// 相对于扫描根目录的路径（用于构建远程路径）
    pub relative_path: PathBuf,
    /// 文件大小（字节）
    pub size: u64,
}

/// 文件夹扫描器
#[derive(Debug, Default)]
pub struct FolderScanner {
    /// 是否跟随符号链接
    follow_symlinks: bool,
}

impl FolderScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// 递归扫描文件夹，按文件名排序保证顺序稳定
    pub fn scan(&self, root: &Path) -> Result<Vec<ScannedFile>, DriveError> {
        info!("开始扫描文件夹: {}", root.display());

        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                DriveError::fs(path, e.into())
            })?;

            if !entry.file_type().is_file() {
                if !entry.file_type().is_dir() {
                    debug!("跳过非常规文件: {}", entry.path().display());
                }
                continue;
            }

            let size = entry
                .metadata()
                .map_err(|e| DriveError::fs(entry.path(), e.into()))?
                .len();

            let Ok(relative_path) = entry.path().strip_prefix(root) else {
                warn!("计算相对路径失败，跳过: {}", entry.path().display());
                continue;
            };

            files.push(ScannedFile {
                local_path: entry.path().to_path_buf(),
                relative_path: relative_path.to_path_buf(),
                size,
            });
        }

        info!(
            "文件夹扫描完成: {} 个文件，总大小 {} 字节",
            files.len(),
            files.iter().map(|f| f.size).sum::<u64>()
        );
        Ok(files)
    }
}

/// 规范化远程路径：保证以 `/` 开头，去掉结尾的 `/`
pub fn normalize_remote(remote: &str) -> String {
    format!("/{}", remote.trim_matches('/'))
}

/// 把本地相对路径拼到远程前缀上，统一使用 `/` 分隔
pub fn join_remote(prefix: &str, relative: &Path) -> String {
    let mut remote = normalize_remote(prefix);
    for component in relative.components() {
        if let Component::Normal(segment) = component {
            if !remote.ends_with('/') {
                remote.push('/');
            }
            remote.push_str(&segment.to_string_lossy());
        }
    }
    remote
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_folder() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("b.txt"), b"bb").unwrap();
        fs::write(root.join("a.txt"), b"a").unwrap();
        fs::create_dir_all(root.join("sub").join("deep")).unwrap();
        fs::write(root.join("sub").join("c.txt"), b"ccc").unwrap();
        fs::write(root.join("sub").join("deep").join("d e.txt"), b"dddd").unwrap();
        fs::create_dir(root.join("empty")).unwrap();
        dir
    }

    #[test]
    fn test_scan_folder() {
        let dir = create_test_folder();
        let files = FolderScanner::new().scan(dir.path()).unwrap();

        let relative: Vec<_> = files
            .iter()
            .map(|f| f.relative_path.to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(
            relative,
            vec!["a.txt", "b.txt", "sub/c.txt", "sub/deep/d e.txt"]
        );
        assert_eq!(files.iter().map(|f| f.size).sum::<u64>(), 10);
    }

    #[test]
    fn test_scan_nonexistent_folder() {
        let dir = TempDir::new().unwrap();
        let result = FolderScanner::new().scan(&dir.path().join("missing"));
        assert!(matches!(result, Err(DriveError::Filesystem { .. })));
    }

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/backup", Path::new("a.txt")), "/backup/a.txt");
        assert_eq!(
            join_remote("backup/", Path::new("sub/deep/d e.txt")),
            "/backup/sub/deep/d e.txt"
        );
        assert_eq!(join_remote("/", Path::new("a.txt")), "/a.txt");
    }

    #[test]
    fn test_normalize_remote() {
        assert_eq!(normalize_remote("docs/x.txt"), "/docs/x.txt");
        assert_eq!(normalize_remote("/docs/"), "/docs");
        assert_eq!(normalize_remote("/"), "/");
    }
}
