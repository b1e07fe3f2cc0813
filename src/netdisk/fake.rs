// 内存中的网盘实现，供传输引擎测试使用

use crate::netdisk::{ByteStream, DriveApi, DriveError, DriveItem, FileFacet, FolderFacet, ItemRef};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::StatusCode;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const ROOT_ID: &str = "ROOT";

/// 已接收的分片
#[derive(Debug, Clone)]
pub struct ReceivedRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
    pub data: Bytes,
}

#[derive(Default)]
pub struct FakeDrive {
    items: HashMap<String, DriveItem>,
    paths: HashMap<String, String>,
    children: HashMap<String, Vec<String>>,
    contents: HashMap<String, Vec<u8>>,
    /// 列表结果不附带下载地址
    listing_without_urls: bool,

    sessions: Mutex<HashMap<String, String>>,
    received: Mutex<HashMap<String, Vec<ReceivedRange>>>,
    /// 分片起始偏移 -> (剩余失败次数, 状态码)
    failures: Mutex<HashMap<u64, (u32, u16)>>,
    /// 打开下载流时失败的文件 ID
    broken_downloads: Mutex<HashSet<String>>,

    pub get_item_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub put_calls: AtomicUsize,
}

impl FakeDrive {
    pub fn new() -> Self {
        let mut drive = Self::default();
        drive.items.insert(
            ROOT_ID.to_string(),
            DriveItem {
                id: ROOT_ID.to_string(),
                name: "root".to_string(),
                size: 0,
                folder: Some(FolderFacet::default()),
                file: None,
                download_url: None,
            },
        );
        drive.paths.insert("/".to_string(), ROOT_ID.to_string());
        drive.children.insert(ROOT_ID.to_string(), Vec::new());
        drive
    }

    pub fn listing_without_urls(mut self) -> Self {
        self.listing_without_urls = true;
        self
    }

    fn path_of(&self, parent: &str, name: &str) -> String {
        let parent_path = self
            .paths
            .iter()
            .find(|(_, id)| id.as_str() == parent)
            .map(|(path, _)| path.clone())
            .expect("unknown parent");
        format!("{}/{}", parent_path.trim_end_matches('/'), name)
    }

    fn attach(&mut self, parent: &str, item: DriveItem) {
        let path = self.path_of(parent, &item.name);
        self.paths.insert(path, item.id.clone());
        self.children
            .get_mut(parent)
            .expect("parent is not a folder")
            .push(item.id.clone());
        self.items.insert(item.id.clone(), item);
    }

    pub fn add_folder(&mut self, parent: &str, id: &str, name: &str) {
        self.children.insert(id.to_string(), Vec::new());
        self.attach(
            parent,
            DriveItem {
                id: id.to_string(),
                name: name.to_string(),
                size: 0,
                folder: Some(FolderFacet::default()),
                file: None,
                download_url: None,
            },
        );
    }

    pub fn add_file(&mut self, parent: &str, id: &str, name: &str, content: &[u8]) {
        let url = format!("fake-download://{}", id);
        self.contents.insert(url.clone(), content.to_vec());
        self.attach(
            parent,
            DriveItem {
                id: id.to_string(),
                name: name.to_string(),
                size: content.len() as u64,
                folder: None,
                file: Some(FileFacet::default()),
                download_url: Some(url),
            },
        );
    }

    /// 让起始偏移为 `start` 的分片前 `times` 次上传返回 `status`
    pub fn fail_chunk(&self, start: u64, times: u32, status: u16) {
        self.failures.lock().unwrap().insert(start, (times, status));
    }

    /// 让文件 `id` 的下载流无法打开
    pub fn fail_download(&self, id: &str) {
        self.broken_downloads.lock().unwrap().insert(id.to_string());
    }

    /// 已创建会话的远程路径
    pub fn session_paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = self.sessions.lock().unwrap().values().cloned().collect();
        paths.sort();
        paths
    }

    /// 按偏移拼接某个远程路径收到的全部分片
    pub fn uploaded(&self, remote_path: &str) -> Option<Vec<u8>> {
        let url = self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .find(|(_, path)| path.as_str() == remote_path)
            .map(|(url, _)| url.clone())?;

        let mut ranges = self
            .received
            .lock()
            .unwrap()
            .get(&url)
            .cloned()
            .unwrap_or_default();
        ranges.sort_by_key(|r| r.start);

        let mut data = Vec::new();
        for range in ranges {
            assert_eq!(range.start, data.len() as u64, "分片不连续");
            assert_eq!(range.end - range.start + 1, range.data.len() as u64);
            data.extend_from_slice(&range.data);
        }
        Some(data)
    }

    fn lookup(&self, item: &ItemRef) -> Result<&DriveItem, DriveError> {
        let id = match item {
            ItemRef::Id(id) => Some(id.clone()),
            ItemRef::Path(path) => {
                let normalized = if path.len() > 1 {
                    path.trim_end_matches('/').to_string()
                } else {
                    path.clone()
                };
                self.paths.get(&normalized).cloned()
            }
        };
        id.and_then(|id| self.items.get(&id))
            .ok_or_else(|| DriveError::NotFound {
                target: item.to_string(),
                body: "{\"error\":{\"code\":\"itemNotFound\"}}".to_string(),
            })
    }
}

#[async_trait]
impl DriveApi for FakeDrive {
    async fn get_item(&self, item: &ItemRef) -> Result<DriveItem, DriveError> {
        self.get_item_calls.fetch_add(1, Ordering::SeqCst);
        self.lookup(item).cloned()
    }

    async fn list_children(&self, item: &ItemRef) -> Result<Vec<DriveItem>, DriveError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let parent = self.lookup(item)?;
        let ids = self.children.get(&parent.id).cloned().unwrap_or_default();

        Ok(ids
            .iter()
            .filter_map(|id| self.items.get(id).cloned())
            .map(|mut child| {
                if self.listing_without_urls {
                    child.download_url = None;
                }
                child
            })
            .collect())
    }

    async fn create_upload_session(&self, remote_path: &str) -> Result<String, DriveError> {
        let mut sessions = self.sessions.lock().unwrap();
        let url = format!("fake-upload://{}", sessions.len());
        sessions.insert(url.clone(), remote_path.to_string());
        Ok(url)
    }

    async fn upload_range(
        &self,
        upload_url: &str,
        start: u64,
        end: u64,
        total: u64,
        data: Bytes,
    ) -> Result<(), DriveError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);

        if let Some((remaining, status)) = self.failures.lock().unwrap().get_mut(&start) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DriveError::BadResponse {
                    context: format!("上传分片失败 (bytes {}-{}/{})", start, end, total),
                    status: StatusCode::from_u16(*status).unwrap(),
                    body: String::new(),
                });
            }
        }

        self.received
            .lock()
            .unwrap()
            .entry(upload_url.to_string())
            .or_default()
            .push(ReceivedRange {
                start,
                end,
                total,
                data,
            });
        Ok(())
    }

    async fn open_download(&self, download_url: &str) -> Result<ByteStream, DriveError> {
        let id = download_url.trim_start_matches("fake-download://");
        if self.broken_downloads.lock().unwrap().contains(id) {
            return Err(DriveError::BadResponse {
                context: format!("打开下载流失败: {}", id),
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: String::new(),
            });
        }

        let content = self
            .contents
            .get(download_url)
            .cloned()
            .ok_or_else(|| DriveError::NotFound {
                target: download_url.to_string(),
                body: String::new(),
            })?;

        // 拆成小块，模拟网络分段到达
        let pieces: Vec<Result<Bytes, DriveError>> = content
            .chunks(7)
            .map(|piece| Ok(Bytes::copy_from_slice(piece)))
            .collect();
        Ok(futures::stream::iter(pieces).boxed())
    }
}
