// 网盘API数据类型

use serde::{Deserialize, Serialize};

/// 远程条目引用
///
/// 以 `/` 开头视为路径，否则视为条目 ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemRef {
    Path(String),
    Id(String),
}

impl ItemRef {
    pub fn parse(target: &str) -> Self {
        if target.starts_with('/') {
            ItemRef::Path(target.to_string())
        } else {
            ItemRef::Id(target.to_string())
        }
    }

    /// 始终按路径解释，缺少的前导 `/` 会补上（`ls`、`link`、`dl` 使用）
    pub fn path(target: &str) -> Self {
        ItemRef::Path(format!("/{}", target.trim_start_matches('/')))
    }

    /// 相对于 drive 根地址的条目 URL 片段
    ///
    /// - `/`          -> `root`
    /// - `/a/b c`     -> `root:/a/b%20c:`
    /// - `01ABCDEF`   -> `items/01ABCDEF`
    pub fn api_segment(&self) -> String {
        match self {
            ItemRef::Path(path) => {
                let trimmed = path.trim_matches('/');
                if trimmed.is_empty() {
                    "root".to_string()
                } else {
                    format!("root:/{}:", encode_remote_path(trimmed))
                }
            }
            ItemRef::Id(id) => format!("items/{}", urlencoding::encode(id)),
        }
    }

    /// 子条目列表的 URL 片段
    pub fn children_segment(&self) -> String {
        format!("{}/children", self.api_segment())
    }
}

impl std::fmt::Display for ItemRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemRef::Path(p) => write!(f, "{}", p),
            ItemRef::Id(id) => write!(f, "id:{}", id),
        }
    }
}

/// 按段编码远程路径，保留 `/` 分隔符
pub fn encode_remote_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// 文件夹属性
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FolderFacet {
    #[serde(rename = "childCount", default)]
    pub child_count: u64,
}

/// 文件属性
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileFacet {
    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// 远程条目元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveItem {
    /// 条目 ID
    pub id: String,

    /// 名称
    pub name: String,

    /// 大小（字节，文件夹为子树总大小）
    #[serde(default)]
    pub size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<FolderFacet>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileFacet>,

    /// 预签名下载地址（仅文件，短期有效）
    #[serde(
        rename = "@microsoft.graph.downloadUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub download_url: Option<String>,
}

impl DriveItem {
    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }

    pub fn is_file(&self) -> bool {
        self.file.is_some()
    }
}

/// 子条目列表响应（分页）
#[derive(Debug, Deserialize)]
pub struct ChildrenResponse {
    #[serde(default)]
    pub value: Vec<DriveItem>,

    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}

/// 创建上传会话响应
#[derive(Debug, Deserialize)]
pub struct UploadSessionResponse {
    #[serde(rename = "uploadUrl", default)]
    pub upload_url: String,

    #[serde(rename = "expirationDateTime", default)]
    pub expiration: Option<String>,
}

/// 分享链接响应
#[derive(Debug, Deserialize)]
pub struct ShareLinkResponse {
    pub link: ShareLink,
}

#[derive(Debug, Deserialize)]
pub struct ShareLink {
    #[serde(rename = "webUrl")]
    pub web_url: String,
}

/// 存储配额
#[derive(Debug, Clone, Deserialize)]
pub struct Quota {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub used: u64,
    #[serde(default)]
    pub remaining: u64,
}

/// drive 信息响应
#[derive(Debug, Deserialize)]
pub struct DriveInfoResponse {
    pub quota: Quota,
}
