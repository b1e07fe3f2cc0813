// 远程目录树解析
//
// 在任何字节传输之前把整棵子树展开，以便得到总大小

use crate::downloader::tree::{NodeId, RemoteNode, RemoteTree, RemoteTreeBuilder};
use crate::netdisk::{DriveApi, DriveError, ItemRef};
use tracing::{debug, info, warn};

/// 远程目录树解析器
pub struct RemoteTreeResolver<'a, A: DriveApi + ?Sized> {
    api: &'a A,
}

impl<'a, A: DriveApi + ?Sized> RemoteTreeResolver<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self { api }
    }

    /// 解析路径（以 `/` 开头）或条目 ID，返回完整展开的目录树
    ///
    /// 每个文件夹发起一次子条目列表请求（含翻页），按列表顺序深度优先展开
    pub async fn resolve(&self, target: &str) -> Result<RemoteTree, DriveError> {
        let item_ref = ItemRef::parse(target);
        let item = self.api.get_item(&item_ref).await?;

        let root = RemoteNode::from_item(&item).ok_or_else(|| DriveError::BadResponse {
            context: format!("{} 既不是文件也不是文件夹", target),
            status: reqwest::StatusCode::OK,
            body: serde_json::to_string(&item).unwrap_or_default(),
        })?;

        let mut builder = RemoteTreeBuilder::new(root);
        if !item.is_folder() {
            return Ok(builder.build());
        }

        // (节点, 条目 ID)：子节点逆序入栈，保证按列表顺序出栈
        let mut pending: Vec<(NodeId, String)> = vec![(builder.root(), item.id.clone())];
        let mut folders = 0usize;

        while let Some((node, id)) = pending.pop() {
            folders += 1;
            let children = self.api.list_children(&ItemRef::Id(id.clone())).await?;
            debug!("展开文件夹: id={}, 子条目 {} 个", id, children.len());

            let mut sub_folders = Vec::new();
            for child in &children {
                let Some(child_node) = RemoteNode::from_item(child) else {
                    warn!("跳过不支持的条目类型: {} (id={})", child.name, child.id);
                    continue;
                };
                if !is_safe_name(&child_node.name) {
                    warn!("跳过名称不合法的条目: {:?} (id={})", child_node.name, child.id);
                    continue;
                }

                let is_folder = child_node.is_folder();
                if let Some(child_id) = builder.add_child(node, child_node) {
                    if is_folder {
                        sub_folders.push((child_id, child.id.clone()));
                    }
                }
            }
            pending.extend(sub_folders.into_iter().rev());
        }

        let tree = builder.build();
        info!(
            "目录树解析完成: {}, 文件夹 {} 个, 文件 {} 个, 总大小 {} 字节",
            target,
            folders,
            tree.file_count(),
            tree.total_size()
        );
        Ok(tree)
    }
}

/// 条目名会被拼到本地路径上，拒绝路径穿越
fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}
