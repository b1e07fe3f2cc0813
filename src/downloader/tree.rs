// 远程目录树
//
// 节点存放在 arena 中，子节点以 NodeId 引用；解析完成后只读

use crate::netdisk::DriveItem;

/// 节点在 arena 中的下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// 节点类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// 文件，附带短期有效的下载地址（列表结果可能不带）
    File { download_url: Option<String> },
    /// 文件夹，子节点保持服务端返回顺序
    Folder { children: Vec<NodeId> },
}

/// 远程节点
#[derive(Debug, Clone)]
pub struct RemoteNode {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub kind: NodeKind,
}

impl RemoteNode {
    pub fn file(id: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size,
            kind: NodeKind::File { download_url: None },
        }
    }

    pub fn folder(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size: 0,
            kind: NodeKind::Folder {
                children: Vec::new(),
            },
        }
    }

    /// 从条目元数据构造节点，既非文件也非文件夹（如 OneNote 包）时返回 None
    pub fn from_item(item: &DriveItem) -> Option<Self> {
        if item.is_folder() {
            Some(Self::folder(&item.id, &item.name))
        } else if item.is_file() {
            Some(
                Self::file(&item.id, &item.name, item.size)
                    .with_download_url(item.download_url.clone()),
            )
        } else {
            None
        }
    }

    fn with_download_url(mut self, url: Option<String>) -> Self {
        if let NodeKind::File { download_url } = &mut self.kind {
            *download_url = url;
        }
        self
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, NodeKind::Folder { .. })
    }

    pub fn download_url(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::File { download_url } => download_url.as_deref(),
            NodeKind::Folder { .. } => None,
        }
    }
}

/// 远程目录树
#[derive(Debug, Clone)]
pub struct RemoteTree {
    nodes: Vec<RemoteNode>,
}

impl RemoteTree {
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn get(&self, id: NodeId) -> &RemoteNode {
        &self.nodes[id.0]
    }

    /// 子节点（文件返回空切片）
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.nodes[id.0].kind {
            NodeKind::Folder { children } => children,
            NodeKind::File { .. } => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 深度优先（先序）遍历，同级保持列表顺序
    pub fn depth_first(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        order
    }

    /// 全部文件大小之和
    pub fn total_size(&self) -> u64 {
        self.depth_first()
            .into_iter()
            .map(|id| self.get(id))
            .filter(|node| !node.is_folder())
            .map(|node| node.size)
            .sum()
    }

    pub fn file_count(&self) -> usize {
        self.nodes.iter().filter(|n| !n.is_folder()).count()
    }
}

/// 目录树构建器，只有解析器使用
#[derive(Debug)]
pub struct RemoteTreeBuilder {
    nodes: Vec<RemoteNode>,
}

impl RemoteTreeBuilder {
    pub fn new(root: RemoteNode) -> Self {
        Self { nodes: vec![root] }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// 把节点挂到文件夹下；父节点不是文件夹时返回 None
    pub fn add_child(&mut self, parent: NodeId, node: RemoteNode) -> Option<NodeId> {
        let id = NodeId(self.nodes.len());
        match &mut self.nodes.get_mut(parent.0)?.kind {
            NodeKind::Folder { children } => children.push(id),
            NodeKind::File { .. } => return None,
        }
        self.nodes.push(node);
        Some(id)
    }

    pub fn build(self) -> RemoteTree {
        RemoteTree { nodes: self.nodes }
    }
}
