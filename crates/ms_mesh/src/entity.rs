// crates/ms_mesh/src/entity.rs

//! 实体句柄
//!
//! [`EntityRef`] 是基于索引的非拥有句柄：类型 + 所属进程 + 本地槽位 + 全局编号。
//! 搜索引擎只通过 [`crate::SearchMesh`] 访问器解析句柄，不假设网格的内存布局。

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 进程编号
pub type Rank = u32;

/// 全局编号
pub type GlobalId = u64;

/// 实体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// 节点
    Node,
    /// 单元
    Element,
}

impl EntityKind {
    /// 线格式编码
    #[inline]
    pub fn code(self) -> u32 {
        match self {
            Self::Node => 0,
            Self::Element => 1,
        }
    }

    /// 从线格式编码解析
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Node),
            1 => Some(Self::Element),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node => write!(f, "node"),
            Self::Element => write!(f, "element"),
        }
    }
}

/// 网格实体句柄
///
/// 排序键为 `(gid, rank, slot, kind)`，即按全局编号优先。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// 实体类型
    pub kind: EntityKind,
    /// 所属进程
    pub rank: Rank,
    /// 所属进程内的本地槽位
    pub slot: u32,
    /// 全局编号
    pub gid: GlobalId,
}

impl EntityRef {
    /// 创建句柄
    #[inline]
    pub fn new(kind: EntityKind, rank: Rank, slot: u32, gid: GlobalId) -> Self {
        Self { kind, rank, slot, gid }
    }

    /// 本地槽位（usize）
    #[inline]
    pub fn index(&self) -> usize {
        self.slot as usize
    }

    fn sort_key(&self) -> (GlobalId, Rank, u32, EntityKind) {
        (self.gid, self.rank, self.slot, self.kind)
    }
}

impl Ord for EntityRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for EntityRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (rank {}, slot {})", self.kind, self.gid, self.rank, self.slot)
    }
}
