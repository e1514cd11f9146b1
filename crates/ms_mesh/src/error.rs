// crates/ms_mesh/src/error.rs
//! 网格层错误类型
//!
//! 包含网格拓扑、全局编号、格式等错误定义

use thiserror::Error;

use ms_geo::GeoError;

use crate::entity::{EntityKind, GlobalId};

/// 网格模块结果类型
pub type MeshResult<T> = Result<T, MeshError>;

/// 网格错误枚举
#[derive(Error, Debug)]
pub enum MeshError {
    /// 拓扑错误
    #[error("拓扑错误: {operation} 失败, {details}")]
    InvalidTopology {
        /// 操作名
        operation: &'static str,
        /// 详情
        details: String,
    },

    /// 全局编号重复
    #[error("全局编号重复: {kind} {gid}")]
    DuplicateGlobalId {
        /// 实体类型
        kind: EntityKind,
        /// 重复的全局编号
        gid: GlobalId,
    },

    /// 本地槽位越界
    #[error("槽位越界: {kind} 槽位 {slot}, 共 {len} 个")]
    SlotOutOfRange {
        /// 实体类型
        kind: EntityKind,
        /// 槽位
        slot: usize,
        /// 实体数
        len: usize,
    },

    /// 分区参数错误
    #[error("分区参数错误: {0}")]
    InvalidPartition(String),

    /// 几何错误
    #[error("几何错误: {0}")]
    Geometry(#[from] GeoError),

    /// 网格文件格式错误
    #[error("网格格式错误: {0}")]
    Format(#[from] serde_json::Error),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl MeshError {
    /// 构造拓扑错误
    pub fn invalid_topology(operation: &'static str, details: impl Into<String>) -> Self {
        Self::InvalidTopology {
            operation,
            details: details.into(),
        }
    }

    /// 构造槽位越界错误
    pub fn slot_out_of_range(kind: EntityKind, slot: usize, len: usize) -> Self {
        Self::SlotOutOfRange { kind, slot, len }
    }
}
