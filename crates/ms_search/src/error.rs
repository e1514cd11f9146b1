// crates/ms_search/src/error.rs
//! 搜索层错误类型
//!
//! 错误分类：
//! - 前置条件错误（参数非法），在构建索引前立即返回
//! - 未映射实体（按策略决定失败或忽略）
//! - 分布式协议错误（传输失败、缺失或格式错误的响应），致命
//! - 网格协作者错误
//!
//! 退化几何不是错误，只记录日志并计数。

use thiserror::Error;

use ms_comm::CommError;
use ms_mesh::{EntityKind, GlobalId, MeshError, Rank};

/// 搜索模块结果类型
pub type Result<T, E = SearchError> = std::result::Result<T, E>;

/// 搜索错误枚举
#[derive(Error, Debug)]
pub enum SearchError {
    /// 参数非法
    #[error("无效参数 '{key}': {value} - {reason}")]
    InvalidArgument {
        /// 参数名
        key: String,
        /// 参数值
        value: String,
        /// 原因
        reason: String,
    },

    /// 存在未映射的目标实体
    #[error("未映射实体: {kind} {gid} (进程 {rank}), 共 {count} 个未映射")]
    Unmapped {
        /// 实体类型
        kind: EntityKind,
        /// 第一个（全局编号最小的）未映射实体
        gid: GlobalId,
        /// 该实体所属进程
        rank: Rank,
        /// 未映射实体总数
        count: usize,
    },

    /// 分布式协议错误
    #[error("分布式协议错误 (进程 {rank}, 对端 {peer:?}): {message}")]
    Protocol {
        /// 本进程
        rank: Rank,
        /// 相关对端
        peer: Option<Rank>,
        /// 详情
        message: String,
    },

    /// 网格协作者错误
    #[error("网格错误: {0}")]
    Mesh(#[from] MeshError),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 配置解析错误
    #[error("配置解析错误: {0}")]
    Parse(String),
}

impl SearchError {
    /// 构造参数错误
    pub fn invalid_argument(key: impl Into<String>, value: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            key: key.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// 构造协议错误
    pub fn protocol(rank: Rank, peer: Option<Rank>, message: impl Into<String>) -> Self {
        Self::Protocol {
            rank,
            peer,
            message: message.into(),
        }
    }

    /// 是否为未映射错误
    pub fn is_unmapped(&self) -> bool {
        matches!(self, Self::Unmapped { .. })
    }

    /// 是否为协议错误
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }
}

impl From<CommError> for SearchError {
    fn from(err: CommError) -> Self {
        let rank = match &err {
            CommError::Timeout { rank, .. } | CommError::Disconnected { rank, .. } => *rank,
            _ => 0,
        };
        Self::Protocol {
            rank,
            peer: err.peer(),
            message: err.to_string(),
        }
    }
}
