// crates/ms_comm/src/error.rs

//! 通信层错误类型

use std::time::Duration;

use thiserror::Error;

/// 通信模块结果类型
pub type CommResult<T> = Result<T, CommError>;

/// 通信错误枚举
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommError {
    /// 等待对端消息超时
    #[error("进程 {rank} 等待进程 {peer} 的消息超时 ({waited:?}), 集合操作序号 {seq}")]
    Timeout {
        /// 本进程
        rank: u32,
        /// 未响应的对端
        peer: u32,
        /// 集合操作序号
        seq: u64,
        /// 已等待时长
        waited: Duration,
    },

    /// 对端已断开
    #[error("进程 {rank} 与进程 {peer} 的连接已断开")]
    Disconnected {
        /// 本进程
        rank: u32,
        /// 断开的对端
        peer: u32,
    },

    /// 缓冲区格式错误
    #[error("缓冲区格式错误 (来自进程 {peer}): {message}")]
    Malformed {
        /// 来源进程
        peer: u32,
        /// 详情
        message: String,
    },

    /// 参数错误
    #[error("通信参数错误: {0}")]
    InvalidArgument(String),
}

impl CommError {
    /// 构造缓冲区格式错误
    pub fn malformed(peer: u32, message: impl Into<String>) -> Self {
        Self::Malformed {
            peer,
            message: message.into(),
        }
    }

    /// 出错的对端进程
    pub fn peer(&self) -> Option<u32> {
        match self {
            Self::Timeout { peer, .. } | Self::Disconnected { peer, .. } | Self::Malformed { peer, .. } => {
                Some(*peer)
            }
            Self::InvalidArgument(_) => None,
        }
    }
}
