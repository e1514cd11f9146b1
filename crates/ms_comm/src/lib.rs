// crates/ms_comm/src/lib.rs

//! MeshSearch 通信模块
//!
//! 分布式搜索的传输协作者。搜索引擎只通过 [`Communicator`] 与其他进程交换数据。
//!
//! # 实现
//!
//! - [`SerialComm`]: 单进程
//! - [`ThreadComm`]: 进程内多线程（每线程一个进程，基于 `mpsc` 通道）
//!
//! # 模块结构
//!
//! - [`traits`]: 通信接口与 Pod 类型化封装
//! - [`serial`]: 单进程通信器
//! - [`thread`]: 线程通信器
//! - [`error`]: 通信错误类型

#![warn(missing_docs)]

pub mod error;
pub mod serial;
pub mod thread;
pub mod traits;

pub use error::{CommError, CommResult};
pub use serial::SerialComm;
pub use thread::{ThreadComm, ThreadCommBuilder, DEFAULT_TIMEOUT};
pub use traits::{decode_records, CommExt, Communicator};
