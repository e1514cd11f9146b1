// apps/ms_cli/src/commands/mod.rs

//! 子命令与全局运行选项

pub mod generate;
pub mod info;
pub mod search;

use clap::{Args, ValueEnum};
use ms_search::UnmappedAction;
use tracing::Level;

/// 日志级别
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// 逐个候选与查询盒扩展
    Trace,
    /// 各阶段统计
    Debug,
    /// 每次搜索一行摘要
    Info,
    /// 退化单元等被排除的实体
    Warn,
    /// 仅错误
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// 所有子命令共享的运行选项
#[derive(Args, Clone, Copy, Debug)]
pub struct RunOptions {
    /// 未映射实体处理策略 (error, ignore)
    #[arg(short, long, global = true, default_value = "error")]
    pub unmapped: UnmappedAction,

    /// 进程数（大于 1 时在线程进程上运行分布式搜索）
    #[arg(short, long, global = true, default_value = "1")]
    pub ranks: usize,
}
