// apps/ms_cli/src/main.rs

//! MeshSearch 命令行界面
//!
//! 生成结构化网格，在两套网格之间运行包含或最近邻搜索（串行或多进程线程模拟）。
//! 日志写到标准错误，标准输出只留给结果报告；多进程时每行日志带 `rank-N` 线程名。

mod commands;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{LogLevel, RunOptions};

/// MeshSearch 网格搜索命令行工具
#[derive(Parser)]
#[command(name = "ms_cli", version, about = "Octree-backed mesh containment and nearest-neighbour search")]
struct Cli {
    /// 日志级别
    #[arg(short, long, global = true, value_enum, default_value = "info")]
    log_level: LogLevel,

    #[command(flatten)]
    run: RunOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 生成结构化网格
    Generate(commands::generate::GenerateArgs),
    /// 运行搜索
    Search(commands::search::SearchArgs),
    /// 显示网格、运行选项与默认配置
    Info(commands::info::InfoArgs),
}

fn init_logging(level: LogLevel, run: &RunOptions) -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::from(level))
        .with_target(false)
        .with_thread_names(run.ranks > 1)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.run.ranks == 0 {
        bail!("--ranks 必须大于 0");
    }
    init_logging(cli.log_level, &cli.run)?;

    match cli.command {
        Commands::Generate(args) => commands::generate::execute(args),
        Commands::Search(args) => commands::search::execute(args, cli.run),
        Commands::Info(args) => commands::info::execute(args, cli.run),
    }
}
