// apps/ms_cli/src/commands/search.rs

//! 搜索命令
//!
//! 读入源网格和目标网格，串行或在 N 个线程进程上运行搜索，打印排序后的结果报告。
//! 多进程时先把两套网格切分为 N 个分区，结果在各进程完成后合并。

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, ValueEnum};
use ms_comm::{Communicator, ThreadComm};
use ms_mesh::{partition, EntityKind, PartitionStrategy, UnstructuredMesh};
use ms_search::{
    par_search_containment, par_search_nearest_dst_to_src, par_search_nearest_src_to_dst, print_search_result,
    search_containment, search_elements_mutual, search_nearest_dst_to_src, search_nearest_src_to_dst,
    SearchConfig, SearchMethod, SearchResult, SearchStats, UnmappedAction,
};
use std::path::PathBuf;
use tracing::info;

use super::RunOptions;

/// 搜索方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Method {
    /// 包含搜索（节点定位或单元重叠）
    Containment,
    /// 目标单元与源单元双向重叠
    Overlap,
    /// 每个目标实体找最近的源实体
    NearestStod,
    /// 每个源实体找最近的目标实体
    NearestDtos,
}

impl Method {
    fn search_method(self) -> SearchMethod {
        match self {
            Self::Containment => SearchMethod::Containment,
            Self::Overlap => SearchMethod::MutualOverlap,
            Self::NearestStod => SearchMethod::NearestSrcToDst,
            Self::NearestDtos => SearchMethod::NearestDstToSrc,
        }
    }
}

/// 实体类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Kind {
    /// 节点
    Node,
    /// 单元
    Element,
}

impl From<Kind> for EntityKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Node => EntityKind::Node,
            Kind::Element => EntityKind::Element,
        }
    }
}

/// 搜索参数
#[derive(Args)]
pub struct SearchArgs {
    /// 源网格文件
    #[arg(long)]
    pub src: PathBuf,

    /// 目标网格文件
    #[arg(long)]
    pub dst: PathBuf,

    /// 搜索方式
    #[arg(short, long, value_enum, default_value = "containment")]
    pub method: Method,

    /// 目标实体类型
    #[arg(short, long, value_enum, default_value = "node")]
    pub kind: Kind,

    /// 分区策略 (strips, round-robin)
    #[arg(short, long, default_value = "strips")]
    pub partition: PartitionStrategy,

    /// 搜索配置文件 (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// 执行搜索命令
pub fn execute(args: SearchArgs, run: RunOptions) -> Result<()> {
    let config = match &args.config {
        Some(path) => SearchConfig::from_file(path)
            .with_context(|| format!("加载搜索配置失败: {}", path.display()))?,
        None => SearchConfig::default(),
    };
    let src = UnstructuredMesh::from_file(&args.src)
        .with_context(|| format!("加载源网格失败: {}", args.src.display()))?;
    let dst = UnstructuredMesh::from_file(&args.dst)
        .with_context(|| format!("加载目标网格失败: {}", args.dst.display()))?;

    info!(
        "搜索: {} / {}, 进程数 {}, 未映射策略 {}, 容差 {:e}",
        args.method.search_method(),
        EntityKind::from(args.kind),
        run.ranks,
        run.unmapped,
        config.tolerance
    );

    let result = match run.ranks {
        0 => bail!("进程数必须大于 0"),
        1 => run_serial(&args, run.unmapped, &src, &dst, &config)?,
        n => run_distributed(&args, run.unmapped, &src, &dst, &config, n)?,
    };

    print_search_result(&result);
    let stats = result.stats();
    info!(
        "完成: {} 条记录, {} 未映射, 远端查询 {}, 耗时 {:.3} ms",
        result.len(),
        stats.unmapped,
        stats.remote_queries_sent,
        stats.duration.as_secs_f64() * 1e3
    );
    result.release();
    Ok(())
}

fn run_serial(
    args: &SearchArgs,
    unmapped: UnmappedAction,
    src: &UnstructuredMesh,
    dst: &UnstructuredMesh,
    config: &SearchConfig,
) -> Result<SearchResult> {
    let kind = EntityKind::from(args.kind);
    let result = match args.method {
        Method::Containment => search_containment(src, dst, kind, unmapped, config)?,
        Method::Overlap => {
            if kind != EntityKind::Element {
                bail!("overlap 只适用于单元");
            }
            search_elements_mutual(dst, unmapped, src, unmapped, config)?
        }
        Method::NearestStod => search_nearest_src_to_dst(src, dst, kind, unmapped, config)?,
        Method::NearestDtos => search_nearest_dst_to_src(src, dst, kind, unmapped, config)?,
    };
    Ok(result)
}

fn run_distributed(
    args: &SearchArgs,
    unmapped: UnmappedAction,
    src: &UnstructuredMesh,
    dst: &UnstructuredMesh,
    config: &SearchConfig,
    n: usize,
) -> Result<SearchResult> {
    if args.method == Method::Overlap {
        bail!("overlap 只支持串行搜索");
    }
    let kind = EntityKind::from(args.kind);
    let src_parts = partition(src, n, args.partition).context("源网格分区失败")?;
    let dst_parts = partition(dst, n, args.partition).context("目标网格分区失败")?;
    info!("网格已按 {} 切分为 {} 个分区", args.partition, n);

    let outcomes = ThreadComm::run(n, |comm| {
        let r = comm.rank() as usize;
        let (s, d) = (&src_parts[r], &dst_parts[r]);
        let result = match args.method {
            Method::NearestStod => par_search_nearest_src_to_dst(s, d, kind, unmapped, config, &comm),
            Method::NearestDtos => par_search_nearest_dst_to_src(s, d, kind, unmapped, config, &comm),
            _ => par_search_containment(s, d, kind, unmapped, config, &comm),
        }?;
        let stats = result.stats().clone();
        Ok::<_, ms_search::SearchError>((result.into_records(), stats))
    });
    if outcomes.len() != n {
        return Err(anyhow!("线程进程启动失败"));
    }

    let mut records = Vec::new();
    let mut stats = SearchStats::default();
    for (rank, outcome) in outcomes.into_iter().enumerate() {
        let (r, s) = outcome.with_context(|| format!("进程 {} 搜索失败", rank))?;
        records.extend(r);
        stats.merge(&s);
    }
    Ok(SearchResult::new(args.method.search_method(), records, stats))
}
