// crates/ms_search/src/api.rs

//! 搜索入口
//!
//! 每个入口在一次调用内完成：参数检查 → 构建提供端索引 → 本地解析 →
//! （分布式）跨进程解析 → 未映射策略 → 结果。索引在调用结束时丢弃，
//! [`search_containment_with_index`] 除外（索引归调用方所有）。
//!
//! | 入口 | 方式 |
//! |------|------|
//! | [`search_containment`] / [`par_search_containment`] | 节点定位或单元重叠 |
//! | [`search_containment_investigate`] | 包含搜索，未解析实体交还调用方 |
//! | [`search_containment_with_index`] | 包含搜索，复用调用方预先构建的源网格索引 |
//! | [`search_elements_mutual`] | 两套单元网格互相重叠 |
//! | [`search_nearest_src_to_dst`] / [`par_search_nearest_src_to_dst`] | 每个目标实体找最近的源实体 |
//! | [`search_nearest_dst_to_src`] / [`par_search_nearest_dst_to_src`] | 每个源实体找最近的目标实体 |
//!
//! 分布式入口是集合操作：组内所有进程必须以相同参数顺序调用。
//!
//! # 示例
//!
//! ```
//! use ms_mesh::{EntityKind, RectMeshGenerator, SearchMesh};
//! use ms_search::{search_containment, SearchConfig, UnmappedAction};
//!
//! let src = RectMeshGenerator::new(4, 4, 1.0, 1.0).build().unwrap();
//! let dst = RectMeshGenerator::new(3, 3, 1.0, 1.0).build().unwrap();
//! let result = search_containment(&src, &dst, EntityKind::Node, UnmappedAction::Error, &SearchConfig::default()).unwrap();
//! assert_eq!(result.len(), dst.n_nodes());
//! result.release();
//! ```

use std::time::Instant;

use ms_comm::{Communicator, SerialComm};
use ms_mesh::{EntityKind, EntityRef, SearchMesh};

use crate::config::SearchConfig;
use crate::distributed::{unhit, Coordinator};
use crate::error::{Result, SearchError};
use crate::index::{Answer, QueryMode, SearchIndex};
use crate::local::{apply_unmapped_policy, collect_consumers, resolve_local, summarize_unmapped, Consumer};
use crate::result::{ElementMatch, MatchLocus, MatchRecord, NodeMatch, SearchResult, SearchStats};
use crate::types::{SearchMethod, UnmappedAction};

/// 一次解析的中间结果
struct Resolved {
    consumers: Vec<Consumer>,
    answers: Vec<Answer>,
    /// 提供端被排除的退化实体
    excluded: Vec<EntityRef>,
    stats: SearchStats,
}

fn containment_mode(kind: EntityKind) -> QueryMode {
    match kind {
        EntityKind::Node => QueryMode::Locate,
        EntityKind::Element => QueryMode::Overlap,
    }
}

fn check_rank<M, C>(role: &str, mesh: &M, comm: &C) -> Result<()>
where
    M: SearchMesh + ?Sized,
    C: Communicator + ?Sized,
{
    if mesh.rank() != comm.rank() || comm.rank() as usize >= comm.size() {
        return Err(SearchError::invalid_argument(
            role,
            mesh.rank(),
            format!("网格所属进程与通信器进程 {} / {} 不一致", comm.rank(), comm.size()),
        ));
    }
    Ok(())
}

fn resolve<P, Q, C>(
    provider: &P,
    provider_kind: EntityKind,
    consumer: &Q,
    consumer_kind: EntityKind,
    mode: QueryMode,
    config: &SearchConfig,
    coord: Option<&Coordinator<'_, C>>,
) -> Result<Resolved>
where
    P: SearchMesh + ?Sized,
    Q: SearchMesh + ?Sized,
    C: Communicator + ?Sized,
{
    let index = SearchIndex::build(provider, provider_kind, config)?;
    resolve_with(&index, consumer, consumer_kind, mode, config, coord)
}

fn resolve_with<Q, C>(
    index: &SearchIndex,
    consumer: &Q,
    consumer_kind: EntityKind,
    mode: QueryMode,
    config: &SearchConfig,
    coord: Option<&Coordinator<'_, C>>,
) -> Result<Resolved>
where
    Q: SearchMesh + ?Sized,
    C: Communicator + ?Sized,
{
    let mut stats = SearchStats::default();
    stats.indexed = index.len();
    stats.degenerate_skipped = index.degenerate_count();

    let consumers = collect_consumers(consumer, consumer_kind, mode)?;
    let local = resolve_local(index, &consumers, mode, config, &mut stats);
    tracing::debug!(
        rank = consumer.rank(),
        consumers = consumers.len(),
        matched = local.iter().filter(|a| a.is_match()).count(),
        "本地解析完成"
    );

    let answers = match coord {
        Some(coord) => {
            let directory = coord.exchange_regions(index)?;
            let answers = coord.resolve(index, &directory, &consumers, local, mode, config, &mut stats)?;
            tracing::debug!(rank = coord.rank(), "跨进程解析完成");
            answers
        }
        None => local,
    };
    Ok(Resolved {
        consumers,
        answers,
        excluded: index.excluded().to_vec(),
        stats,
    })
}

/// 本进程所有、可作为候选（未因退化被排除）但未被命中的提供端实体
fn unhit_candidates(owned: &[EntityRef], excluded: &[EntityRef], hits: &[EntityRef]) -> Vec<EntityRef> {
    let mut missing = unhit(owned, hits);
    missing.retain(|e| excluded.binary_search(e).is_err());
    missing
}

/// 把答案转为以消费端实体为目标的记录，返回记录和未匹配的消费端实体
fn records_by_consumer(resolved: &mut Resolved) -> (Vec<MatchRecord>, Vec<EntityRef>) {
    let mut records = Vec::new();
    let mut unmapped = Vec::new();
    let answers = std::mem::take(&mut resolved.answers);
    for (consumer, answer) in resolved.consumers.iter().zip(answers) {
        let dst = consumer.entity;
        match answer {
            Answer::NoMatch => unmapped.push(dst),
            Answer::Located { source, pcoord } => records.push(MatchRecord::Node(NodeMatch {
                dst,
                source,
                locus: MatchLocus::Parametric(pcoord),
            })),
            Answer::Overlaps(sources) => records.push(MatchRecord::Element(ElementMatch { dst, sources })),
            Answer::Nearest { source, distance } => records.push(MatchRecord::Node(NodeMatch {
                dst,
                source,
                locus: MatchLocus::Distance(distance),
            })),
        }
    }
    (records, unmapped)
}

fn enforce<C: Communicator + ?Sized>(
    kind: EntityKind,
    unmapped: &[EntityRef],
    action: UnmappedAction,
    coord: Option<&Coordinator<'_, C>>,
) -> Result<()> {
    let (first, total) = match coord {
        Some(coord) => coord.agree_unmapped(unmapped)?,
        None => summarize_unmapped(unmapped),
    };
    apply_unmapped_policy(kind, first, total, action)
}

fn finish(
    method: SearchMethod,
    rank: u32,
    records: Vec<MatchRecord>,
    mut stats: SearchStats,
    started: Instant,
) -> SearchResult {
    stats.duration = started.elapsed();
    tracing::info!(
        method = %method,
        rank,
        consumers = stats.consumers,
        matched = stats.matched,
        unmapped = stats.unmapped,
        indexed = stats.indexed,
        remote_sent = stats.remote_queries_sent,
        remote_served = stats.remote_queries_served,
        elapsed_ms = stats.duration.as_secs_f64() * 1e3,
        "搜索完成"
    );
    SearchResult::new(method, records, stats)
}

fn containment<S, D, C>(
    src: &S,
    dst: &D,
    dst_kind: EntityKind,
    unmapped: UnmappedAction,
    config: &SearchConfig,
    coord: Option<&Coordinator<'_, C>>,
) -> Result<SearchResult>
where
    S: SearchMesh + ?Sized,
    D: SearchMesh + ?Sized,
    C: Communicator + ?Sized,
{
    let started = Instant::now();
    let mode = containment_mode(dst_kind);
    let mut resolved = resolve(src, EntityKind::Element, dst, dst_kind, mode, config, coord)?;
    let (records, missing) = records_by_consumer(&mut resolved);
    resolved.stats.matched = records.len();
    resolved.stats.unmapped = missing.len();
    enforce(dst_kind, &missing, unmapped, coord)?;
    Ok(finish(SearchMethod::Containment, dst.rank(), records, resolved.stats, started))
}

/// 包含搜索（串行）
///
/// 目标为节点时，求包含该点的源单元（全局编号最小者）及参数坐标；
/// 目标为单元时，求与之重叠的全部源单元。
pub fn search_containment<S, D>(
    src: &S,
    dst: &D,
    dst_kind: EntityKind,
    unmapped: UnmappedAction,
    config: &SearchConfig,
) -> Result<SearchResult>
where
    S: SearchMesh + ?Sized,
    D: SearchMesh + ?Sized,
{
    config.validate()?;
    containment::<S, D, SerialComm>(src, dst, dst_kind, unmapped, config, None)
}

/// 包含搜索（串行），未解析的目标实体交还调用方而不应用策略
pub fn search_containment_investigate<S, D>(
    src: &S,
    dst: &D,
    dst_kind: EntityKind,
    config: &SearchConfig,
) -> Result<(SearchResult, Vec<EntityRef>)>
where
    S: SearchMesh + ?Sized,
    D: SearchMesh + ?Sized,
{
    config.validate()?;
    let started = Instant::now();
    let mode = containment_mode(dst_kind);
    let mut resolved = resolve::<S, D, SerialComm>(src, EntityKind::Element, dst, dst_kind, mode, config, None)?;
    let (records, mut missing) = records_by_consumer(&mut resolved);
    missing.sort();
    resolved.stats.matched = records.len();
    resolved.stats.unmapped = missing.len();
    if !missing.is_empty() {
        tracing::debug!(count = missing.len(), "未解析实体交还调用方");
    }
    let result = finish(SearchMethod::Containment, dst.rank(), records, resolved.stats, started);
    Ok((result, missing))
}

/// 包含搜索（串行），使用调用方预先构建的源网格单元索引
///
/// 同一源网格对多个目标网格搜索时可复用索引。`index` 须由
/// [`SearchIndex::build`] 以 [`EntityKind::Element`] 构建，且构建时的容差应与 `config` 一致。
pub fn search_containment_with_index<D>(
    index: &SearchIndex,
    dst: &D,
    dst_kind: EntityKind,
    unmapped: UnmappedAction,
    config: &SearchConfig,
) -> Result<SearchResult>
where
    D: SearchMesh + ?Sized,
{
    config.validate()?;
    if index.kind() != EntityKind::Element {
        return Err(SearchError::invalid_argument("index", index.kind(), "包含搜索需要单元索引"));
    }
    let started = Instant::now();
    let mode = containment_mode(dst_kind);
    let mut resolved = resolve_with::<D, SerialComm>(index, dst, dst_kind, mode, config, None)?;
    let (records, missing) = records_by_consumer(&mut resolved);
    resolved.stats.matched = records.len();
    resolved.stats.unmapped = missing.len();
    enforce::<SerialComm>(dst_kind, &missing, unmapped, None)?;
    Ok(finish(SearchMethod::Containment, dst.rank(), records, resolved.stats, started))
}

/// 包含搜索（分布式，集合操作）
pub fn par_search_containment<S, D, C>(
    src: &S,
    dst: &D,
    dst_kind: EntityKind,
    unmapped: UnmappedAction,
    config: &SearchConfig,
    comm: &C,
) -> Result<SearchResult>
where
    S: SearchMesh + ?Sized,
    D: SearchMesh + ?Sized,
    C: Communicator + ?Sized,
{
    config.validate()?;
    check_rank("src", src, comm)?;
    check_rank("dst", dst, comm)?;
    let coord = Coordinator::new(comm);
    containment(src, dst, dst_kind, unmapped, config, Some(&coord))
}

/// 两套单元网格互相重叠（串行）
///
/// 记录以 A 的单元为目标、以重叠的 B 单元为源。
/// 没有 B 伙伴的 A 单元按 `unmapped_a` 处理，不出现在任何记录中的 B 单元按 `unmapped_b` 处理。
pub fn search_elements_mutual<A, B>(
    mesh_a: &A,
    unmapped_a: UnmappedAction,
    mesh_b: &B,
    unmapped_b: UnmappedAction,
    config: &SearchConfig,
) -> Result<SearchResult>
where
    A: SearchMesh + ?Sized,
    B: SearchMesh + ?Sized,
{
    config.validate()?;
    let started = Instant::now();
    let mut resolved = resolve::<B, A, SerialComm>(
        mesh_b,
        EntityKind::Element,
        mesh_a,
        EntityKind::Element,
        QueryMode::Overlap,
        config,
        None,
    )?;
    let (records, missing_a) = records_by_consumer(&mut resolved);
    let partners: Vec<EntityRef> = records.iter().flat_map(|r| r.sources().iter().copied()).collect();
    let missing_b = unhit_candidates(&mesh_b.owned_entities(EntityKind::Element), &resolved.excluded, &partners);
    tracing::debug!(unmapped_a = missing_a.len(), unmapped_b = missing_b.len(), "双向重叠解析完成");

    resolved.stats.matched = records.len();
    resolved.stats.unmapped = missing_a.len() + missing_b.len();
    enforce::<SerialComm>(EntityKind::Element, &missing_a, unmapped_a, None)?;
    enforce::<SerialComm>(EntityKind::Element, &missing_b, unmapped_b, None)?;
    Ok(finish(SearchMethod::MutualOverlap, mesh_a.rank(), records, resolved.stats, started))
}

fn nearest_src_to_dst<S, D, C>(
    src: &S,
    dst: &D,
    kind: EntityKind,
    unmapped: UnmappedAction,
    config: &SearchConfig,
    coord: Option<&Coordinator<'_, C>>,
) -> Result<SearchResult>
where
    S: SearchMesh + ?Sized,
    D: SearchMesh + ?Sized,
    C: Communicator + ?Sized,
{
    let started = Instant::now();
    let mut resolved = resolve(src, kind, dst, kind, QueryMode::Nearest, config, coord)?;
    let (records, missing) = records_by_consumer(&mut resolved);
    resolved.stats.matched = records.len();
    resolved.stats.unmapped = missing.len();
    enforce(kind, &missing, unmapped, coord)?;
    Ok(finish(SearchMethod::NearestSrcToDst, dst.rank(), records, resolved.stats, started))
}

/// 最近邻：每个目标实体找最近的源实体（串行）
///
/// `kind` 为节点时点对点匹配；为单元时以目标单元形心匹配最近的源单元几何。
pub fn search_nearest_src_to_dst<S, D>(
    src: &S,
    dst: &D,
    kind: EntityKind,
    unmapped: UnmappedAction,
    config: &SearchConfig,
) -> Result<SearchResult>
where
    S: SearchMesh + ?Sized,
    D: SearchMesh + ?Sized,
{
    config.validate()?;
    nearest_src_to_dst::<S, D, SerialComm>(src, dst, kind, unmapped, config, None)
}

/// 最近邻：每个目标实体找最近的源实体（分布式，集合操作）
pub fn par_search_nearest_src_to_dst<S, D, C>(
    src: &S,
    dst: &D,
    kind: EntityKind,
    unmapped: UnmappedAction,
    config: &SearchConfig,
    comm: &C,
) -> Result<SearchResult>
where
    S: SearchMesh + ?Sized,
    D: SearchMesh + ?Sized,
    C: Communicator + ?Sized,
{
    config.validate()?;
    check_rank("src", src, comm)?;
    check_rank("dst", dst, comm)?;
    let coord = Coordinator::new(comm);
    nearest_src_to_dst(src, dst, kind, unmapped, config, Some(&coord))
}

fn nearest_dst_to_src<S, D, C>(
    src: &S,
    dst: &D,
    kind: EntityKind,
    unmapped: UnmappedAction,
    config: &SearchConfig,
    coord: Option<&Coordinator<'_, C>>,
) -> Result<SearchResult>
where
    S: SearchMesh + ?Sized,
    D: SearchMesh + ?Sized,
    C: Communicator + ?Sized,
{
    let started = Instant::now();
    let mut resolved = resolve(dst, kind, src, kind, QueryMode::Nearest, config, coord)?;

    let mut records = Vec::new();
    let mut hits = Vec::new();
    let answers = std::mem::take(&mut resolved.answers);
    for (consumer, answer) in resolved.consumers.iter().zip(answers) {
        match answer {
            Answer::Nearest { source: target, distance } => {
                records.push(MatchRecord::Node(NodeMatch {
                    dst: target,
                    source: consumer.entity,
                    locus: MatchLocus::Distance(distance),
                }));
                hits.push(target);
            }
            _ => tracing::debug!(gid = consumer.entity.gid, "源实体在截断半径内没有目标实体"),
        }
    }

    let reached = match coord {
        Some(coord) => {
            let (local, remote): (Vec<EntityRef>, Vec<EntityRef>) =
                hits.into_iter().partition(|h| h.rank == coord.rank());
            let mut reached = coord.exchange_hits(kind, &remote)?;
            reached.extend(local);
            reached
        }
        None => hits,
    };
    let missing = unhit_candidates(&dst.owned_entities(kind), &resolved.excluded, &reached);

    resolved.stats.matched = records.len();
    resolved.stats.unmapped = missing.len();
    enforce(kind, &missing, unmapped, coord)?;
    Ok(finish(SearchMethod::NearestDstToSrc, dst.rank(), records, resolved.stats, started))
}

/// 最近邻：每个源实体找最近的目标实体（串行）
///
/// 一个目标实体可能是多个源实体的最近者，因而出现在多条记录中；
/// 没有被任何源实体选中的目标实体为未映射。
pub fn search_nearest_dst_to_src<S, D>(
    src: &S,
    dst: &D,
    kind: EntityKind,
    unmapped: UnmappedAction,
    config: &SearchConfig,
) -> Result<SearchResult>
where
    S: SearchMesh + ?Sized,
    D: SearchMesh + ?Sized,
{
    config.validate()?;
    nearest_dst_to_src::<S, D, SerialComm>(src, dst, kind, unmapped, config, None)
}

/// 最近邻：每个源实体找最近的目标实体（分布式，集合操作）
pub fn par_search_nearest_dst_to_src<S, D, C>(
    src: &S,
    dst: &D,
    kind: EntityKind,
    unmapped: UnmappedAction,
    config: &SearchConfig,
    comm: &C,
) -> Result<SearchResult>
where
    S: SearchMesh + ?Sized,
    D: SearchMesh + ?Sized,
    C: Communicator + ?Sized,
{
    config.validate()?;
    check_rank("src", src, comm)?;
    check_rank("dst", dst, comm)?;
    let coord = Coordinator::new(comm);
    nearest_dst_to_src(src, dst, kind, unmapped, config, Some(&coord))
}

/// 打印结果报告到标准输出（按目标、源全局编号排序）
pub fn print_search_result(result: &SearchResult) {
    print!("{}", result);
}

/// 释放结果
///
/// 按值消费句柄，释放后无法再访问。
pub fn destroy_search_result(result: SearchResult) {
    result.release();
}
