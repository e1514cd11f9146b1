// crates/ms_search/src/distributed.rs

//! 分布式搜索协调
//!
//! 每个进程先用本地索引解析自己的消费端实体，然后：
//!
//! 1. 全收集各进程索引的根区域，建立 [`RankDirectory`]
//! 2. 把候选区域与探针相交（最近邻：距离不超过当前上界）的远端进程作为查询对象
//! 3. 全交换查询记录，用本地索引为其他进程解析，全交换响应记录
//! 4. 校验每个查询都得到响应，按确定性规则合并答案
//!
//! 所有进程以相同顺序执行相同的集合操作。传输失败、缺失或格式错误的响应
//! 都是致命的协议错误，不会产生部分结果。

use std::collections::BTreeSet;

use glam::DVec3;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use ms_comm::{CommExt, Communicator};
use ms_geo::BoundingBox;
use ms_mesh::{EntityKind, EntityRef, GlobalId, Rank};

use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::index::{Answer, QueryMode, SearchIndex};
use crate::local::Consumer;
use crate::result::SearchStats;
use crate::wire::{HitRecord, QueryRecord, RegionRecord, ResponseRecord, UnmappedRecord};

/// 最近邻上界的相对放宽量（抵消开方再平方的舍入）
const BOUND_SLACK: f64 = 1e-12;

/// 远端进程的区域
#[derive(Debug, Clone)]
struct RankRegion {
    rank: Rank,
    bbox: BoundingBox,
}

impl RTreeObject for RankRegion {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bbox.min.to_array(), self.bbox.max.to_array())
    }
}

impl PointDistance for RankRegion {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let d = self.bbox.distance_to_point(DVec3::from_array(*point));
        d * d
    }
}

/// 远端进程区域目录
///
/// 只包含索引非空的远端进程。
#[derive(Debug)]
pub struct RankDirectory {
    local: Rank,
    tree: RTree<RankRegion>,
}

impl RankDirectory {
    /// 由全收集得到的区域记录构建（记录按进程编号排列）
    pub fn from_records(local: Rank, records: &[RegionRecord]) -> Self {
        let regions: Vec<RankRegion> = records
            .iter()
            .enumerate()
            .filter(|(rank, rec)| *rank as Rank != local && rec.count > 0)
            .map(|(rank, rec)| RankRegion {
                rank: rank as Rank,
                bbox: rec.bounding_box(),
            })
            .filter(|r| r.bbox.is_valid())
            .collect();
        Self {
            local,
            tree: RTree::bulk_load(regions),
        }
    }

    /// 本进程编号
    pub fn local_rank(&self) -> Rank {
        self.local
    }

    /// 远端区域数
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// 是否没有远端区域
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// 区域与 `bbox` 相交（含边界接触）的远端进程，升序
    pub fn overlapping(&self, bbox: &BoundingBox) -> Vec<Rank> {
        if bbox.is_empty() {
            return Vec::new();
        }
        let envelope = AABB::from_corners(bbox.min.to_array(), bbox.max.to_array());
        let mut ranks: Vec<Rank> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|r| r.rank)
            .collect();
        ranks.sort_unstable();
        ranks
    }

    /// 远端区域中离 `p` 最近者的最远角点距离
    ///
    /// 该区域内至少有一个实体，故全局最近距离不超过该值。
    pub fn covering_distance(&self, p: DVec3) -> f64 {
        self.tree
            .iter()
            .map(|r| r.bbox.max_distance_to_point(p))
            .fold(f64::INFINITY, f64::min)
    }

    /// 区域到 `p` 的距离不超过 `bound` 的远端进程，升序
    pub fn within(&self, p: DVec3, bound: f64) -> Vec<Rank> {
        let mut ranks: Vec<Rank> = if bound.is_finite() {
            let r = bound * (1.0 + BOUND_SLACK);
            self.tree
                .locate_within_distance(p.to_array(), r * r)
                .map(|r| r.rank)
                .collect()
        } else {
            self.tree.iter().map(|r| r.rank).collect()
        };
        ranks.sort_unstable();
        ranks
    }
}

/// 分布式协调器
///
/// 借用通信器，只在一次搜索调用内使用。
pub struct Coordinator<'c, C: Communicator + ?Sized> {
    comm: &'c C,
}

impl<'c, C: Communicator + ?Sized> Coordinator<'c, C> {
    /// 创建协调器
    pub fn new(comm: &'c C) -> Self {
        Self { comm }
    }

    /// 本进程编号
    pub fn rank(&self) -> Rank {
        self.comm.rank()
    }

    /// 进程总数
    pub fn size(&self) -> usize {
        self.comm.size()
    }

    fn protocol(&self, peer: Option<Rank>, message: impl Into<String>) -> SearchError {
        SearchError::protocol(self.rank(), peer, message)
    }

    fn check_batches<T>(&self, what: &str, batches: &[T]) -> Result<()> {
        if batches.len() != self.size() {
            return Err(self.protocol(
                None,
                format!("{}: 期望 {} 个批次, 收到 {}", what, self.size(), batches.len()),
            ));
        }
        Ok(())
    }

    /// 交换各进程索引的根区域
    pub fn exchange_regions(&self, index: &SearchIndex) -> Result<RankDirectory> {
        let record = RegionRecord::new(&index.bounds(), index.len());
        let records = self.comm.all_gather_pod(&record)?;
        self.check_batches("区域交换", &records)?;
        let directory = RankDirectory::from_records(self.rank(), &records);
        tracing::debug!(rank = self.rank(), remote_regions = directory.len(), "区域交换完成");
        Ok(directory)
    }

    /// 跨进程解析
    ///
    /// `local` 为本地解析得到的答案，与 `consumers` 一一对应。
    /// 定位和重叠查询发往所有区域相交的远端进程（即使本地已找到匹配），
    /// 以保证平局规则与串行搜索一致；最近邻查询带距离上界，只发往可能更近的进程。
    pub fn resolve(
        &self,
        index: &SearchIndex,
        directory: &RankDirectory,
        consumers: &[Consumer],
        local: Vec<Answer>,
        mode: QueryMode,
        config: &SearchConfig,
        stats: &mut SearchStats,
    ) -> Result<Vec<Answer>> {
        if local.len() != consumers.len() {
            return Err(SearchError::invalid_argument(
                "local",
                local.len(),
                format!("答案数与消费端实体数 {} 不一致", consumers.len()),
            ));
        }
        let size = self.size();
        let tol = config.tolerance;

        let mut outgoing: Vec<Vec<QueryRecord>> = vec![Vec::new(); size];
        for (id, (consumer, answer)) in consumers.iter().zip(&local).enumerate() {
            if !consumer.probe.is_finite() {
                continue;
            }
            let (targets, bound) = match mode {
                QueryMode::Locate | QueryMode::Overlap => {
                    (directory.overlapping(&consumer.probe.query_box(tol)), None)
                }
                QueryMode::Nearest => {
                    let p = consumer.probe.point();
                    let local_best = match answer {
                        Answer::Nearest { distance, .. } => *distance,
                        _ => f64::INFINITY,
                    };
                    let bound = local_best
                        .min(directory.covering_distance(p))
                        .min(config.nearest.max_radius.unwrap_or(f64::INFINITY));
                    (directory.within(p, bound), bound.is_finite().then_some(bound))
                }
            };
            let id = u32::try_from(id)
                .map_err(|_| SearchError::invalid_argument("consumers", consumers.len(), "超出查询编号范围"))?;
            for peer in targets {
                outgoing[peer as usize].push(QueryRecord::new(id, mode, &consumer.probe, bound));
            }
        }

        let sent: Vec<BTreeSet<u32>> = outgoing
            .iter()
            .map(|batch| batch.iter().map(|q| q.id).collect())
            .collect();
        let n_sent: usize = outgoing.iter().map(Vec::len).sum();
        stats.remote_queries_sent += n_sent;
        tracing::debug!(rank = self.rank(), queries = n_sent, "发送远端查询");

        let incoming = self.comm.all_to_all_pod(outgoing)?;
        self.check_batches("查询交换", &incoming)?;

        let mut replies: Vec<Vec<ResponseRecord>> = vec![Vec::new(); size];
        for (peer, batch) in incoming.iter().enumerate() {
            let peer_rank = peer as Rank;
            for query in batch {
                let query_mode = query.query_mode().map_err(|m| self.protocol(Some(peer_rank), m))?;
                let probe = query.probe().map_err(|m| self.protocol(Some(peer_rank), m))?;
                let answer = index.resolve(query_mode, &probe, query.bound(), config, stats);
                stats.remote_queries_served += 1;
                replies[peer].extend(ResponseRecord::encode(query.id, &answer));
            }
        }
        tracing::debug!(
            rank = self.rank(),
            served = incoming.iter().map(Vec::len).sum::<usize>(),
            "远端查询处理完成"
        );

        let responses = self.comm.all_to_all_pod(replies)?;
        self.check_batches("响应交换", &responses)?;
        self.merge_responses(&sent, &responses, local)
    }

    /// 校验并合并远端响应
    ///
    /// 每个发往进程 `p` 的查询都必须在 `responses[p]` 中至少有一条响应，
    /// 且 `responses[p]` 不得包含未发往 `p` 的查询。
    fn merge_responses(
        &self,
        sent: &[BTreeSet<u32>],
        responses: &[Vec<ResponseRecord>],
        local: Vec<Answer>,
    ) -> Result<Vec<Answer>> {
        let mut answers = local;
        for (peer, batch) in responses.iter().enumerate() {
            let peer_rank = peer as Rank;
            let Some(expected) = sent.get(peer) else {
                return Err(self.protocol(Some(peer_rank), "响应来自未参与查询的进程"));
            };
            let mut answered = BTreeSet::new();
            for response in batch {
                if !expected.contains(&response.query) {
                    return Err(self.protocol(
                        Some(peer_rank),
                        format!("收到未发出的查询 {} 的响应", response.query),
                    ));
                }
                let remote = response.decode().map_err(|m| self.protocol(Some(peer_rank), m))?;
                let Some(slot) = answers.get_mut(response.query as usize) else {
                    return Err(self.protocol(Some(peer_rank), format!("查询编号 {} 超出范围", response.query)));
                };
                *slot = std::mem::replace(slot, Answer::NoMatch).merge(remote);
                answered.insert(response.query);
            }
            if let Some(missing) = expected.difference(&answered).next() {
                return Err(self.protocol(Some(peer_rank), format!("查询 {} 没有响应", missing)));
            }
        }
        Ok(answers)
    }

    /// 把命中通知发往目标实体的所属进程，返回本进程被命中的实体
    pub fn exchange_hits(&self, kind: EntityKind, hits: &[EntityRef]) -> Result<Vec<EntityRef>> {
        let rank = self.rank();
        let mut outgoing: Vec<Vec<HitRecord>> = vec![Vec::new(); self.size()];
        for hit in hits {
            let owner = hit.rank as usize;
            if owner >= outgoing.len() {
                return Err(self.protocol(Some(hit.rank), format!("实体 {} 的所属进程超出范围", hit.gid)));
            }
            outgoing[owner].push(HitRecord::new(hit));
        }
        let incoming = self.comm.all_to_all_pod(outgoing)?;
        self.check_batches("命中交换", &incoming)?;

        let mut received = Vec::new();
        for (peer, batch) in incoming.iter().enumerate() {
            for record in batch {
                if record.kind != kind.code() {
                    return Err(self.protocol(
                        Some(peer as Rank),
                        format!("命中通知实体类型编码 {} 与期望的 {} 不符", record.kind, kind),
                    ));
                }
                received.push(EntityRef::new(kind, rank, record.slot, record.gid));
            }
        }
        Ok(received)
    }

    /// 汇总所有进程的未映射实体：全局编号最小者与总数
    ///
    /// 所有进程得到相同的结果，从而对未映射策略作出一致的决定。
    pub fn agree_unmapped(&self, unmapped: &[EntityRef]) -> Result<(Option<(GlobalId, Rank)>, usize)> {
        let record = UnmappedRecord::new(self.rank(), unmapped);
        let records = self.comm.all_gather_pod(&record)?;
        self.check_batches("未映射汇总", &records)?;
        let total = records.iter().map(|r| r.count as usize).sum();
        let first = records
            .iter()
            .filter(|r| r.has_first != 0)
            .map(|r| (r.first_gid, r.first_rank))
            .min();
        Ok((first, total))
    }
}

/// 本进程所有但未被命中的实体
pub fn unhit(owned: &[EntityRef], hits: &[EntityRef]) -> Vec<EntityRef> {
    let hit: BTreeSet<GlobalId> = hits.iter().map(|h| h.gid).collect();
    owned.iter().filter(|e| !hit.contains(&e.gid)).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_comm::{SerialComm, ThreadComm};
    use ms_mesh::{point_cloud, RectMeshGenerator};

    use crate::index::Probe;
    use crate::local::{collect_consumers, resolve_local};

    fn region(min: [f64; 3], max: [f64; 3]) -> RegionRecord {
        RegionRecord { min, max, count: 1 }
    }

    #[test]
    fn test_directory_skips_local_and_empty() {
        let records = [
            region([0.0; 3], [1.0; 3]),
            RegionRecord::new(&BoundingBox::EMPTY, 0),
            region([2.0, 0.0, 0.0], [3.0, 1.0, 1.0]),
        ];
        let dir = RankDirectory::from_records(0, &records);
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.overlapping(&BoundingBox::from_point(DVec3::new(0.5, 0.5, 0.5))), Vec::<Rank>::new());
        assert_eq!(dir.overlapping(&BoundingBox::from_point(DVec3::new(2.0, 0.5, 0.5))), vec![2]);
    }

    #[test]
    fn test_directory_distance_queries() {
        let records = [
            region([0.0; 3], [1.0; 3]),
            region([3.0, 0.0, 0.0], [4.0, 1.0, 1.0]),
            region([10.0, 0.0, 0.0], [11.0, 1.0, 1.0]),
        ];
        let dir = RankDirectory::from_records(0, &records);
        let p = DVec3::new(2.0, 0.0, 0.0);
        assert_eq!(dir.within(p, 1.0), vec![1]);
        assert_eq!(dir.within(p, f64::INFINITY), vec![1, 2]);
        let cover = dir.covering_distance(p);
        assert!((cover - (4.0f64 + 1.0 + 1.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_serial_comm_resolves_locally() {
        let src = RectMeshGenerator::new(2, 2, 1.0, 1.0).build().unwrap();
        let dst = point_cloud(0, &[DVec3::new(0.2, 0.2, 0.0), DVec3::new(5.0, 5.0, 0.0)], 0).unwrap();
        let config = SearchConfig::default();
        let index = SearchIndex::build(&src, EntityKind::Element, &config).unwrap();
        let consumers = collect_consumers(&dst, EntityKind::Node, QueryMode::Locate).unwrap();
        let mut stats = SearchStats::default();
        let local = resolve_local(&index, &consumers, QueryMode::Locate, &config, &mut stats);

        let comm = SerialComm;
        let coord = Coordinator::new(&comm);
        let dir = coord.exchange_regions(&index).unwrap();
        assert!(dir.is_empty());
        let answers = coord
            .resolve(&index, &dir, &consumers, local.clone(), QueryMode::Locate, &config, &mut stats)
            .unwrap();
        assert_eq!(answers, local);
        assert_eq!(stats.remote_queries_sent, 0);
    }

    #[test]
    fn test_remote_nearest_beats_local() {
        // 进程 0 的点在 x=0，进程 1 的点在 x=10；查询点在 x=9 属于进程 0
        let answers = ThreadComm::run(2, |comm| {
            let rank = comm.rank();
            let provider = point_cloud(rank, &[DVec3::new(10.0 * rank as f64, 0.0, 0.0)], rank as u64).unwrap();
            let probes: Vec<DVec3> = if rank == 0 { vec![DVec3::new(9.0, 0.0, 0.0)] } else { vec![] };
            let consumer = point_cloud(rank, &probes, 100).unwrap();

            let config = SearchConfig::default();
            let index = SearchIndex::build(&provider, EntityKind::Node, &config).unwrap();
            let consumers = collect_consumers(&consumer, EntityKind::Node, QueryMode::Nearest).unwrap();
            let mut stats = SearchStats::default();
            let local = resolve_local(&index, &consumers, QueryMode::Nearest, &config, &mut stats);
            let coord = Coordinator::new(&comm);
            let dir = coord.exchange_regions(&index).unwrap();
            let answers = coord
                .resolve(&index, &dir, &consumers, local, QueryMode::Nearest, &config, &mut stats)
                .unwrap();
            (answers, stats)
        });
        let (rank0, stats0) = &answers[0];
        match &rank0[0] {
            Answer::Nearest { source, distance } => {
                assert_eq!((source.gid, source.rank), (1, 1));
                assert_eq!(*distance, 1.0);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(stats0.remote_queries_sent, 1);
        assert_eq!(answers[1].1.remote_queries_served, 1);
    }

    #[test]
    fn test_hits_and_unmapped_agreement() {
        let results = ThreadComm::run(3, |comm| {
            let coord = Coordinator::new(&comm);
            let rank = comm.rank();
            // 每个进程命中下一个进程的实体
            let next = (rank + 1) % 3;
            let hit = EntityRef::new(EntityKind::Node, next, 0, 10 * next as u64);
            let received = coord.exchange_hits(EntityKind::Node, &[hit]).unwrap();

            let unmapped: Vec<EntityRef> = (0..rank)
                .map(|i| EntityRef::new(EntityKind::Node, rank, i, 50 - rank as u64 - i as u64))
                .collect();
            let agreed = coord.agree_unmapped(&unmapped).unwrap();
            (received, agreed)
        });
        for (rank, (received, agreed)) in results.iter().enumerate() {
            assert_eq!(received.len(), 1);
            assert_eq!(received[0].gid, 10 * rank as u64);
            assert_eq!(received[0].rank, rank as Rank);
            assert_eq!(*agreed, (Some((47, 2)), 3));
        }
    }

    #[test]
    fn test_unanswered_query_is_protocol_error() {
        let comm = SerialComm;
        let coord = Coordinator::new(&comm);
        let sent = vec![BTreeSet::from([0u32, 1])];
        let responses = vec![ResponseRecord::encode(0, &Answer::NoMatch)];
        let err = coord
            .merge_responses(&sent, &responses, vec![Answer::NoMatch, Answer::NoMatch])
            .unwrap_err();
        assert!(err.is_protocol());
        match err {
            SearchError::Protocol { rank, peer, message } => {
                assert_eq!((rank, peer), (0, Some(0)));
                assert!(message.contains('1'));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_response_to_unsent_query_is_protocol_error() {
        let comm = SerialComm;
        let coord = Coordinator::new(&comm);
        let sent = vec![BTreeSet::from([0u32])];
        let mut batch = ResponseRecord::encode(0, &Answer::NoMatch);
        batch.extend(ResponseRecord::encode(5, &Answer::NoMatch));
        let err = coord
            .merge_responses(&sent, &[batch], vec![Answer::NoMatch])
            .unwrap_err();
        assert!(matches!(err, SearchError::Protocol { peer: Some(0), .. }));
    }

    #[test]
    fn test_complete_responses_merge() {
        let comm = SerialComm;
        let coord = Coordinator::new(&comm);
        let near = EntityRef::new(EntityKind::Node, 0, 3, 3);
        let sent = vec![BTreeSet::from([0u32])];
        let responses = vec![ResponseRecord::encode(0, &Answer::Nearest { source: near, distance: 0.5 })];
        let answers = coord.merge_responses(&sent, &responses, vec![Answer::NoMatch]).unwrap();
        assert_eq!(answers, vec![Answer::Nearest { source: near, distance: 0.5 }]);
    }

    #[test]
    fn test_unhit() {
        let e = |gid| EntityRef::new(EntityKind::Element, 0, gid as u32, gid);
        let rest = unhit(&[e(1), e(2), e(3)], &[e(2)]);
        assert_eq!(rest.iter().map(|x| x.gid).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_probe_query_box_covers_point() {
        let p = Probe::Point(DVec3::ONE);
        assert!(p.query_box(1e-8).contains_point(DVec3::ONE));
    }
}
