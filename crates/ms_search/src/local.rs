// crates/ms_search/src/local.rs

//! 本地搜索驱动
//!
//! 对本进程所有的每个消费端实体：构造探针 → 查询提供端索引 → 精确几何测试 → 记录答案。
//! 只使用本地候选；跨进程解析由 [`crate::distributed`] 完成。

use ms_mesh::{EntityKind, EntityRef, GlobalId, Rank, SearchMesh};

use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::index::{Answer, Probe, QueryMode, SearchIndex};
use crate::result::SearchStats;
use crate::types::UnmappedAction;

/// 一个待解析的消费端实体
#[derive(Debug, Clone)]
pub struct Consumer {
    /// 实体句柄
    pub entity: EntityRef,
    /// 几何探针
    pub probe: Probe,
}

/// 收集本进程所有的消费端实体
///
/// 节点以坐标为探针；单元在重叠模式下以完整几何为探针，其余模式以形心为探针。
pub fn collect_consumers<M: SearchMesh + ?Sized>(
    mesh: &M,
    kind: EntityKind,
    mode: QueryMode,
) -> Result<Vec<Consumer>> {
    mesh.owned_entities(kind)
        .into_iter()
        .map(|entity| -> Result<Consumer> {
            let probe = match kind {
                EntityKind::Node => Probe::Point(mesh.node_coords(entity.index())),
                EntityKind::Element => {
                    let geom = mesh.element_geometry(entity.index())?;
                    match mode {
                        QueryMode::Overlap => Probe::Element(geom),
                        QueryMode::Locate | QueryMode::Nearest => Probe::Point(geom.centroid()),
                    }
                }
            };
            Ok(Consumer { entity, probe })
        })
        .collect()
}

/// 用本地索引解析全部消费端实体
pub fn resolve_local(
    index: &SearchIndex,
    consumers: &[Consumer],
    mode: QueryMode,
    config: &SearchConfig,
    stats: &mut SearchStats,
) -> Vec<Answer> {
    stats.consumers += consumers.len();
    consumers
        .iter()
        .map(|c| {
            if !c.probe.is_finite() {
                tracing::debug!(gid = c.entity.gid, "消费端实体坐标非有限, 视为未映射");
                return Answer::NoMatch;
            }
            index.resolve(mode, &c.probe, None, config, stats)
        })
        .collect()
}

/// 本进程未映射实体的汇总：全局编号最小者与总数
pub fn summarize_unmapped(unmapped: &[EntityRef]) -> (Option<(GlobalId, Rank)>, usize) {
    let first = unmapped.iter().min().map(|e| (e.gid, e.rank));
    (first, unmapped.len())
}

/// 按策略处理未映射实体
///
/// `first` 为全局编号最小的未映射实体 `(gid, rank)`（分布式时为所有进程中最小者），
/// `total` 为未映射总数。
pub fn apply_unmapped_policy(
    kind: EntityKind,
    first: Option<(GlobalId, Rank)>,
    total: usize,
    action: UnmappedAction,
) -> Result<()> {
    let Some((gid, rank)) = first else {
        return Ok(());
    };
    match action {
        UnmappedAction::Error => Err(SearchError::Unmapped {
            kind,
            gid,
            rank,
            count: total,
        }),
        UnmappedAction::Ignore => {
            tracing::warn!(
                kind = %kind,
                count = total,
                first_gid = gid,
                "存在未映射实体, 按策略忽略"
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;
    use ms_mesh::{point_cloud, RectMeshGenerator};

    #[test]
    fn test_consumer_probes() {
        let mesh = RectMeshGenerator::new(1, 1, 2.0, 2.0).build().unwrap();
        let nodes = collect_consumers(&mesh, EntityKind::Node, QueryMode::Locate).unwrap();
        assert_eq!(nodes.len(), 4);
        let elems = collect_consumers(&mesh, EntityKind::Element, QueryMode::Nearest).unwrap();
        assert_eq!(elems[0].probe, Probe::Point(DVec3::new(1.0, 1.0, 0.0)));
        let elems = collect_consumers(&mesh, EntityKind::Element, QueryMode::Overlap).unwrap();
        assert!(matches!(elems[0].probe, Probe::Element(_)));
    }

    #[test]
    fn test_non_finite_consumer_unmapped() {
        let src = RectMeshGenerator::new(1, 1, 1.0, 1.0).build().unwrap();
        let config = SearchConfig::default();
        let index = SearchIndex::build(&src, EntityKind::Element, &config).unwrap();
        let dst = point_cloud(0, &[DVec3::new(0.5, 0.5, 0.0), DVec3::new(f64::NAN, 0.0, 0.0)], 0).unwrap();
        let consumers = collect_consumers(&dst, EntityKind::Node, QueryMode::Locate).unwrap();
        let mut stats = SearchStats::default();
        let answers = resolve_local(&index, &consumers, QueryMode::Locate, &config, &mut stats);
        assert!(answers[0].is_match());
        assert_eq!(answers[1], Answer::NoMatch);
        assert_eq!(stats.consumers, 2);
    }

    #[test]
    fn test_policy() {
        let unmapped = [
            EntityRef::new(EntityKind::Node, 1, 2, 12),
            EntityRef::new(EntityKind::Node, 1, 0, 8),
            EntityRef::new(EntityKind::Node, 1, 1, 9),
        ];
        let (first, total) = summarize_unmapped(&unmapped);
        assert_eq!(first, Some((8, 1)));
        assert!(apply_unmapped_policy(EntityKind::Node, None, 0, UnmappedAction::Error).is_ok());
        assert!(apply_unmapped_policy(EntityKind::Node, first, total, UnmappedAction::Ignore).is_ok());
        match apply_unmapped_policy(EntityKind::Node, first, total, UnmappedAction::Error) {
            Err(SearchError::Unmapped { gid, rank, count, .. }) => assert_eq!((gid, rank, count), (8, 1, 3)),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
