// crates/ms_search/src/index.rs

//! 单次搜索的提供端索引
//!
//! [`SearchIndex`] 在一次搜索调用内构建、只读使用、调用结束即丢弃，不跨调用缓存。
//! 构建时把提供端网格中本进程所有的实体连同几何一起放入八叉树，
//! 之后的精确测试不再访问网格。
//!
//! # 查询
//!
//! - [`QueryMode::Locate`]: 点定位，取包含该点的全局编号最小的单元
//! - [`QueryMode::Overlap`]: 单元重叠，取全部重叠单元
//! - [`QueryMode::Nearest`]: 最近邻，扩展查询盒直到找到候选，再精确求最小距离

use glam::DVec3;

use ms_geo::{
    elements_overlap, point_distance, test_containment, BoundingBox, Containment, ElementGeometry,
    Octree, ParametricCoords,
};
use ms_mesh::{EntityKind, EntityRef, SearchMesh};

use crate::config::SearchConfig;
use crate::error::Result;
use crate::result::SearchStats;

/// 查询方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// 点定位
    Locate,
    /// 单元重叠
    Overlap,
    /// 最近邻
    Nearest,
}

impl QueryMode {
    /// 线格式编码
    pub fn code(self) -> u32 {
        match self {
            Self::Locate => 0,
            Self::Overlap => 1,
            Self::Nearest => 2,
        }
    }

    /// 从线格式编码解析
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Locate),
            1 => Some(Self::Overlap),
            2 => Some(Self::Nearest),
            _ => None,
        }
    }
}

/// 查询探针（消费端实体的几何）
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Probe {
    /// 点
    Point(DVec3),
    /// 单元
    Element(ElementGeometry),
}

impl Probe {
    /// 探针包围盒
    pub fn bounding_box(&self) -> BoundingBox {
        match self {
            Self::Point(p) => BoundingBox::from_point(*p),
            Self::Element(g) => g.bounding_box(),
        }
    }

    /// 候选查询盒（单元探针按容差相对尺寸放宽）
    pub fn query_box(&self, tol: f64) -> BoundingBox {
        match self {
            Self::Point(p) => BoundingBox::from_point(*p),
            Self::Element(g) => g.bounding_box().expand(tol * g.scale()),
        }
    }

    /// 代表点
    pub fn point(&self) -> DVec3 {
        match self {
            Self::Point(p) => *p,
            Self::Element(g) => g.centroid(),
        }
    }

    /// 坐标是否全部有限
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Point(p) => p.is_finite(),
            Self::Element(g) => g.vertices().iter().all(|v| v.is_finite()),
        }
    }
}

/// 单个查询的答案
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// 无匹配
    NoMatch,
    /// 点定位结果
    Located {
        /// 包含该点的源单元
        source: EntityRef,
        /// 参数坐标
        pcoord: ParametricCoords,
    },
    /// 重叠单元（升序，按全局编号去重）
    Overlaps(Vec<EntityRef>),
    /// 最近邻结果
    Nearest {
        /// 最近的实体
        source: EntityRef,
        /// 距离
        distance: f64,
    },
}

impl Answer {
    /// 是否有匹配
    pub fn is_match(&self) -> bool {
        !matches!(self, Self::NoMatch)
    }

    /// 合并两份答案（来自不同进程），结果与合并顺序无关
    pub fn merge(self, other: Answer) -> Answer {
        match (self, other) {
            (Self::NoMatch, a) | (a, Self::NoMatch) => a,
            (
                Self::Located { source: s1, pcoord: p1 },
                Self::Located { source: s2, pcoord: p2 },
            ) => {
                if s2 < s1 {
                    Self::Located { source: s2, pcoord: p2 }
                } else {
                    Self::Located { source: s1, pcoord: p1 }
                }
            }
            (Self::Overlaps(mut a), Self::Overlaps(b)) => {
                a.extend(b);
                a.sort();
                a.dedup_by_key(|s| s.gid);
                Self::Overlaps(a)
            }
            (
                Self::Nearest { source: s1, distance: d1 },
                Self::Nearest { source: s2, distance: d2 },
            ) => {
                if d2.total_cmp(&d1).then(s2.cmp(&s1)).is_lt() {
                    Self::Nearest { source: s2, distance: d2 }
                } else {
                    Self::Nearest { source: s1, distance: d1 }
                }
            }
            (a, b) => {
                tracing::warn!("答案类型不一致, 保留先到者: {:?} / {:?}", a, b);
                a
            }
        }
    }
}

/// 索引条目的几何
#[derive(Debug, Clone, Copy)]
enum ProviderShape {
    Node(DVec3),
    Element(ElementGeometry),
}

#[derive(Debug, Clone, Copy)]
struct ProviderEntity {
    entity: EntityRef,
    shape: ProviderShape,
}

impl ProviderEntity {
    fn distance(&self, p: DVec3) -> f64 {
        match &self.shape {
            ProviderShape::Node(q) => q.distance(p),
            ProviderShape::Element(g) => point_distance(p, g),
        }
    }
}

/// 提供端索引
#[derive(Debug)]
pub struct SearchIndex {
    kind: EntityKind,
    tree: Octree<ProviderEntity>,
    excluded: Vec<EntityRef>,
}

impl SearchIndex {
    /// 从提供端网格中本进程所有的 `kind` 类实体构建索引
    ///
    /// 退化单元和非有限坐标的节点被排除（记录日志并计数），不视为错误。
    pub fn build<M: SearchMesh + ?Sized>(mesh: &M, kind: EntityKind, config: &SearchConfig) -> Result<Self> {
        let tol = config.tolerance;
        let mut excluded = Vec::new();
        let mut items = Vec::new();

        for entity in mesh.owned_entities(kind) {
            let (bbox, shape) = match kind {
                EntityKind::Node => {
                    let p = mesh.node_coords(entity.index());
                    if !p.is_finite() {
                        tracing::warn!(gid = entity.gid, rank = entity.rank, "节点坐标非有限, 排除出索引");
                        excluded.push(entity);
                        continue;
                    }
                    (BoundingBox::from_point(p), ProviderShape::Node(p))
                }
                EntityKind::Element => {
                    let geom = mesh.element_geometry(entity.index())?;
                    if geom.is_degenerate() {
                        tracing::warn!(
                            gid = entity.gid,
                            rank = entity.rank,
                            det = geom.jacobian_determinant(),
                            "退化单元, 排除出候选"
                        );
                        excluded.push(entity);
                        continue;
                    }
                    // 参数容差对应的物理松弛量
                    let bbox = geom.bounding_box().expand(2.0 * tol * geom.scale());
                    (bbox, ProviderShape::Element(geom))
                }
            };
            items.push((bbox, ProviderEntity { entity, shape }));
        }

        let tree = Octree::build(items, tol, config.octree);
        tracing::debug!(
            kind = %kind,
            rank = mesh.rank(),
            indexed = tree.len(),
            degenerate = excluded.len(),
            depth = tree.depth(),
            "提供端索引构建完成"
        );
        excluded.sort();
        Ok(Self { kind, tree, excluded })
    }

    /// 实体类型
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// 索引根区域（空索引为空包围盒）
    pub fn bounds(&self) -> BoundingBox {
        self.tree.bounds()
    }

    /// 索引条目数
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// 被排除的退化实体数
    pub fn degenerate_count(&self) -> usize {
        self.excluded.len()
    }

    /// 被排除的退化实体（升序）
    ///
    /// 这些实体不是候选，也不参与未映射判定。
    pub fn excluded(&self) -> &[EntityRef] {
        &self.excluded
    }

    /// 候选实体（包围盒与区域重叠）
    pub fn candidates(&self, region: &BoundingBox) -> Vec<EntityRef> {
        self.tree.query(region).into_iter().map(|p| p.entity).collect()
    }

    /// 解析一个查询
    ///
    /// `bound` 只用于最近邻：超过该距离的候选不予考虑。
    pub fn resolve(
        &self,
        mode: QueryMode,
        probe: &Probe,
        bound: Option<f64>,
        config: &SearchConfig,
        stats: &mut SearchStats,
    ) -> Answer {
        if self.is_empty() || !probe.is_finite() {
            return Answer::NoMatch;
        }
        match mode {
            QueryMode::Locate => self.locate(probe.point(), config.tolerance, stats),
            QueryMode::Overlap => match probe {
                Probe::Element(g) => self.overlaps(g, config.tolerance, stats),
                Probe::Point(p) => match self.locate(*p, config.tolerance, stats) {
                    Answer::Located { source, .. } => Answer::Overlaps(vec![source]),
                    other => other,
                },
            },
            QueryMode::Nearest => self.nearest(probe.point(), bound, config, stats),
        }
    }

    fn locate(&self, p: DVec3, tol: f64, stats: &mut SearchStats) -> Answer {
        let mut best: Option<(EntityRef, ParametricCoords)> = None;
        self.tree.for_each_overlapping(&BoundingBox::from_point(p), |_, item| {
            let ProviderShape::Element(geom) = &item.shape else {
                return;
            };
            stats.candidates_tested += 1;
            if let Containment::Inside(xi) = test_containment(p, geom, tol) {
                if best.map_or(true, |(b, _)| item.entity < b) {
                    best = Some((item.entity, xi));
                }
            }
        });
        match best {
            Some((source, pcoord)) => Answer::Located { source, pcoord },
            None => Answer::NoMatch,
        }
    }

    fn overlaps(&self, geom: &ElementGeometry, tol: f64, stats: &mut SearchStats) -> Answer {
        let mut found = Vec::new();
        let region = Probe::Element(*geom).query_box(tol);
        self.tree.for_each_overlapping(&region, |_, item| {
            let ProviderShape::Element(candidate) = &item.shape else {
                return;
            };
            stats.candidates_tested += 1;
            let slack = tol * candidate.scale().max(geom.scale());
            if elements_overlap(candidate, geom, slack) {
                found.push(item.entity);
            }
        });
        if found.is_empty() {
            return Answer::NoMatch;
        }
        found.sort();
        found.dedup_by_key(|s| s.gid);
        Answer::Overlaps(found)
    }

    /// 扩展盒最近邻
    ///
    /// 查询盒半宽从 `max(根尺寸 * initial_fraction, 点到根区域距离, 容差)` 开始加倍，
    /// 直到找到候选、覆盖整个索引、超过截断半径或达到最大加倍次数。
    /// 找到候选后以最佳距离为半宽再查询一次，保证结果是精确最近者。
    fn nearest(&self, p: DVec3, bound: Option<f64>, config: &SearchConfig, stats: &mut SearchStats) -> Answer {
        let root = self.tree.bounds();
        let cap = bound
            .unwrap_or(f64::INFINITY)
            .min(config.nearest.max_radius.unwrap_or(f64::INFINITY));
        let cover = root.max_distance_to_point(p);
        let mut half = (root.max_extent() * config.nearest.initial_fraction)
            .max(root.distance_to_point(p))
            .max(config.tolerance)
            .max(f64::MIN_POSITIVE);

        let mut hit: Option<(EntityRef, f64)> = None;
        for step in 0..=config.nearest.max_expansions {
            let h = half.min(cap);
            hit = self.closest_in(&BoundingBox::cube(p, h), p, stats);
            if hit.is_some() || h >= cover || h >= cap {
                break;
            }
            tracing::trace!(step, half = h, "最近邻查询盒扩展");
            stats.expansions += 1;
            half *= 2.0;
        }

        let Some((_, first)) = hit else {
            return Answer::NoMatch;
        };
        // 候选包围盒与查询盒相交不代表更近的实体都已被检查
        let refined = self.closest_in(&BoundingBox::cube(p, first), p, stats).or(hit);
        match refined {
            Some((source, distance)) if distance <= cap => Answer::Nearest { source, distance },
            _ => Answer::NoMatch,
        }
    }

    fn closest_in(&self, region: &BoundingBox, p: DVec3, stats: &mut SearchStats) -> Option<(EntityRef, f64)> {
        let mut best: Option<(EntityRef, f64)> = None;
        self.tree.for_each_overlapping(region, |_, item| {
            stats.candidates_tested += 1;
            let d = item.distance(p);
            let better = match best {
                None => true,
                Some((e, bd)) => d.total_cmp(&bd).then(item.entity.cmp(&e)).is_lt(),
            };
            if better {
                best = Some((item.entity, d));
            }
        });
        best
    }
}
