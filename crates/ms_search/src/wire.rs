// crates/ms_search/src/wire.rs

//! 分布式交换的定长记录
//!
//! 所有记录为 `#[repr(C)]` 的 Pod 类型，无隐式填充，可直接按字节收发。
//! 显式的 `_pad` 字段保证对齐。

use bytemuck::{Pod, Zeroable};
use glam::DVec3;

use ms_geo::{BoundingBox, ElementGeometry, ElementShape, MAX_ELEMENT_VERTICES};
use ms_mesh::{EntityKind, EntityRef, GlobalId, Rank};

use crate::index::{Answer, Probe, QueryMode};

/// 探针类型编码：点
const PROBE_POINT: u32 = u32::MAX;

/// 进程分区区域
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct RegionRecord {
    /// 最小角点
    pub min: [f64; 3],
    /// 最大角点
    pub max: [f64; 3],
    /// 索引中的实体数
    pub count: u64,
}

impl RegionRecord {
    /// 由包围盒和实体数创建
    pub fn new(bbox: &BoundingBox, count: usize) -> Self {
        Self {
            min: bbox.min.to_array(),
            max: bbox.max.to_array(),
            count: count as u64,
        }
    }

    /// 还原包围盒
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox {
            min: DVec3::from_array(self.min),
            max: DVec3::from_array(self.max),
        }
    }
}

/// 查询记录
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct QueryRecord {
    /// 发起方内的查询编号
    pub id: u32,
    /// 查询方式
    pub mode: u32,
    /// 探针类型：点为 `u32::MAX`，否则为单元形状编码
    pub probe: u32,
    /// 对齐填充
    pub _pad: u32,
    /// 最近邻距离上界（无上界为 +∞）
    pub bound: f64,
    /// 点坐标或单元顶点坐标（按顶点展开）
    pub coords: [f64; 3 * MAX_ELEMENT_VERTICES],
}

impl QueryRecord {
    /// 编码查询
    pub fn new(id: u32, mode: QueryMode, probe: &Probe, bound: Option<f64>) -> Self {
        let mut coords = [0.0; 3 * MAX_ELEMENT_VERTICES];
        let code = match probe {
            Probe::Point(p) => {
                coords[..3].copy_from_slice(&p.to_array());
                PROBE_POINT
            }
            Probe::Element(g) => {
                for (chunk, v) in coords.chunks_exact_mut(3).zip(g.vertices()) {
                    chunk.copy_from_slice(&v.to_array());
                }
                g.shape().code()
            }
        };
        Self {
            id,
            mode: mode.code(),
            probe: code,
            _pad: 0,
            bound: bound.unwrap_or(f64::INFINITY),
            coords,
        }
    }

    /// 查询方式
    pub fn query_mode(&self) -> Result<QueryMode, String> {
        QueryMode::from_code(self.mode).ok_or_else(|| format!("未知查询方式编码 {}", self.mode))
    }

    /// 距离上界
    pub fn bound(&self) -> Option<f64> {
        (self.bound < f64::INFINITY).then_some(self.bound)
    }

    /// 解码探针
    pub fn probe(&self) -> Result<Probe, String> {
        let vertex = |i: usize| DVec3::new(self.coords[3 * i], self.coords[3 * i + 1], self.coords[3 * i + 2]);
        if self.probe == PROBE_POINT {
            return Ok(Probe::Point(vertex(0)));
        }
        let shape = ElementShape::from_code(self.probe).map_err(|e| e.to_string())?;
        let vertices: Vec<DVec3> = (0..shape.n_vertices()).map(vertex).collect();
        ElementGeometry::new(shape, &vertices)
            .map(Probe::Element)
            .map_err(|e| e.to_string())
    }
}

/// 响应状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
enum Status {
    NoMatch = 0,
    Located = 1,
    Overlap = 2,
    Nearest = 3,
}

/// 响应记录（重叠查询每个源单元一条）
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ResponseRecord {
    /// 对应的查询编号
    pub query: u32,
    /// 状态编码
    pub status: u32,
    /// 源实体所属进程
    pub src_rank: u32,
    /// 源实体槽位
    pub src_slot: u32,
    /// 源实体全局编号
    pub src_gid: u64,
    /// 源实体类型编码
    pub src_kind: u32,
    /// 对齐填充
    pub _pad: u32,
    /// 最近邻距离
    pub distance: f64,
    /// 参数坐标
    pub pcoord: [f64; 3],
}

impl ResponseRecord {
    fn with_source(query: u32, status: Status, source: &EntityRef) -> Self {
        Self {
            query,
            status: status as u32,
            src_rank: source.rank,
            src_slot: source.slot,
            src_gid: source.gid,
            src_kind: source.kind.code(),
            _pad: 0,
            distance: 0.0,
            pcoord: [0.0; 3],
        }
    }

    /// 无匹配响应
    pub fn no_match(query: u32) -> Self {
        Self {
            query,
            status: Status::NoMatch as u32,
            ..Self::zeroed()
        }
    }

    /// 把一个答案编码为响应（至少一条）
    pub fn encode(query: u32, answer: &Answer) -> Vec<Self> {
        match answer {
            Answer::NoMatch => vec![Self::no_match(query)],
            Answer::Located { source, pcoord } => {
                let mut r = Self::with_source(query, Status::Located, source);
                r.pcoord = *pcoord;
                vec![r]
            }
            Answer::Overlaps(sources) if sources.is_empty() => vec![Self::no_match(query)],
            Answer::Overlaps(sources) => sources
                .iter()
                .map(|s| Self::with_source(query, Status::Overlap, s))
                .collect(),
            Answer::Nearest { source, distance } => {
                let mut r = Self::with_source(query, Status::Nearest, source);
                r.distance = *distance;
                vec![r]
            }
        }
    }

    fn source(&self) -> Result<EntityRef, String> {
        let kind = EntityKind::from_code(self.src_kind).ok_or_else(|| format!("未知实体类型编码 {}", self.src_kind))?;
        Ok(EntityRef::new(kind, self.src_rank, self.src_slot, self.src_gid))
    }

    /// 解码为答案
    pub fn decode(&self) -> Result<Answer, String> {
        match self.status {
            s if s == Status::NoMatch as u32 => Ok(Answer::NoMatch),
            s if s == Status::Located as u32 => Ok(Answer::Located {
                source: self.source()?,
                pcoord: self.pcoord,
            }),
            s if s == Status::Overlap as u32 => Ok(Answer::Overlaps(vec![self.source()?])),
            s if s == Status::Nearest as u32 => Ok(Answer::Nearest {
                source: self.source()?,
                distance: self.distance,
            }),
            other => Err(format!("未知响应状态 {}", other)),
        }
    }
}

/// 命中通知（最近邻 dst->src 模式：告知目标实体所属进程其实体被匹配）
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct HitRecord {
    /// 目标实体槽位
    pub slot: u32,
    /// 目标实体类型编码
    pub kind: u32,
    /// 目标实体全局编号
    pub gid: u64,
}

impl HitRecord {
    /// 由实体句柄创建
    pub fn new(entity: &EntityRef) -> Self {
        Self {
            slot: entity.slot,
            kind: entity.kind.code(),
            gid: entity.gid,
        }
    }
}

/// 未映射统计（用于各进程达成一致）
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct UnmappedRecord {
    /// 本进程未映射实体数
    pub count: u64,
    /// 本进程全局编号最小的未映射实体
    pub first_gid: u64,
    /// 该实体所属进程
    pub first_rank: u32,
    /// 是否存在未映射实体
    pub has_first: u32,
}

impl UnmappedRecord {
    /// 由本进程未映射实体创建
    pub fn new(rank: Rank, unmapped: &[EntityRef]) -> Self {
        match unmapped.iter().min() {
            Some(first) => Self {
                count: unmapped.len() as u64,
                first_gid: first.gid,
                first_rank: first.rank,
                has_first: 1,
            },
            None => Self {
                count: 0,
                first_gid: GlobalId::MAX,
                first_rank: rank,
                has_first: 0,
            },
        }
    }
}
