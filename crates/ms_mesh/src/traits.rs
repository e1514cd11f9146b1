// crates/ms_mesh/src/traits.rs

//! 网格协作者接口（SearchMesh）
//!
//! 搜索引擎只通过此 trait 读取网格，不依赖具体存储。实现必须保证线程安全
//! （Send + Sync），分布式测试中每个进程线程持有各自分区的网格。
//!
//! # 能力
//!
//! - 枚举本地节点/单元（按槽位 `0..n`）
//! - 查询实体全局编号与归属（ghost 节点不归本进程所有）
//! - 获取实体包围盒、代表点与单元几何（参数坐标反演由 [`ElementGeometry`] 完成）
//!
//! # 使用示例
//!
//! ```ignore
//! use ms_mesh::{EntityKind, SearchMesh};
//!
//! fn owned_count<M: SearchMesh + ?Sized>(mesh: &M) -> usize {
//!     mesh.owned_entities(EntityKind::Node).len()
//! }
//! ```

use glam::DVec3;

use ms_geo::{BoundingBox, ElementGeometry};

use crate::entity::{EntityKind, EntityRef, GlobalId, Rank};
use crate::error::{MeshError, MeshResult};

/// 网格只读访问接口
pub trait SearchMesh: Send + Sync {
    // ===== 基本信息 =====

    /// 本分区所属进程
    fn rank(&self) -> Rank;

    /// 本地节点数（含 ghost 节点）
    fn n_nodes(&self) -> usize;

    /// 本地单元数
    fn n_elements(&self) -> usize;

    // ===== 节点 =====

    /// 节点坐标
    fn node_coords(&self, slot: usize) -> DVec3;

    /// 节点全局编号
    fn node_gid(&self, slot: usize) -> GlobalId;

    /// 节点是否归本进程所有
    fn node_is_owned(&self, slot: usize) -> bool;

    // ===== 单元 =====

    /// 单元全局编号
    fn element_gid(&self, slot: usize) -> GlobalId;

    /// 单元几何（顶点坐标 + 形状）
    fn element_geometry(&self, slot: usize) -> MeshResult<ElementGeometry>;

    /// 单元是否归本进程所有
    #[inline]
    fn element_is_owned(&self, _slot: usize) -> bool {
        true
    }

    // ===== 派生查询 =====

    /// 给定类型的本地实体数
    #[inline]
    fn n_entities(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Node => self.n_nodes(),
            EntityKind::Element => self.n_elements(),
        }
    }

    /// 构造槽位对应的句柄
    fn entity_ref(&self, kind: EntityKind, slot: usize) -> MeshResult<EntityRef> {
        let len = self.n_entities(kind);
        if slot >= len {
            return Err(MeshError::slot_out_of_range(kind, slot, len));
        }
        let gid = match kind {
            EntityKind::Node => self.node_gid(slot),
            EntityKind::Element => self.element_gid(slot),
        };
        Ok(EntityRef::new(kind, self.rank(), slot as u32, gid))
    }

    /// 本进程所有的实体（按槽位顺序）
    fn owned_entities(&self, kind: EntityKind) -> Vec<EntityRef> {
        (0..self.n_entities(kind))
            .filter(|&slot| match kind {
                EntityKind::Node => self.node_is_owned(slot),
                EntityKind::Element => self.element_is_owned(slot),
            })
            .filter_map(|slot| self.entity_ref(kind, slot).ok())
            .collect()
    }

    /// 实体包围盒（节点退化为单点）
    fn entity_bbox(&self, entity: &EntityRef) -> MeshResult<BoundingBox> {
        self.check_local(entity)?;
        match entity.kind {
            EntityKind::Node => Ok(BoundingBox::from_point(self.node_coords(entity.index()))),
            EntityKind::Element => Ok(self.element_geometry(entity.index())?.bounding_box()),
        }
    }

    /// 实体代表点（节点坐标或单元形心）
    fn entity_point(&self, entity: &EntityRef) -> MeshResult<DVec3> {
        self.check_local(entity)?;
        match entity.kind {
            EntityKind::Node => Ok(self.node_coords(entity.index())),
            EntityKind::Element => Ok(self.element_geometry(entity.index())?.centroid()),
        }
    }

    /// 校验句柄属于本分区且槽位有效
    fn check_local(&self, entity: &EntityRef) -> MeshResult<()> {
        if entity.rank != self.rank() {
            return Err(MeshError::invalid_topology(
                "resolve_entity",
                format!("句柄属于进程 {}, 当前进程 {}", entity.rank, self.rank()),
            ));
        }
        let len = self.n_entities(entity.kind);
        if entity.index() >= len {
            return Err(MeshError::slot_out_of_range(entity.kind, entity.index(), len));
        }
        Ok(())
    }

    /// 所有节点的包围盒
    fn node_bounds(&self) -> BoundingBox {
        (0..self.n_nodes()).fold(BoundingBox::EMPTY, |acc, i| acc.include_point(self.node_coords(i)))
    }
}
