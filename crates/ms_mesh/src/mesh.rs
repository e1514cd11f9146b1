// crates/ms_mesh/src/mesh.rs

//! 非结构化网格（SoA 布局）
//!
//! [`UnstructuredMesh`] 是一个进程分区上的只读网格：节点坐标、全局编号、
//! 归属标记，以及 CSR 形式的单元连接关系。通过 [`UnstructuredMeshBuilder`]
//! 构建，构建时校验全局编号唯一、连接关系合法。
//!
//! 网格可序列化为 JSON（`serde_json`），命令行工具以此交换网格文件。

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use ms_geo::{ElementGeometry, ElementShape};

use crate::entity::{EntityKind, GlobalId, Rank};
use crate::error::{MeshError, MeshResult};
use crate::traits::SearchMesh;

/// 非结构化网格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnstructuredMesh {
    rank: Rank,
    node_coords: Vec<DVec3>,
    node_gids: Vec<GlobalId>,
    node_owned: Vec<bool>,
    element_shapes: Vec<ElementShape>,
    /// CSR 偏移，长度为单元数 + 1
    element_offsets: Vec<usize>,
    element_nodes: Vec<u32>,
    element_gids: Vec<GlobalId>,
}

impl Default for UnstructuredMesh {
    fn default() -> Self {
        Self {
            rank: 0,
            node_coords: Vec::new(),
            node_gids: Vec::new(),
            node_owned: Vec::new(),
            element_shapes: Vec::new(),
            element_offsets: vec![0],
            element_nodes: Vec::new(),
            element_gids: Vec::new(),
        }
    }
}

impl UnstructuredMesh {
    /// 创建构建器
    pub fn builder(rank: Rank) -> UnstructuredMeshBuilder {
        UnstructuredMeshBuilder::new(rank)
    }

    /// 单元形状
    #[inline]
    pub fn element_shape(&self, slot: usize) -> ElementShape {
        self.element_shapes[slot]
    }

    /// 单元节点（本地槽位）
    #[inline]
    pub fn element_nodes(&self, slot: usize) -> &[u32] {
        &self.element_nodes[self.element_offsets[slot]..self.element_offsets[slot + 1]]
    }

    /// 所有节点坐标
    #[inline]
    pub fn node_coords_slice(&self) -> &[DVec3] {
        &self.node_coords
    }

    /// 本进程所有的节点数
    pub fn n_owned_nodes(&self) -> usize {
        self.node_owned.iter().filter(|&&o| o).count()
    }

    /// 校验内部一致性（反序列化后调用）
    pub fn validate(&self) -> MeshResult<()> {
        let n_nodes = self.node_coords.len();
        if self.node_gids.len() != n_nodes || self.node_owned.len() != n_nodes {
            return Err(MeshError::invalid_topology(
                "validate",
                format!(
                    "节点数组长度不一致: coords={}, gids={}, owned={}",
                    n_nodes,
                    self.node_gids.len(),
                    self.node_owned.len()
                ),
            ));
        }
        let n_elements = self.element_shapes.len();
        if self.element_gids.len() != n_elements || self.element_offsets.len() != n_elements + 1 {
            return Err(MeshError::invalid_topology(
                "validate",
                format!(
                    "单元数组长度不一致: shapes={}, gids={}, offsets={}",
                    n_elements,
                    self.element_gids.len(),
                    self.element_offsets.len()
                ),
            ));
        }
        if self.element_offsets.first() != Some(&0)
            || self.element_offsets.last() != Some(&self.element_nodes.len())
        {
            return Err(MeshError::invalid_topology("validate", "CSR 偏移首尾不匹配"));
        }
        for (e, shape) in self.element_shapes.iter().enumerate() {
            let (lo, hi) = (self.element_offsets[e], self.element_offsets[e + 1]);
            if hi < lo || hi - lo != shape.n_vertices() {
                return Err(MeshError::invalid_topology(
                    "validate",
                    format!("单元 {} 节点数与形状 {:?} 不符", self.element_gids[e], shape),
                ));
            }
            if let Some(&bad) = self.element_nodes[lo..hi].iter().find(|&&n| n as usize >= n_nodes) {
                return Err(MeshError::slot_out_of_range(EntityKind::Node, bad as usize, n_nodes));
            }
        }
        check_unique(EntityKind::Node, &self.node_gids)?;
        check_unique(EntityKind::Element, &self.element_gids)?;
        Ok(())
    }

    /// 从 JSON 文件读取
    pub fn from_file<P: AsRef<Path>>(path: P) -> MeshResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mesh: Self = serde_json::from_reader(reader)?;
        mesh.validate()?;
        Ok(mesh)
    }

    /// 写出为 JSON 文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> MeshResult<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }
}

fn check_unique(kind: EntityKind, gids: &[GlobalId]) -> MeshResult<()> {
    let mut seen = HashSet::with_capacity(gids.len());
    for &gid in gids {
        if !seen.insert(gid) {
            return Err(MeshError::DuplicateGlobalId { kind, gid });
        }
    }
    Ok(())
}

impl SearchMesh for UnstructuredMesh {
    #[inline]
    fn rank(&self) -> Rank {
        self.rank
    }

    #[inline]
    fn n_nodes(&self) -> usize {
        self.node_coords.len()
    }

    #[inline]
    fn n_elements(&self) -> usize {
        self.element_shapes.len()
    }

    #[inline]
    fn node_coords(&self, slot: usize) -> DVec3 {
        self.node_coords[slot]
    }

    #[inline]
    fn node_gid(&self, slot: usize) -> GlobalId {
        self.node_gids[slot]
    }

    #[inline]
    fn node_is_owned(&self, slot: usize) -> bool {
        self.node_owned[slot]
    }

    #[inline]
    fn element_gid(&self, slot: usize) -> GlobalId {
        self.element_gids[slot]
    }

    fn element_geometry(&self, slot: usize) -> MeshResult<ElementGeometry> {
        if slot >= self.n_elements() {
            return Err(MeshError::slot_out_of_range(EntityKind::Element, slot, self.n_elements()));
        }
        let nodes = self.element_nodes(slot);
        let mut coords = [DVec3::ZERO; ms_geo::MAX_ELEMENT_VERTICES];
        for (c, &n) in coords.iter_mut().zip(nodes) {
            *c = self.node_coords[n as usize];
        }
        Ok(ElementGeometry::new(self.element_shapes[slot], &coords[..nodes.len()])?)
    }
}

// ============================================================
// 构建器
// ============================================================

/// 网格构建器
#[derive(Debug, Clone)]
pub struct UnstructuredMeshBuilder {
    mesh: UnstructuredMesh,
}

impl UnstructuredMeshBuilder {
    /// 创建空构建器
    pub fn new(rank: Rank) -> Self {
        Self {
            mesh: UnstructuredMesh {
                rank,
                ..UnstructuredMesh::default()
            },
        }
    }

    /// 添加本进程所有的节点，返回本地槽位
    pub fn add_node(&mut self, gid: GlobalId, coords: DVec3) -> u32 {
        self.push_node(gid, coords, true)
    }

    /// 添加 ghost 节点（归其他进程所有，只用于单元几何）
    pub fn add_ghost_node(&mut self, gid: GlobalId, coords: DVec3) -> u32 {
        self.push_node(gid, coords, false)
    }

    fn push_node(&mut self, gid: GlobalId, coords: DVec3, owned: bool) -> u32 {
        let slot = self.mesh.node_coords.len() as u32;
        self.mesh.node_coords.push(coords);
        self.mesh.node_gids.push(gid);
        self.mesh.node_owned.push(owned);
        slot
    }

    /// 添加单元，`nodes` 为本地节点槽位
    pub fn add_element(&mut self, gid: GlobalId, shape: ElementShape, nodes: &[u32]) -> MeshResult<u32> {
        if nodes.len() != shape.n_vertices() {
            return Err(ms_geo::GeoError::vertex_count_mismatch(shape, nodes.len()).into());
        }
        let n_nodes = self.mesh.node_coords.len();
        if let Some(&bad) = nodes.iter().find(|&&n| n as usize >= n_nodes) {
            return Err(MeshError::slot_out_of_range(EntityKind::Node, bad as usize, n_nodes));
        }
        let slot = self.mesh.element_shapes.len() as u32;
        self.mesh.element_shapes.push(shape);
        self.mesh.element_nodes.extend_from_slice(nodes);
        self.mesh.element_offsets.push(self.mesh.element_nodes.len());
        self.mesh.element_gids.push(gid);
        Ok(slot)
    }

    /// 当前节点数
    pub fn n_nodes(&self) -> usize {
        self.mesh.node_coords.len()
    }

    /// 完成构建并校验
    pub fn build(self) -> MeshResult<UnstructuredMesh> {
        self.mesh.validate()?;
        tracing::debug!(
            rank = self.mesh.rank,
            nodes = self.mesh.n_nodes(),
            elements = self.mesh.n_elements(),
            "网格构建完成"
        );
        Ok(self.mesh)
    }
}
