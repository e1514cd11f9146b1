// crates/ms_mesh/src/partition.rs

//! 网格分区
//!
//! 把一个串行网格切分为 N 个进程分区，用于分布式搜索和等价性测试。
//!
//! - 单元按策略分配到分区
//! - 节点归属于引用它的单元所在的最小分区；未被单元引用的节点按同一策略单独分配
//! - 分区内引用的非本分区节点作为 ghost 节点加入，只参与单元几何
//!
//! 全局编号在分区间保持不变，因此分区结果与串行网格可以逐实体比较。

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::entity::Rank;
use crate::error::{MeshError, MeshResult};
use crate::mesh::UnstructuredMesh;
use crate::traits::SearchMesh;

/// 分区策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartitionStrategy {
    /// 按 x 坐标切条（几何局部性好）
    #[default]
    Strips,
    /// 按下标轮转（几何上完全打散）
    RoundRobin,
}

impl fmt::Display for PartitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strips => write!(f, "strips"),
            Self::RoundRobin => write!(f, "round-robin"),
        }
    }
}

impl FromStr for PartitionStrategy {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strips" => Ok(Self::Strips),
            "round-robin" | "round_robin" => Ok(Self::RoundRobin),
            other => Err(MeshError::InvalidPartition(format!("未知分区策略: {}", other))),
        }
    }
}

impl PartitionStrategy {
    /// 为 `keys`（x 坐标, 全局编号）分配分区号
    fn assign(self, keys: &[(f64, u64)], n_parts: usize) -> Vec<usize> {
        let n = keys.len();
        match self {
            Self::RoundRobin => (0..n).map(|i| i % n_parts).collect(),
            Self::Strips => {
                let mut order: Vec<usize> = (0..n).collect();
                order.sort_by(|&a, &b| {
                    keys[a].0.total_cmp(&keys[b].0).then(keys[a].1.cmp(&keys[b].1))
                });
                let mut parts = vec![0; n];
                for (pos, &i) in order.iter().enumerate() {
                    parts[i] = pos * n_parts / n;
                }
                parts
            }
        }
    }
}

/// 把串行网格切分为 `n_parts` 个分区
///
/// 输入网格的所有节点必须归本进程所有（未分区网格）。
pub fn partition(
    mesh: &UnstructuredMesh,
    n_parts: usize,
    strategy: PartitionStrategy,
) -> MeshResult<Vec<UnstructuredMesh>> {
    if n_parts == 0 {
        return Err(MeshError::InvalidPartition("分区数必须大于 0".into()));
    }
    if mesh.n_owned_nodes() != mesh.n_nodes() {
        return Err(MeshError::InvalidPartition("输入网格含 ghost 节点, 不是串行网格".into()));
    }

    let element_keys: Vec<(f64, u64)> = (0..mesh.n_elements())
        .map(|e| {
            let x = mesh.element_geometry(e).map(|g| g.centroid().x).unwrap_or(0.0);
            (x, mesh.element_gid(e))
        })
        .collect();
    let element_part = strategy.assign(&element_keys, n_parts);

    // 节点归属：引用它的最小分区，孤立节点单独分配
    let mut node_part: Vec<Option<usize>> = vec![None; mesh.n_nodes()];
    for (e, &p) in element_part.iter().enumerate() {
        for &n in mesh.element_nodes(e) {
            let slot = &mut node_part[n as usize];
            *slot = Some(slot.map_or(p, |q| q.min(p)));
        }
    }
    let orphans: Vec<usize> = (0..mesh.n_nodes()).filter(|&n| node_part[n].is_none()).collect();
    let orphan_keys: Vec<(f64, u64)> = orphans
        .iter()
        .map(|&n| (mesh.node_coords(n).x, mesh.node_gid(n)))
        .collect();
    for (&n, p) in orphans.iter().zip(strategy.assign(&orphan_keys, n_parts)) {
        node_part[n] = Some(p);
    }

    let mut parts = Vec::with_capacity(n_parts);
    for p in 0..n_parts {
        let mut b = UnstructuredMesh::builder(p as Rank);
        let mut local: HashMap<u32, u32> = HashMap::new();

        for n in 0..mesh.n_nodes() {
            if node_part[n] == Some(p) {
                let slot = b.add_node(mesh.node_gid(n), mesh.node_coords(n));
                local.insert(n as u32, slot);
            }
        }

        let mut conn: Vec<u32> = Vec::with_capacity(8);
        for e in (0..mesh.n_elements()).filter(|&e| element_part[e] == p) {
            conn.clear();
            for &n in mesh.element_nodes(e) {
                let slot = match local.get(&n) {
                    Some(&s) => s,
                    None => {
                        let s = b.add_ghost_node(mesh.node_gid(n as usize), mesh.node_coords(n as usize));
                        local.insert(n, s);
                        s
                    }
                };
                conn.push(slot);
            }
            b.add_element(mesh.element_gid(e), mesh.element_shape(e), &conn)?;
        }

        parts.push(b.build()?);
    }

    tracing::debug!(
        parts = n_parts,
        strategy = %strategy,
        elements = mesh.n_elements(),
        nodes = mesh.n_nodes(),
        "网格分区完成"
    );
    Ok(parts)
}
