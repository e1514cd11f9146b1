// crates/ms_mesh/src/generation.rs

//! 网格生成模块
//!
//! 提供简单的结构化网格生成工具，用于测试、示例和命令行：
//!
//! - [`RectMeshGenerator`]: 矩形域上的四边形/三角形网格
//! - [`BoxMeshGenerator`]: 长方体域上的六面体网格
//! - [`point_cloud`]: 只有节点的点云网格
//!
//! 节点与单元的全局编号按行主序从给定偏移开始连续分配。
//!
//! # 使用示例
//!
//! ```rust
//! use ms_mesh::generation::RectMeshGenerator;
//! use ms_mesh::SearchMesh;
//!
//! // 生成 10x10 的三角形网格
//! let mesh = RectMeshGenerator::new(10, 10, 100.0, 100.0)
//!     .triangles(true)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(mesh.n_elements(), 200); // 10*10*2 triangles
//! ```

use glam::DVec3;

use ms_geo::ElementShape;

use crate::entity::{GlobalId, Rank};
use crate::error::{MeshError, MeshResult};
use crate::mesh::UnstructuredMesh;

/// 矩形结构化网格生成器
///
/// 顶点按行主序排列，z 坐标取原点的 z 分量
#[derive(Debug, Clone)]
pub struct RectMeshGenerator {
    /// x 方向单元数
    nx: usize,
    /// y 方向单元数
    ny: usize,
    /// x 方向域长度
    lx: f64,
    /// y 方向域长度
    ly: f64,
    origin: DVec3,
    triangles: bool,
    node_gid_offset: GlobalId,
    element_gid_offset: GlobalId,
}

impl RectMeshGenerator {
    /// 创建矩形网格生成器
    ///
    /// # 参数
    ///
    /// - `nx`: x 方向单元数
    /// - `ny`: y 方向单元数
    /// - `lx`: x 方向域长度
    /// - `ly`: y 方向域长度
    pub fn new(nx: usize, ny: usize, lx: f64, ly: f64) -> Self {
        Self {
            nx,
            ny,
            lx,
            ly,
            origin: DVec3::ZERO,
            triangles: false,
            node_gid_offset: 0,
            element_gid_offset: 0,
        }
    }

    /// 创建方形网格生成器
    pub fn square(n: usize, length: f64) -> Self {
        Self::new(n, n, length, length)
    }

    /// 设置原点偏移
    pub fn with_origin(mut self, origin: DVec3) -> Self {
        self.origin = origin;
        self
    }

    /// 每个矩形剖分为两个三角形
    pub fn triangles(mut self, enabled: bool) -> Self {
        self.triangles = enabled;
        self
    }

    /// 全局编号起始值
    pub fn with_gid_offset(mut self, node: GlobalId, element: GlobalId) -> Self {
        self.node_gid_offset = node;
        self.element_gid_offset = element;
        self
    }

    /// x 方向网格间距
    pub fn dx(&self) -> f64 {
        self.lx / self.nx as f64
    }

    /// y 方向网格间距
    pub fn dy(&self) -> f64 {
        self.ly / self.ny as f64
    }

    /// 顶点总数
    pub fn n_vertices(&self) -> usize {
        (self.nx + 1) * (self.ny + 1)
    }

    /// 单元总数
    pub fn n_cells(&self) -> usize {
        let quads = self.nx * self.ny;
        if self.triangles {
            quads * 2
        } else {
            quads
        }
    }

    /// 构建网格
    pub fn build(&self) -> MeshResult<UnstructuredMesh> {
        check_extent("rect", &[(self.nx, self.lx), (self.ny, self.ly)])?;
        let mut b = UnstructuredMesh::builder(0);
        let (dx, dy) = (self.dx(), self.dy());

        for j in 0..=self.ny {
            for i in 0..=self.nx {
                let p = self.origin + DVec3::new(i as f64 * dx, j as f64 * dy, 0.0);
                let gid = self.node_gid_offset + (j * (self.nx + 1) + i) as GlobalId;
                b.add_node(gid, p);
            }
        }

        let vertex_idx = |i: usize, j: usize| (j * (self.nx + 1) + i) as u32;
        let mut gid = self.element_gid_offset;
        for j in 0..self.ny {
            for i in 0..self.nx {
                let v00 = vertex_idx(i, j);
                let v10 = vertex_idx(i + 1, j);
                let v01 = vertex_idx(i, j + 1);
                let v11 = vertex_idx(i + 1, j + 1);

                if !self.triangles {
                    b.add_element(gid, ElementShape::Quad4, &[v00, v10, v11, v01])?;
                    gid += 1;
                    continue;
                }
                // 交替对角线方向
                let tris = if (i + j) % 2 == 0 {
                    [[v00, v10, v11], [v00, v11, v01]]
                } else {
                    [[v00, v10, v01], [v10, v11, v01]]
                };
                for t in tris {
                    b.add_element(gid, ElementShape::Tri3, &t)?;
                    gid += 1;
                }
            }
        }
        b.build()
    }
}

/// 长方体六面体网格生成器
#[derive(Debug, Clone)]
pub struct BoxMeshGenerator {
    n: [usize; 3],
    length: DVec3,
    origin: DVec3,
    node_gid_offset: GlobalId,
    element_gid_offset: GlobalId,
}

impl BoxMeshGenerator {
    /// 创建生成器
    pub fn new(nx: usize, ny: usize, nz: usize, length: DVec3) -> Self {
        Self {
            n: [nx, ny, nz],
            length,
            origin: DVec3::ZERO,
            node_gid_offset: 0,
            element_gid_offset: 0,
        }
    }

    /// 设置原点偏移
    pub fn with_origin(mut self, origin: DVec3) -> Self {
        self.origin = origin;
        self
    }

    /// 全局编号起始值
    pub fn with_gid_offset(mut self, node: GlobalId, element: GlobalId) -> Self {
        self.node_gid_offset = node;
        self.element_gid_offset = element;
        self
    }

    /// 单元总数
    pub fn n_cells(&self) -> usize {
        self.n.iter().product()
    }

    /// 构建网格
    pub fn build(&self) -> MeshResult<UnstructuredMesh> {
        let [nx, ny, nz] = self.n;
        check_extent(
            "box",
            &[(nx, self.length.x), (ny, self.length.y), (nz, self.length.z)],
        )?;
        let h = self.length / DVec3::new(nx as f64, ny as f64, nz as f64);
        let idx = |i: usize, j: usize, k: usize| (k * (ny + 1) + j) * (nx + 1) + i;

        let mut b = UnstructuredMesh::builder(0);
        for k in 0..=nz {
            for j in 0..=ny {
                for i in 0..=nx {
                    let p = self.origin + DVec3::new(i as f64, j as f64, k as f64) * h;
                    b.add_node(self.node_gid_offset + idx(i, j, k) as GlobalId, p);
                }
            }
        }

        let mut gid = self.element_gid_offset;
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let v = |di: usize, dj: usize, dk: usize| idx(i + di, j + dj, k + dk) as u32;
                    let hex = [
                        v(0, 0, 0),
                        v(1, 0, 0),
                        v(1, 1, 0),
                        v(0, 1, 0),
                        v(0, 0, 1),
                        v(1, 0, 1),
                        v(1, 1, 1),
                        v(0, 1, 1),
                    ];
                    b.add_element(gid, ElementShape::Hex8, &hex)?;
                    gid += 1;
                }
            }
        }
        b.build()
    }
}

/// 点云网格（只有节点），全局编号为 `gid_offset + 下标`
pub fn point_cloud(rank: Rank, points: &[DVec3], gid_offset: GlobalId) -> MeshResult<UnstructuredMesh> {
    let mut b = UnstructuredMesh::builder(rank);
    for (i, p) in points.iter().enumerate() {
        b.add_node(gid_offset + i as GlobalId, *p);
    }
    b.build()
}

fn check_extent(generator: &'static str, dims: &[(usize, f64)]) -> MeshResult<()> {
    for &(n, l) in dims {
        if n == 0 || !(l.is_finite() && l > 0.0) {
            return Err(MeshError::invalid_topology(
                generator,
                format!("单元数必须为正且域长度为正有限值: n={}, l={}", n, l),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SearchMesh;

    #[test]
    fn test_rect_quads() {
        let mesh = RectMeshGenerator::new(3, 2, 3.0, 2.0)
            .with_origin(DVec3::new(1.0, 1.0, 0.0))
            .build()
            .unwrap();
        assert_eq!(mesh.n_nodes(), 12);
        assert_eq!(mesh.n_elements(), 6);
        let g = mesh.element_geometry(0).unwrap();
        assert_eq!(g.shape(), ElementShape::Quad4);
        assert!(g.jacobian_determinant() > 0.0);
        assert_eq!(mesh.node_coords(11), DVec3::new(4.0, 3.0, 0.0));
    }

    #[test]
    fn test_rect_triangles_orientation() {
        let mesh = RectMeshGenerator::square(4, 1.0).triangles(true).build().unwrap();
        assert_eq!(mesh.n_elements(), 32);
        for e in 0..mesh.n_elements() {
            assert!(mesh.element_geometry(e).unwrap().jacobian_determinant() > 0.0);
        }
    }

    #[test]
    fn test_box_hex() {
        let mesh = BoxMeshGenerator::new(2, 2, 2, DVec3::splat(2.0))
            .with_gid_offset(1000, 500)
            .build()
            .unwrap();
        assert_eq!(mesh.n_nodes(), 27);
        assert_eq!(mesh.n_elements(), 8);
        assert_eq!(mesh.element_gid(0), 500);
        assert_eq!(mesh.node_gid(0), 1000);
        let g = mesh.element_geometry(7).unwrap();
        assert!((g.centroid() - DVec3::splat(1.5)).length() < 1e-15);
        assert!(g.jacobian_determinant() > 0.0);
    }

    #[test]
    fn test_invalid_extent() {
        assert!(RectMeshGenerator::new(0, 2, 1.0, 1.0).build().is_err());
        assert!(BoxMeshGenerator::new(1, 1, 1, DVec3::new(1.0, -1.0, 1.0)).build().is_err());
    }

    #[test]
    fn test_point_cloud() {
        let mesh = point_cloud(2, &[DVec3::ZERO, DVec3::X], 7).unwrap();
        assert_eq!(mesh.rank(), 2);
        assert_eq!(mesh.n_elements(), 0);
        assert_eq!(mesh.node_gid(1), 8);
    }
}
