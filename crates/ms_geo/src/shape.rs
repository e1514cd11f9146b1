// crates/ms_geo/src/shape.rs

//! 单元形状与形函数
//!
//! 支持四种线性单元：
//!
//! | 形状 | 参数维度 | 参考空间 |
//! |------|---------|---------|
//! | `Tri3` | 2 | 单纯形 ξ,η ≥ 0, ξ+η ≤ 1 |
//! | `Quad4` | 2 | [0,1]² |
//! | `Tet4` | 3 | 单纯形 ξ,η,ζ ≥ 0, ξ+η+ζ ≤ 1 |
//! | `Hex8` | 3 | [0,1]³ |
//!
//! 二维单元在 xy 平面内求解，忽略 z 分量。
//!
//! # 顶点编号
//!
//! ```text
//! Quad4:  3---2     Hex8 底面 0-1-2-3 (z=0)，顶面 4-5-6-7 (z=1)
//!         |   |
//!         0---1
//! ```

use glam::{DMat2, DMat3, DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::{GeoError, GeoResult};

/// 单元最大顶点数
pub const MAX_ELEMENT_VERTICES: usize = 8;

/// Newton 迭代最大次数
const MAX_NEWTON_ITERATIONS: usize = 32;

/// Newton 收敛容差（相对单元尺寸）
const NEWTON_REL_TOL: f64 = 1e-13;

/// 退化判断容差（|det J| 相对 尺寸^维度）
const DEGENERATE_REL_TOL: f64 = 1e-12;

/// 参数坐标（未使用的分量为 0）
pub type ParametricCoords = [f64; 3];

/// 单元形状
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementShape {
    /// 三节点三角形
    Tri3,
    /// 四节点四边形
    Quad4,
    /// 四节点四面体
    Tet4,
    /// 八节点六面体
    Hex8,
}

const TRI3_EDGES: [[usize; 2]; 3] = [[0, 1], [1, 2], [2, 0]];
const QUAD4_EDGES: [[usize; 2]; 4] = [[0, 1], [1, 2], [2, 3], [3, 0]];
const TET4_EDGES: [[usize; 2]; 6] = [[0, 1], [1, 2], [2, 0], [0, 3], [1, 3], [2, 3]];
const HEX8_EDGES: [[usize; 2]; 12] = [
    [0, 1], [1, 2], [2, 3], [3, 0],
    [4, 5], [5, 6], [6, 7], [7, 4],
    [0, 4], [1, 5], [2, 6], [3, 7],
];

const TRI3_FACES: [&[usize]; 1] = [&[0, 1, 2]];
const QUAD4_FACES: [&[usize]; 1] = [&[0, 1, 2, 3]];
const TET4_FACES: [&[usize]; 4] = [&[0, 2, 1], &[0, 1, 3], &[1, 2, 3], &[0, 3, 2]];
const HEX8_FACES: [&[usize]; 6] = [
    &[0, 3, 2, 1],
    &[4, 5, 6, 7],
    &[0, 1, 5, 4],
    &[1, 2, 6, 5],
    &[2, 3, 7, 6],
    &[3, 0, 4, 7],
];

impl ElementShape {
    /// 顶点数
    #[inline]
    pub const fn n_vertices(self) -> usize {
        match self {
            Self::Tri3 => 3,
            Self::Quad4 | Self::Tet4 => 4,
            Self::Hex8 => 8,
        }
    }

    /// 参数空间维度
    #[inline]
    pub const fn parametric_dim(self) -> usize {
        match self {
            Self::Tri3 | Self::Quad4 => 2,
            Self::Tet4 | Self::Hex8 => 3,
        }
    }

    /// 参考空间是否为单纯形
    #[inline]
    pub const fn is_simplex(self) -> bool {
        matches!(self, Self::Tri3 | Self::Tet4)
    }

    /// 线缆编码
    #[inline]
    pub const fn code(self) -> u32 {
        match self {
            Self::Tri3 => 0,
            Self::Quad4 => 1,
            Self::Tet4 => 2,
            Self::Hex8 => 3,
        }
    }

    /// 从线缆编码恢复
    pub fn from_code(code: u32) -> GeoResult<Self> {
        match code {
            0 => Ok(Self::Tri3),
            1 => Ok(Self::Quad4),
            2 => Ok(Self::Tet4),
            3 => Ok(Self::Hex8),
            other => Err(GeoError::UnknownShape(other)),
        }
    }

    /// 单元棱边（顶点局部编号对）
    pub fn edges(self) -> &'static [[usize; 2]] {
        match self {
            Self::Tri3 => &TRI3_EDGES,
            Self::Quad4 => &QUAD4_EDGES,
            Self::Tet4 => &TET4_EDGES,
            Self::Hex8 => &HEX8_EDGES,
        }
    }

    /// 单元面（二维单元为自身，三维单元为外法向朝外的边界面）
    pub fn faces(self) -> &'static [&'static [usize]] {
        match self {
            Self::Tri3 => &TRI3_FACES,
            Self::Quad4 => &QUAD4_FACES,
            Self::Tet4 => &TET4_FACES,
            Self::Hex8 => &HEX8_FACES,
        }
    }

    /// 参考空间中心
    fn reference_center(self) -> ParametricCoords {
        match self {
            Self::Tri3 => [1.0 / 3.0, 1.0 / 3.0, 0.0],
            Self::Quad4 => [0.5, 0.5, 0.0],
            Self::Tet4 => [0.25, 0.25, 0.25],
            Self::Hex8 => [0.5, 0.5, 0.5],
        }
    }

    /// 参数坐标是否落在（带容差的）参考单元内
    ///
    /// 张量积单元要求每个分量在 `[-tol, 1+tol]`，单纯形要求各分量
    /// `>= -tol` 且分量和 `<= 1+tol`。
    pub fn reference_contains(self, xi: &ParametricCoords, tol: f64) -> bool {
        let d = self.parametric_dim();
        let coords = &xi[..d];
        if coords.iter().any(|v| !v.is_finite() || *v < -tol) {
            return false;
        }
        if self.is_simplex() {
            coords.iter().sum::<f64>() <= 1.0 + tol
        } else {
            coords.iter().all(|v| *v <= 1.0 + tol)
        }
    }

    /// 形函数值及其对参数坐标的导数
    fn evaluate(self, xi: &ParametricCoords) -> ([f64; MAX_ELEMENT_VERTICES], [[f64; 3]; MAX_ELEMENT_VERTICES]) {
        let mut n = [0.0; MAX_ELEMENT_VERTICES];
        let mut dn = [[0.0; 3]; MAX_ELEMENT_VERTICES];
        let [x, y, z] = *xi;
        match self {
            Self::Tri3 => {
                n[..3].copy_from_slice(&[1.0 - x - y, x, y]);
                dn[0] = [-1.0, -1.0, 0.0];
                dn[1] = [1.0, 0.0, 0.0];
                dn[2] = [0.0, 1.0, 0.0];
            }
            Self::Quad4 => {
                n[..4].copy_from_slice(&[(1.0 - x) * (1.0 - y), x * (1.0 - y), x * y, (1.0 - x) * y]);
                dn[0] = [-(1.0 - y), -(1.0 - x), 0.0];
                dn[1] = [1.0 - y, -x, 0.0];
                dn[2] = [y, x, 0.0];
                dn[3] = [-y, 1.0 - x, 0.0];
            }
            Self::Tet4 => {
                n[..4].copy_from_slice(&[1.0 - x - y - z, x, y, z]);
                dn[0] = [-1.0, -1.0, -1.0];
                dn[1] = [1.0, 0.0, 0.0];
                dn[2] = [0.0, 1.0, 0.0];
                dn[3] = [0.0, 0.0, 1.0];
            }
            Self::Hex8 => {
                // 角点 (cx, cy, cz) ∈ {0,1}³，按底面逆时针、顶面逆时针排列
                const CORNERS: [[f64; 3]; 8] = [
                    [0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0],
                    [0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 1.0], [0.0, 1.0, 1.0],
                ];
                let lin = |c: f64, t: f64| if c > 0.5 { t } else { 1.0 - t };
                let dlin = |c: f64| if c > 0.5 { 1.0 } else { -1.0 };
                for (i, c) in CORNERS.iter().enumerate() {
                    let (fx, fy, fz) = (lin(c[0], x), lin(c[1], y), lin(c[2], z));
                    n[i] = fx * fy * fz;
                    dn[i] = [dlin(c[0]) * fy * fz, fx * dlin(c[1]) * fz, fx * fy * dlin(c[2])];
                }
            }
        }
        (n, dn)
    }
}

/// 单元几何（形状 + 顶点坐标）
///
/// 固定容量的顶点数组，可按值拷贝，便于跨进程打包。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementGeometry {
    shape: ElementShape,
    coords: [DVec3; MAX_ELEMENT_VERTICES],
}

impl ElementGeometry {
    /// 创建单元几何，顶点数必须与形状一致
    pub fn new(shape: ElementShape, vertices: &[DVec3]) -> GeoResult<Self> {
        if vertices.len() != shape.n_vertices() {
            return Err(GeoError::vertex_count_mismatch(shape, vertices.len()));
        }
        let mut coords = [DVec3::ZERO; MAX_ELEMENT_VERTICES];
        coords[..vertices.len()].copy_from_slice(vertices);
        Ok(Self { shape, coords })
    }

    /// 单元形状
    #[inline]
    pub fn shape(&self) -> ElementShape {
        self.shape
    }

    /// 顶点坐标
    #[inline]
    pub fn vertices(&self) -> &[DVec3] {
        &self.coords[..self.shape.n_vertices()]
    }

    /// 包围盒
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(self.vertices())
    }

    /// 顶点平均中心
    pub fn centroid(&self) -> DVec3 {
        let v = self.vertices();
        v.iter().copied().sum::<DVec3>() / v.len() as f64
    }

    /// 特征尺寸（包围盒最长边）
    pub fn scale(&self) -> f64 {
        self.bounding_box().max_extent()
    }

    /// 参数坐标映射到物理坐标
    pub fn map(&self, xi: &ParametricCoords) -> DVec3 {
        let (n, _) = self.shape.evaluate(xi);
        self.vertices()
            .iter()
            .zip(n.iter())
            .map(|(v, w)| *v * *w)
            .sum()
    }

    /// 雅可比矩阵（列 k 为 ∂x/∂ξ_k）
    fn jacobian(&self, xi: &ParametricCoords) -> DMat3 {
        let (_, dn) = self.shape.evaluate(xi);
        let mut cols = [DVec3::ZERO; 3];
        for (v, d) in self.vertices().iter().zip(dn.iter()) {
            for k in 0..3 {
                cols[k] += *v * d[k];
            }
        }
        DMat3::from_cols(cols[0], cols[1], cols[2])
    }

    /// 参考中心处的雅可比行列式（二维单元取 xy 分量）
    pub fn jacobian_determinant(&self) -> f64 {
        let j = self.jacobian(&self.shape.reference_center());
        match self.shape.parametric_dim() {
            2 => DMat2::from_cols(j.x_axis.truncate(), j.y_axis.truncate()).determinant(),
            _ => j.determinant(),
        }
    }

    /// 是否退化（零面积/零体积、非有限坐标）
    pub fn is_degenerate(&self) -> bool {
        if self.vertices().iter().any(|v| !v.is_finite()) {
            return true;
        }
        let scale = self.scale();
        if scale <= 0.0 {
            return true;
        }
        let det = self.jacobian_determinant();
        let reference = scale.powi(self.shape.parametric_dim() as i32);
        !det.is_finite() || det.abs() <= DEGENERATE_REL_TOL * reference
    }

    /// 反演物理点的参数坐标（Newton 迭代，线性单元一步收敛）
    ///
    /// 返回的坐标不保证落在参考单元内，由调用方做包含判断。
    pub fn invert(&self, point: DVec3) -> GeoResult<ParametricCoords> {
        let scale = self.scale();
        if self.is_degenerate() {
            return Err(GeoError::Degenerate {
                shape: self.shape,
                det: self.jacobian_determinant(),
            });
        }
        let tol = NEWTON_REL_TOL * scale;
        let planar = self.shape.parametric_dim() == 2;
        let mut xi = self.shape.reference_center();
        let mut residual = f64::INFINITY;

        for _ in 0..MAX_NEWTON_ITERATIONS {
            let r = self.map(&xi) - point;
            let j = self.jacobian(&xi);
            let step = if planar {
                let r2 = r.truncate();
                residual = r2.length();
                if residual <= tol {
                    return Ok(xi);
                }
                let j2 = DMat2::from_cols(j.x_axis.truncate(), j.y_axis.truncate());
                let det = j2.determinant();
                if det.abs() <= DEGENERATE_REL_TOL * scale * scale {
                    return Err(GeoError::Degenerate { shape: self.shape, det });
                }
                let d: DVec2 = j2.inverse() * r2;
                DVec3::new(d.x, d.y, 0.0)
            } else {
                residual = r.length();
                if residual <= tol {
                    return Ok(xi);
                }
                let det = j.determinant();
                if det.abs() <= DEGENERATE_REL_TOL * scale * scale * scale {
                    return Err(GeoError::Degenerate { shape: self.shape, det });
                }
                j.inverse() * r
            };
            xi = [xi[0] - step.x, xi[1] - step.y, xi[2] - step.z];
            if !step.is_finite() {
                break;
            }
        }

        // 最后一次更新后可能已经收敛
        let r = self.map(&xi) - point;
        let final_residual = if planar { r.truncate().length() } else { r.length() };
        if final_residual <= tol {
            return Ok(xi);
        }
        Err(GeoError::NotConverged {
            shape: self.shape,
            iterations: MAX_NEWTON_ITERATIONS,
            residual: final_residual.min(residual),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_quad() -> ElementGeometry {
        ElementGeometry::new(
            ElementShape::Quad4,
            &[
                DVec3::new(0.0, 0.0, 0.0),
                DVec3::new(1.0, 0.0, 0.0),
                DVec3::new(1.0, 1.0, 0.0),
                DVec3::new(0.0, 1.0, 0.0),
            ],
        )
        .unwrap()
    }

    fn unit_hex(offset: DVec3, size: f64) -> ElementGeometry {
        let c = [
            [0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 1.0], [0.0, 1.0, 1.0],
        ];
        let v: Vec<DVec3> = c.iter().map(|p| offset + DVec3::from_array(*p) * size).collect();
        ElementGeometry::new(ElementShape::Hex8, &v).unwrap()
    }

    #[test]
    fn test_vertex_count_checked() {
        let err = ElementGeometry::new(ElementShape::Tri3, &[DVec3::ZERO; 4]).unwrap_err();
        assert!(matches!(err, GeoError::VertexCountMismatch { expected: 3, provided: 4, .. }));
    }

    #[test]
    fn test_shape_code_roundtrip() {
        for s in [ElementShape::Tri3, ElementShape::Quad4, ElementShape::Tet4, ElementShape::Hex8] {
            assert_eq!(ElementShape::from_code(s.code()).unwrap(), s);
        }
        assert!(ElementShape::from_code(9).is_err());
    }

    #[test]
    fn test_partition_of_unity() {
        for s in [ElementShape::Tri3, ElementShape::Quad4, ElementShape::Tet4, ElementShape::Hex8] {
            let (n, _) = s.evaluate(&[0.2, 0.3, 0.1]);
            let sum: f64 = n[..s.n_vertices()].iter().sum();
            assert!((sum - 1.0).abs() < 1e-14, "{s:?}");
        }
    }

    #[test]
    fn test_triangle_inversion() {
        let tri = ElementGeometry::new(
            ElementShape::Tri3,
            &[DVec3::new(0.0, 0.0, 0.0), DVec3::new(2.0, 0.0, 0.0), DVec3::new(0.0, 2.0, 0.0)],
        )
        .unwrap();
        let xi = tri.invert(DVec3::new(0.5, 1.0, 0.0)).unwrap();
        assert!((xi[0] - 0.25).abs() < 1e-12);
        assert!((xi[1] - 0.5).abs() < 1e-12);
        assert!(ElementShape::Tri3.reference_contains(&xi, 0.0));
    }

    #[test]
    fn test_bilinear_inversion_distorted_quad() {
        let quad = ElementGeometry::new(
            ElementShape::Quad4,
            &[
                DVec3::new(0.0, 0.0, 0.0),
                DVec3::new(2.0, 0.0, 0.0),
                DVec3::new(2.5, 1.5, 0.0),
                DVec3::new(0.0, 1.0, 0.0),
            ],
        )
        .unwrap();
        let target = [0.3, 0.7, 0.0];
        let p = quad.map(&target);
        let xi = quad.invert(p).unwrap();
        assert!((xi[0] - target[0]).abs() < 1e-10);
        assert!((xi[1] - target[1]).abs() < 1e-10);
    }

    #[test]
    fn test_hex_inversion() {
        let hex = unit_hex(DVec3::new(1.0, 2.0, 3.0), 2.0);
        let xi = hex.invert(DVec3::new(2.0, 2.5, 4.5)).unwrap();
        assert!((xi[0] - 0.5).abs() < 1e-12);
        assert!((xi[1] - 0.25).abs() < 1e-12);
        assert!((xi[2] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_reference_contains_tolerance() {
        assert!(ElementShape::Quad4.reference_contains(&[1.0 + 1e-9, 0.5, 0.0], 1e-8));
        assert!(!ElementShape::Quad4.reference_contains(&[1.0 + 1e-7, 0.5, 0.0], 1e-8));
        assert!(ElementShape::Tri3.reference_contains(&[0.5, 0.5, 0.0], 0.0));
        assert!(!ElementShape::Tri3.reference_contains(&[0.6, 0.5, 0.0], 1e-8));
    }

    #[test]
    fn test_degenerate_detection() {
        assert!(!unit_quad().is_degenerate());
        let collapsed = ElementGeometry::new(
            ElementShape::Tri3,
            &[DVec3::new(0.0, 0.0, 0.0), DVec3::new(1.0, 1.0, 0.0), DVec3::new(2.0, 2.0, 0.0)],
        )
        .unwrap();
        assert!(collapsed.is_degenerate());
        assert!(collapsed.invert(DVec3::ZERO).unwrap_err().is_degenerate());
    }

    #[test]
    fn test_centroid() {
        assert_eq!(unit_quad().centroid(), DVec3::new(0.5, 0.5, 0.0));
    }
}
