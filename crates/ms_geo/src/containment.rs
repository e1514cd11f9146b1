// crates/ms_geo/src/containment.rs

//! 包含 / 距离 / 重叠判断
//!
//! - [`test_containment`]: 点是否落在单元内（带参数坐标容差）
//! - [`point_distance`]: 点到单元几何的欧氏距离（顶点、棱、面中最近者）
//! - [`elements_overlap`]: 两个凸单元是否重叠（分离轴定理）

use glam::DVec3;

use crate::error::GeoError;
use crate::shape::{ElementGeometry, ParametricCoords};

/// 点包含判断结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Containment {
    /// 点在单元内，附带参数坐标
    Inside(ParametricCoords),
    /// 点在单元外
    Outside,
    /// 单元退化，无法判断
    Degenerate,
}

impl Containment {
    /// 是否在单元内
    #[inline]
    pub fn is_inside(&self) -> bool {
        matches!(self, Self::Inside(_))
    }

    /// 参数坐标（仅 `Inside`）
    #[inline]
    pub fn pcoord(&self) -> Option<ParametricCoords> {
        match self {
            Self::Inside(xi) => Some(*xi),
            _ => None,
        }
    }
}

/// 判断点是否在单元内
///
/// 参数坐标落在 `[-tol, 1+tol]`（单纯形为等价条件）即视为包含。
/// 反演不收敛的点视为在单元外。
pub fn test_containment(point: DVec3, geom: &ElementGeometry, tol: f64) -> Containment {
    if geom.is_degenerate() {
        return Containment::Degenerate;
    }
    match geom.invert(point) {
        Ok(xi) if geom.shape().reference_contains(&xi, tol) => Containment::Inside(xi),
        Ok(_) => Containment::Outside,
        Err(GeoError::Degenerate { .. }) | Err(GeoError::NotConverged { .. }) => {
            tracing::trace!("参数坐标反演失败, 视为单元外: {:?}", point);
            Containment::Outside
        }
        Err(_) => Containment::Outside,
    }
}

/// 点到单元几何的欧氏距离
///
/// 三维单元内部的点距离为 0；其余情况取到各面（扇形三角化）的最近距离。
pub fn point_distance(point: DVec3, geom: &ElementGeometry) -> f64 {
    let shape = geom.shape();
    if shape.parametric_dim() == 3 && test_containment(point, geom, 0.0).is_inside() {
        return 0.0;
    }
    let v = geom.vertices();
    let mut best = f64::INFINITY;
    for face in shape.faces() {
        for k in 1..face.len() - 1 {
            let q = closest_point_on_triangle(point, v[face[0]], v[face[k]], v[face[k + 1]]);
            best = best.min(q.distance(point));
        }
    }
    best
}

/// 三角形上距离给定点最近的点
///
/// 按 Voronoi 区域分类（Ericson, Real-Time Collision Detection）。
pub fn closest_point_on_triangle(p: DVec3, a: DVec3, b: DVec3, c: DVec3) -> DVec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = va + vb + vc;
    if denom.abs() < f64::MIN_POSITIVE {
        // 退化三角形，退回到顶点
        return [a, b, c]
            .into_iter()
            .min_by(|x, y| x.distance_squared(p).total_cmp(&y.distance_squared(p)))
            .unwrap_or(a);
    }
    let v = vb / denom;
    let w = vc / denom;
    a + ab * v + ac * w
}

/// 候选分离轴：二维单元取平面法向及面内棱法向，三维单元取面法向
fn face_axes(geom: &ElementGeometry, out: &mut Vec<DVec3>) {
    let v = geom.vertices();
    let shape = geom.shape();
    for face in shape.faces() {
        // Newell 法向，兼容轻微翘曲的四边形面
        let mut n = DVec3::ZERO;
        for i in 0..face.len() {
            let a = v[face[i]];
            let b = v[face[(i + 1) % face.len()]];
            n += DVec3::new(
                (a.y - b.y) * (a.z + b.z),
                (a.z - b.z) * (a.x + b.x),
                (a.x - b.x) * (a.y + b.y),
            );
        }
        out.push(n);
        if shape.parametric_dim() == 2 {
            for [i, j] in shape.edges() {
                out.push(n.cross(v[*j] - v[*i]));
            }
        }
    }
}

fn project(vertices: &[DVec3], axis: DVec3) -> (f64, f64) {
    vertices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
        let d = p.dot(axis);
        (lo.min(d), hi.max(d))
    })
}

/// 两个凸单元是否重叠（含 `tol` 的接触）
///
/// 分离轴取两单元的面法向、二维单元面内棱法向以及两两棱向量叉积。
/// 单元按凸多面体处理。
pub fn elements_overlap(a: &ElementGeometry, b: &ElementGeometry, tol: f64) -> bool {
    if !a.bounding_box().expand(tol).intersects(&b.bounding_box()) {
        return false;
    }

    let scale = a.scale().max(b.scale()).max(f64::MIN_POSITIVE);
    let mut axes = Vec::with_capacity(64);
    face_axes(a, &mut axes);
    face_axes(b, &mut axes);
    let (va, vb) = (a.vertices(), b.vertices());
    for [i, j] in a.shape().edges() {
        let ea = va[*j] - va[*i];
        for [k, l] in b.shape().edges() {
            axes.push(ea.cross(vb[*l] - vb[*k]));
        }
    }

    let min_len = 1e-12 * scale * scale;
    for axis in axes {
        let len = axis.length();
        if !len.is_finite() || len <= min_len {
            continue;
        }
        let n = axis / len;
        let (a_lo, a_hi) = project(va, n);
        let (b_lo, b_hi) = project(vb, n);
        if a_hi + tol < b_lo || b_hi + tol < a_lo {
            return false;
        }
    }
    true
}
