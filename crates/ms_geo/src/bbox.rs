// crates/ms_geo/src/bbox.rs

//! 轴对齐包围盒
//!
//! 三维 AABB，二维网格的 z 分量恒为 0。空包围盒以 `min = +∞, max = -∞`
//! 表示，与任何包围盒都不相交，合并时作为单位元。

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// 轴对齐包围盒
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// 最小角点
    pub min: DVec3,
    /// 最大角点
    pub max: DVec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BoundingBox {
    /// 空包围盒
    pub const EMPTY: Self = Self {
        min: DVec3::splat(f64::INFINITY),
        max: DVec3::splat(f64::NEG_INFINITY),
    };

    /// 从两个角点创建（自动排序分量）
    #[must_use]
    pub fn new(a: DVec3, b: DVec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// 退化为单点的包围盒
    #[must_use]
    pub fn from_point(p: DVec3) -> Self {
        Self { min: p, max: p }
    }

    /// 以 `center` 为中心、半宽为 `half` 的立方体
    #[must_use]
    pub fn cube(center: DVec3, half: f64) -> Self {
        Self {
            min: center - DVec3::splat(half),
            max: center + DVec3::splat(half),
        }
    }

    /// 点集的包围盒，点集为空时返回 [`BoundingBox::EMPTY`]
    #[must_use]
    pub fn from_points<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a DVec3>,
    {
        points
            .into_iter()
            .fold(Self::EMPTY, |acc, p| acc.include_point(*p))
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// 所有分量有限且非空
    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.is_empty() && self.min.is_finite() && self.max.is_finite()
    }

    /// 扩展以包含给定点
    #[must_use]
    pub fn include_point(&self, p: DVec3) -> Self {
        Self {
            min: self.min.min(p),
            max: self.max.max(p),
        }
    }

    /// 合并两个包围盒
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// 各方向向外扩展 `amount`（空包围盒保持为空）
    #[must_use]
    pub fn expand(&self, amount: f64) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self {
            min: self.min - DVec3::splat(amount),
            max: self.max + DVec3::splat(amount),
        }
    }

    /// 闭区间相交判断
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// 点是否在包围盒内（含边界）
    #[inline]
    pub fn contains_point(&self, p: DVec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// `other` 是否完全位于本包围盒内
    #[inline]
    pub fn contains_box(&self, other: &Self) -> bool {
        other.min.x >= self.min.x
            && other.max.x <= self.max.x
            && other.min.y >= self.min.y
            && other.max.y <= self.max.y
            && other.min.z >= self.min.z
            && other.max.z <= self.max.z
    }

    /// 中心点
    #[inline]
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// 各方向尺寸
    #[inline]
    pub fn size(&self) -> DVec3 {
        if self.is_empty() {
            DVec3::ZERO
        } else {
            self.max - self.min
        }
    }

    /// 最长边长度
    #[inline]
    pub fn max_extent(&self) -> f64 {
        self.size().max_element()
    }

    /// 第 `i` 个八分体（i 的第 0/1/2 位分别选择 x/y/z 的上半部分）
    #[must_use]
    pub fn octant(&self, i: usize) -> Self {
        let c = self.center();
        let pick = |bit: usize, lo: f64, mid: f64, hi: f64| {
            if i & bit == 0 {
                (lo, mid)
            } else {
                (mid, hi)
            }
        };
        let (x0, x1) = pick(1, self.min.x, c.x, self.max.x);
        let (y0, y1) = pick(2, self.min.y, c.y, self.max.y);
        let (z0, z1) = pick(4, self.min.z, c.z, self.max.z);
        Self {
            min: DVec3::new(x0, y0, z0),
            max: DVec3::new(x1, y1, z1),
        }
    }

    /// 点到包围盒的最短距离（点在盒内时为 0）
    pub fn distance_to_point(&self, p: DVec3) -> f64 {
        if self.is_empty() {
            return f64::INFINITY;
        }
        let d = (self.min - p).max(p - self.max).max(DVec3::ZERO);
        d.length()
    }

    /// 点到包围盒最远角点的距离
    ///
    /// 包围盒内任意一点到 `p` 的距离都不超过该值。
    pub fn max_distance_to_point(&self, p: DVec3) -> f64 {
        if self.is_empty() {
            return f64::INFINITY;
        }
        let d = (p - self.min).abs().max((self.max - p).abs());
        d.length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> BoundingBox {
        BoundingBox::new(DVec3::ZERO, DVec3::ONE)
    }

    #[test]
    fn test_empty_box() {
        let e = BoundingBox::EMPTY;
        assert!(e.is_empty());
        assert!(!e.is_valid());
        assert!(!e.intersects(&unit()));
        assert_eq!(e.merge(&unit()), unit());
        assert!(e.expand(1.0).is_empty());
        assert_eq!(e.distance_to_point(DVec3::ZERO), f64::INFINITY);
    }

    #[test]
    fn test_new_sorts_corners() {
        let b = BoundingBox::new(DVec3::new(1.0, 0.0, 2.0), DVec3::new(0.0, 1.0, 0.0));
        assert_eq!(b.min, DVec3::new(0.0, 0.0, 0.0));
        assert_eq!(b.max, DVec3::new(1.0, 1.0, 2.0));
    }

    #[test]
    fn test_intersects_touching_faces() {
        let a = unit();
        let b = BoundingBox::new(DVec3::new(1.0, 0.0, 0.0), DVec3::new(2.0, 1.0, 1.0));
        assert!(a.intersects(&b));
        let c = BoundingBox::new(DVec3::new(1.1, 0.0, 0.0), DVec3::new(2.0, 1.0, 1.0));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_octants_cover_parent() {
        let b = BoundingBox::new(DVec3::ZERO, DVec3::splat(2.0));
        let merged = (0..8).fold(BoundingBox::EMPTY, |acc, i| acc.merge(&b.octant(i)));
        assert_eq!(merged, b);
        assert_eq!(b.octant(0).max, DVec3::ONE);
        assert_eq!(b.octant(7).min, DVec3::ONE);
    }

    #[test]
    fn test_distances() {
        let b = unit();
        assert_eq!(b.distance_to_point(DVec3::splat(0.5)), 0.0);
        assert!((b.distance_to_point(DVec3::new(2.0, 0.5, 0.5)) - 1.0).abs() < 1e-15);
        let far = b.max_distance_to_point(DVec3::ZERO);
        assert!((far - 3.0_f64.sqrt()).abs() < 1e-15);
    }

    #[test]
    fn test_from_points() {
        let pts = [DVec3::new(0.0, 2.0, 0.0), DVec3::new(1.0, -1.0, 0.0)];
        let b = BoundingBox::from_points(pts.iter());
        assert_eq!(b.min, DVec3::new(0.0, -1.0, 0.0));
        assert_eq!(b.max, DVec3::new(1.0, 2.0, 0.0));
        assert!(b.contains_box(&BoundingBox::from_point(DVec3::new(0.5, 0.0, 0.0))));
    }
}
