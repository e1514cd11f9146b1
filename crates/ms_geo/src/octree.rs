// crates/ms_geo/src/octree.rs

//! 包围盒八叉树
//!
//! 按八分体递归划分三维空间，存储带包围盒的条目，回答盒/点重叠查询。
//!
//! # 结构
//!
//! - 叶子节点保存条目列表，条目数超过阈值时分裂为 8 个子节点
//! - 完全落在某个子八分体内的条目下沉到子节点，跨越子节点边界的条目
//!   留在当前节点（"straddling" 列表），因此每个条目的包围盒都被其所属
//!   节点的区域完全包含
//! - 区域尺寸小于 `min_extent` 或深度达到 `max_depth` 时停止分裂，
//!   重复几何或退化几何不会导致无限递归
//!
//! 查询只进入与查询盒相交的子区域，结果允许假阳性（由调用方精确过滤），
//! 不允许假阴性。
//!
//! # 示例
//!
//! ```
//! use glam::DVec3;
//! use ms_geo::{BoundingBox, Octree, OctreeParams};
//!
//! let items = (0..100).map(|i| {
//!     let p = DVec3::new(i as f64, 0.0, 0.0);
//!     (BoundingBox::new(p, p + DVec3::ONE), i)
//! });
//! let tree = Octree::build(items, 1e-8, OctreeParams::default());
//!
//! let hits = tree.query(&BoundingBox::from_point(DVec3::new(10.5, 0.5, 0.5)));
//! assert_eq!(hits, vec![&10]);
//! ```

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use glam::DVec3;

/// 八叉树参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OctreeParams {
    /// 叶子节点最大条目数，超过则分裂
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// 最大深度
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// 最小区域尺寸，子区域小于该值时不再分裂
    #[serde(default = "default_min_extent")]
    pub min_extent: f64,
}

fn default_max_entries() -> usize { 12 }
fn default_max_depth() -> usize { 24 }
fn default_min_extent() -> f64 { 1e-12 }

impl Default for OctreeParams {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_depth: default_max_depth(),
            min_extent: default_min_extent(),
        }
    }
}

#[derive(Debug)]
struct OctreeEntry<T> {
    bbox: BoundingBox,
    data: T,
}

#[derive(Debug)]
enum OctreeNode<T> {
    Leaf {
        entries: Vec<OctreeEntry<T>>,
    },
    Internal {
        straddling: Vec<OctreeEntry<T>>,
        children: Box<[OctreeNode<T>; 8]>,
    },
}

impl<T> OctreeNode<T> {
    fn empty_leaf() -> Self {
        Self::Leaf { entries: Vec::new() }
    }
}

/// 包围盒八叉树
#[derive(Debug)]
pub struct Octree<T> {
    root: OctreeNode<T>,
    bounds: BoundingBox,
    params: OctreeParams,
    len: usize,
}

impl<T> Octree<T> {
    /// 以给定根区域创建空树
    pub fn new(bounds: BoundingBox, params: OctreeParams) -> Self {
        Self {
            root: OctreeNode::empty_leaf(),
            bounds,
            params,
            len: 0,
        }
    }

    /// 从条目集合构建
    ///
    /// 根区域为全部条目包围盒的并集，再向外扩展 `padding`（通常取几何容差，
    /// 以容纳边界附近的匹配）。条目为空时根区域为空，任何查询返回空结果。
    pub fn build<I>(items: I, padding: f64, params: OctreeParams) -> Self
    where
        I: IntoIterator<Item = (BoundingBox, T)>,
    {
        let items: Vec<(BoundingBox, T)> = items.into_iter().collect();
        let bounds = items
            .iter()
            .fold(BoundingBox::EMPTY, |acc, (b, _)| acc.merge(b))
            .expand(padding.max(0.0));

        let mut tree = Self::new(bounds, params);
        for (bbox, data) in items {
            tree.insert(bbox, data);
        }
        tracing::trace!(
            entries = tree.len,
            depth = tree.depth(),
            nodes = tree.node_count(),
            "八叉树构建完成"
        );
        tree
    }

    /// 插入条目
    ///
    /// 包围盒为空、含非有限坐标或不在根区域内时返回 `false`，并记录警告。
    pub fn insert(&mut self, bbox: BoundingBox, data: T) -> bool {
        if bbox.is_empty() || !self.bounds.contains_box(&bbox) {
            tracing::warn!(
                min = ?bbox.min.to_array(),
                max = ?bbox.max.to_array(),
                root_min = ?self.bounds.min.to_array(),
                root_max = ?self.bounds.max.to_array(),
                "条目包围盒不在八叉树根区域内, 未插入"
            );
            return false;
        }
        Self::insert_recursive(
            &mut self.root,
            self.bounds,
            OctreeEntry { bbox, data },
            0,
            &self.params,
        );
        self.len += 1;
        true
    }

    fn insert_recursive(
        node: &mut OctreeNode<T>,
        region: BoundingBox,
        entry: OctreeEntry<T>,
        depth: usize,
        params: &OctreeParams,
    ) {
        match node {
            OctreeNode::Internal { straddling, children } => match child_slot(&region, &entry.bbox) {
                Some(i) => {
                    Self::insert_recursive(&mut children[i], region.octant(i), entry, depth + 1, params)
                }
                None => straddling.push(entry),
            },
            OctreeNode::Leaf { entries } => {
                entries.push(entry);
                let splittable = entries.len() > params.max_entries
                    && depth < params.max_depth
                    && region.max_extent() * 0.5 >= params.min_extent;
                if splittable {
                    let old = std::mem::take(entries);
                    Self::split(node, region, old, depth, params);
                }
            }
        }
    }

    fn split(
        node: &mut OctreeNode<T>,
        region: BoundingBox,
        old: Vec<OctreeEntry<T>>,
        depth: usize,
        params: &OctreeParams,
    ) {
        tracing::trace!(depth, entries = old.len(), "八叉树节点分裂");
        *node = OctreeNode::Internal {
            straddling: Vec::new(),
            children: Box::new(std::array::from_fn(|_| OctreeNode::empty_leaf())),
        };
        for e in old {
            Self::insert_recursive(node, region, e, depth, params);
        }
    }

    /// 查询与区域重叠的全部条目
    pub fn query(&self, region: &BoundingBox) -> Vec<&T> {
        let mut out = Vec::new();
        self.for_each_overlapping(region, |_, data| out.push(data));
        out
    }

    /// 查询包围盒包含给定点的全部条目
    pub fn query_point(&self, p: DVec3) -> Vec<&T> {
        self.query(&BoundingBox::from_point(p))
    }

    /// 对与区域重叠的每个条目调用 `f(条目包围盒, 数据)`
    pub fn for_each_overlapping<'a, F>(&'a self, region: &BoundingBox, mut f: F)
    where
        F: FnMut(&'a BoundingBox, &'a T),
    {
        if self.len == 0 || region.is_empty() {
            return;
        }
        Self::visit(&self.root, &self.bounds, region, &mut f);
    }

    fn visit<'a, F>(node: &'a OctreeNode<T>, bounds: &BoundingBox, region: &BoundingBox, f: &mut F)
    where
        F: FnMut(&'a BoundingBox, &'a T),
    {
        if !bounds.intersects(region) {
            return;
        }
        let scan = |entries: &'a [OctreeEntry<T>], f: &mut F| {
            for e in entries {
                if e.bbox.intersects(region) {
                    f(&e.bbox, &e.data);
                }
            }
        };
        match node {
            OctreeNode::Leaf { entries } => scan(entries, f),
            OctreeNode::Internal { straddling, children } => {
                scan(straddling, f);
                for (i, child) in children.iter().enumerate() {
                    Self::visit(child, &bounds.octant(i), region, f);
                }
            }
        }
    }

    /// 根区域
    #[inline]
    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    /// 构建参数
    #[inline]
    pub fn params(&self) -> &OctreeParams {
        &self.params
    }

    /// 条目数
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 树深度（仅根节点时为 0）
    pub fn depth(&self) -> usize {
        fn walk<T>(node: &OctreeNode<T>) -> usize {
            match node {
                OctreeNode::Leaf { .. } => 0,
                OctreeNode::Internal { children, .. } => {
                    1 + children.iter().map(walk).max().unwrap_or(0)
                }
            }
        }
        walk(&self.root)
    }

    /// 节点总数
    pub fn node_count(&self) -> usize {
        fn walk<T>(node: &OctreeNode<T>) -> usize {
            match node {
                OctreeNode::Leaf { .. } => 1,
                OctreeNode::Internal { children, .. } => 1 + children.iter().map(walk).sum::<usize>(),
            }
        }
        walk(&self.root)
    }
}

/// 完全容纳 `bbox` 的子八分体编号
fn child_slot(region: &BoundingBox, bbox: &BoundingBox) -> Option<usize> {
    (0..8).find(|&i| region.octant(i).contains_box(bbox))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_items(n: usize) -> Vec<(BoundingBox, usize)> {
        let mut items = Vec::new();
        for k in 0..n {
            for j in 0..n {
                for i in 0..n {
                    let p = DVec3::new(i as f64, j as f64, k as f64);
                    items.push((BoundingBox::new(p, p + DVec3::ONE), items.len()));
                }
            }
        }
        items
    }

    #[test]
    fn test_empty_tree_returns_nothing() {
        let tree: Octree<usize> = Octree::build(Vec::new(), 1e-8, OctreeParams::default());
        assert!(tree.is_empty());
        assert!(tree.bounds().is_empty());
        assert!(tree.query(&BoundingBox::new(DVec3::splat(-1e9), DVec3::splat(1e9))).is_empty());
        assert!(tree.query_point(DVec3::ZERO).is_empty());
    }

    #[test]
    fn test_query_matches_brute_force() {
        let items = grid_items(6);
        let tree = Octree::build(items.clone(), 1e-8, OctreeParams::default());
        assert_eq!(tree.len(), 216);
        assert!(tree.depth() > 0);

        let region = BoundingBox::new(DVec3::new(1.5, 2.5, 0.2), DVec3::new(3.2, 2.7, 4.0));
        let mut got: Vec<usize> = tree.query(&region).into_iter().copied().collect();
        got.sort_unstable();
        let mut expected: Vec<usize> = items
            .iter()
            .filter(|(b, _)| b.intersects(&region))
            .map(|(_, i)| *i)
            .collect();
        expected.sort_unstable();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_query_is_idempotent() {
        let tree = Octree::build(grid_items(4), 1e-8, OctreeParams::default());
        let region = BoundingBox::cube(DVec3::splat(2.0), 0.75);
        let first: Vec<usize> = tree.query(&region).into_iter().copied().collect();
        let second: Vec<usize> = tree.query(&region).into_iter().copied().collect();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_point_on_shared_face_hits_both() {
        let items = vec![
            (BoundingBox::new(DVec3::ZERO, DVec3::ONE), 0),
            (BoundingBox::new(DVec3::X, DVec3::new(2.0, 1.0, 1.0)), 1),
        ];
        let tree = Octree::build(items, 0.0, OctreeParams::default());
        let mut hits: Vec<i32> = tree.query_point(DVec3::new(1.0, 0.5, 0.5)).into_iter().copied().collect();
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 1]);
    }

    #[test]
    fn test_duplicate_geometry_bounded_depth() {
        let params = OctreeParams { max_entries: 2, max_depth: 6, min_extent: 1e-12 };
        let p = DVec3::splat(0.5);
        let mut items: Vec<(BoundingBox, usize)> = (0..50).map(|i| (BoundingBox::from_point(p), i)).collect();
        items.push((BoundingBox::new(DVec3::ZERO, DVec3::ONE), 50));
        let tree = Octree::build(items, 0.0, params);
        assert!(tree.depth() <= 6);
        assert_eq!(tree.query_point(p).len(), 51);
    }

    #[test]
    fn test_insert_outside_rejected() {
        let mut tree = Octree::new(BoundingBox::new(DVec3::ZERO, DVec3::ONE), OctreeParams::default());
        assert!(tree.insert(BoundingBox::cube(DVec3::splat(0.5), 0.1), 'a'));
        assert!(!tree.insert(BoundingBox::cube(DVec3::splat(2.0), 0.1), 'b'));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_insert_non_finite_rejected() {
        let mut tree = Octree::new(BoundingBox::new(DVec3::ZERO, DVec3::ONE), OctreeParams::default());
        let nan = BoundingBox {
            min: DVec3::new(f64::NAN, 0.2, 0.2),
            max: DVec3::splat(0.4),
        };
        assert!(!tree.insert(nan, 'x'));
        assert!(!tree.insert(BoundingBox::EMPTY, 'y'));
        assert!(tree.is_empty());
        assert!(tree.query(&BoundingBox::new(DVec3::ZERO, DVec3::ONE)).is_empty());
    }

    #[test]
    fn test_params_serde_defaults() {
        let params: OctreeParams = serde_json::from_str(r#"{"max_entries": 4}"#).unwrap();
        assert_eq!(params.max_entries, 4);
        assert_eq!(params.max_depth, 24);
    }
}
