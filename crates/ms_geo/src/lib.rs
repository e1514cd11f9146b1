// crates/ms_geo/src/lib.rs

//! MeshSearch 几何层
//!
//! 与网格组织方式无关的纯几何工具。
//!
//! # 模块结构
//!
//! - [`bbox`]: 轴对齐包围盒
//! - [`shape`]: 单元形状、参数映射与反演
//! - [`containment`]: 点包含、点距离、单元重叠判断
//! - [`octree`]: 包围盒八叉树空间索引
//! - [`error`]: 几何错误类型
//!
//! # 示例
//!
//! ```rust
//! use glam::DVec3;
//! use ms_geo::{test_containment, ElementGeometry, ElementShape};
//!
//! let tri = ElementGeometry::new(
//!     ElementShape::Tri3,
//!     &[DVec3::ZERO, DVec3::X, DVec3::Y],
//! ).unwrap();
//!
//! let c = test_containment(DVec3::new(0.25, 0.25, 0.0), &tri, 1e-8);
//! assert!(c.is_inside());
//! ```

#![warn(missing_docs)]

pub mod bbox;
pub mod containment;
pub mod error;
pub mod octree;
pub mod shape;

pub use bbox::BoundingBox;
pub use containment::{
    closest_point_on_triangle, elements_overlap, point_distance, test_containment, Containment,
};
pub use error::{GeoError, GeoResult};
pub use octree::{Octree, OctreeParams};
pub use shape::{ElementGeometry, ElementShape, ParametricCoords, MAX_ELEMENT_VERTICES};

/// 常用类型预导入
pub mod prelude {
    pub use crate::bbox::BoundingBox;
    pub use crate::containment::{point_distance, test_containment, Containment};
    pub use crate::octree::{Octree, OctreeParams};
    pub use crate::shape::{ElementGeometry, ElementShape};
    pub use glam::DVec3;
}
