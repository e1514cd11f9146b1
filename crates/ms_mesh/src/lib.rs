// crates/ms_mesh/src/lib.rs

//! MeshSearch 网格模块
//!
//! 搜索引擎的网格协作者：只读访问接口、实体句柄和一个具体的非结构化网格实现。
//!
//! # 核心类型
//!
//! - [`SearchMesh`]: 网格只读访问接口（搜索引擎只依赖此 trait）
//! - [`EntityRef`]: 基于索引的实体句柄（进程 + 槽位 + 全局编号）
//! - [`UnstructuredMesh`]: SoA 布局的非结构化网格
//!
//! # 模块结构
//!
//! - [`entity`]: 实体类型与句柄
//! - [`traits`]: 网格抽象接口
//! - [`mesh`]: 非结构化网格与构建器
//! - [`generation`]: 结构化网格生成器
//! - [`partition`]: 串行网格分区
//!
//! # 示例
//!
//! ```rust
//! use glam::DVec3;
//! use ms_geo::ElementShape;
//! use ms_mesh::{EntityKind, SearchMesh, UnstructuredMesh};
//!
//! let mut b = UnstructuredMesh::builder(0);
//! let v0 = b.add_node(0, DVec3::new(0.0, 0.0, 0.0));
//! let v1 = b.add_node(1, DVec3::new(1.0, 0.0, 0.0));
//! let v2 = b.add_node(2, DVec3::new(0.5, 1.0, 0.0));
//! b.add_element(0, ElementShape::Tri3, &[v0, v1, v2]).unwrap();
//! let mesh = b.build().unwrap();
//!
//! assert_eq!(mesh.owned_entities(EntityKind::Element).len(), 1);
//! ```

#![warn(missing_docs)]

pub mod entity;
pub mod error;
pub mod generation;
pub mod mesh;
pub mod partition;
pub mod traits;

pub use entity::{EntityKind, EntityRef, GlobalId, Rank};
pub use error::{MeshError, MeshResult};
pub use generation::{point_cloud, BoxMeshGenerator, RectMeshGenerator};
pub use mesh::{UnstructuredMesh, UnstructuredMeshBuilder};
pub use partition::{partition, PartitionStrategy};
pub use traits::SearchMesh;
