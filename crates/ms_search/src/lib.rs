// crates/ms_search/src/lib.rs

//! MeshSearch 搜索引擎
//!
//! 在源网格与目标网格之间建立几何对应关系：
//!
//! - 包含搜索：目标节点位于哪个源单元内（附参数坐标），目标单元与哪些源单元重叠
//! - 最近邻搜索：src->dst 或 dst->src 方向的最近实体
//!
//! 每次调用构建一次提供端八叉树索引，调用结束即丢弃。
//! 分布式变体通过 [`ms_comm::Communicator`] 交换区域、查询和响应，
//! 结果与在合并网格上做串行搜索一致。
//!
//! # 模块结构
//!
//! - [`api`]: 调用方入口
//! - [`config`]: 搜索配置
//! - [`index`]: 单次搜索的提供端索引
//! - [`local`]: 本地搜索驱动
//! - [`distributed`]: 分布式协调
//! - [`wire`]: 跨进程交换的定长记录
//! - [`result`]: 结果模型
//! - [`types`]: 搜索选择器
//! - [`error`]: 错误类型

#![warn(missing_docs)]

pub mod api;
pub mod config;
pub mod distributed;
pub mod error;
pub mod index;
pub mod local;
pub mod result;
pub mod types;
pub mod wire;

pub use api::{
    destroy_search_result, par_search_containment, par_search_nearest_dst_to_src, par_search_nearest_src_to_dst,
    print_search_result, search_containment, search_containment_investigate, search_containment_with_index,
    search_elements_mutual, search_nearest_dst_to_src, search_nearest_src_to_dst,
};
pub use config::{NearestConfig, SearchConfig, SearchConfigBuilder};
pub use error::{Result, SearchError};
pub use index::SearchIndex;
pub use result::{ElementMatch, MatchLocus, MatchRecord, NodeMatch, SearchResult, SearchStats};
pub use types::{SearchMethod, UnmappedAction};
