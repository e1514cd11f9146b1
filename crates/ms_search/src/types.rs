// crates/ms_search/src/types.rs

//! 搜索选择器

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// 未映射实体处理策略
///
/// 由调用方显式给出，适用于整个调用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmappedAction {
    /// 存在未映射实体时整个搜索失败
    Error,
    /// 从结果中省略未映射实体
    Ignore,
}

impl fmt::Display for UnmappedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Ignore => write!(f, "ignore"),
        }
    }
}

impl FromStr for UnmappedAction {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Self::Error),
            "ignore" => Ok(Self::Ignore),
            other => Err(SearchError::invalid_argument("unmapped", other, "可选值: error, ignore")),
        }
    }
}

/// 搜索方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMethod {
    /// 包含搜索（节点定位或单元重叠）
    Containment,
    /// 双向单元重叠
    MutualOverlap,
    /// 每个目标实体找最近的源实体
    NearestSrcToDst,
    /// 每个源实体找最近的目标实体
    NearestDstToSrc,
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Containment => "containment",
            Self::MutualOverlap => "mutual-overlap",
            Self::NearestSrcToDst => "nearest-src-to-dst",
            Self::NearestDstToSrc => "nearest-dst-to-src",
        };
        f.write_str(name)
    }
}
