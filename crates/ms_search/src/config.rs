// crates/ms_search/src/config.rs

//! SearchConfig - 搜索配置
//!
//! 所有字段都有默认值，JSON 配置文件只需给出要覆盖的字段：
//!
//! ```json
//! { "tolerance": 1e-6, "nearest": { "max_radius": 50.0 } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use ms_geo::OctreeParams;

use crate::error::{Result, SearchError};

/// 最近邻扩展搜索参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NearestConfig {
    /// 初始查询盒半宽占索引根区域尺寸的比例
    #[serde(default = "default_initial_fraction")]
    pub initial_fraction: f64,
    /// 最大加倍次数
    #[serde(default = "default_max_expansions")]
    pub max_expansions: usize,
    /// 最大搜索半径，超出视为未映射（`None` 表示不限）
    #[serde(default)]
    pub max_radius: Option<f64>,
}

fn default_initial_fraction() -> f64 { 1.0 / 64.0 }
fn default_max_expansions() -> usize { 64 }
fn default_tolerance() -> f64 { 1e-8 }

impl Default for NearestConfig {
    fn default() -> Self {
        Self {
            initial_fraction: default_initial_fraction(),
            max_expansions: default_max_expansions(),
            max_radius: None,
        }
    }
}

/// 搜索配置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// 几何容差（参数坐标松弛量）
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// 八叉树参数
    #[serde(default)]
    pub octree: OctreeParams,
    /// 最近邻搜索参数
    #[serde(default)]
    pub nearest: NearestConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            octree: OctreeParams::default(),
            nearest: NearestConfig::default(),
        }
    }
}

impl SearchConfig {
    /// 创建构建器
    pub fn builder() -> SearchConfigBuilder {
        SearchConfigBuilder::default()
    }

    /// 从 JSON 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: SearchConfig =
            serde_json::from_str(&content).map_err(|e| SearchError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| SearchError::Parse(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(SearchError::invalid_argument(
                "tolerance",
                self.tolerance,
                "容差必须为非负有限值",
            ));
        }
        if self.octree.max_entries == 0 {
            return Err(SearchError::invalid_argument(
                "octree.max_entries",
                self.octree.max_entries,
                "叶子容量必须为正",
            ));
        }
        if !(self.octree.min_extent.is_finite() && self.octree.min_extent > 0.0) {
            return Err(SearchError::invalid_argument(
                "octree.min_extent",
                self.octree.min_extent,
                "最小区域尺寸必须为正",
            ));
        }
        let f = self.nearest.initial_fraction;
        if !(f.is_finite() && f > 0.0 && f <= 1.0) {
            return Err(SearchError::invalid_argument(
                "nearest.initial_fraction",
                f,
                "初始比例必须在 (0, 1] 范围内",
            ));
        }
        if let Some(r) = self.nearest.max_radius {
            if r.is_nan() || r <= 0.0 {
                return Err(SearchError::invalid_argument(
                    "nearest.max_radius",
                    r,
                    "最大搜索半径必须为正",
                ));
            }
        }
        Ok(())
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    /// 几何容差
    pub fn tolerance(mut self, tol: f64) -> Self {
        self.config.tolerance = tol;
        self
    }

    /// 八叉树参数
    pub fn octree(mut self, params: OctreeParams) -> Self {
        self.config.octree = params;
        self
    }

    /// 叶子节点最大条目数
    pub fn max_entries(mut self, n: usize) -> Self {
        self.config.octree.max_entries = n;
        self
    }

    /// 最大搜索半径
    pub fn max_radius(mut self, radius: f64) -> Self {
        self.config.nearest.max_radius = Some(radius);
        self
    }

    /// 最大加倍次数
    pub fn max_expansions(mut self, n: usize) -> Self {
        self.config.nearest.max_expansions = n;
        self
    }

    /// 初始查询盒比例
    pub fn initial_fraction(mut self, f: f64) -> Self {
        self.config.nearest.initial_fraction = f;
        self
    }

    /// 构建并校验
    pub fn build(self) -> Result<SearchConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SearchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tolerance, 1e-8);
        assert_eq!(config.octree.max_entries, 12);
        assert_eq!(config.nearest.max_radius, None);
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let err = SearchConfig::builder().tolerance(-1.0).build().unwrap_err();
        assert!(matches!(err, SearchError::InvalidArgument { ref key, .. } if key == "tolerance"));
        assert!(SearchConfig::builder().tolerance(f64::NAN).build().is_err());
        assert!(SearchConfig::builder().max_radius(0.0).build().is_err());
        assert!(SearchConfig::builder().max_entries(0).build().is_err());
    }

    #[test]
    fn test_partial_json() {
        let config: SearchConfig =
            serde_json::from_str(r#"{"tolerance": 1e-6, "nearest": {"max_radius": 5.0}}"#).unwrap();
        assert_eq!(config.tolerance, 1e-6);
        assert_eq!(config.nearest.max_radius, Some(5.0));
        assert_eq!(config.nearest.max_expansions, 64);
        assert_eq!(config.octree.max_depth, 24);
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = SearchConfig::builder().tolerance(1e-4).max_expansions(8).build().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: SearchConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("ms_search_config_{}.json", std::process::id()));
        let config = SearchConfig::builder().max_radius(3.0).build().unwrap();
        config.save_to_file(&path).unwrap();
        let loaded = SearchConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }
}
