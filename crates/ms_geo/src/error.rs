// crates/ms_geo/src/error.rs

//! 几何层错误类型

use thiserror::Error;

use crate::shape::ElementShape;

/// 几何模块结果类型
pub type GeoResult<T> = Result<T, GeoError>;

/// 几何错误枚举
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    /// 顶点数与单元形状不符
    #[error("单元顶点数不匹配: {shape:?} 需要 {expected} 个顶点, 提供 {provided}")]
    VertexCountMismatch {
        /// 单元形状
        shape: ElementShape,
        /// 期望顶点数
        expected: usize,
        /// 实际顶点数
        provided: usize,
    },

    /// 退化单元（雅可比行列式接近零）
    #[error("退化单元: {shape:?}, 雅可比行列式 {det:.3e}")]
    Degenerate {
        /// 单元形状
        shape: ElementShape,
        /// 雅可比行列式
        det: f64,
    },

    /// 参数坐标反演未收敛
    #[error("参数坐标反演未收敛: {shape:?}, {iterations} 次迭代后残差 {residual:.3e}")]
    NotConverged {
        /// 单元形状
        shape: ElementShape,
        /// 迭代次数
        iterations: usize,
        /// 最终残差
        residual: f64,
    },

    /// 未知的形状编码
    #[error("未知的单元形状编码: {0}")]
    UnknownShape(u32),
}

impl GeoError {
    /// 构造顶点数不匹配错误
    pub fn vertex_count_mismatch(shape: ElementShape, provided: usize) -> Self {
        Self::VertexCountMismatch {
            shape,
            expected: shape.n_vertices(),
            provided,
        }
    }

    /// 是否为退化几何
    pub fn is_degenerate(&self) -> bool {
        matches!(self, Self::Degenerate { .. })
    }
}
