//! 运行时错误.
//!
//! 只有两类 "软失败" 不会以错误形式出现在公开接口中:
//! GPU 故障 (转为 CPU 回退) 与百分位查表越界 (返回 `None`).

use thiserror::Error;

/// 体数据维度/缓冲区不一致. 该错误是致命的, 发生时不会尝试任何计算后端.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidVolumeError {
    /// 缓冲区长度与 `width * height * depth` 不符.
    #[error("体数据长度不符: 期望 {expected} 个体素, 实际为 {actual}")]
    LengthMismatch {
        /// 由维度推算的体素个数.
        expected: usize,
        /// 实际缓冲区长度.
        actual: usize,
    },

    /// 某个维度为 0, 或维度乘积溢出.
    #[error("体数据维度非法: width = {width}, height = {height}, depth = {depth}")]
    BadDimension {
        /// 宽.
        width: usize,
        /// 高.
        height: usize,
        /// 切片数.
        depth: usize,
    },

    /// 体素间距必须为有限正数.
    #[error("体素间距非法: {axis} = {value}")]
    BadSpacing {
        /// 轴名 (`dx`, `dy`, `dz`).
        axis: &'static str,
        /// 实际值.
        value: f64,
    },
}

/// 时间帧序列不合法.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidSeriesError {
    /// 序列中没有任何帧.
    #[error("时间帧序列为空")]
    Empty,

    /// 帧的体素个数与声明的帧形状不符.
    #[error("第 {index} 帧长度不符: 期望 {expected}, 实际为 {actual}")]
    FrameLengthMismatch {
        /// 帧索引.
        index: usize,
        /// 期望长度.
        expected: usize,
        /// 实际长度.
        actual: usize,
    },

    /// 帧形状中存在为 0 的维度.
    #[error("帧形状非法: {0:?}")]
    BadShape(crate::Idx3d),

    /// 时间分辨率必须为有限正数 (秒).
    #[error("时间分辨率非法: {0}")]
    BadTemporalResolution(f64),

    /// ROI 掩膜与帧形状不符.
    #[error("ROI 掩膜形状 {actual:?} 与帧形状 {expected:?} 不符")]
    RoiShapeMismatch {
        /// 帧形状.
        expected: crate::Idx3d,
        /// 掩膜形状.
        actual: crate::Idx3d,
    },
}

/// GPU 后端错误. 它们从不直接返回给调用者, 而是被记录并触发 CPU 回退.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GpuError {
    /// 无法创建 GPU 计算上下文 (无适配器、无设备、着色器编译失败等).
    #[error("GPU 初始化失败: {0}")]
    Initialization(String),

    /// 流水线执行过程中的失败 (校验错误、映射回读失败等).
    #[error("GPU 运算失败: {0}")]
    Operation(String),

    /// 设备丢失. 此后的调用不再尝试 GPU.
    #[error("GPU 设备丢失: {0}")]
    DeviceLost(String),
}

/// 一次分析调用的错误.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// 输入体数据不合法.
    #[error(transparent)]
    InvalidVolume(#[from] InvalidVolumeError),

    /// 输入时间帧序列不合法.
    #[error(transparent)]
    InvalidSeries(#[from] InvalidSeriesError),

    /// 调用被取消令牌中止.
    #[error("分析已被取消")]
    Cancelled,
}

/// 体数据构造结果.
pub type VolumeResult<T> = Result<T, InvalidVolumeError>;

/// 时间帧序列构造结果.
pub type SeriesResult<T> = Result<T, InvalidSeriesError>;

/// 分析调用结果.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// GPU 内部操作结果.
pub type GpuResult<T> = Result<T, GpuError>;
