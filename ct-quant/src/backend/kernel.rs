//! GPU 逐切片计算核的抽象.
//!
//! 每次调用处理一层切片, 依次执行两遍计算:
//!
//! 1. 阈值 + 打包: 候选像素保留原 HU, 其余写入 [`PACKED_EMPTY`];
//! 2. 密度分级: 对打包结果逐像素求 Agatston 密度因子, 非候选像素为 0.
//!
//! 该切片的全部 GPU 资源在调用内创建并释放.

use std::fmt::Debug;

use crate::calcium::density_factor;
use crate::error::{GpuError, GpuResult};
use crate::Idx2d;

/// 打包结果中表示 "非候选像素" 的哨兵值.
pub const PACKED_EMPTY: f32 = -3.0e38;

/// 一层切片的回读结果, 均为行优先存储, 长度为 `H * W`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceReadback {
    /// 第一遍: 候选像素的 HU, 或 [`PACKED_EMPTY`].
    pub packed: Vec<f32>,
    /// 第二遍: 逐像素密度因子 `0 ~ 4`.
    pub factors: Vec<u32>,
}

/// 已初始化的 GPU 计算上下文.
pub trait SliceKernel: Debug + Send {
    /// 设备/适配器名称, 仅用于日志.
    fn name(&self) -> String;

    /// 对一层切片执行两遍计算并回读. `slice` 为行优先 HU, `shape` 为 (H, W).
    fn run_slice(
        &mut self,
        slice: &[f32],
        shape: Idx2d,
        threshold_hu: f32,
    ) -> GpuResult<SliceReadback>;
}

/// 创建 GPU 计算上下文的能力探测.
pub trait GpuProvider: Debug + Send + Sync {
    /// 尝试创建上下文. 失败时返回 [`GpuError::Initialization`].
    fn create(&self) -> GpuResult<Box<dyn SliceKernel>>;
}

/// 总是报告初始化失败的提供者. 未启用 `gpu` feature 时的默认值.
#[derive(Debug, Copy, Clone, Default)]
pub struct UnavailableProvider;

impl GpuProvider for UnavailableProvider {
    fn create(&self) -> GpuResult<Box<dyn SliceKernel>> {
        Err(GpuError::Initialization(
            "当前构建未启用 GPU 后端".to_string(),
        ))
    }
}

/// 在主机内存中逐位复现两遍计算语义的参考计算核.
///
/// 用于在没有 GPU 的环境中验证逐切片流水线与 CPU 路径的一致性.
#[derive(Debug, Copy, Clone, Default)]
pub struct ReferenceKernel;

impl ReferenceKernel {
    /// 第一遍: 阈值 + 打包.
    #[inline]
    pub fn threshold_pack(hu: f32, threshold_hu: f32) -> f32 {
        if hu > threshold_hu {
            hu
        } else {
            PACKED_EMPTY
        }
    }

    /// 第二遍: 密度分级.
    #[inline]
    pub fn classify_density(packed: f32) -> u32 {
        if packed == PACKED_EMPTY {
            0
        } else {
            density_factor(packed) as u32
        }
    }
}

impl SliceKernel for ReferenceKernel {
    fn name(&self) -> String {
        "reference".to_string()
    }

    fn run_slice(
        &mut self,
        slice: &[f32],
        (h, w): Idx2d,
        threshold_hu: f32,
    ) -> GpuResult<SliceReadback> {
        if slice.len() != h * w {
            return Err(GpuError::Operation(format!(
                "切片长度 {} 与形状 {h} x {w} 不符",
                slice.len()
            )));
        }
        let packed: Vec<f32> = slice
            .iter()
            .map(|&hu| Self::threshold_pack(hu, threshold_hu))
            .collect();
        let factors = packed.iter().map(|&p| Self::classify_density(p)).collect();
        Ok(SliceReadback { packed, factors })
    }
}

/// 创建 [`ReferenceKernel`] 的提供者.
#[derive(Debug, Copy, Clone, Default)]
pub struct ReferenceProvider;

impl GpuProvider for ReferenceProvider {
    fn create(&self) -> GpuResult<Box<dyn SliceKernel>> {
        Ok(Box::new(ReferenceKernel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_two_pass() {
        let mut k = ReferenceKernel;
        let rb = k
            .run_slice(&[100.0, 131.0, 250.0, 450.0, -3.0, 130.0], (2, 3), 130.0)
            .unwrap();
        assert_eq!(
            rb.packed,
            vec![PACKED_EMPTY, 131.0, 250.0, 450.0, PACKED_EMPTY, PACKED_EMPTY]
        );
        assert_eq!(rb.factors, vec![0, 1, 2, 4, 0, 0]);
    }

    #[test]
    fn test_reference_low_threshold_factor_zero() {
        // 阈值低于 130 时, 候选像素的因子可以为 0.
        let rb = ReferenceKernel.run_slice(&[120.0], (1, 1), 100.0).unwrap();
        assert_eq!(rb.packed, vec![120.0]);
        assert_eq!(rb.factors, vec![0]);
    }

    #[test]
    fn test_reference_shape_mismatch() {
        assert!(matches!(
            ReferenceKernel.run_slice(&[0.0; 3], (2, 2), 130.0),
            Err(GpuError::Operation(_))
        ));
        assert!(matches!(
            UnavailableProvider.create(),
            Err(GpuError::Initialization(_))
        ));
    }
}
