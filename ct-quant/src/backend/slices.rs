//! GPU 路径的主机端驱动: 逐切片提交、回读、累加.

use log::debug;
use ndarray::{Array3, CowArray};

use super::kernel::{SliceKernel, PACKED_EMPTY};
use super::CancelToken;
use crate::calcium::{candidate_density_sum, CandidateMask, MassCalibration, ScanEvidence};
use crate::error::GpuError;
use crate::VolumeBuffer;

/// 逐切片流水线中止的原因.
#[derive(Debug)]
pub(crate) enum SliceRunError {
    /// 调用被取消, 不回退.
    Cancelled,
    /// GPU 故障, 本次调用整体回退到 CPU.
    Gpu(GpuError),
}

impl From<GpuError> for SliceRunError {
    fn from(e: GpuError) -> Self {
        Self::Gpu(e)
    }
}

/// 严格串行地逐切片运行 `kernel`, 并把回读结果组装为体素证据.
///
/// 任一切片失败时立即返回, 已累加的部分结果全部丢弃.
pub(crate) fn collect_evidence(
    kernel: &mut dyn SliceKernel,
    volume: &VolumeBuffer,
    threshold_hu: f32,
    calibration: &dyn MassCalibration,
    cancel: &CancelToken,
) -> Result<ScanEvidence<'static>, SliceRunError> {
    let shape = volume.shape();
    let (_, h, w) = shape;
    let n = h * w;
    let mut mask = Array3::from_elem(shape, false);
    let mut packed = Array3::from_elem(shape, PACKED_EMPTY);
    let mut factors = Array3::<u8>::zeros(shape);
    let mut candidate_count = 0usize;
    let mut density_sum = 0.0;

    for (z, slice) in volume.slice_iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(SliceRunError::Cancelled);
        }
        let input = slice.as_row_major_slice();
        let rb = kernel.run_slice(&input, (h, w), threshold_hu)?;
        if rb.packed.len() != n || rb.factors.len() != n {
            return Err(GpuError::Operation(format!(
                "切片 {z} 回读长度不符: packed = {}, factors = {}, 期望 {n}",
                rb.packed.len(),
                rb.factors.len()
            ))
            .into());
        }

        let mut slice_count = 0;
        for (i, (&v, &f)) in rb.packed.iter().zip(rb.factors.iter()).enumerate() {
            let pos = (z, i / w, i % w);
            factors[pos] = u8::try_from(f)
                .ok()
                .filter(|&f| f <= 4)
                .ok_or_else(|| GpuError::Operation(format!("切片 {z} 出现非法密度因子 {f}")))?;
            if v != PACKED_EMPTY {
                mask[pos] = true;
                packed[pos] = v;
                slice_count += 1;
            }
        }
        candidate_count += slice_count;
        density_sum += candidate_density_sum(
            rb.packed.iter().copied().filter(|&v| v != PACKED_EMPTY),
            calibration,
        );
        debug!("GPU 切片 {z}: 候选像素 {slice_count} 个");
    }

    Ok(ScanEvidence {
        mask: CandidateMask::from_array(mask),
        hu: CowArray::from(packed),
        factors: Some(factors),
        candidate_count,
        density_sum,
    })
}
