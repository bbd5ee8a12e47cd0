//! CPU 路径.

use ndarray::CowArray;

use super::CancelToken;
use crate::calcium::{
    candidate_density_sum, classify, is_candidate, MassCalibration, ScanEvidence,
};
use crate::error::{AnalysisError, AnalysisResult};
use crate::{ScanSlice, VolumeBuffer};

/// 单层切片的候选个数与校准密度之和. 已取消时返回 `None`.
fn slice_stats(
    slice: ScanSlice,
    threshold_hu: f32,
    calibration: &dyn MassCalibration,
    cancel: &CancelToken,
) -> Option<(usize, f64)> {
    if cancel.is_cancelled() {
        return None;
    }
    let candidates = slice
        .iter()
        .copied()
        .filter(|&hu| is_candidate(hu, threshold_hu));
    Some((
        slice.count_above(threshold_hu),
        candidate_density_sum(candidates, calibration),
    ))
}

/// 计算 CPU 路径的体素证据. 打开 `rayon` feature 时逐切片并行, 累加顺序仍按切片升序.
pub(crate) fn collect_evidence<'a>(
    volume: &'a VolumeBuffer,
    threshold_hu: f32,
    calibration: &dyn MassCalibration,
    cancel: &CancelToken,
) -> AnalysisResult<ScanEvidence<'a>> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            let stats = volume.par_map_indexed_slices(|_, s| {
                slice_stats(s, threshold_hu, calibration, cancel)
            });
        } else {
            let stats: Vec<_> = volume
                .slice_iter()
                .map(|s| slice_stats(s, threshold_hu, calibration, cancel))
                .collect();
        }
    }
    let stats = stats
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or(AnalysisError::Cancelled)?;
    let (candidate_count, density_sum) = stats
        .into_iter()
        .fold((0, 0.0), |(c, d), (sc, sd)| (c + sc, d + sd));

    Ok(ScanEvidence {
        mask: classify(volume, threshold_hu),
        hu: CowArray::from(volume.data()),
        factors: None,
        candidate_count,
        density_sum,
    })
}
