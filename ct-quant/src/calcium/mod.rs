//! 冠脉钙化积分.
//!
//! 流水线: 阈值分类 -> 连通分量标注 -> 面积过滤 -> 密度因子 -> 计分.
//! GPU / CPU 的选择由 [`ExecutionBackend`] 负责.

use std::sync::Arc;

use crate::backend::{CancelToken, ExecutionBackend};
use crate::consts::MIN_LESION_AREA_MM2;
use crate::error::AnalysisResult;
use crate::{Spacing, VolumeBuffer};

mod calibration;
mod density;
mod label;
mod region;
mod score;
mod threshold;

pub use calibration::{LinearCalibration, MassCalibration};
pub use density::density_factor;
pub use label::{label_components, retain_min_area, Cluster, Connectivity};
pub use region::{QuadrantAssigner, RegionAssigner, RegionScores, VesselRegion};
pub use score::{agatston_score, mass_score, volume_score, BackendKind, Component, ScoreResult};
pub use threshold::{classify, is_candidate, CandidateMask};

pub(crate) use score::{candidate_density_sum, ScanEvidence};

/// 钙化积分配置.
#[derive(Debug, Clone)]
pub struct CalciumConfig {
    connectivity: Connectivity,
    min_area_mm2: f64,
    calibration: Arc<dyn MassCalibration>,
    region_assigner: Arc<dyn RegionAssigner>,
}

impl Default for CalciumConfig {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::default(),
            min_area_mm2: MIN_LESION_AREA_MM2,
            calibration: Arc::new(LinearCalibration::default()),
            region_assigner: Arc::new(QuadrantAssigner),
        }
    }
}

impl CalciumConfig {
    /// 设置连通规则.
    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// 设置病灶面积下限 (平方毫米). 负数与 `NaN` 按 0 处理.
    pub fn with_min_area_mm2(mut self, min_area_mm2: f64) -> Self {
        self.min_area_mm2 = if min_area_mm2 > 0.0 { min_area_mm2 } else { 0.0 };
        self
    }

    /// 设置质量积分的密度校准.
    pub fn with_calibration<C: MassCalibration + 'static>(mut self, calibration: C) -> Self {
        self.calibration = Arc::new(calibration);
        self
    }

    /// 设置冠脉分区策略.
    pub fn with_region_assigner<R: RegionAssigner + 'static>(mut self, assigner: R) -> Self {
        self.region_assigner = Arc::new(assigner);
        self
    }

    /// 连通规则.
    #[inline]
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    /// 病灶面积下限 (平方毫米).
    #[inline]
    pub fn min_area_mm2(&self) -> f64 {
        self.min_area_mm2
    }

    /// 密度校准.
    #[inline]
    pub fn calibration(&self) -> &dyn MassCalibration {
        self.calibration.as_ref()
    }

    /// 冠脉分区策略.
    #[inline]
    pub fn region_assigner(&self) -> &dyn RegionAssigner {
        self.region_assigner.as_ref()
    }
}

/// 钙化积分分析器. 显式构造, 持有配置与执行后端.
///
/// 同一个实例可以在多个线程间共享; GPU 访问在内部串行化.
#[derive(Debug)]
pub struct CalciumAnalyzer {
    config: CalciumConfig,
    backend: ExecutionBackend,
}

impl CalciumAnalyzer {
    /// 由配置与后端构建分析器.
    pub fn new(config: CalciumConfig, backend: ExecutionBackend) -> Self {
        Self { config, backend }
    }

    /// 仅使用 CPU 的默认分析器.
    pub fn cpu_only() -> Self {
        Self::new(CalciumConfig::default(), ExecutionBackend::cpu_only())
    }

    /// 按环境变量选择后端的默认分析器. 见 [`ExecutionBackend::from_env`].
    pub fn from_env() -> Self {
        Self::new(CalciumConfig::default(), ExecutionBackend::from_env())
    }

    /// 配置.
    #[inline]
    pub fn config(&self) -> &CalciumConfig {
        &self.config
    }

    /// 执行后端.
    #[inline]
    pub fn backend(&self) -> &ExecutionBackend {
        &self.backend
    }

    /// 计算钙化积分. 阈值一般取 [`crate::consts::DEFAULT_THRESHOLD_HU`].
    ///
    /// GPU 故障不会以 `Err` 返回, 而是整体回退到 CPU; 结果中的 `backend` 字段记录实际使用的后端.
    pub fn compute_calcium_score(
        &self,
        volume: &VolumeBuffer,
        threshold_hu: f32,
    ) -> AnalysisResult<ScoreResult> {
        self.compute_calcium_score_with_cancel(volume, threshold_hu, &CancelToken::new())
    }

    /// 与 [`Self::compute_calcium_score`] 相同, 但在切片之间检查 `cancel`.
    pub fn compute_calcium_score_with_cancel(
        &self,
        volume: &VolumeBuffer,
        threshold_hu: f32,
        cancel: &CancelToken,
    ) -> AnalysisResult<ScoreResult> {
        self.backend
            .compute(volume, threshold_hu, &self.config, cancel)
    }

    /// 由裸缓冲区计算钙化积分. `dims` 为 `(width, height, depth)`, `spacing` 为 `[dx, dy, dz]` 毫米.
    ///
    /// 缓冲区与维度不一致时返回 `InvalidVolume`, 且不会触碰任何计算后端.
    pub fn compute_calcium_score_raw(
        &self,
        data: Vec<f32>,
        (width, height, depth): (usize, usize, usize),
        spacing: [f64; 3],
        threshold_hu: f32,
    ) -> AnalysisResult<ScoreResult> {
        let spacing = Spacing::from_array(spacing)?;
        let volume = VolumeBuffer::from_raw(data, width, height, depth, spacing)?;
        self.compute_calcium_score(&volume, threshold_hu)
    }

    /// 单独计算体积积分 (立方毫米), 不做标注.
    #[inline]
    pub fn volume_score(&self, volume: &VolumeBuffer, threshold_hu: f32) -> f64 {
        volume_score(volume, threshold_hu)
    }

    /// 单独计算质量积分 (毫克), 使用配置中的密度校准, 不做标注.
    #[inline]
    pub fn mass_score(&self, volume: &VolumeBuffer, threshold_hu: f32) -> f64 {
        mass_score(volume, threshold_hu, self.config.calibration())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendState, ReferenceProvider};
    use crate::consts::{CARDIAC_SPACING_MM, DEFAULT_THRESHOLD_HU};
    use crate::error::{AnalysisError, InvalidVolumeError};
    use crate::phantom::{CalciumPhantom, Deposit};
    use approx::assert_relative_eq;

    fn centered_sphere() -> VolumeBuffer {
        CalciumPhantom::new((64, 64, 64), Spacing::from_array(CARDIAC_SPACING_MM).unwrap())
            .with_deposit(Deposit::new((32, 32, 32), 3.0, 500.0))
            .build()
    }

    #[test]
    fn test_sphere_scenario() {
        let _ = simple_logger::init_with_level(log::Level::Debug);
        let vol = centered_sphere();
        let analyzer = CalciumAnalyzer::cpu_only();
        let r = analyzer
            .compute_calcium_score(&vol, DEFAULT_THRESHOLD_HU)
            .unwrap();

        let voxel_count = vol.as_slice().iter().filter(|&&v| v > 130.0).count();
        // 半径为 3 的离散球.
        assert_eq!(voxel_count, 123);
        assert!(r.agatston_score > 0.0);
        assert_eq!(r.components.len(), 1);
        let c = &r.components[0];
        assert_eq!(c.density_factor, 4);
        assert_eq!(c.voxel_count, voxel_count);
        assert_eq!(c.peak_hu, 500.0);
        assert_eq!(c.slice_span, (29, 35));
        assert_eq!(c.region, VesselRegion::Lm);
        assert_relative_eq!(r.volume_score, voxel_count as f64 * (0.625 * 0.625 * 3.0));
        assert_relative_eq!(r.agatston_score, voxel_count as f64 * 0.625 * 0.625 * 4.0);
        assert_relative_eq!(r.per_region[VesselRegion::Lm], r.agatston_score);
        assert_eq!(r.backend, BackendKind::Cpu);
    }

    #[test]
    fn test_threshold_monotone() {
        let vol = CalciumPhantom::new((16, 32, 32), Spacing::new(0.625, 0.625, 3.0).unwrap())
            .with_deposit(Deposit::new((4, 8, 8), 2.5, 180.0))
            .with_deposit(Deposit::new((8, 20, 10), 3.0, 260.0))
            .with_deposit(Deposit::new((10, 10, 24), 2.0, 350.0))
            .with_deposit(Deposit::new((12, 24, 24), 3.5, 650.0))
            .build();
        let analyzer = CalciumAnalyzer::cpu_only();
        let mut last = f64::INFINITY;
        for t in (100..=700).step_by(25) {
            let s = analyzer
                .compute_calcium_score(&vol, t as f32)
                .unwrap()
                .agatston_score;
            assert!(s <= last, "threshold {t}: {s} > {last}");
            last = s;
        }
        assert_eq!(last, 0.0);
    }

    #[test]
    fn test_raw_length_mismatch_never_reaches_backend() {
        let analyzer = CalciumAnalyzer::new(
            CalciumConfig::default(),
            ExecutionBackend::new(Arc::new(ReferenceProvider)),
        );
        let err = analyzer
            .compute_calcium_score_raw(vec![0.0; 10], (2, 2, 3), [0.625, 0.625, 3.0], 130.0)
            .unwrap_err();
        assert_eq!(
            err,
            AnalysisError::InvalidVolume(InvalidVolumeError::LengthMismatch {
                expected: 12,
                actual: 10
            })
        );
        assert_eq!(analyzer.backend().state(), BackendState::Uninitialized);
    }

    #[test]
    fn test_isolated_connectivity_drops_sub_area_voxels() {
        // 0.625² mm² 的单体素面积小于 1 mm², 孤立模式下全部被丢弃.
        let vol = centered_sphere();
        let analyzer = CalciumAnalyzer::new(
            CalciumConfig::default().with_connectivity(Connectivity::Isolated),
            ExecutionBackend::cpu_only(),
        );
        let r = analyzer.compute_calcium_score(&vol, 130.0).unwrap();
        assert_eq!(r.agatston_score, 0.0);
        assert!(r.components.is_empty());
        assert!(r.volume_score > 0.0);
    }

    #[test]
    fn test_standalone_scores_match_pipeline() {
        let vol = centered_sphere();
        let analyzer = CalciumAnalyzer::cpu_only();
        let r = analyzer.compute_calcium_score(&vol, 130.0).unwrap();
        assert_eq!(analyzer.volume_score(&vol, 130.0), r.volume_score);
        assert_eq!(analyzer.mass_score(&vol, 130.0), r.mass_score);
        // 0.5 * (500 + 1000) mg/cm³.
        assert_relative_eq!(
            r.mass_score,
            750.0 * r.volume_score / 1000.0,
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_custom_strategies() {
        #[derive(Debug)]
        struct AllRca;
        impl RegionAssigner for AllRca {
            fn assign(&self, _: (f64, f64, f64), _: crate::Idx3d) -> VesselRegion {
                VesselRegion::Rca
            }
        }
        let vol = centered_sphere();
        let analyzer = CalciumAnalyzer::new(
            CalciumConfig::default()
                .with_region_assigner(AllRca)
                .with_calibration(LinearCalibration::new(1.0, 0.0).unwrap()),
            ExecutionBackend::cpu_only(),
        );
        let r = analyzer.compute_calcium_score(&vol, 130.0).unwrap();
        assert_eq!(r.per_region[VesselRegion::Rca], r.agatston_score);
        assert_eq!(r.per_region[VesselRegion::Lm], 0.0);
        assert_relative_eq!(
            r.mass_score,
            500.0 * r.volume_score / 1000.0,
            max_relative = 1e-12
        );
    }
}
