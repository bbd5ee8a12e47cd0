//! Agatston / 体积 / 质量积分.
//!
//! 三种积分都可以单独调用. 体积与质量积分不依赖连通分量标注.

use log::{debug, info};
use ndarray::{Array3, CowArray, Ix3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::calibration::MassCalibration;
use super::density::density_factor;
use super::label::{label_components, retain_min_area, Cluster};
use super::region::{RegionScores, VesselRegion};
use super::threshold::{is_candidate, CandidateMask};
use super::CalciumConfig;
use crate::{Idx3d, Spacing, VolumeBuffer};

/// 实际产生结果的计算后端.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BackendKind {
    /// GPU 计算着色器.
    Gpu,
    /// CPU.
    Cpu,
}

/// 通过面积过滤的钙化病灶.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Component {
    /// 标注阶段分配的编号.
    pub id: usize,
    /// 体素个数.
    pub voxel_count: usize,
    /// 面积 (平方毫米).
    pub area_mm2: f64,
    /// 峰值 HU.
    pub peak_hu: f32,
    /// 平均 HU.
    pub mean_hu: f64,
    /// Agatston 密度因子, 0 ~ 4.
    pub density_factor: u8,
    /// 所属冠脉分区.
    pub region: VesselRegion,
    /// 几何中心 (z, H, W).
    pub centroid: (f64, f64, f64),
    /// 首末切片索引 (含).
    pub slice_span: (usize, usize),
}

impl Component {
    /// 该病灶的 Agatston 分数 `area * factor`.
    #[inline]
    pub fn score(&self) -> f64 {
        self.area_mm2 * self.density_factor as f64
    }
}

/// 一次钙化积分调用的结果.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScoreResult {
    /// Agatston 积分.
    pub agatston_score: f64,
    /// 体积积分 (立方毫米).
    pub volume_score: f64,
    /// 质量积分 (毫克).
    pub mass_score: f64,
    /// 通过面积过滤的病灶, 按编号升序.
    pub components: Vec<Component>,
    /// 每个冠脉分区的 Agatston 分数.
    pub per_region: RegionScores,
    /// 实际使用的后端.
    pub backend: BackendKind,
    /// 本次使用的阈值 (HU).
    pub threshold_hu: f32,
}

/// Agatston 积分: 各病灶 `area * factor` 之和.
pub fn agatston_score(components: &[Component]) -> f64 {
    components.iter().map(Component::score).sum()
}

/// 体积积分: 全部候选体素个数 `* dx * dy * dz`, 与连通性、密度因子无关.
pub fn volume_score(volume: &VolumeBuffer, threshold_hu: f32) -> f64 {
    let count: usize = volume
        .slice_iter()
        .map(|s| s.count_above(threshold_hu))
        .sum();
    count as f64 * volume.voxel()
}

/// 质量积分: `Σ calibration(HU) * 体素体积 (cm³)`, 求和范围为全部候选体素.
pub fn mass_score(
    volume: &VolumeBuffer,
    threshold_hu: f32,
    calibration: &dyn MassCalibration,
) -> f64 {
    let density_sum: f64 = volume
        .slice_iter()
        .map(|s| {
            candidate_density_sum(
                s.iter().copied().filter(|&hu| is_candidate(hu, threshold_hu)),
                calibration,
            )
        })
        .sum();
    density_sum * volume.spacing().voxel_cm3()
}

/// 一组候选体素的校准密度之和 (mg/cm³), 按迭代顺序累加.
///
/// CPU 与 GPU 两条路径都逐层按行优先顺序调用它, 再按切片升序求和, 因此浮点结果完全一致.
#[inline]
pub(crate) fn candidate_density_sum<I: IntoIterator<Item = f32>>(
    candidates: I,
    calibration: &dyn MassCalibration,
) -> f64 {
    candidates
        .into_iter()
        .map(|hu| calibration.density_mg_cm3(hu as f64))
        .sum()
}

/// 某条计算路径产出的、尚未标注的逐体素证据.
pub(crate) struct ScanEvidence<'a> {
    /// 候选掩膜.
    pub mask: CandidateMask,
    /// 候选体素上的 HU. 非候选位置的取值不被读取.
    pub hu: CowArray<'a, f32, Ix3>,
    /// 逐体素密度因子. 为 `None` 时由峰值 HU 现场计算.
    pub factors: Option<Array3<u8>>,
    /// 候选体素个数.
    pub candidate_count: usize,
    /// 候选体素校准密度之和 (mg/cm³).
    pub density_sum: f64,
}

impl ScanEvidence<'_> {
    fn component(&self, cluster: &Cluster, spacing: &Spacing, config: &CalciumConfig) -> Component {
        let voxels = cluster.voxels();
        let peak_hu = voxels
            .iter()
            .map(|&p| self.hu[p])
            .fold(f32::NEG_INFINITY, f32::max);
        let mean_hu =
            voxels.iter().map(|&p| self.hu[p] as f64).sum::<f64>() / voxels.len() as f64;
        // 因子映射单调, 因此逐体素因子的最大值等于峰值的因子.
        let density_factor = match &self.factors {
            Some(f) => voxels.iter().map(|&p| f[p]).max().unwrap_or(0),
            None => density_factor(peak_hu),
        };
        let centroid = cluster.centroid();
        Component {
            id: cluster.id(),
            voxel_count: cluster.len(),
            area_mm2: cluster.area_mm2(spacing),
            peak_hu,
            mean_hu,
            density_factor,
            region: config.region_assigner().assign(centroid, self.shape()),
            centroid,
            slice_span: cluster.slice_span(),
        }
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.mask.shape()
    }

    /// 标注、过滤、计分.
    pub fn into_score(
        self,
        spacing: &Spacing,
        threshold_hu: f32,
        config: &CalciumConfig,
        backend: BackendKind,
    ) -> ScoreResult {
        let clusters = label_components(&self.mask, config.connectivity());
        let found = clusters.len();
        let clusters = retain_min_area(clusters, spacing, config.min_area_mm2());
        debug!(
            "{:?} 连通分量 {} 个, 面积过滤后剩余 {} 个",
            config.connectivity(),
            found,
            clusters.len()
        );

        let components: Vec<Component> = clusters
            .iter()
            .map(|c| self.component(c, spacing, config))
            .collect();
        let mut per_region = RegionScores::default();
        for c in components.iter() {
            per_region[c.region] += c.score();
        }

        let result = ScoreResult {
            agatston_score: agatston_score(&components),
            volume_score: self.candidate_count as f64 * spacing.voxel(),
            mass_score: self.density_sum * spacing.voxel_cm3(),
            components,
            per_region,
            backend,
            threshold_hu,
        };
        info!(
            "钙化积分完成 ({:?}): Agatston = {:.1}, 体积 = {:.1} mm³, 质量 = {:.1} mg, 病灶 {} 个",
            backend,
            result.agatston_score,
            result.volume_score,
            result.mass_score,
            result.components.len()
        );
        result
    }
}
