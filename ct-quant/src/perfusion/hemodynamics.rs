//! 逐体素的 CBF / CBV / MTT / TTP.

use itertools::Itertools;
use log::{debug, info};
use ndarray::{Array3, ArrayView1, Axis};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::stats::{MapStatistics, PerfusionStats};
use crate::consts::perfusion as defaults;
use crate::{FrameSeries, Idx3d};

/// 血流动力学参数的计算常量.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PerfusionConfig {
    /// 基线最多取前几帧, 至少为 1.
    pub baseline_frames: usize,
    /// CBF 比例系数.
    pub cbf_scale: f64,
    /// CBV 比例系数.
    pub cbv_scale: f64,
    /// MTT 比例系数.
    pub mtt_scale: f64,
    /// CBF 严格大于该值时才计算 MTT.
    pub cbf_gate: f64,
    /// 没有正斜率时使用的最大斜率.
    pub default_slope: f64,
}

impl Default for PerfusionConfig {
    fn default() -> Self {
        Self {
            baseline_frames: defaults::BASELINE_FRAMES,
            cbf_scale: defaults::CBF_SCALE,
            cbv_scale: defaults::CBV_SCALE,
            mtt_scale: defaults::MTT_SCALE,
            cbf_gate: defaults::CBF_GATE,
            default_slope: defaults::DEFAULT_SLOPE,
        }
    }
}

impl PerfusionConfig {
    /// 设置基线帧数. 传入 0 时按 1 处理.
    pub fn with_baseline_frames(mut self, n: usize) -> Self {
        self.baseline_frames = n.max(1);
        self
    }

    /// 设置 CBF 的门限.
    pub fn with_cbf_gate(mut self, gate: f64) -> Self {
        self.cbf_gate = gate;
        self
    }
}

/// 与帧形状 (z, H, W) 对齐的四张参数图.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HemodynamicMaps {
    /// 脑血流量.
    pub cbf: Array3<f64>,
    /// 脑血容量.
    pub cbv: Array3<f64>,
    /// 平均通过时间 (秒).
    pub mtt: Array3<f64>,
    /// 达峰时间 (秒).
    pub ttp: Array3<f64>,
}

impl HemodynamicMaps {
    /// 参数图形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.cbf.dim()
    }

    /// 四张图各自的统计量.
    pub fn statistics(&self) -> PerfusionStats {
        PerfusionStats {
            cbf: MapStatistics::from_map(&self.cbf),
            cbv: MapStatistics::from_map(&self.cbv),
            mtt: MapStatistics::from_map(&self.mtt),
            ttp: MapStatistics::from_map(&self.ttp),
        }
    }
}

/// 一次灌注分析的结果.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PerfusionAnalysis {
    /// 参数图.
    pub maps: HemodynamicMaps,
    /// 参数图统计量.
    pub stats: PerfusionStats,
}

/// 单体素的参数, 依次为 CBF, CBV, MTT, TTP.
type VoxelParams = [f64; 4];

fn voxel_params(curve: ArrayView1<f32>, dt: f64, cfg: &PerfusionConfig) -> VoxelParams {
    let n = curve.len();
    let baseline_len = n.min(cfg.baseline_frames.max(1));
    let baseline = curve
        .iter()
        .take(baseline_len)
        .map(|&v| v as f64)
        .sum::<f64>()
        / baseline_len as f64;

    // 第一个最大值.
    let (peak_idx, peak) = curve
        .iter()
        .map(|&v| v as f64)
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        });

    let max_slope = curve
        .iter()
        .tuple_windows()
        .map(|(&a, &b)| (b as f64 - a as f64).abs() / dt)
        .fold(0.0, f64::max);
    let max_slope = if max_slope > 0.0 {
        max_slope
    } else {
        cfg.default_slope
    };

    let cbf = (peak - baseline).max(0.0) / (baseline + 1.0) * max_slope * cfg.cbf_scale;
    let cbv = if peak == 0.0 {
        0.0
    } else {
        curve.iter().map(|&v| v as f64 * dt).sum::<f64>() / peak * cfg.cbv_scale
    };
    let mtt = if cbf > cfg.cbf_gate {
        cbv / cbf * cfg.mtt_scale
    } else {
        0.0
    };
    let ttp = dt * peak_idx as f64;
    [cbf, cbv, mtt, ttp]
}

/// 使用默认常量计算参数图及其统计量.
#[inline]
pub fn analyze_perfusion(series: &FrameSeries) -> PerfusionAnalysis {
    analyze_perfusion_with(series, &PerfusionConfig::default())
}

/// 计算参数图及其统计量.
///
/// 打开 `rayon` feature 时逐体素并行, 结果与串行相同.
pub fn analyze_perfusion_with(series: &FrameSeries, config: &PerfusionConfig) -> PerfusionAnalysis {
    let dt = series.temporal_resolution();
    let data = series.data();
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            use rayon::iter::{IntoParallelIterator, ParallelIterator};
            let params: Vec<VoxelParams> = data
                .axis_iter(Axis(1))
                .into_par_iter()
                .map(|c| voxel_params(c, dt, config))
                .collect();
        } else {
            let params: Vec<VoxelParams> = data
                .axis_iter(Axis(1))
                .map(|c| voxel_params(c, dt, config))
                .collect();
        }
    }
    debug!(
        "灌注: {} 帧, {} 体素, dt = {dt}s",
        series.len(),
        series.voxel_count()
    );

    let shape = series.frame_shape();
    let (_, h, w) = shape;
    let map =
        |k: usize| Array3::from_shape_fn(shape, |(z, y, x)| params[(z * h + y) * w + x][k]);
    let maps = HemodynamicMaps {
        cbf: map(0),
        cbv: map(1),
        mtt: map(2),
        ttp: map(3),
    };
    let stats = maps.statistics();
    info!(
        "灌注分析完成: CBF {:.2}, CBV {:.2}, MTT {:.2}, TTP {:.2} (均值)",
        stats.cbf.mean, stats.cbv.mean, stats.mtt.mean, stats.ttp.mean
    );
    PerfusionAnalysis { maps, stats }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn single_voxel(curve: &[f32], dt: f64) -> VoxelParams {
        let frames = curve.iter().map(|&v| vec![v]).collect();
        let s = FrameSeries::from_frames(frames, 1, 1, dt).unwrap();
        voxel_params(s.curve(0), dt, &PerfusionConfig::default())
    }

    #[test]
    fn test_bolus_scenario() {
        // 4x4 帧, 10 帧, 只有 (1, 2) 在第 5 帧达到 100.
        let frames: Vec<Vec<f32>> = (0..10)
            .map(|t| {
                let mut f = vec![0.0; 16];
                if t == 5 {
                    f[4 + 2] = 100.0;
                }
                f
            })
            .collect();
        let s = FrameSeries::from_frames(frames, 4, 4, 1.0).unwrap();
        let r = analyze_perfusion(&s);
        assert_eq!(r.maps.shape(), (1, 4, 4));
        assert_eq!(r.maps.ttp[(0, 1, 2)], 5.0);
        // 基线 0, 峰值 100, 最大斜率 100.
        assert_relative_eq!(r.maps.cbf[(0, 1, 2)], 1.0e6);
        assert_relative_eq!(r.maps.cbv[(0, 1, 2)], 4.0);
        assert_relative_eq!(r.maps.mtt[(0, 1, 2)], 4.0 / 1.0e6 * 60.0);
        // 其余体素全为 0, 不参与统计.
        assert_eq!(r.maps.cbf[(0, 0, 0)], 0.0);
        assert_eq!(r.stats.ttp.count, 1);
        assert_eq!(r.stats.ttp.mean, 5.0);
        assert_eq!(r.stats.ttp.stddev, 0.0);
        assert_eq!(r.stats.cbv.min, 4.0);
    }

    #[test]
    fn test_zero_rules() {
        // 全零曲线: 没有正斜率, 最大值为 0.
        let [cbf, cbv, mtt, ttp] = single_voxel(&[0.0; 5], 1.0);
        assert_eq!((cbf, cbv, mtt, ttp), (0.0, 0.0, 0.0, 0.0));

        // 峰值不高于基线, CBF 为 0, 从而 MTT 为 0.
        let [cbf, cbv, mtt, _] = single_voxel(&[10.0, 10.0, 10.0, 5.0], 1.0);
        assert_eq!(cbf, 0.0);
        assert!(cbv > 0.0);
        assert_eq!(mtt, 0.0);

        // 门限为严格大于: 基线 0, 峰值 1, 斜率 1, CBF 恰为 100.
        let frames = vec![vec![0.0], vec![0.0], vec![0.0], vec![1.0]];
        let s = FrameSeries::from_frames(frames, 1, 1, 1.0).unwrap();
        let [cbf, cbv, mtt, _] = voxel_params(s.curve(0), 1.0, &PerfusionConfig::default());
        assert_eq!(cbf, 100.0);
        assert_relative_eq!(mtt, cbv / 100.0 * 60.0);
        let gated = PerfusionConfig::default().with_cbf_gate(100.0);
        let [_, _, mtt, _] = voxel_params(s.curve(0), 1.0, &gated);
        assert_eq!(mtt, 0.0);

        // 默认门限: 基线 0, 峰值 0.01, CBF 约为 0.01, 落在 (0, 1] 内, MTT 为 0.
        let [cbf, cbv, mtt, _] = single_voxel(&[0.0, 0.0, 0.0, 0.01], 1.0);
        assert!(cbf > 0.0 && cbf <= 1.0);
        assert!(cbv > 0.0);
        assert_eq!(mtt, 0.0);
    }

    #[test]
    fn test_default_slope() {
        // 单帧: 没有相邻帧, 斜率取默认值 1.
        let [cbf, cbv, mtt, ttp] = single_voxel(&[50.0], 2.0);
        // 基线等于峰值.
        assert_eq!(cbf, 0.0);
        assert_relative_eq!(cbv, 50.0 * 2.0 / 50.0 * 4.0);
        assert_eq!(mtt, 0.0);
        assert_eq!(ttp, 0.0);
    }

    #[test]
    fn test_baseline_window() {
        // 只取第 0 帧作为基线: (20 - 0) / 1 * 20 * 100.
        let cfg = PerfusionConfig::default().with_baseline_frames(1);
        let frames = vec![vec![0.0], vec![20.0], vec![20.0]];
        let s = FrameSeries::from_frames(frames, 1, 1, 1.0).unwrap();
        let [cbf, ..] = voxel_params(s.curve(0), 1.0, &cfg);
        assert_relative_eq!(cbf, 20.0 * 20.0 * 100.0);
        // 默认取三帧: 基线 40 / 3.
        let [cbf, ..] = voxel_params(s.curve(0), 1.0, &PerfusionConfig::default());
        let baseline = 40.0 / 3.0;
        assert_relative_eq!(cbf, (20.0 - baseline) / (baseline + 1.0) * 20.0 * 100.0);
    }

    #[test]
    fn test_first_maximum() {
        let [_, _, _, ttp] = single_voxel(&[0.0, 3.0, 7.0, 7.0, 2.0], 0.5);
        assert_eq!(ttp, 1.0);
    }

    #[test]
    fn test_2d_layout() {
        // 3 x 2 帧, 体素 (y, x) = (1, 0) 即行优先索引 3.
        let frames: Vec<Vec<f32>> = (0..4)
            .map(|t| {
                let mut f = vec![0.0; 6];
                f[3] = if t == 2 { 9.0 } else { 1.0 };
                f
            })
            .collect();
        let s = FrameSeries::from_frames(frames, 3, 2, 1.0).unwrap();
        let r = analyze_perfusion(&s);
        assert_eq!(r.maps.shape(), (1, 2, 3));
        assert_eq!(r.maps.ttp[(0, 1, 0)], 2.0);
        assert_eq!(r.stats.ttp.count, 1);
        assert_eq!(r.stats.cbv.count, 1);
    }
}
