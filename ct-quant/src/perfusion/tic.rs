//! 时间-强度曲线 (TIC).

use ndarray::Array3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::flow::RangeStatus;
use crate::consts::perfusion::CURVE_MTT_NORMAL;
use crate::error::{InvalidSeriesError, SeriesResult};
use crate::FrameSeries;

/// ROI 内每帧的平均强度及其派生量.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeIntensityCurve {
    /// 每帧的平均强度.
    pub values: Vec<f64>,
    /// 时间分辨率 (秒).
    pub dt: f64,
    /// 峰值.
    pub peak: f64,
    /// 达峰时间 (秒), 取第一个最大值.
    pub time_to_peak: f64,
    /// 曲线下面积 (梯形法).
    pub auc: f64,
    /// `auc / peak`, 峰值不为正时为 0.
    pub mtt: f64,
    /// `mtt` 是否落在 4 ~ 6 秒.
    pub mtt_status: RangeStatus,
}

impl TimeIntensityCurve {
    /// 由帧序列计算 TIC.
    ///
    /// `roi` 为 `None` 时对整帧求平均. ROI 为空时每帧取 0.
    /// ROI 形状必须等于帧形状.
    pub fn from_series(series: &FrameSeries, roi: Option<&Array3<bool>>) -> SeriesResult<Self> {
        let values: Vec<f64> = match roi {
            None => (0..series.len())
                .map(|t| {
                    let frame = series.frame(t);
                    frame.iter().map(|&v| v as f64).sum::<f64>() / frame.len() as f64
                })
                .collect(),
            Some(mask) => {
                if mask.dim() != series.frame_shape() {
                    return Err(InvalidSeriesError::RoiShapeMismatch {
                        expected: series.frame_shape(),
                        actual: mask.dim(),
                    });
                }
                // 掩膜按行优先展开, 与帧内体素顺序一致.
                let selected: Vec<usize> = mask
                    .iter()
                    .enumerate()
                    .filter_map(|(i, &m)| m.then_some(i))
                    .collect();
                (0..series.len())
                    .map(|t| {
                        if selected.is_empty() {
                            return 0.0;
                        }
                        let frame = series.frame(t);
                        selected.iter().map(|&i| frame[i] as f64).sum::<f64>()
                            / selected.len() as f64
                    })
                    .collect()
            }
        };
        Ok(Self::from_values(values, series.temporal_resolution()))
    }

    /// 由已有的强度序列计算派生量. `values` 不应为空.
    pub fn from_values(values: Vec<f64>, dt: f64) -> Self {
        let (peak_idx, peak) = values.iter().copied().enumerate().fold(
            (0, f64::NEG_INFINITY),
            |(bi, bv), (i, v)| if v > bv { (i, v) } else { (bi, bv) },
        );
        let peak = if values.is_empty() { 0.0 } else { peak };
        let auc = values
            .windows(2)
            .map(|w| (w[0] + w[1]) * 0.5 * dt)
            .sum::<f64>();
        let mtt = if peak > 0.0 { auc / peak } else { 0.0 };
        Self {
            values,
            dt,
            peak,
            time_to_peak: peak_idx as f64 * dt,
            auc,
            mtt,
            mtt_status: RangeStatus::of(mtt, CURVE_MTT_NORMAL),
        }
    }

    /// MTT 的 ±20% 估计区间.
    #[inline]
    pub fn mtt_range(&self) -> (f64, f64) {
        (self.mtt * 0.8, self.mtt * 1.2)
    }

    /// 第 `t` 帧对应的时刻 (秒).
    #[inline]
    pub fn time_at(&self, t: usize) -> f64 {
        t as f64 * self.dt
    }
}
