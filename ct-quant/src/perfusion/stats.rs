use ndarray::Array3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 参数图的统计量, 只统计有限且大于 0 的值.
///
/// 没有符合条件的体素时, 所有字段为 0.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MapStatistics {
    /// 均值.
    pub mean: f64,
    /// 总体标准差.
    pub stddev: f64,
    /// 最小值.
    pub min: f64,
    /// 最大值.
    pub max: f64,
    /// 参与统计的体素个数.
    pub count: usize,
}

impl MapStatistics {
    /// 对 `values` 中有限且大于 0 的值求统计量.
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let kept: Vec<f64> = values
            .into_iter()
            .filter(|v| v.is_finite() && *v > 0.0)
            .collect();
        if kept.is_empty() {
            return Self::default();
        }
        let n = kept.len() as f64;
        let mean = kept.iter().sum::<f64>() / n;
        let var = kept.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let (min, max) = kept
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        Self {
            mean,
            stddev: var.sqrt(),
            min,
            max,
            count: kept.len(),
        }
    }

    /// 参数图的统计量.
    #[inline]
    pub fn from_map(map: &Array3<f64>) -> Self {
        Self::from_values(map.iter().copied())
    }
}

/// 四张参数图的统计量.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PerfusionStats {
    /// CBF.
    pub cbf: MapStatistics,
    /// CBV.
    pub cbv: MapStatistics,
    /// MTT.
    pub mtt: MapStatistics,
    /// TTP.
    pub ttp: MapStatistics,
}

impl PerfusionStats {
    /// 直接由四个均值构造, 其余字段为 0. 用于只有均值的场合.
    pub fn from_means(cbf: f64, cbv: f64, mtt: f64, ttp: f64) -> Self {
        let m = |mean| MapStatistics {
            mean,
            ..Default::default()
        };
        Self {
            cbf: m(cbf),
            cbv: m(cbv),
            mtt: m(mtt),
            ttp: m(ttp),
        }
    }
}
