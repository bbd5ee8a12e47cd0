//! 由参数图均值判定灌注异常程度.

use std::fmt::{self, Display, Formatter};

use log::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::stats::PerfusionStats;
use crate::consts::abnormality as defaults;

/// 单个参数的状态.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParameterStatus {
    /// 偏低.
    Low,
    /// 正常.
    Normal,
    /// 偏高.
    High,
}

/// TTP 的状态.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TtpStatus {
    /// 正常.
    Normal,
    /// 延迟.
    Delayed,
}

/// 总体异常程度.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OverallStatus {
    /// 没有异常参数.
    Normal,
    /// 1 个异常参数.
    MildlyAbnormal,
    /// 2 个异常参数.
    ModeratelyAbnormal,
    /// 3 个及以上.
    SeverelyAbnormal,
}

impl OverallStatus {
    /// 由异常参数个数得到总体状态.
    pub fn from_count(count: usize) -> Self {
        match count {
            0 => Self::Normal,
            1 => Self::MildlyAbnormal,
            2 => Self::ModeratelyAbnormal,
            _ => Self::SeverelyAbnormal,
        }
    }
}

impl Display for OverallStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::MildlyAbnormal => "mildly_abnormal",
            Self::ModeratelyAbnormal => "moderately_abnormal",
            Self::SeverelyAbnormal => "severely_abnormal",
        })
    }
}

/// 各参数的正常范围. 区间端点本身算正常.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AbnormalityThresholds {
    /// CBF 正常范围.
    pub cbf: (f64, f64),
    /// CBV 正常范围.
    pub cbv: (f64, f64),
    /// MTT 正常范围.
    pub mtt: (f64, f64),
    /// TTP 上限 (秒).
    pub ttp_delayed: f64,
}

impl Default for AbnormalityThresholds {
    fn default() -> Self {
        Self {
            cbf: (defaults::CBF_LOW, defaults::CBF_HIGH),
            cbv: (defaults::CBV_LOW, defaults::CBV_HIGH),
            mtt: (defaults::MTT_LOW, defaults::MTT_HIGH),
            ttp_delayed: defaults::TTP_DELAYED,
        }
    }
}

fn status(mean: f64, (low, high): (f64, f64)) -> ParameterStatus {
    if mean < low {
        ParameterStatus::Low
    } else if mean > high {
        ParameterStatus::High
    } else {
        ParameterStatus::Normal
    }
}

/// 灌注异常评估结果.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AbnormalityAssessment {
    /// CBF 状态.
    pub cbf_status: ParameterStatus,
    /// CBV 状态.
    pub cbv_status: ParameterStatus,
    /// MTT 状态.
    pub mtt_status: ParameterStatus,
    /// TTP 状态.
    pub ttp_status: TtpStatus,
    /// 总体状态.
    pub overall_status: OverallStatus,
    /// 异常参数个数, 0 ~ 4.
    pub abnormal_count: usize,
}

/// 使用默认阈值评估.
#[inline]
pub fn assess_abnormality(stats: &PerfusionStats) -> AbnormalityAssessment {
    assess_abnormality_with(stats, &AbnormalityThresholds::default())
}

/// 只依赖四个均值. 低于下界或高于上界都算异常.
pub fn assess_abnormality_with(
    stats: &PerfusionStats,
    thresholds: &AbnormalityThresholds,
) -> AbnormalityAssessment {
    let cbf_status = status(stats.cbf.mean, thresholds.cbf);
    let cbv_status = status(stats.cbv.mean, thresholds.cbv);
    let mtt_status = status(stats.mtt.mean, thresholds.mtt);
    let ttp_status = if stats.ttp.mean > thresholds.ttp_delayed {
        TtpStatus::Delayed
    } else {
        TtpStatus::Normal
    };
    let abnormal_count = [cbf_status, cbv_status, mtt_status]
        .iter()
        .filter(|&&s| s != ParameterStatus::Normal)
        .count()
        + usize::from(ttp_status == TtpStatus::Delayed);
    let overall_status = OverallStatus::from_count(abnormal_count);
    debug!("灌注异常参数 {abnormal_count} 个 -> {overall_status}");
    AbnormalityAssessment {
        cbf_status,
        cbv_status,
        mtt_status,
        ttp_status,
        overall_status,
        abnormal_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_normal() {
        let a = assess_abnormality(&PerfusionStats::from_means(50.0, 4.0, 5.0, 8.0));
        assert_eq!(a.overall_status, OverallStatus::Normal);
        assert_eq!(a.abnormal_count, 0);
        assert_eq!(a.ttp_status, TtpStatus::Normal);
    }

    #[test]
    fn test_boundaries_are_normal() {
        let a = assess_abnormality(&PerfusionStats::from_means(30.0, 5.0, 2.0, 10.0));
        assert_eq!(a.abnormal_count, 0);
        let a = assess_abnormality(&PerfusionStats::from_means(80.0, 2.5, 8.0, 10.0));
        assert_eq!(a.abnormal_count, 0);
    }

    #[test]
    fn test_counts() {
        let a = assess_abnormality(&PerfusionStats::from_means(20.0, 4.0, 5.0, 8.0));
        assert_eq!(a.cbf_status, ParameterStatus::Low);
        assert_eq!(a.overall_status, OverallStatus::MildlyAbnormal);

        let a = assess_abnormality(&PerfusionStats::from_means(20.0, 6.0, 5.0, 8.0));
        assert_eq!(a.cbv_status, ParameterStatus::High);
        assert_eq!(a.overall_status, OverallStatus::ModeratelyAbnormal);

        let a = assess_abnormality(&PerfusionStats::from_means(20.0, 6.0, 9.0, 12.0));
        assert_eq!(a.ttp_status, TtpStatus::Delayed);
        assert_eq!(a.abnormal_count, 4);
        assert_eq!(a.overall_status, OverallStatus::SeverelyAbnormal);
        assert_eq!(a.overall_status.to_string(), "severely_abnormal");
    }

    #[test]
    fn test_custom_thresholds() {
        let t = AbnormalityThresholds {
            ttp_delayed: 5.0,
            ..Default::default()
        };
        let stats = PerfusionStats::from_means(50.0, 4.0, 5.0, 8.0);
        assert_eq!(assess_abnormality_with(&stats, &t).abnormal_count, 1);
    }
}
