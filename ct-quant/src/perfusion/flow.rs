//! 基于动脉输入函数 (AIF) 的简化血流估计.

use std::fmt::{self, Display, Formatter};

use log::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::tic::TimeIntensityCurve;
use crate::consts::perfusion::{AIF_CBF_MAX, AIF_CBF_NORMAL};

/// 某个量是否落在正常范围内.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RangeStatus {
    /// 在范围内 (含端点).
    Normal,
    /// 超出范围, 或不是有限值.
    Abnormal,
}

impl RangeStatus {
    /// `value` 落在闭区间 `[low, high]` 内时为 `Normal`.
    pub fn of(value: f64, (low, high): (f64, f64)) -> Self {
        if (low..=high).contains(&value) {
            Self::Normal
        } else {
            Self::Abnormal
        }
    }
}

impl Display for RangeStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::Abnormal => "abnormal",
        })
    }
}

/// AIF 法估计的 CBF.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BloodFlowEstimate {
    /// CBF (mL/min/100g), 截断到 `[0, 100]`.
    pub cbf: f64,
    /// 是否落在 `[40, 60]`.
    pub status: RangeStatus,
}

/// `CBF = 组织曲线峰值 / AUC(AIF) × 100`, 截断到 `[0, 100]`.
///
/// AIF 曲线下面积不为正时 CBF 取 0.
pub fn blood_flow(aif: &TimeIntensityCurve, tissue: &TimeIntensityCurve) -> BloodFlowEstimate {
    let cbf = if aif.auc > 0.0 {
        (tissue.peak / aif.auc * 100.0).clamp(0.0, AIF_CBF_MAX)
    } else {
        0.0
    };
    let status = RangeStatus::of(cbf, AIF_CBF_NORMAL);
    debug!("AIF 估计 CBF = {cbf:.1} ({status})");
    BloodFlowEstimate { cbf, status }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn curve(values: &[f64]) -> TimeIntensityCurve {
        TimeIntensityCurve::from_values(values.to_vec(), 1.0)
    }

    #[test]
    fn test_blood_flow() {
        // AIF 梯形面积 = 0.5 * (0 + 4) + 0.5 * (4 + 0) = 4.
        let aif = curve(&[0.0, 4.0, 0.0]);
        let r = blood_flow(&aif, &curve(&[0.0, 2.0, 1.0]));
        assert_relative_eq!(r.cbf, 50.0);
        assert_eq!(r.status, RangeStatus::Normal);

        let r = blood_flow(&aif, &curve(&[0.0, 1.0, 0.0]));
        assert_relative_eq!(r.cbf, 25.0);
        assert_eq!(r.status, RangeStatus::Abnormal);
        assert_eq!(r.status.to_string(), "abnormal");
    }

    #[test]
    fn test_blood_flow_clamped() {
        let aif = curve(&[0.0, 4.0, 0.0]);
        assert_eq!(blood_flow(&aif, &curve(&[0.0, 40.0, 0.0])).cbf, 100.0);
        assert_eq!(blood_flow(&aif, &curve(&[-8.0, -4.0, -8.0])).cbf, 0.0);
        // AIF 面积为 0.
        let flat = curve(&[0.0, 0.0, 0.0]);
        let r = blood_flow(&flat, &curve(&[0.0, 2.0, 1.0]));
        assert_eq!(r.cbf, 0.0);
        assert_eq!(r.status, RangeStatus::Abnormal);
    }

    #[test]
    fn test_range_status_bounds() {
        assert_eq!(RangeStatus::of(40.0, AIF_CBF_NORMAL), RangeStatus::Normal);
        assert_eq!(RangeStatus::of(60.0, AIF_CBF_NORMAL), RangeStatus::Normal);
        assert_eq!(RangeStatus::of(60.1, AIF_CBF_NORMAL), RangeStatus::Abnormal);
        assert_eq!(RangeStatus::of(f64::NAN, AIF_CBF_NORMAL), RangeStatus::Abnormal);
    }
}
