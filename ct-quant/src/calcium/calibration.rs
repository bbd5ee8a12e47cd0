//! 质量积分使用的 HU -> 钙密度校准策略.

use std::fmt::Debug;

use crate::consts::calibration::{OFFSET_HU, SLOPE};

/// HU 值到钙密度 (mg/cm³) 的换算.
pub trait MassCalibration: Debug + Send + Sync {
    /// 返回 `hu` 对应的钙密度, 单位 mg/cm³.
    fn density_mg_cm3(&self, hu: f64) -> f64;
}

/// 线性校准 `density = slope * (HU + offset_hu)`.
///
/// 默认参数只是占位公式, 并非体模标定结果.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LinearCalibration {
    slope: f64,
    offset_hu: f64,
}

impl Default for LinearCalibration {
    fn default() -> Self {
        Self {
            slope: SLOPE,
            offset_hu: OFFSET_HU,
        }
    }
}

impl LinearCalibration {
    /// 构建线性校准. `slope` 与 `offset_hu` 必须为有限值, 否则返回 `None`.
    pub fn new(slope: f64, offset_hu: f64) -> Option<Self> {
        (slope.is_finite() && offset_hu.is_finite()).then_some(Self { slope, offset_hu })
    }

    /// 斜率.
    #[inline]
    pub fn slope(&self) -> f64 {
        self.slope
    }

    /// HU 偏移.
    #[inline]
    pub fn offset_hu(&self) -> f64 {
        self.offset_hu
    }
}

impl MassCalibration for LinearCalibration {
    #[inline]
    fn density_mg_cm3(&self, hu: f64) -> f64 {
        self.slope * (hu + self.offset_hu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_linear_calibration() {
        let c = LinearCalibration::default();
        assert_eq!(c.density_mg_cm3(0.0), 500.0);
        assert_eq!(c.density_mg_cm3(400.0), 700.0);
        assert_eq!(c.density_mg_cm3(-1000.0), 0.0);
    }

    #[test]
    fn test_custom_calibration() {
        assert!(LinearCalibration::new(f64::NAN, 0.0).is_none());
        let c = LinearCalibration::new(1.0, 0.0).unwrap();
        assert_eq!(c.density_mg_cm3(250.0), 250.0);
    }
}
