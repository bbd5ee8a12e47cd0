use crate::error::{InvalidVolumeError, VolumeResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 体素间距, 以毫米为单位.
///
/// `dx` 为宽度方向 (自然 2D 图像的水平方向), `dy` 为高度方向,
/// `dz` 为相邻切片方向. 该结构是只读的, 三个分量保证是有限正数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Spacing {
    dx: f64,
    dy: f64,
    dz: f64,
}

impl Spacing {
    /// 构建体素间距. 任一分量不是有限正数时返回 `Err`.
    pub fn new(dx: f64, dy: f64, dz: f64) -> VolumeResult<Self> {
        for (axis, value) in [("dx", dx), ("dy", dy), ("dz", dz)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(InvalidVolumeError::BadSpacing { axis, value });
            }
        }
        Ok(Self { dx, dy, dz })
    }

    /// 从 `[dx, dy, dz]` 构建.
    #[inline]
    pub fn from_array([dx, dy, dz]: [f64; 3]) -> VolumeResult<Self> {
        Self::new(dx, dy, dz)
    }

    /// 宽度方向间距.
    #[inline]
    pub fn dx(&self) -> f64 {
        self.dx
    }

    /// 高度方向间距.
    #[inline]
    pub fn dy(&self) -> f64 {
        self.dy
    }

    /// 切片方向间距.
    #[inline]
    pub fn dz(&self) -> f64 {
        self.dz
    }

    /// 水平切片上单个像素的面积 (mm²).
    #[inline]
    pub fn slice_pixel(&self) -> f64 {
        self.dx * self.dy
    }

    /// 单个体素的体积 (mm³).
    #[inline]
    pub fn voxel(&self) -> f64 {
        self.dx * self.dy * self.dz
    }

    /// 单个体素的体积 (cm³).
    #[inline]
    pub fn voxel_cm3(&self) -> f64 {
        self.voxel() / 1000.0
    }

    /// 体素分辨率在三个维度上是否是各向同的?
    #[inline]
    pub fn is_isotropic(&self) -> bool {
        self.dx == self.dy && self.dx == self.dz
    }
}

#[cfg(test)]
mod tests {
    use super::Spacing;
    use crate::error::InvalidVolumeError;

    #[test]
    fn test_spacing_invalid_input() {
        assert!(Spacing::new(0.0, 1.0, 1.0).is_err());
        assert!(Spacing::new(1.0, -1.0, 1.0).is_err());
        assert!(matches!(
            Spacing::new(1.0, 1.0, f64::NAN),
            Err(InvalidVolumeError::BadSpacing { axis: "dz", .. })
        ));
        assert!(Spacing::new(1.0, f64::INFINITY, 1.0).is_err());
    }

    #[test]
    fn test_spacing_geometry() {
        let s = Spacing::from_array([0.625, 0.625, 3.0]).unwrap();
        assert_eq!(s.slice_pixel(), 0.390625);
        assert_eq!(s.voxel(), 1.171875);
        assert!((s.voxel_cm3() - 0.001171875).abs() < 1e-15);
        assert!(!s.is_isotropic());
    }
}
