//! Agatston 密度因子.

use crate::consts::density::*;

/// 将病灶峰值 HU 映射为 Agatston 密度因子.
///
/// `[400, ∞) -> 4`, `[300, 400) -> 3`, `[200, 300) -> 2`, `[130, 200) -> 1`, 其余 (含 `NaN`) `-> 0`.
/// 分界点严格取自临床标准, 不做插值.
#[inline]
pub fn density_factor(max_hu: f32) -> u8 {
    if max_hu >= FACTOR_4_HU {
        4
    } else if max_hu >= FACTOR_3_HU {
        3
    } else if max_hu >= FACTOR_2_HU {
        2
    } else if max_hu >= FACTOR_1_HU {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::density_factor;

    #[test]
    fn test_density_boundaries() {
        let hu = [129.0, 130.0, 199.0, 200.0, 299.0, 300.0, 399.0, 400.0, 500.0];
        let got: Vec<u8> = hu.iter().map(|&v| density_factor(v)).collect();
        assert_eq!(got, vec![0, 1, 1, 2, 2, 3, 3, 4, 4]);
    }

    #[test]
    fn test_density_non_finite() {
        assert_eq!(density_factor(f32::NAN), 0);
        assert_eq!(density_factor(f32::INFINITY), 4);
        assert_eq!(density_factor(f32::NEG_INFINITY), 0);
        assert_eq!(density_factor(199.999), 1);
    }

    #[test]
    fn test_density_monotone() {
        let mut last = 0;
        for i in -200..1200 {
            let f = density_factor(i as f32 * 0.5);
            assert!(f >= last);
            last = f;
        }
    }
}
