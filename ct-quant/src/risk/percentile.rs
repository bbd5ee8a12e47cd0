//! MESA 人群百分位查表.

use std::str::FromStr;

use log::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 性别.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Gender {
    /// 男性.
    Male,
    /// 女性.
    Female,
}

impl Gender {
    /// 只接受 `"M"` / `"F"`. 其余取值 (包括小写和带空白的写法) 返回 `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "M" => Some(Self::Male),
            "F" => Some(Self::Female),
            _ => None,
        }
    }
}

impl FromStr for Gender {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or(())
    }
}

/// 查表支持的最小年龄 (含).
pub const MIN_AGE: u32 = 40;

/// 查表支持的最大年龄 (含).
pub const MAX_AGE: u32 = 80;

/// 百分位步长. 第 `i` 个分界点对应第 `i * 12.5` 百分位.
const PERCENTILE_STEP: f64 = 12.5;

type Table = [f64; 9];

const MALE: [Table; 4] = [
    [0.0, 0.0, 1.0, 4.0, 15.0, 34.0, 81.0, 168.0, 364.0],
    [0.0, 0.0, 3.0, 11.0, 35.0, 78.0, 155.0, 318.0, 674.0],
    [0.0, 1.0, 7.0, 23.0, 58.0, 123.0, 242.0, 467.0, 937.0],
    [0.0, 2.0, 12.0, 36.0, 86.0, 175.0, 330.0, 618.0, 1169.0],
];

const FEMALE: [Table; 4] = [
    [0.0, 0.0, 0.0, 0.0, 2.0, 8.0, 25.0, 62.0, 153.0],
    [0.0, 0.0, 0.0, 1.0, 5.0, 17.0, 42.0, 93.0, 204.0],
    [0.0, 0.0, 0.0, 3.0, 12.0, 30.0, 67.0, 141.0, 292.0],
    [0.0, 0.0, 1.0, 6.0, 20.0, 48.0, 102.0, 204.0, 407.0],
];

/// 年龄对应的十年段 `{40, 50, 60, 70}`: 向下取整到十年, 再截断到 `[40, 70]`.
///
/// 超出 `[MIN_AGE, MAX_AGE]` 时返回 `None`.
pub fn age_band(age: u32) -> Option<u32> {
    (MIN_AGE..=MAX_AGE)
        .contains(&age)
        .then(|| (age / 10 * 10).clamp(40, 70))
}

/// `(gender, age_band)` 对应的升序分界点表.
pub fn percentile_table(gender: Gender, band: u32) -> Option<&'static [f64; 9]> {
    let row = match band {
        40 => 0,
        50 => 1,
        60 => 2,
        70 => 3,
        _ => return None,
    };
    Some(match gender {
        Gender::Male => &MALE[row],
        Gender::Female => &FEMALE[row],
    })
}

/// 计算 Agatston 积分在同年龄段、同性别人群中的百分位.
///
/// 返回第一个满足 `score <= 分界点` 的下标乘以 12.5; 高于全部分界点时为 100.
/// 年龄超出 `[40, 80]` 或 `score` 非有限值时返回 `None`. 不做外推.
pub fn compute_percentile(score: f64, age: u32, gender: Gender) -> Option<f64> {
    if !score.is_finite() {
        return None;
    }
    let Some(band) = age_band(age) else {
        warn!("{age} 岁, {gender:?}: 没有对应的百分位数据");
        return None;
    };
    let table = percentile_table(gender, band)?;
    let percentile = table
        .iter()
        .position(|&v| score <= v)
        .map_or(100.0, |i| i as f64 * PERCENTILE_STEP);
    debug!("{gender:?} {band} 岁段, Agatston {score:.1} -> 第 {percentile} 百分位");
    Some(percentile)
}

/// 与 [`compute_percentile`] 相同, 但性别以字符串给出. 无法识别的性别返回 `None`.
pub fn compute_percentile_str(score: f64, age: u32, gender: &str) -> Option<f64> {
    compute_percentile(score, age, Gender::parse(gender)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_examples() {
        assert_eq!(compute_percentile_str(0.0, 45, "M"), Some(0.0));
        assert_eq!(compute_percentile_str(1000.0, 65, "F"), Some(100.0));
        assert_eq!(compute_percentile_str(50.0, 20, "M"), None);
        assert_eq!(compute_percentile_str(50.0, 55, "X"), None);
    }

    #[test]
    fn test_age_bands() {
        assert_eq!(age_band(39), None);
        assert_eq!(age_band(40), Some(40));
        assert_eq!(age_band(49), Some(40));
        assert_eq!(age_band(55), Some(50));
        assert_eq!(age_band(79), Some(70));
        assert_eq!(age_band(80), Some(70));
        assert_eq!(age_band(81), None);
    }

    #[test]
    fn test_table_scan() {
        // 男性 60 岁段: [0, 1, 7, 23, 58, 123, 242, 467, 937].
        let p = |s: f64| compute_percentile(s, 63, Gender::Male).unwrap();
        assert_eq!(p(0.0), 0.0);
        assert_eq!(p(1.0), 12.5);
        assert_eq!(p(7.5), 37.5);
        assert_eq!(p(123.0), 62.5);
        assert_eq!(p(937.0), 100.0);
        assert_eq!(p(938.0), 100.0);
        // 女性 40 岁段前四个分界点均为 0.
        assert_eq!(compute_percentile(0.5, 41, Gender::Female), Some(50.0));
    }

    #[test]
    fn test_gender_parse() {
        assert_eq!(Gender::parse("M"), Some(Gender::Male));
        assert_eq!("F".parse::<Gender>(), Ok(Gender::Female));
        assert_eq!(Gender::parse("m"), None);
        assert_eq!(Gender::parse(" F "), None);
        assert_eq!(Gender::parse("male"), None);
        assert_eq!(compute_percentile_str(0.0, 45, "m"), None);
        assert_eq!(compute_percentile(f64::NAN, 50, Gender::Male), None);
    }
}
