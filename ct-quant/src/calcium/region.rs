//! 冠脉分区 (LAD / LCX / RCA / LM).
//!
//! 默认的象限规则是非临床的粗略启发式, 因此以 trait 的形式暴露, 可整体替换.

use std::fmt::{self, Debug, Display, Formatter};
use std::ops::{Index, IndexMut};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Idx3d;

/// 冠脉分区.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VesselRegion {
    /// 左前降支.
    Lad,
    /// 左回旋支.
    Lcx,
    /// 右冠状动脉.
    Rca,
    /// 左主干.
    Lm,
}

impl VesselRegion {
    /// 全部分区, 顺序固定.
    pub const ALL: [VesselRegion; 4] = [Self::Lad, Self::Lcx, Self::Rca, Self::Lm];

    /// 分区的缩写名.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Lad => "LAD",
            Self::Lcx => "LCX",
            Self::Rca => "RCA",
            Self::Lm => "LM",
        }
    }

    #[inline]
    const fn ordinal(self) -> usize {
        match self {
            Self::Lad => 0,
            Self::Lcx => 1,
            Self::Rca => 2,
            Self::Lm => 3,
        }
    }
}

impl Display for VesselRegion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 为病灶指定所属冠脉分区的策略.
pub trait RegionAssigner: Debug + Send + Sync {
    /// `centroid` 为病灶几何中心 (z, H, W), `shape` 为体数据形状 (z, H, W).
    fn assign(&self, centroid: (f64, f64, f64), shape: Idx3d) -> VesselRegion;
}

/// 象限启发式: 按中心在宽度方向与高度方向上的相对位置划分.
///
/// `x < 0.4` 时, `y < 0.5` 为 LAD, 否则为 LCX; `x > 0.6` 为 RCA; 其余为 LM.
#[derive(Debug, Copy, Clone, Default)]
pub struct QuadrantAssigner;

impl RegionAssigner for QuadrantAssigner {
    fn assign(&self, (_, y, x): (f64, f64, f64), (_, h, w): Idx3d) -> VesselRegion {
        let y_rel = y / h as f64;
        let x_rel = x / w as f64;
        if x_rel < 0.4 {
            if y_rel < 0.5 {
                VesselRegion::Lad
            } else {
                VesselRegion::Lcx
            }
        } else if x_rel > 0.6 {
            VesselRegion::Rca
        } else {
            VesselRegion::Lm
        }
    }
}

/// 每个冠脉分区的 Agatston 分数. 四个分区总是全部存在.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegionScores {
    scores: [f64; 4],
}

impl Index<VesselRegion> for RegionScores {
    type Output = f64;

    #[inline]
    fn index(&self, index: VesselRegion) -> &Self::Output {
        &self.scores[index.ordinal()]
    }
}

impl IndexMut<VesselRegion> for RegionScores {
    #[inline]
    fn index_mut(&mut self, index: VesselRegion) -> &mut Self::Output {
        &mut self.scores[index.ordinal()]
    }
}

impl RegionScores {
    /// 按 [`VesselRegion::ALL`] 的顺序迭代 `(分区, 分数)`.
    pub fn iter(&self) -> impl Iterator<Item = (VesselRegion, f64)> + '_ {
        VesselRegion::ALL.into_iter().map(|r| (r, self[r]))
    }

    /// 全部分区之和.
    pub fn total(&self) -> f64 {
        self.scores.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadrant_rules() {
        let a = QuadrantAssigner;
        let shape = (10, 100, 100);
        assert_eq!(a.assign((5.0, 20.0, 10.0), shape), VesselRegion::Lad);
        assert_eq!(a.assign((5.0, 70.0, 10.0), shape), VesselRegion::Lcx);
        assert_eq!(a.assign((5.0, 20.0, 80.0), shape), VesselRegion::Rca);
        assert_eq!(a.assign((5.0, 20.0, 50.0), shape), VesselRegion::Lm);
        // 边界: 0.4 与 0.6 都属于 LM.
        assert_eq!(a.assign((0.0, 0.0, 40.0), shape), VesselRegion::Lm);
        assert_eq!(a.assign((0.0, 0.0, 60.0), shape), VesselRegion::Lm);
    }

    #[test]
    fn test_region_scores() {
        let mut s = RegionScores::default();
        s[VesselRegion::Rca] += 12.5;
        s[VesselRegion::Lad] += 2.5;
        assert_eq!(s.total(), 15.0);
        let names: Vec<_> = s.iter().map(|(r, _)| r.to_string()).collect();
        assert_eq!(names, vec!["LAD", "LCX", "RCA", "LM"]);
        assert_eq!(s[VesselRegion::Lm], 0.0);
    }
}
