//! 候选体素的连通分量标注.
//!
//! 标注与阈值分类、计分彼此独立, 便于单独测试. 面积过滤在标注之后进行.

use std::collections::VecDeque;

use itertools::Itertools;
use ndarray::Array3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::threshold::CandidateMask;
use crate::{Idx3d, Spacing};

/// 连通规则.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Connectivity {
    /// 三维 26-邻域洪泛填充. 临床意义上的病灶.
    #[default]
    Full26,

    /// 每个候选体素单独成为一个分量. 仅用于对照实验.
    Isolated,
}

/// 一个连通分量的全部体素, 按发现顺序排列 (第一个为种子).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    id: usize,
    voxels: Vec<Idx3d>,
}

impl Cluster {
    /// 分量编号. 按行优先的种子发现顺序从 0 开始递增, 面积过滤不会重新编号.
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// 分量内的体素索引.
    #[inline]
    pub fn voxels(&self) -> &[Idx3d] {
        &self.voxels
    }

    /// 体素个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    /// 分量是否为空. 标注结果中的分量总是非空的.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    /// 每层切片上的体素个数 `(z, count)`, 按 `z` 升序.
    pub fn slice_counts(&self) -> Vec<(usize, usize)> {
        self.voxels
            .iter()
            .counts_by(|&(z, _, _)| z)
            .into_iter()
            .sorted_unstable()
            .collect()
    }

    /// 病灶面积 (平方毫米): 逐层 `count * dx * dy` 再累加.
    pub fn area_mm2(&self, spacing: &Spacing) -> f64 {
        let pixel = spacing.slice_pixel();
        self.slice_counts()
            .into_iter()
            .map(|(_, n)| n as f64 * pixel)
            .sum()
    }

    /// 首末切片索引 (含).
    pub fn slice_span(&self) -> (usize, usize) {
        match self.voxels.iter().map(|&(z, _, _)| z).minmax() {
            itertools::MinMaxResult::NoElements => (0, 0),
            itertools::MinMaxResult::OneElement(z) => (z, z),
            itertools::MinMaxResult::MinMax(lo, hi) => (lo, hi),
        }
    }

    /// 体素索引的几何中心 (z, H, W). 空分量返回 `NaN`.
    pub fn centroid(&self) -> (f64, f64, f64) {
        let n = self.voxels.len() as f64;
        let (z, h, w) = self
            .voxels
            .iter()
            .fold((0.0, 0.0, 0.0), |(a, b, c), &(z, h, w)| {
                (a + z as f64, b + h as f64, c + w as f64)
            });
        (z / n, h / n, w / n)
    }
}

/// 获取 `pos` 的 26-邻域中不越界的坐标.
fn neighbours26((z, h, w): Idx3d, (d0, h0, w0): Idx3d) -> impl Iterator<Item = Idx3d> {
    const STEPS: [isize; 3] = [-1, 0, 1];
    STEPS
        .into_iter()
        .cartesian_product(STEPS)
        .cartesian_product(STEPS)
        .filter(|&((dz, dh), dw)| (dz, dh, dw) != (0, 0, 0))
        .filter_map(move |((dz, dh), dw)| {
            let nz = z.checked_add_signed(dz)?;
            let nh = h.checked_add_signed(dh)?;
            let nw = w.checked_add_signed(dw)?;
            (nz < d0 && nh < h0 && nw < w0).then_some((nz, nh, nw))
        })
}

/// 按 `connectivity` 将候选体素分组为连通分量.
///
/// 种子按行优先顺序发现, 分量编号即发现顺序.
pub fn label_components(mask: &CandidateMask, connectivity: Connectivity) -> Vec<Cluster> {
    match connectivity {
        Connectivity::Isolated => mask
            .candidates()
            .enumerate()
            .map(|(id, pos)| Cluster {
                id,
                voxels: vec![pos],
            })
            .collect(),
        Connectivity::Full26 => flood_fill_26(mask),
    }
}

fn flood_fill_26(mask: &CandidateMask) -> Vec<Cluster> {
    let shape = mask.shape();
    let mut visited = Array3::from_elem(shape, false);
    let mut ans = Vec::new();
    let mut bfs_q = VecDeque::with_capacity(64);

    for seed in mask.candidates() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        bfs_q.push_back(seed);
        let mut voxels = Vec::with_capacity(8);
        while let Some(cur) = bfs_q.pop_front() {
            voxels.push(cur);
            for neigh in neighbours26(cur, shape) {
                if mask[neigh] && !visited[neigh] {
                    visited[neigh] = true;
                    bfs_q.push_back(neigh);
                }
            }
        }
        ans.push(Cluster {
            id: ans.len(),
            voxels,
        });
    }
    ans
}

/// 丢弃面积小于 `min_area_mm2` 的分量.
pub fn retain_min_area(
    clusters: Vec<Cluster>,
    spacing: &Spacing,
    min_area_mm2: f64,
) -> Vec<Cluster> {
    clusters
        .into_iter()
        .filter(|c| c.area_mm2(spacing) >= min_area_mm2)
        .collect()
}
