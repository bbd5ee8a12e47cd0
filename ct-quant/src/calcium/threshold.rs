//! 逐体素阈值分类.

use std::ops::Index;

use ndarray::{Array3, ArrayView3, Zip};

use crate::{Idx3d, VolumeBuffer};

/// 判断单个体素是否为钙化候选. 规则为严格大于, `NaN` 永远不是候选.
#[inline]
pub fn is_candidate(hu: f32, threshold_hu: f32) -> bool {
    hu > threshold_hu
}

/// 与体数据对齐的候选体素掩膜, 按 (z, H, W) 访问.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMask {
    data: Array3<bool>,
}

impl Index<Idx3d> for CandidateMask {
    type Output = bool;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl CandidateMask {
    #[inline]
    pub(crate) fn from_array(data: Array3<bool>) -> Self {
        Self { data }
    }

    /// 掩膜形状 (z, H, W).
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 候选体素个数.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// 第 `z` 层切片上的候选体素个数. 越界时 panic.
    pub fn slice_count(&self, z: usize) -> usize {
        self.data
            .index_axis(ndarray::Axis(0), z)
            .iter()
            .filter(|&&v| v)
            .count()
    }

    /// 以行优先顺序迭代所有候选体素的索引.
    pub fn candidates(&self) -> impl Iterator<Item = Idx3d> + '_ {
        self.data
            .indexed_iter()
            .filter_map(|(pos, &v)| v.then_some(pos))
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, bool> {
        self.data.view()
    }
}

/// 对体数据逐体素做阈值分类: `候选 = HU > threshold_hu`.
///
/// 纯函数. 打开 `rayon` feature 时并行计算, 结果与串行版本完全相同.
pub fn classify(volume: &VolumeBuffer, threshold_hu: f32) -> CandidateMask {
    let mut data = Array3::from_elem(volume.shape(), false);
    let zip = Zip::from(&mut data).and(volume.data());
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            zip.par_for_each(|m, &hu| *m = is_candidate(hu, threshold_hu));
        } else {
            zip.for_each(|m, &hu| *m = is_candidate(hu, threshold_hu));
        }
    }
    CandidateMask::from_array(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Spacing;

    fn volume(values: Vec<f32>, w: usize, h: usize, d: usize) -> VolumeBuffer {
        VolumeBuffer::from_raw(values, w, h, d, Spacing::new(1.0, 1.0, 1.0).unwrap()).unwrap()
    }

    #[test]
    fn test_strict_boundary() {
        let vol = volume(vec![129.0, 130.0, 130.5, 900.0, f32::NAN, -1000.0], 3, 2, 1);
        let mask = classify(&vol, 130.0);
        assert_eq!(mask.count(), 2);
        assert!(!mask[(0, 0, 1)]);
        assert!(mask[(0, 0, 2)]);
        assert!(mask[(0, 1, 0)]);
        assert!(!mask[(0, 1, 1)]);
    }

    #[test]
    fn test_candidates_row_major() {
        let vol = volume(vec![0.0, 200.0, 0.0, 0.0, 300.0, 0.0, 0.0, 400.0], 2, 2, 2);
        let mask = classify(&vol, 130.0);
        let got: Vec<_> = mask.candidates().collect();
        assert_eq!(got, vec![(0, 0, 1), (1, 0, 0), (1, 1, 1)]);
        assert_eq!(mask.slice_count(0), 1);
        assert_eq!(mask.slice_count(1), 2);
    }
}
