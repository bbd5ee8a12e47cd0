use std::borrow::Cow;
use std::ops::Index;

use ndarray::iter::Iter;
use ndarray::{ArrayView2, Ix2};

use crate::Idx2d;

/// 不可变、借用的二维水平 CT 扫描切片.
pub struct ScanSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::VolumeBuffer`].
    data: ArrayView2<'a, f32>,
}

impl Index<Idx2d> for ScanSlice<'_> {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl<'a> ScanSlice<'a> {
    /// 直接初始化.
    #[inline]
    pub(crate) fn new(data: ArrayView2<'a, f32>) -> Self {
        Self { data }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView2<f32> {
        self.data.view()
    }

    /// 获取可以迭代图像像素的迭代器.
    #[inline]
    pub fn iter(&self) -> Iter<'_, f32, Ix2> {
        self.data.iter()
    }

    /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx2d) -> Option<&f32> {
        self.data.get(pos)
    }

    /// 图像的分辨率 (高, 宽).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.data.dim()
    }

    /// 图像的像素个数.
    #[inline]
    pub fn size(&self) -> usize {
        let (h, w) = self.shape();
        h * w
    }

    /// 以行优先规则, 获取能迭代图像所有 `(索引, CT HU 值)` 的迭代器.
    #[inline]
    pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &f32)> {
        self.data.indexed_iter()
    }

    /// 严格高于 `threshold` 的像素个数.
    #[inline]
    pub fn count_above(&self, threshold: f32) -> usize {
        self.data.iter().filter(|&&hu| hu > threshold).count()
    }

    /// 将图像转化为行优先的序列化存储.
    pub fn as_row_major_vec(&self) -> Vec<f32> {
        let mut buf = Vec::with_capacity(self.size());
        buf.extend(self.iter());
        buf
    }

    /// 获得行优先存储的序列化数据.
    /// 当原始数据本身就是行优先格式时, 可以避免一次 deepcopy.
    pub fn as_row_major_slice(&self) -> Cow<[f32]> {
        match self.data.as_slice() {
            Some(s) => Cow::Borrowed(s),
            None => Cow::Owned(self.as_row_major_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Spacing, VolumeBuffer};
    use std::borrow::Cow;

    #[test]
    fn test_slice_view() {
        let data: Vec<f32> = (0..12).map(|v| v as f32 * 100.0).collect();
        let vol =
            VolumeBuffer::from_raw(data, 3, 2, 2, Spacing::new(1.0, 1.0, 1.0).unwrap()).unwrap();
        let sli = vol.slice_at(1);
        assert_eq!(sli.shape(), (2, 3));
        assert_eq!(sli[(0, 0)], 600.0);
        assert_eq!(sli.get((2, 0)), None);
        // 700, 800, ..., 1100 中严格大于 800 的有 3 个.
        assert_eq!(sli.count_above(800.0), 3);
        assert!(matches!(sli.as_row_major_slice(), Cow::Borrowed(_)));
        assert_eq!(sli.as_row_major_vec()[5], 1100.0);
    }
}
