use std::ops::Index;
use std::path::Path;

use ndarray::{Array3, ArrayView3, Axis};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use thiserror::Error;

use crate::error::{InvalidVolumeError, VolumeResult};
use crate::{Idx2d, Idx3d};

mod frames;
mod slice;
mod spacing;

pub use frames::FrameSeries;
pub use slice::ScanSlice;
pub use spacing::Spacing;

/// 打开 nii 文件时的错误.
#[derive(Debug, Error)]
pub enum OpenVolumeError {
    /// nifti 解码失败.
    #[error(transparent)]
    Nifti(#[from] nifti::NiftiError),

    /// 文件内容不构成合法体数据.
    #[error(transparent)]
    Invalid(#[from] InvalidVolumeError),
}

/// 3D CT 体数据. HU 值以 `f32` 连续保存, 按 (z, H, W) 访问.
///
/// 该结构在构造后是只读的; 维度信息与缓冲区分开保存, 构造时仅用缓冲区长度做一致性校验.
#[derive(Debug, Clone)]
pub struct VolumeBuffer {
    spacing: Spacing,
    data: Array3<f32>,
}

/// 将 nifti header 中的 (W, H, z) 转换成 (z, H, W).
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    let [_, w, h, z, ..] = h.dim;
    (z as usize, h as usize, w as usize)
}

impl Index<Idx3d> for VolumeBuffer {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl VolumeBuffer {
    /// 由裸缓冲区和显式维度创建体数据.
    ///
    /// `data` 按行优先存储, 宽度方向变化最快, 其次是高度, 最后是切片.
    /// 若任一维度为 0, 或 `data.len() != width * height * depth`, 返回 `Err`.
    pub fn from_raw(
        data: Vec<f32>,
        width: usize,
        height: usize,
        depth: usize,
        spacing: Spacing,
    ) -> VolumeResult<Self> {
        let bad_dim = InvalidVolumeError::BadDimension {
            width,
            height,
            depth,
        };
        if width == 0 || height == 0 || depth == 0 {
            return Err(bad_dim);
        }
        let expected = width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(depth))
            .ok_or(bad_dim)?;
        if data.len() != expected {
            return Err(InvalidVolumeError::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }
        let data = Array3::from_shape_vec((depth, height, width), data).map_err(|_| {
            InvalidVolumeError::LengthMismatch {
                expected,
                actual: expected,
            }
        })?;
        Ok(Self { spacing, data })
    }

    /// 直接包装 (z, H, W) 格式的数组.
    pub fn from_array(data: Array3<f32>, spacing: Spacing) -> VolumeResult<Self> {
        let (depth, height, width) = data.dim();
        if width == 0 || height == 0 || depth == 0 {
            return Err(InvalidVolumeError::BadDimension {
                width,
                height,
                depth,
            });
        }
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        Ok(Self { spacing, data })
    }

    /// 打开 nii 文件格式的 3D CT 扫描. 体素间距取自 header 的 `pixdim`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, OpenVolumeError> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = obj.header().clone();
        let (depth, height, width) = get_shape_from_header(&header);
        let [_, pw, ph, pz, ..] = header.pixdim;
        let spacing = Spacing::new(pw as f64, ph as f64, pz as f64)?;

        // [W, H, z] -> [z, H, W].
        let data = obj
            .into_volume()
            .into_ndarray::<f32>()?
            .permuted_axes([2, 1, 0].as_slice());
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        Ok(Self::from_raw(
            data.into_raw_vec(),
            width,
            height,
            depth,
            spacing,
        )?)
    }

    /// 获取数据形状 (z, H, W).
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 获取水平切片形状 (H, W).
    #[inline]
    pub fn slice_shape(&self) -> Idx2d {
        let (_, h, w) = self.shape();
        (h, w)
    }

    /// 宽 (自然图像的水平方向).
    #[inline]
    pub fn width(&self) -> usize {
        self.shape().2
    }

    /// 高 (自然图像的垂直方向).
    #[inline]
    pub fn height(&self) -> usize {
        self.shape().1
    }

    /// 水平切片个数.
    #[inline]
    pub fn depth(&self) -> usize {
        self.shape().0
    }

    /// 体素个数.
    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 检查索引是否合法.
    #[inline]
    pub fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 体素间距.
    #[inline]
    pub fn spacing(&self) -> Spacing {
        self.spacing
    }

    /// 单个体素的体积, 以立方毫米为单位.
    #[inline]
    pub fn voxel(&self) -> f64 {
        self.spacing.voxel()
    }

    /// 水平切片上单个像素的面积, 以平方毫米为单位.
    #[inline]
    pub fn slice_pixel(&self) -> f64 {
        self.spacing.slice_pixel()
    }

    /// 获取第 `z_index` 层水平切片视图. 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> ScanSlice<'_> {
        ScanSlice::new(self.data.index_axis(Axis(0), z_index))
    }

    /// 获取能按升序迭代水平切片的迭代器.
    #[inline]
    pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = ScanSlice> {
        self.data.axis_iter(Axis(0)).map(ScanSlice::new)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// 获得行优先的底层连续存储.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        // 构造时保证了标准布局.
        self.data
            .as_slice()
            .unwrap_or_else(|| unreachable!("VolumeBuffer 总是标准布局"))
    }

    /// 计算由 `it` 给出的所有索引对应的 HU 平均值. 空迭代器返回 `NaN`.
    ///
    /// 如果存在越界索引, 则程序 panic.
    pub fn mean_hu<I: IntoIterator<Item = Idx3d>>(&self, it: I) -> f64 {
        let mut count = 0u64;
        let mut hu = 0.0;
        for pos in it.into_iter() {
            count += 1;
            hu += self[pos] as f64;
        }
        hu / (count as f64)
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
    }
}

/// 并发操作部分
#[cfg(feature = "rayon")]
impl VolumeBuffer {
    /// 借助 `rayon`, 并行地对每个水平切片求值 `op`, 结果按切片索引升序排列.
    pub fn par_map_indexed_slices<T, F>(&self, op: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize, ScanSlice) -> T + Sync + Send,
    {
        self.data
            .axis_iter(Axis(0))
            .into_par_iter()
            .enumerate()
            .map(|(i, v)| op(i, ScanSlice::new(v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spacing() -> Spacing {
        Spacing::new(0.5, 0.5, 2.0).unwrap()
    }

    #[test]
    fn test_from_raw_layout() {
        // width 3, height 2, depth 2
        let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let vol = VolumeBuffer::from_raw(data, 3, 2, 2, spacing()).unwrap();
        assert_eq!(vol.shape(), (2, 2, 3));
        assert_eq!(vol[(0, 0, 2)], 2.0);
        assert_eq!(vol[(0, 1, 0)], 3.0);
        assert_eq!(vol[(1, 0, 0)], 6.0);
        assert_eq!(vol.slice_at(1).shape(), (2, 3));
        assert_eq!(vol.as_slice().len(), 12);
    }

    #[test]
    fn test_from_raw_length_mismatch() {
        let err = VolumeBuffer::from_raw(vec![0.0; 11], 3, 2, 2, spacing()).unwrap_err();
        assert_eq!(
            err,
            InvalidVolumeError::LengthMismatch {
                expected: 12,
                actual: 11
            }
        );
    }

    #[test]
    fn test_from_raw_zero_dimension() {
        let err = VolumeBuffer::from_raw(vec![], 0, 2, 2, spacing()).unwrap_err();
        assert!(matches!(err, InvalidVolumeError::BadDimension { .. }));
    }

    #[test]
    fn test_voxel_geometry() {
        let vol = VolumeBuffer::from_raw(vec![0.0; 8], 2, 2, 2, spacing()).unwrap();
        assert_eq!(vol.slice_pixel(), 0.25);
        assert_eq!(vol.voxel(), 0.5);
        assert!(vol.check(&(1, 1, 1)));
        assert!(!vol.check(&(2, 0, 0)));
    }

    #[test]
    fn test_mean_hu() {
        let data: Vec<f32> = (0..8).map(|v| v as f32).collect();
        let vol = VolumeBuffer::from_raw(data, 2, 2, 2, spacing()).unwrap();
        assert_eq!(vol.mean_hu([(0, 0, 0), (1, 1, 1)]), 3.5);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_par_map_preserves_order() {
        let data: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let vol = VolumeBuffer::from_raw(data, 2, 3, 4, spacing()).unwrap();
        let sums = vol.par_map_indexed_slices(|z, s| (z, s.iter().sum::<f32>()));
        let serial: Vec<_> = vol
            .slice_iter()
            .enumerate()
            .map(|(z, s)| (z, s.iter().sum::<f32>()))
            .collect();
        assert_eq!(sums, serial);
    }
}
