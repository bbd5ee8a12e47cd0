use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::consts::perfusion::BASELINE_FRAMES;
use crate::error::{InvalidSeriesError, SeriesResult};
use crate::Idx3d;

/// 按时间排序的帧序列. 每帧是形状为 (z, H, W) 的体素网格 (二维帧时 z = 1).
///
/// 内部以 (帧, 体素) 的二维数组保存, 因此单个体素的时间曲线是一列,
/// 单帧是一行.
#[derive(Debug, Clone)]
pub struct FrameSeries {
    data: Array2<f32>,
    frame_shape: Idx3d,
    dt: f64,
}

impl FrameSeries {
    /// 由若干行优先存储的帧创建序列. `frame_shape` 为 (z, H, W), `dt` 为相邻帧的时间间隔 (秒).
    pub fn new(frames: Vec<Vec<f32>>, frame_shape: Idx3d, dt: f64) -> SeriesResult<Self> {
        if frames.is_empty() {
            return Err(InvalidSeriesError::Empty);
        }
        let (z, h, w) = frame_shape;
        if z == 0 || h == 0 || w == 0 {
            return Err(InvalidSeriesError::BadShape(frame_shape));
        }
        if !(dt.is_finite() && dt > 0.0) {
            return Err(InvalidSeriesError::BadTemporalResolution(dt));
        }
        let voxels = z
            .checked_mul(h)
            .and_then(|v| v.checked_mul(w))
            .ok_or(InvalidSeriesError::BadShape(frame_shape))?;
        let mut buf = Vec::with_capacity(frames.len() * voxels);
        for (index, frame) in frames.iter().enumerate() {
            if frame.len() != voxels {
                return Err(InvalidSeriesError::FrameLengthMismatch {
                    index,
                    expected: voxels,
                    actual: frame.len(),
                });
            }
            buf.extend_from_slice(frame);
        }
        let data = Array2::from_shape_vec((frames.len(), voxels), buf)
            .map_err(|_| InvalidSeriesError::BadShape(frame_shape))?;
        Ok(Self {
            data,
            frame_shape,
            dt,
        })
    }

    /// 由二维帧 (`width * height`) 创建序列.
    #[inline]
    pub fn from_frames(
        frames: Vec<Vec<f32>>,
        width: usize,
        height: usize,
        dt: f64,
    ) -> SeriesResult<Self> {
        Self::new(frames, (1, height, width), dt)
    }

    /// 帧个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    /// 序列是否为空. 构造时保证非空, 因此总是 `false`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 单帧形状 (z, H, W).
    #[inline]
    pub fn frame_shape(&self) -> Idx3d {
        self.frame_shape
    }

    /// 单帧体素个数.
    #[inline]
    pub fn voxel_count(&self) -> usize {
        self.data.ncols()
    }

    /// 时间分辨率 (秒).
    #[inline]
    pub fn temporal_resolution(&self) -> f64 {
        self.dt
    }

    /// 基线窗口长度, 即前 `min(3, 帧数)` 帧.
    #[inline]
    pub fn baseline_len(&self) -> usize {
        self.len().min(BASELINE_FRAMES)
    }

    /// 第 `t` 帧. 越界时 panic.
    #[inline]
    pub fn frame(&self, t: usize) -> ArrayView1<'_, f32> {
        self.data.index_axis(Axis(0), t)
    }

    /// 第 `v` 个体素 (行优先索引) 的时间曲线. 越界时 panic.
    #[inline]
    pub fn curve(&self, v: usize) -> ArrayView1<'_, f32> {
        self.data.index_axis(Axis(1), v)
    }

    /// (帧, 体素) 格式的全部数据.
    #[inline]
    pub fn data(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }
}

#[cfg(test)]
mod tests {
    use super::FrameSeries;
    use crate::error::InvalidSeriesError;

    #[test]
    fn test_series_shape() {
        let frames = vec![vec![0.0, 1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0, 7.0]];
        let s = FrameSeries::from_frames(frames, 2, 2, 0.5).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.frame_shape(), (1, 2, 2));
        assert_eq!(s.voxel_count(), 4);
        assert_eq!(s.baseline_len(), 2);
        assert_eq!(s.curve(3).to_vec(), vec![3.0, 7.0]);
        assert_eq!(s.frame(1)[0], 4.0);
    }

    #[test]
    fn test_series_invalid_input() {
        assert_eq!(
            FrameSeries::from_frames(vec![], 2, 2, 1.0).unwrap_err(),
            InvalidSeriesError::Empty
        );
        assert_eq!(
            FrameSeries::from_frames(vec![vec![0.0; 4], vec![0.0; 3]], 2, 2, 1.0).unwrap_err(),
            InvalidSeriesError::FrameLengthMismatch {
                index: 1,
                expected: 4,
                actual: 3
            }
        );
        assert!(matches!(
            FrameSeries::from_frames(vec![vec![0.0; 4]], 2, 2, 0.0),
            Err(InvalidSeriesError::BadTemporalResolution(_))
        ));
        assert!(matches!(
            FrameSeries::from_frames(vec![vec![]], 0, 2, 1.0),
            Err(InvalidSeriesError::BadShape(_))
        ));
    }

    #[test]
    fn test_series_shape_overflow() {
        assert_eq!(
            FrameSeries::new(vec![vec![0.0]], (usize::MAX, 2, 1), 1.0).unwrap_err(),
            InvalidSeriesError::BadShape((usize::MAX, 2, 1))
        );
    }
}
