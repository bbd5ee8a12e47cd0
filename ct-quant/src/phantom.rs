//! 确定性合成体模.
//!
//! 1. [`CalciumPhantom`]: 软组织背景上的球形钙化沉积.
//! 2. [`BolusPhantom`]: 对比剂团注的时间帧序列.
//!
//! 同样的参数 (和种子) 总是生成逐位相同的数据.

use ndarray::Array3;

use crate::error::SeriesResult;
use crate::{FrameSeries, Idx2d, Idx3d, Spacing, VolumeBuffer};

/// 由 `seed` 派生的伪随机 64 位整数.
fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// `[0, 1)` 上的伪随机数.
#[inline]
fn unit(seed: u64) -> f64 {
    (splitmix64(seed) >> 11) as f64 / (1u64 << 53) as f64
}

/// `[lo, hi)` 上的伪随机整数. 要求 `lo < hi`.
#[inline]
fn range(seed: u64, lo: usize, hi: usize) -> usize {
    lo + (unit(seed) * (hi - lo) as f64) as usize
}

/// 球形钙化沉积. 球内 (含边界) 所有体素被设为 `hu`.
///
/// 半径以体素为单位, 与体素间距无关.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Deposit {
    center: Idx3d,
    radius: f64,
    hu: f32,
}

impl Deposit {
    /// `center` 为 (z, H, W).
    pub fn new(center: Idx3d, radius: f64, hu: f32) -> Self {
        Self {
            center,
            radius,
            hu,
        }
    }

    /// 球心.
    #[inline]
    pub fn center(&self) -> Idx3d {
        self.center
    }

    /// 半径 (体素).
    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// 沉积 HU 值.
    #[inline]
    pub fn hu(&self) -> f32 {
        self.hu
    }

    #[inline]
    fn contains(&self, (z, h, w): Idx3d) -> bool {
        let (cz, ch, cw) = self.center;
        let dz = z as f64 - cz as f64;
        let dh = h as f64 - ch as f64;
        let dw = w as f64 - cw as f64;
        dz * dz + dh * dh + dw * dw <= self.radius * self.radius
    }
}

/// 合成心脏 CT 体模构建器.
#[derive(Debug, Clone)]
pub struct CalciumPhantom {
    shape: Idx3d,
    spacing: Spacing,
    background_hu: f32,
    noise_hu: f32,
    seed: u64,
    deposits: Vec<Deposit>,
}

impl CalciumPhantom {
    /// 形状为 (z, H, W) 的体模. 默认背景为 `-100 ± 50` HU 的均匀噪声, 无沉积.
    pub fn new(shape: Idx3d, spacing: Spacing) -> Self {
        Self {
            shape,
            spacing,
            background_hu: -100.0,
            noise_hu: 50.0,
            seed: 0,
            deposits: vec![],
        }
    }

    /// 随机生成 3 ~ 7 个沉积 (半径 2 ~ 5 体素, 强度 150 ~ 799 HU), 球心距边界至少 5 个体素.
    ///
    /// 任一维度不超过 10 时不生成沉积.
    pub fn random(shape: Idx3d, spacing: Spacing, seed: u64) -> Self {
        let mut phantom = Self::new(shape, spacing).with_seed(seed);
        let (d, h, w) = shape;
        if d <= 10 || h <= 10 || w <= 10 {
            return phantom;
        }
        let mut s = splitmix64(seed ^ 0xC0FF_EE00);
        let mut next = || {
            s = splitmix64(s);
            s
        };
        let count = range(next(), 3, 8);
        for _ in 0..count {
            let center = (
                range(next(), 5, d - 5),
                range(next(), 5, h - 5),
                range(next(), 5, w - 5),
            );
            let radius = range(next(), 2, 6) as f64;
            let hu = range(next(), 150, 800) as f32;
            phantom.deposits.push(Deposit::new(center, radius, hu));
        }
        phantom
    }

    /// 设置背景均值与噪声幅度. 背景体素取值于 `[mean - noise, mean + noise)`.
    pub fn with_background(mut self, mean_hu: f32, noise_hu: f32) -> Self {
        self.background_hu = mean_hu;
        self.noise_hu = noise_hu.abs();
        self
    }

    /// 设置噪声种子.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// 添加一个沉积. 后添加的沉积覆盖先添加的.
    pub fn with_deposit(mut self, deposit: Deposit) -> Self {
        self.deposits.push(deposit);
        self
    }

    /// 已添加的沉积.
    #[inline]
    pub fn deposits(&self) -> &[Deposit] {
        &self.deposits
    }

    /// 生成体数据.
    ///
    /// # Panics
    ///
    /// 形状中存在为 0 的维度时 panic.
    pub fn build(&self) -> VolumeBuffer {
        let (_, h, w) = self.shape;
        let data = Array3::from_shape_fn(self.shape, |pos| {
            if let Some(d) = self.deposits.iter().rev().find(|d| d.contains(pos)) {
                return d.hu;
            }
            let (z, y, x) = pos;
            let flat = ((z * h + y) * w + x) as u64;
            let noise = (unit(self.seed.wrapping_mul(0x1000_0000_01B3) ^ flat) * 2.0 - 1.0) as f32;
            self.background_hu + noise * self.noise_hu
        });
        match VolumeBuffer::from_array(data, self.spacing) {
            Ok(v) => v,
            Err(e) => panic!("体模形状非法: {e}"),
        }
    }
}

/// 单个体素上的团注曲线: 以 `peak_frame` 为顶点、半宽为 `spread` 帧的三角脉冲.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Bolus {
    /// 体素位置 (H, W).
    pub pos: Idx2d,
    /// 相对基线的峰值增强.
    pub peak: f32,
    /// 峰值所在帧.
    pub peak_frame: usize,
    /// 半宽 (帧). 为 1 时只有峰值帧有增强.
    pub spread: usize,
}

impl Bolus {
    #[inline]
    fn enhancement(&self, t: usize) -> f32 {
        let spread = self.spread.max(1) as f32;
        let dist = (t as f32 - self.peak_frame as f32).abs();
        (self.peak * (1.0 - dist / spread)).max(0.0)
    }
}

/// 二维灌注帧序列构建器.
#[derive(Debug, Clone)]
pub struct BolusPhantom {
    width: usize,
    height: usize,
    frames: usize,
    dt: f64,
    baseline: f32,
    boluses: Vec<Bolus>,
}

impl BolusPhantom {
    /// `frames` 帧, 每帧 `width * height`, 帧间隔 `dt` 秒, 基线为 0.
    pub fn new(width: usize, height: usize, frames: usize, dt: f64) -> Self {
        Self {
            width,
            height,
            frames,
            dt,
            baseline: 0.0,
            boluses: vec![],
        }
    }

    /// 设置所有体素的基线值.
    pub fn with_baseline(mut self, baseline: f32) -> Self {
        self.baseline = baseline;
        self
    }

    /// 添加一条团注曲线. 同一体素上的多条曲线相加.
    pub fn with_bolus(mut self, bolus: Bolus) -> Self {
        self.boluses.push(bolus);
        self
    }

    /// 生成帧序列. 参数非法时返回 `Err`.
    pub fn build(&self) -> SeriesResult<FrameSeries> {
        let frames = (0..self.frames)
            .map(|t| {
                let mut frame = vec![self.baseline; self.width * self.height];
                for b in self.boluses.iter() {
                    let (h, w) = b.pos;
                    if h < self.height && w < self.width {
                        frame[h * self.width + w] += b.enhancement(t);
                    }
                }
                frame
            })
            .collect();
        FrameSeries::from_frames(frames, self.width, self.height, self.dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spacing() -> Spacing {
        Spacing::new(0.625, 0.625, 3.0).unwrap()
    }

    #[test]
    fn test_background_below_threshold() {
        let vol = CalciumPhantom::new((4, 16, 16), spacing()).with_seed(7).build();
        assert!(vol.as_slice().iter().all(|&v| (-150.0..=-50.0).contains(&v)));
        // 噪声不是常数.
        assert!(vol.as_slice().iter().any(|&v| v != vol.as_slice()[0]));
    }

    #[test]
    fn test_deterministic() {
        let a = CalciumPhantom::random((32, 64, 64), spacing(), 42);
        let b = CalciumPhantom::random((32, 64, 64), spacing(), 42);
        assert_eq!(a.deposits(), b.deposits());
        assert!((3..8).contains(&a.deposits().len()));
        for d in a.deposits() {
            assert!((2.0..6.0).contains(&d.radius()));
            assert!((150.0..800.0).contains(&d.hu()));
            let (z, h, w) = d.center();
            assert!((5..27).contains(&z) && (5..59).contains(&h) && (5..59).contains(&w));
        }
        assert_eq!(a.build().as_slice(), b.build().as_slice());
        assert!(CalciumPhantom::random((8, 64, 64), spacing(), 1)
            .deposits()
            .is_empty());
    }

    #[test]
    fn test_deposit_overrides_background() {
        let vol = CalciumPhantom::new((9, 9, 9), spacing())
            .with_deposit(Deposit::new((4, 4, 4), 1.0, 300.0))
            .build();
        assert_eq!(vol[(4, 4, 4)], 300.0);
        assert_eq!(vol[(3, 4, 4)], 300.0);
        assert!(vol[(3, 3, 4)] < 0.0);
    }

    #[test]
    fn test_bolus_series() {
        let s = BolusPhantom::new(3, 2, 10, 1.0)
            .with_bolus(Bolus {
                pos: (1, 2),
                peak: 100.0,
                peak_frame: 5,
                spread: 1,
            })
            .build()
            .unwrap();
        assert_eq!(s.len(), 10);
        let curve = s.curve(5).to_vec();
        assert_eq!(curve[5], 100.0);
        assert_eq!(curve.iter().filter(|&&v| v != 0.0).count(), 1);
        assert!(s.curve(0).iter().all(|&v| v == 0.0));
    }
}
