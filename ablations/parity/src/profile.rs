//! 后端运行统计.

use std::time::{Duration, Instant};

/// 累计计时器. 每个后端策略持有两个: 一个只累计各用例的积分计算,
/// 另一个从策略开始一直计到结束 (含 GPU 初始化与回退开销).
#[derive(Clone, Debug)]
struct AccTimer {
    consumed: Duration,
    since: Instant,
}

impl AccTimer {
    /// 创建即开始计时, 用于策略总时长.
    #[inline]
    fn new() -> Self {
        Self {
            consumed: Duration::ZERO,
            since: Instant::now(),
        }
    }

    /// 开始计一个用例 (一个体数据 × 一个阈值).
    #[inline]
    fn start(&mut self) {
        self.since = Instant::now();
    }

    /// 结束本轮并累加, 返回本轮时长以便找出最慢的用例.
    #[inline]
    fn elapsed(&mut self) -> Duration {
        let d = self.since.elapsed();
        self.consumed += d;
        d
    }

    /// 累计时长 (微秒), 写入对比报告.
    #[inline]
    fn total_us(&self) -> u64 {
        self.consumed.as_micros() as u64
    }
}

/// 单个执行策略的统计.
#[derive(Clone, Debug)]
pub struct Profile {
    /// 成功完成的用例个数.
    cases: u64,

    /// 由 GPU 给出结果的用例个数.
    gpu_hits: u64,

    /// 失败 (返回 `Err`) 的用例个数.
    failures: u64,

    /// 只统计积分计算本身.
    case_time: AccTimer,

    /// 整个策略的运行时间, 包括后端初始化.
    real_time: AccTimer,

    /// 最耗时的一次用例.
    most: Option<Duration>,

    /// 各用例的 Agatston 积分, 按用例顺序排列. 失败的用例为 `None`.
    scores: Vec<Option<f64>>,
}

impl Profile {
    /// 初始化.
    #[inline]
    pub fn new() -> Self {
        Self {
            cases: 0,
            gpu_hits: 0,
            failures: 0,
            case_time: AccTimer::new(),
            real_time: AccTimer::new(),
            most: None,
            scores: vec![],
        }
    }

    /// 开始一次用例计时.
    #[inline]
    pub fn case_start(&mut self) {
        self.case_time.start();
    }

    /// 结束一次用例计时并记录结果.
    pub fn case_finished(&mut self, agatston: Option<f64>, on_gpu: bool) {
        let d = self.case_time.elapsed();
        self.most = Some(self.most.map_or(d, |m| m.max(d)));
        match agatston {
            Some(_) => {
                self.cases += 1;
                self.gpu_hits += u64::from(on_gpu);
            }
            None => self.failures += 1,
        }
        self.scores.push(agatston);
    }

    /// 结束全部计时.
    #[inline]
    pub fn finish(mut self) -> Self {
        self.real_time.elapsed();
        self
    }

    /// 成功的用例个数.
    #[inline]
    pub fn get_cases(&self) -> u64 {
        self.cases
    }

    /// 由 GPU 完成的用例个数.
    #[inline]
    pub fn get_gpu_hits(&self) -> u64 {
        self.gpu_hits
    }

    /// 失败的用例个数.
    #[inline]
    pub fn get_failures(&self) -> u64 {
        self.failures
    }

    /// 用例总耗时 (微秒).
    #[inline]
    pub fn get_case_time_us(&self) -> u64 {
        self.case_time.total_us()
    }

    /// 策略总耗时 (微秒).
    #[inline]
    pub fn get_real_time_us(&self) -> u64 {
        self.real_time.total_us()
    }

    /// 用例平均耗时 (微秒). 没有成功用例时为 `None`.
    #[inline]
    pub fn get_avg_case_time_us(&self) -> Option<f64> {
        match self.cases {
            0 => None,
            n => Some(self.get_case_time_us() as f64 / n as f64),
        }
    }

    /// 最耗时的一次用例.
    #[inline]
    pub fn get_most_time_consuming(&self) -> Option<Duration> {
        self.most
    }

    /// 与 `baseline` 逐用例比较 Agatston 积分, 返回最大相对误差.
    ///
    /// 两者都为 0 的用例误差记为 0. 没有可比较用例时返回 `None`.
    pub fn max_relative_error(&self, baseline: &Profile) -> Option<f64> {
        self.scores
            .iter()
            .zip(baseline.scores.iter())
            .filter_map(|(a, b)| Some((a.as_ref()?, b.as_ref()?)))
            .map(|(&a, &b)| {
                let denom = a.abs().max(b.abs());
                if denom == 0.0 {
                    0.0
                } else {
                    (a - b).abs() / denom
                }
            })
            .reduce(f64::max)
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new()
    }
}
