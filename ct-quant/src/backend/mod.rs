//! 执行后端: GPU 计算着色器优先, CPU 回退.
//!
//! 状态机:
//!
//! ```text
//! Uninitialized --(创建成功)--> GpuReady --(设备丢失)--> Failed
//!       |
//!       +--------(创建失败)--> CpuFallback
//! ```
//!
//! 任何 GPU 故障都会让 *本次调用* 整体在 CPU 上重新计算, 部分 GPU 结果被丢弃.
//! 设备丢失之后的调用不再尝试 GPU.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::calcium::{BackendKind, CalciumConfig, ScanEvidence, ScoreResult};
use crate::consts::BACKEND_ENV;
use crate::error::{AnalysisError, AnalysisResult, GpuError};
use crate::VolumeBuffer;

mod cpu;
mod kernel;
mod slices;
#[cfg(feature = "gpu")]
mod wgpu_kernel;

pub use kernel::{
    GpuProvider, ReferenceKernel, ReferenceProvider, SliceKernel, SliceReadback,
    UnavailableProvider, PACKED_EMPTY,
};
#[cfg(feature = "gpu")]
pub use wgpu_kernel::{WgpuKernel, WgpuProvider};

use slices::SliceRunError;

/// GPU 上下文的生命周期状态.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BackendState {
    /// 尚未尝试创建 GPU 上下文.
    Uninitialized,
    /// GPU 上下文可用.
    GpuReady,
    /// GPU 上下文创建失败, 此后总是使用 CPU.
    CpuFallback,
    /// GPU 设备已丢失, 此后总是使用 CPU.
    Failed,
}

/// 后端偏好.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BackendPreference {
    /// 优先 GPU, 失败时回退到 CPU.
    #[default]
    Auto,
    /// 只使用 CPU, 从不创建 GPU 上下文.
    CpuOnly,
}

impl BackendPreference {
    /// 解析环境变量取值. `cpu` (不区分大小写, 忽略首尾空白) 为 [`Self::CpuOnly`], 其余为 [`Self::Auto`].
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("cpu") {
            Self::CpuOnly
        } else {
            Self::Auto
        }
    }

    /// 读取环境变量 [`BACKEND_ENV`]. 未设置时为 [`Self::Auto`].
    pub fn from_env() -> Self {
        std::env::var(BACKEND_ENV)
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }
}

/// 尽力而为的取消令牌. 克隆体共享同一个标志, 在切片之间被检查.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// 新的、未取消的令牌.
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// 是否已请求取消.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// 构建时启用的默认 GPU 提供者.
pub fn default_provider() -> Arc<dyn GpuProvider> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "gpu")] {
            Arc::new(WgpuProvider::default())
        } else {
            Arc::new(UnavailableProvider)
        }
    }
}

#[derive(Debug)]
struct GpuSlot {
    state: BackendState,
    kernel: Option<Box<dyn SliceKernel>>,
}

/// 一次 GPU 尝试的结局.
enum GpuAttempt<'a> {
    Done(ScanEvidence<'a>),
    Cancelled,
    Unavailable,
}

/// GPU / CPU 双路径执行后端.
///
/// GPU 上下文是独占资源, 由内部互斥锁串行化; CPU 路径不共享可变状态, 可以完全并发.
#[derive(Debug)]
pub struct ExecutionBackend {
    preference: BackendPreference,
    provider: Arc<dyn GpuProvider>,
    slot: Mutex<GpuSlot>,
}

impl Default for ExecutionBackend {
    fn default() -> Self {
        Self::new(default_provider())
    }
}

impl ExecutionBackend {
    /// 以 `provider` 探测 GPU 的自动后端. 首次使用时才创建上下文.
    pub fn new(provider: Arc<dyn GpuProvider>) -> Self {
        Self {
            preference: BackendPreference::Auto,
            provider,
            slot: Mutex::new(GpuSlot {
                state: BackendState::Uninitialized,
                kernel: None,
            }),
        }
    }

    /// 只使用 CPU 的后端.
    pub fn cpu_only() -> Self {
        Self::new(Arc::new(UnavailableProvider)).with_preference(BackendPreference::CpuOnly)
    }

    /// 使用默认提供者, 偏好取自环境变量 [`BACKEND_ENV`].
    pub fn from_env() -> Self {
        Self::default().with_preference(BackendPreference::from_env())
    }

    /// 设置偏好.
    pub fn with_preference(mut self, preference: BackendPreference) -> Self {
        self.preference = preference;
        self
    }

    /// 偏好.
    #[inline]
    pub fn preference(&self) -> BackendPreference {
        self.preference
    }

    /// 当前 GPU 上下文状态.
    pub fn state(&self) -> BackendState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, GpuSlot> {
        // 持锁期间的 panic 不会破坏 `GpuSlot` 的一致性.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 计算钙化积分. 体数据的合法性由 `VolumeBuffer` 在构造时保证.
    pub(crate) fn compute(
        &self,
        volume: &VolumeBuffer,
        threshold_hu: f32,
        config: &CalciumConfig,
        cancel: &CancelToken,
    ) -> AnalysisResult<ScoreResult> {
        let spacing = volume.spacing();
        if self.preference == BackendPreference::Auto {
            match self.try_gpu(volume, threshold_hu, config, cancel) {
                GpuAttempt::Done(evidence) => {
                    return Ok(evidence.into_score(&spacing, threshold_hu, config, BackendKind::Gpu))
                }
                GpuAttempt::Cancelled => return Err(AnalysisError::Cancelled),
                GpuAttempt::Unavailable => {}
            }
        }
        let evidence = cpu::collect_evidence(volume, threshold_hu, config.calibration(), cancel)?;
        Ok(evidence.into_score(&spacing, threshold_hu, config, BackendKind::Cpu))
    }

    /// 持锁运行 GPU 路径. 锁在标注之前释放.
    fn try_gpu(
        &self,
        volume: &VolumeBuffer,
        threshold_hu: f32,
        config: &CalciumConfig,
        cancel: &CancelToken,
    ) -> GpuAttempt<'static> {
        let mut slot = self.lock();
        if slot.state == BackendState::Uninitialized {
            match self.provider.create() {
                Ok(kernel) => {
                    info!("GPU 计算上下文已就绪: {}", kernel.name());
                    slot.kernel = Some(kernel);
                    slot.state = BackendState::GpuReady;
                }
                Err(e) => {
                    warn!("{e}, 此后使用 CPU 计算");
                    slot.state = BackendState::CpuFallback;
                }
            }
        }
        if slot.state != BackendState::GpuReady {
            return GpuAttempt::Unavailable;
        }
        let Some(kernel) = slot.kernel.as_mut() else {
            slot.state = BackendState::CpuFallback;
            return GpuAttempt::Unavailable;
        };

        match slices::collect_evidence(
            kernel.as_mut(),
            volume,
            threshold_hu,
            config.calibration(),
            cancel,
        ) {
            Ok(evidence) => GpuAttempt::Done(evidence),
            Err(SliceRunError::Cancelled) => GpuAttempt::Cancelled,
            Err(SliceRunError::Gpu(e @ GpuError::DeviceLost(_))) => {
                warn!("{e}, 本次及此后的调用使用 CPU 计算");
                slot.kernel = None;
                slot.state = BackendState::Failed;
                GpuAttempt::Unavailable
            }
            Err(SliceRunError::Gpu(e)) => {
                warn!("{e}, 本次调用整体回退到 CPU");
                GpuAttempt::Unavailable
            }
        }
    }
}
