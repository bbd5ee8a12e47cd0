//! 由时间帧序列计算血流动力学参数 (CBF / CBV / MTT / TTP), 并判定异常程度.
//!
//! 计算结果只依赖帧序列本身, 不保存任何状态.

mod abnormality;
mod flow;
mod hemodynamics;
mod stats;
mod tic;

pub use abnormality::{
    assess_abnormality, assess_abnormality_with, AbnormalityAssessment, AbnormalityThresholds,
    OverallStatus, ParameterStatus, TtpStatus,
};
pub use flow::{blood_flow, BloodFlowEstimate, RangeStatus};
pub use hemodynamics::{
    analyze_perfusion, analyze_perfusion_with, HemodynamicMaps, PerfusionAnalysis,
    PerfusionConfig,
};
pub use stats::{MapStatistics, PerfusionStats};
pub use tic::TimeIntensityCurve;
