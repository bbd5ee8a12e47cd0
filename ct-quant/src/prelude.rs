//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::{FrameSeries, ScanSlice, Spacing, VolumeBuffer};

pub use crate::consts::DEFAULT_THRESHOLD_HU;
pub use crate::error::{AnalysisError, InvalidSeriesError, InvalidVolumeError};

pub use crate::backend::{BackendState, CancelToken, ExecutionBackend};
pub use crate::calcium::{
    BackendKind, CalciumAnalyzer, CalciumConfig, Component, Connectivity, ScoreResult,
    VesselRegion,
};
pub use crate::perfusion::{
    analyze_perfusion, assess_abnormality, blood_flow, AbnormalityAssessment, PerfusionAnalysis,
    PerfusionStats, TimeIntensityCurve,
};
pub use crate::risk::{assess_risk_category, compute_percentile, Gender, RiskCategory};
