//! 钙化积分的人群百分位与风险分级.
//!
//! 百分位只是补充信息, 输入超出查表范围时返回 `None` 而不是错误.

mod category;
mod percentile;

pub use category::{assess_risk_category, RiskAssessment, RiskCategory};
pub use percentile::{
    age_band, compute_percentile, compute_percentile_str, percentile_table, Gender, MAX_AGE,
    MIN_AGE,
};
