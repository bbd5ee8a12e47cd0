//! 仅由 Agatston 积分决定的风险分级.

use std::fmt::{self, Display, Formatter};

use log::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 风险等级.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RiskCategory {
    /// `score <= 10`.
    Minimal,
    /// `10 < score <= 100`.
    Mild,
    /// `100 < score <= 400`.
    Moderate,
    /// `score > 400`.
    Severe,
}

impl Display for RiskCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Minimal => "Minimal",
            Self::Mild => "Mild",
            Self::Moderate => "Moderate",
            Self::Severe => "Severe",
        })
    }
}

/// 风险评估: 等级、描述与固定的建议列表.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct RiskAssessment {
    /// 等级.
    pub category: RiskCategory,
    /// 描述.
    pub description: &'static str,
    /// 建议.
    pub recommendations: &'static [&'static str],
}

const ZERO: RiskAssessment = RiskAssessment {
    category: RiskCategory::Minimal,
    description: "Very low risk of coronary heart disease",
    recommendations: &[
        "Continue current lifestyle",
        "Routine follow-up in 5-10 years",
        "Focus on primary prevention",
    ],
};

const MINIMAL: RiskAssessment = RiskAssessment {
    category: RiskCategory::Minimal,
    description: "Low risk of coronary heart disease",
    recommendations: &[
        "Continue healthy lifestyle",
        "Consider follow-up in 3-5 years",
        "Monitor traditional risk factors",
    ],
};

const MILD: RiskAssessment = RiskAssessment {
    category: RiskCategory::Mild,
    description: "Mild coronary atherosclerosis",
    recommendations: &[
        "Lifestyle modifications recommended",
        "Consider statin therapy if indicated",
        "Follow-up in 3-5 years",
    ],
};

const MODERATE: RiskAssessment = RiskAssessment {
    category: RiskCategory::Moderate,
    description: "Moderate coronary atherosclerosis",
    recommendations: &[
        "Aggressive lifestyle modifications",
        "Statin therapy recommended",
        "Consider additional cardiac evaluation",
        "Follow-up in 2-3 years",
    ],
};

const SEVERE: RiskAssessment = RiskAssessment {
    category: RiskCategory::Severe,
    description: "Extensive coronary atherosclerosis",
    recommendations: &[
        "Intensive medical therapy",
        "Cardiology consultation recommended",
        "Consider stress testing",
        "Annual follow-up recommended",
    ],
};

/// 由 Agatston 积分给出风险评估. 与年龄、性别无关.
///
/// 0 分有单独的 "极低风险" 描述. `NaN` 不满足任何上界, 归入 [`RiskCategory::Severe`].
pub fn assess_risk_category(score: f64) -> RiskAssessment {
    let assessment = if score == 0.0 {
        ZERO
    } else if score <= 10.0 {
        MINIMAL
    } else if score <= 100.0 {
        MILD
    } else if score <= 400.0 {
        MODERATE
    } else {
        SEVERE
    };
    debug!("Agatston {score:.1} -> {}", assessment.category);
    assessment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries() {
        let c = |s: f64| assess_risk_category(s).category;
        assert_eq!(c(0.0), RiskCategory::Minimal);
        assert_eq!(c(10.0), RiskCategory::Minimal);
        assert_eq!(c(10.5), RiskCategory::Mild);
        assert_eq!(c(11.0), RiskCategory::Mild);
        assert_eq!(c(100.0), RiskCategory::Mild);
        assert_eq!(c(101.0), RiskCategory::Moderate);
        assert_eq!(c(400.0), RiskCategory::Moderate);
        assert_eq!(c(401.0), RiskCategory::Severe);
    }

    #[test]
    fn test_zero_has_own_wording() {
        let zero = assess_risk_category(0.0);
        let low = assess_risk_category(5.0);
        assert_eq!(zero.category, low.category);
        assert_ne!(zero.description, low.description);
        assert_eq!(zero.recommendations.len(), 3);
        assert_eq!(assess_risk_category(1000.0).recommendations.len(), 4);
        assert_eq!(RiskCategory::Moderate.to_string(), "Moderate");
    }
}
