//! 通用常量.

/// 默认钙化阈值 (HU). 判定规则为严格大于.
pub const DEFAULT_THRESHOLD_HU: f32 = 130.0;

/// 病灶面积下限 (平方毫米). 面积小于该值的连通分量在计分前被丢弃.
pub const MIN_LESION_AREA_MM2: f64 = 1.0;

/// 常用的心脏 CT 体素间距 `(dx, dy, dz)`, 以毫米为单位.
pub const CARDIAC_SPACING_MM: [f64; 3] = [0.625, 0.625, 3.0];

/// Agatston 密度因子的 HU 分界点.
pub mod density {
    /// 密度因子 1 的下界 (含).
    pub const FACTOR_1_HU: f32 = 130.0;

    /// 密度因子 2 的下界 (含).
    pub const FACTOR_2_HU: f32 = 200.0;

    /// 密度因子 3 的下界 (含).
    pub const FACTOR_3_HU: f32 = 300.0;

    /// 密度因子 4 的下界 (含).
    pub const FACTOR_4_HU: f32 = 400.0;
}

/// 质量积分的线性密度校准 (占位公式, 非体模标定).
pub mod calibration {
    /// `density = SLOPE * (HU + OFFSET_HU)` mg/cm³ 中的斜率.
    pub const SLOPE: f64 = 0.5;

    /// `density = SLOPE * (HU + OFFSET_HU)` mg/cm³ 中的偏移.
    pub const OFFSET_HU: f64 = 1000.0;
}

/// 灌注参数计算常量.
pub mod perfusion {
    /// 基线最多取前几帧.
    pub const BASELINE_FRAMES: usize = 3;

    /// CBF 比例系数.
    pub const CBF_SCALE: f64 = 100.0;

    /// CBV 比例系数.
    pub const CBV_SCALE: f64 = 4.0;

    /// MTT 比例系数 (分钟 -> 秒).
    pub const MTT_SCALE: f64 = 60.0;

    /// 只有 CBF 严格大于该值时才计算 MTT.
    pub const CBF_GATE: f64 = 1.0;

    /// 不存在正斜率时的默认最大斜率.
    pub const DEFAULT_SLOPE: f64 = 1.0;

    /// 由 AIF 估计的 CBF 截断上限 (mL/min/100g).
    pub const AIF_CBF_MAX: f64 = 100.0;

    /// AIF 估计 CBF 的正常范围 (含端点).
    pub const AIF_CBF_NORMAL: (f64, f64) = (40.0, 60.0);

    /// 由组织曲线得到的 MTT 的正常范围 (秒, 含端点).
    pub const CURVE_MTT_NORMAL: (f64, f64) = (4.0, 6.0);
}

/// 灌注异常分级阈值.
pub mod abnormality {
    /// CBF 低于该值判定为偏低.
    pub const CBF_LOW: f64 = 30.0;

    /// CBF 高于该值判定为偏高.
    pub const CBF_HIGH: f64 = 80.0;

    /// CBV 低于该值判定为偏低.
    pub const CBV_LOW: f64 = 2.5;

    /// CBV 高于该值判定为偏高.
    pub const CBV_HIGH: f64 = 5.0;

    /// MTT 低于该值判定为偏低.
    pub const MTT_LOW: f64 = 2.0;

    /// MTT 高于该值判定为偏高.
    pub const MTT_HIGH: f64 = 8.0;

    /// TTP 均值高于该值 (秒) 判定为延迟.
    pub const TTP_DELAYED: f64 = 10.0;
}

/// 选择执行后端的环境变量. 值为 `cpu` 时强制使用 CPU.
pub const BACKEND_ENV: &str = "CT_QUANT_BACKEND";
