//! 实验结果.

use crate::profile::Profile;
use std::io::{self, Write};

/// GPU 与 CPU 积分允许的最大相对误差.
const PARITY_TOLERANCE: f64 = 1e-3;

/// 将 `p` 的结果写进 `w` 中. `baseline` 为 CPU 策略的统计.
fn describe_into<W: Write>(
    name: &str,
    p: &Profile,
    baseline: &Profile,
    w: &mut W,
) -> io::Result<()> {
    const S4: &str = "    ";

    #[inline]
    fn f64_to_display(f: Option<f64>) -> String {
        match f {
            Some(f) => format!("{f:.6}"),
            None => "/".to_string(),
        }
    }

    writeln!(w, "Profile `{name}`:")?;
    writeln!(w, "{S4}Finished cases: {}", p.get_cases())?;
    writeln!(w, "{S4}Failed cases: {}", p.get_failures())?;
    writeln!(w, "{S4}Cases served by GPU: {}", p.get_gpu_hits())?;
    writeln!(w, "{S4}Scoring total time: {} us", p.get_case_time_us())?;
    writeln!(
        w,
        "{S4}Scoring average time: {} us",
        f64_to_display(p.get_avg_case_time_us())
    )?;
    writeln!(w, "{S4}Total machine time: {} us", p.get_real_time_us())?;
    let t = p.get_most_time_consuming().map(|d| d.as_micros() as f64);
    writeln!(w, "{S4}Most time-consuming case costs {} us", f64_to_display(t))?;
    let err = p.max_relative_error(baseline);
    write!(
        w,
        "{S4}Max relative Agatston error vs cpu: {} ({})",
        f64_to_display(err),
        match err {
            Some(e) if e <= PARITY_TOLERANCE => "ok",
            Some(_) => "MISMATCH",
            None => "/",
        }
    )?;
    Ok(())
}

/// 消融实验最终结果. 第一项为 CPU 基准.
pub struct AblationResult {
    data: Vec<(&'static str, Profile)>,
}

impl AblationResult {
    pub fn from_iter<I: IntoIterator<Item = (&'static str, Profile)>>(it: I) -> Self {
        Self {
            data: it.into_iter().collect(),
        }
    }

    /// 分析运行结果.
    pub fn analyze(&self) {
        let Some((_, baseline)) = self.data.first() else {
            return;
        };
        utils::sep();
        let mut buf = Vec::with_capacity(512);

        for (key, profile) in self.data.iter() {
            describe_into(key, profile, baseline, &mut buf).unwrap();
            println!("{}", String::from_utf8_lossy(&buf));
            buf.clear();

            utils::sep();
        }
    }
}
