//! 消融实验依赖的通用组件.

use ct_quant::consts::CARDIAC_SPACING_MM;
use ct_quant::Spacing;

pub mod loader;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep() {
    println!("{SEP}");
}

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 常用心脏 CT 体素间距 0.625 x 0.625 x 3.0 mm.
#[inline]
pub fn cardiac_spacing() -> Spacing {
    let [dx, dy, dz] = CARDIAC_SPACING_MM;
    Spacing::new(dx, dy, dz).unwrap()
}
