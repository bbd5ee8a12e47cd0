//! GPU / CPU 钙化积分一致性与耗时对比.
//!
//! 用法: `cargo run --release -p parity`. 设置 `CT_QUANT_SCAN_DIR` 后额外使用目录中的 nii 扫描.

mod profile;
mod result;
mod runner;

fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .env()
        .init()
        .unwrap();
    println!("Using {} cpus", utils::cpus());
    runner::run().analyze();
}
