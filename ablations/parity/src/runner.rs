//! 程序运行函数.

use crate::profile::Profile;
use crate::result::AblationResult;
use ct_quant::backend::{default_provider, ExecutionBackend, ReferenceProvider};
use ct_quant::calcium::{BackendKind, CalciumAnalyzer, CalciumConfig};
use ct_quant::phantom::CalciumPhantom;
use ct_quant::VolumeBuffer;
use log::info;
use std::sync::Arc;
use std::thread;
use utils::loader;

/// 合成体模个数.
const PHANTOMS: u64 = 12;

/// 合成体模形状 (z, H, W).
const PHANTOM_SHAPE: (usize, usize, usize) = (40, 128, 128);

/// 参与对比的阈值 (HU).
const THRESHOLDS: [f32; 3] = [130.0, 200.0, 350.0];

/// 单个用例.
struct Case {
    volume: VolumeBuffer,
    threshold_hu: f32,
}

/// 合成体模, 以及 `$CT_QUANT_SCAN_DIR` 下可读取的扫描.
fn volumes() -> Vec<VolumeBuffer> {
    let spacing = utils::cardiac_spacing();
    let mut ans: Vec<VolumeBuffer> = (0..PHANTOMS)
        .map(|seed| CalciumPhantom::random(PHANTOM_SHAPE, spacing, seed).build())
        .collect();
    if let Some(dir) = loader::scan_dir_from_env_or_home() {
        let before = ans.len();
        ans.extend(loader::scan_loader(&dir).map(|(_, v)| v));
        info!("从 {} 载入 {} 个扫描", dir.display(), ans.len() - before);
    }
    ans
}

fn cases() -> Vec<Case> {
    volumes()
        .into_iter()
        .flat_map(|v| {
            THRESHOLDS.map(|threshold_hu| Case {
                volume: v.clone(),
                threshold_hu,
            })
        })
        .collect()
}

/// 用 `backend` 依次计算全部用例.
fn profile_backend(backend: ExecutionBackend, cases: &[Case]) -> Profile {
    let analyzer = CalciumAnalyzer::new(CalciumConfig::default(), backend);
    let mut profile = Profile::new();
    for case in cases {
        profile.case_start();
        let result = analyzer.compute_calcium_score(&case.volume, case.threshold_hu);
        let (score, on_gpu) = match result {
            Ok(r) => (Some(r.agatston_score), r.backend == BackendKind::Gpu),
            Err(_) => (None, false),
        };
        profile.case_finished(score, on_gpu);
    }
    info!("后端最终状态: {:?}", analyzer.backend().state());
    profile.finish()
}

/// 实际运行.
pub fn run() -> AblationResult {
    let cases = cases();
    assert!(!cases.is_empty(), "No cases to run");
    let cases = cases.as_slice();

    println!("Running parity studies on {} cases...", cases.len());
    thread::scope(|s| {
        let strategies: [(&'static str, fn() -> ExecutionBackend); 3] = [
            ("cpu", ExecutionBackend::cpu_only),
            ("reference", || ExecutionBackend::new(Arc::new(ReferenceProvider))),
            ("gpu", || ExecutionBackend::new(default_provider())),
        ];
        let handles =
            strategies.map(|(name, make)| (name, s.spawn(move || profile_backend(make(), cases))));

        AblationResult::from_iter(
            handles
                .into_iter()
                .map(|(name, th)| (name, th.join().expect("Thread joining error"))),
        )
    })
}
