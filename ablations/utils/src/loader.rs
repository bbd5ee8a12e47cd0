//! 真实扫描 (nii) 的加载. 目录不存在时消融实验只使用合成体模.

use ct_quant::{OpenVolumeError, VolumeBuffer};
use log::warn;
use std::env;
use std::path::{Path, PathBuf};

/// 指定扫描目录的环境变量.
pub const SCAN_DIR_ENV: &str = "CT_QUANT_SCAN_DIR";

/// 获取钙化扫描目录.
///
/// 1. 若环境变量 `$CT_QUANT_SCAN_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/calcium`. 无法确定主目录时返回 `None`.
pub fn scan_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var(SCAN_DIR_ENV) {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => {
            let mut ans = dirs::home_dir()?;
            ans.extend(["dataset", "calcium"]);
            Some(ans)
        }
    }
}

/// 列出 `dir` 下所有 `.nii` / `.nii.gz` 文件, 按文件名排序.
pub fn list_scans<P: AsRef<Path>>(dir: P) -> Vec<PathBuf> {
    let Ok(rd) = std::fs::read_dir(dir.as_ref()) else {
        return vec![];
    };
    let mut ans: Vec<PathBuf> = rd
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".nii") || n.ends_with(".nii.gz"))
        })
        .collect();
    ans.sort();
    ans
}

/// 逐个加载扫描. 无法读取的文件记录警告后跳过.
pub fn scan_loader<P: AsRef<Path>>(dir: P) -> impl Iterator<Item = (PathBuf, VolumeBuffer)> {
    list_scans(dir).into_iter().filter_map(|p| {
        match VolumeBuffer::open(&p) {
            Ok(v) => Some((p, v)),
            Err(e) => {
                warn_unreadable(&p, &e);
                None
            }
        }
    })
}

fn warn_unreadable(p: &Path, e: &OpenVolumeError) {
    warn!("跳过无法读取的扫描 {}: {e}", p.display());
}
