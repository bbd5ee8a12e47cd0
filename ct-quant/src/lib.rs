#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 从 CT 体数据计算冠脉钙化积分 (Agatston / 体积 / 质量),
//! 并从时间帧序列计算脑灌注血流动力学参数 (CBF / CBV / MTT / TTP).
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. DICOM 解析不在本 crate 范围内. 调用者负责提供解码后的 HU 缓冲区,
//!   或者使用 [`VolumeBuffer::open`] 读取 nii 文件.
//! 2. 对用户输入的校验失败以 `Err` 返回; 仅在内部不变量被破坏时 panic.
//! 3. 本 crate 不持有任何全局可变状态. GPU 上下文由 [`backend::ExecutionBackend`]
//!   实例显式持有.
//!
//! # 开发计划
//!
//! ### 阈值分类与 26-连通分量标注 ✅
//!
//! 实现位于 `ct-quant/src/calcium/threshold.rs` 与 `ct-quant/src/calcium/label.rs`.
//!
//! ### Agatston / 体积 / 质量积分 ✅
//!
//! 质量积分的密度校准和血管分区都是可替换的策略 (trait), 默认实现仅为占位公式.
//!
//! 实现位于 `ct-quant/src/calcium`.
//!
//! ### GPU 计算着色器后端与 CPU 回退 ✅
//!
//! 逐切片两遍计算 (阈值 + 打包, 密度分级), 任何 GPU 故障都会令本次调用整体回退到 CPU.
//! 两条路径共享同一个连通分量标注器, 从而保证结果一致.
//!
//! 实现位于 `ct-quant/src/backend`.
//!
//! ### MESA 百分位与风险分级 ✅
//!
//! 实现位于 `ct-quant/src/risk`.
//!
//! ### 灌注参数图与异常分级 ✅
//!
//! 另外提供 ROI 时间-密度曲线 (TIC).
//!
//! 实现位于 `ct-quant/src/perfusion`.
//!
//! ### 合成体模 ✅
//!
//! 确定性的球形钙化体模与团注帧序列, 供测试与消融实验使用.
//!
//! 实现位于 `ct-quant/src/phantom.rs`.
//!
//! ### 基于真实体模的密度校准 ⌛️
//!
//! 目前的 `0.5 * (HU + 1000)` 只是占位公式.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 体数据与时间帧序列基础数据结构.
mod data;

pub use data::{FrameSeries, OpenVolumeError, ScanSlice, Spacing, VolumeBuffer};

pub mod consts;

pub mod error;

pub mod calcium;

pub mod backend;

pub mod risk;

pub mod perfusion;

pub mod phantom;

pub mod prelude;
