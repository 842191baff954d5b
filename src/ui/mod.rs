//! 交互层入口。
//!
//! 目前只有基于标准输入输出的无 UI 交互。

pub mod noui;
