//! 基础设施：配置、日志、文件名清洗。

pub mod config;
pub mod context;
pub mod logging;
