//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`          — 数据模型（SeriesInfo / Chapter / ChapterNumber / RunReport 等）
//! - `pool`            — 共享 HTTP 连接池与 DNS 缓存
//! - `fetcher`         — 单张图片下载（重试 + 退避）
//! - `chapter_worker`  — 单章节：临时目录、ComicInfo、并发拉图、打包
//! - `downloader`      — 多章节编排（两级并发上限）
//! - `progress`        — 进度上报与 CLI 进度条
//! - `resume`          — 断点续传缓存

pub mod chapter_worker;
pub mod downloader;
pub mod fetcher;
pub(crate) mod gauge;
pub mod models;
pub mod pool;
pub mod progress;
pub mod resume;
