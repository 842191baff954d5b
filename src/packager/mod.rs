//! 章节打包：生成 ComicInfo.xml 清单，并把清单与图片压成 `.cbz`。

pub mod archive;
pub mod comic_info;

pub use archive::{PackError, pack};
pub use comic_info::write_comic_info;
