//! Built-in tools

mod download;
mod render;
mod run_code;

pub use download::{DownloadFileTool, Downloader, HttpDownloader, validate_url};
pub use render::{CommandRenderer, HttpRenderer, PageRenderer, RenderHtmlTool, renderer_from_config};
pub use run_code::RunCodeTool;
