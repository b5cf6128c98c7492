use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

use crate::downloader::error::DownloadError;

lazy_static! {
    static ref RESOLUTION_SUFFIX: Regex = Regex::new(r"-\d+x\d+").unwrap();
    static ref EXTENSION: Regex = Regex::new(r"\.\w+$").unwrap();
}

pub struct FormatTool;

impl FormatTool {
    // 去掉缩略图地址里的分辨率后缀: photo-800x600.jpg -> photo.jpg
    pub fn strip_resolution(src: &str) -> String {
        RESOLUTION_SUFFIX.replace_all(src, "").into_owned()
    }

    /// 把 %t 替换为标题, %d 替换为日期
    ///
    /// 单遍扫描模板, 替换进来的文本不会再被展开, 标题里出现的 `%d` 原样保留。
    pub fn format_path(template: &str, title: &str, date: &str) -> String {
        let mut out = String::with_capacity(template.len() + title.len() + date.len());
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '%' {
                match chars.peek() {
                    Some('t') => {
                        out.push_str(title);
                        chars.next();
                        continue;
                    }
                    Some('d') => {
                        out.push_str(date);
                        chars.next();
                        continue;
                    }
                    _ => {}
                }
            }
            out.push(c);
        }
        out
    }

    /// 从图片地址末尾的 `.ext` 取扩展名 (含点), 忽略查询串
    pub fn extension_of(src: &str) -> Result<String, DownloadError> {
        let path = match Url::parse(src) {
            Ok(url) => url.path().to_string(),
            Err(_) => src.split(['?', '#']).next().unwrap_or(src).to_string(),
        };

        EXTENSION
            .find(&path)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| DownloadError::InvalidUrl(format!("无法识别扩展名: {}", src)))
    }
}
