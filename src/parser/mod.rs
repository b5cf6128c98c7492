use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::downloader::error::DownloadError;
use crate::downloader::models::ImageMetadata;

pub mod utils;

use utils::FormatTool;

pub const IMAGE_LINK: &str = "a.anons-thumbnail.show";
pub const THUMBNAIL: &str = "img.thumbnail.wp-post-image";
pub const HIGH_PRIORITY_IMAGE: &str = "img[fetchpriority=\"high\"]";
pub const DATE_LABEL: &str = "span.date";

lazy_static! {
    static ref IMAGE_LINK_SELECTOR: Selector = Selector::parse(IMAGE_LINK).unwrap();
    static ref THUMBNAIL_SELECTOR: Selector = Selector::parse(THUMBNAIL).unwrap();
    static ref HIGH_PRIORITY_IMAGE_SELECTOR: Selector = Selector::parse(HIGH_PRIORITY_IMAGE).unwrap();
    static ref DATE_LABEL_SELECTOR: Selector = Selector::parse(DATE_LABEL).unwrap();
}

// `Html` 不是 Send, 以下函数都在同步上下文里解析完并返回拥有所有权的数据

/// 列表页中所有图片详情页链接
pub fn extract_image_links(html: &str, page_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let links: Vec<String> = document
        .select(&IMAGE_LINK_SELECTOR)
        .filter_map(|a| attr_or_warn(a, IMAGE_LINK, "href"))
        .map(|href| resolve(page_url, href))
        .collect();
    debug!("列表页 {} 找到 {} 个详情链接", page_url, links.len());
    links
}

/// 列表页中所有缩略图的原图地址 (已去掉分辨率后缀)
pub fn extract_thumbnails(html: &str, page_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let srcs: Vec<String> = document
        .select(&THUMBNAIL_SELECTOR)
        .filter_map(|img| attr_or_warn(img, THUMBNAIL, "src"))
        .map(|src| FormatTool::strip_resolution(&resolve(page_url, src)))
        .collect();
    debug!("列表页 {} 找到 {} 张缩略图", page_url, srcs.len());
    srcs
}

/// 解析图片详情页; 主图和日期标签都必须恰好出现一次
pub fn extract_metadata(html: &str, page_url: &str) -> Result<ImageMetadata, DownloadError> {
    let document = Html::parse_document(html);

    let image = exactly_one(&document, &HIGH_PRIORITY_IMAGE_SELECTOR, HIGH_PRIORITY_IMAGE)?;
    let date_label = exactly_one(&document, &DATE_LABEL_SELECTOR, DATE_LABEL)?;

    let title = required_attr(image, HIGH_PRIORITY_IMAGE, "title")?;
    let src = required_attr(image, HIGH_PRIORITY_IMAGE, "src")?;
    let date = date_label.text().collect::<String>().trim().to_string();

    Ok(ImageMetadata {
        title: title.to_string(),
        date,
        src: FormatTool::strip_resolution(&resolve(page_url, src)),
    })
}

fn exactly_one<'a>(
    document: &'a Html,
    selector: &Selector,
    name: &'static str,
) -> Result<ElementRef<'a>, DownloadError> {
    let mut found = document.select(selector);
    match (found.next(), found.count()) {
        (Some(element), 0) => Ok(element),
        (first, rest) => Err(DownloadError::MalformedPage {
            selector: name,
            expected: 1,
            found: usize::from(first.is_some()) + rest,
        }),
    }
}

fn required_attr<'a>(
    element: ElementRef<'a>,
    selector: &'static str,
    attribute: &'static str,
) -> Result<&'a str, DownloadError> {
    element
        .value()
        .attr(attribute)
        .ok_or(DownloadError::MissingAttribute {
            selector,
            attribute,
        })
}

fn attr_or_warn<'a>(element: ElementRef<'a>, selector: &str, attribute: &str) -> Option<&'a str> {
    let value = element.value().attr(attribute);
    if value.is_none() {
        warn!("`{}` 元素缺少属性 `{}`, 跳过", selector, attribute);
    }
    value
}

// 相对地址按页面地址补全, 无法解析时原样返回
fn resolve(page_url: &str, href: &str) -> String {
    Url::parse(page_url)
        .and_then(|base| base.join(href))
        .map(String::from)
        .unwrap_or_else(|_| href.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <article>
            <a class="anons-thumbnail show" href="https://example.com/images/1">
              <img class="thumbnail wp-post-image" src="https://cdn.example.com/a-300x200.jpg">
            </a>
          </article>
          <article>
            <a class="anons-thumbnail show" href="/images/2">
              <img class="thumbnail wp-post-image" src="https://cdn.example.com/b-300x200.png">
            </a>
          </article>
          <a class="other" href="/about">about</a>
        </body></html>
    "#;

    #[test]
    fn listing_links_are_resolved() {
        let links = extract_image_links(LISTING, "https://example.com/page/2");
        assert_eq!(
            links,
            vec!["https://example.com/images/1", "https://example.com/images/2"]
        );
    }

    #[test]
    fn listing_thumbnails_are_stripped() {
        let srcs = extract_thumbnails(LISTING, "https://example.com/page/2");
        assert_eq!(
            srcs,
            vec!["https://cdn.example.com/a.jpg", "https://cdn.example.com/b.png"]
        );
    }

    #[test]
    fn detail_page_metadata() {
        let html = r#"
            <img fetchpriority="high" title="Lake" src="https://cdn.example.com/lake-1920x1080.jpg">
            <span class="date"> 2024-01-01 </span>
        "#;
        let meta = extract_metadata(html, "https://example.com/images/1").unwrap();
        assert_eq!(meta.title, "Lake");
        assert_eq!(meta.date, "2024-01-01");
        assert_eq!(meta.src, "https://cdn.example.com/lake.jpg");
    }

    #[test]
    fn detail_page_with_two_dates_is_malformed() {
        let html = r#"
            <img fetchpriority="high" title="Lake" src="lake.jpg">
            <span class="date">2024-01-01</span>
            <span class="date">2024-01-02</span>
        "#;
        let err = extract_metadata(html, "https://example.com/images/1").unwrap_err();
        assert!(matches!(
            err,
            DownloadError::MalformedPage {
                selector: DATE_LABEL,
                expected: 1,
                found: 2
            }
        ));
    }

    #[test]
    fn detail_page_without_image_is_malformed() {
        let html = r#"<span class="date">2024-01-01</span>"#;
        let err = extract_metadata(html, "https://example.com/images/1").unwrap_err();
        assert!(matches!(err, DownloadError::MalformedPage { found: 0, .. }));
    }

    #[test]
    fn detail_page_missing_title() {
        let html = r#"
            <img fetchpriority="high" src="lake.jpg">
            <span class="date">2024-01-01</span>
        "#;
        let err = extract_metadata(html, "https://example.com/images/1").unwrap_err();
        assert!(matches!(
            err,
            DownloadError::MissingAttribute {
                attribute: "title",
                ..
            }
        ));
    }
}
