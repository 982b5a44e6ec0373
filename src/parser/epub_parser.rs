use super::txt_parser::{decode_text, display_name};
use super::*;
use crate::error::ArchiveFormatError;
use roxmltree::{Document, Node, ParsingOptions};
use std::io::{Cursor, Read, Seek};
use tracing::{debug, info, warn};
use zip::result::ZipError;
use zip::ZipArchive;

/// 容器描述文件的固定路径
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// 清单条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
}

/// OPF 包文档
#[derive(Debug, Clone, Default)]
pub struct PackageDocument {
    /// `metadata/title`
    pub title: Option<String>,
    /// id -> 清单条目
    pub manifest: HashMap<String, ManifestItem>,
    /// 阅读顺序（idref 列表）
    pub spine: Vec<String>,
}

/// 一个内容文档（按阅读顺序）
#[derive(Debug, Clone)]
pub struct ContentDocument {
    /// 压缩包内的完整路径
    pub path: String,
    pub media_type: String,
    /// 解码后的 HTML/XHTML 文本
    pub html: String,
}

/// 压缩包解包结果
#[derive(Debug, Clone)]
pub struct ArchiveContents {
    pub title: Option<String>,
    pub package_path: String,
    pub documents: Vec<ContentDocument>,
    /// 被跳过的阅读顺序条目（缺失、类型不符或文件不存在）
    pub skipped: Vec<String>,
}

/// EPUB 解析器
///
/// 读取 container.xml → OPF → 清单与阅读顺序，逐个提取内容文档中的文本块
#[derive(Clone)]
pub struct EpubParser;

impl EpubParser {
    /// 创建新的 EPUB 解析器实例
    pub fn new() -> Self {
        Self
    }

    /// 按阅读顺序取出所有内容文档
    ///
    /// # 参数
    /// - `bytes`: EPUB 文件内容
    ///
    /// # 返回
    /// 书名、OPF 路径和按阅读顺序排列的原始内容文档
    pub fn read_documents(&self, bytes: &[u8]) -> Result<ArchiveContents> {
        // 1. 打开压缩包
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        debug!(entries = archive.len(), "已打开 EPUB 压缩包");

        // 2. container.xml -> OPF 路径
        let package_path = find_package_path(&mut archive)?;

        // 3. 读取并解析 OPF
        let package_bytes = read_entry(&mut archive, &package_path)?
            .ok_or_else(|| ArchiveFormatError::MissingPackageDocument(package_path.clone()))?;
        let package_xml = decode_text(&package_bytes, &package_path);
        let package = parse_package(&package_xml, &package_path)?;
        let base_dir = parent_dir(&package_path);

        // 4. 按阅读顺序读取内容文档
        let mut documents = Vec::new();
        let mut skipped = Vec::new();

        for idref in &package.spine {
            let Some(item) = package.manifest.get(idref) else {
                debug!(idref = %idref, "阅读顺序引用了不存在的清单条目，跳过");
                skipped.push(idref.clone());
                continue;
            };

            if !is_content_media_type(&item.media_type) {
                debug!(idref = %idref, media_type = %item.media_type, "非文本类型，跳过");
                skipped.push(idref.clone());
                continue;
            }

            let path = resolve_href(&base_dir, &item.href);
            match read_entry(&mut archive, &path)? {
                Some(data) => documents.push(ContentDocument {
                    html: decode_text(&data, &path),
                    path,
                    media_type: item.media_type.clone(),
                }),
                None => {
                    warn!(path = %path, "内容文档不存在，跳过");
                    skipped.push(idref.clone());
                }
            }
        }

        Ok(ArchiveContents {
            title: package.title,
            package_path,
            documents,
            skipped,
        })
    }
}

/// 从 container.xml 中读取 OPF 路径
pub fn find_package_path<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String> {
    let data = read_entry(archive, CONTAINER_PATH)?.ok_or(ArchiveFormatError::MissingContainer)?;
    let xml = decode_text(&data, CONTAINER_PATH);
    let doc = parse_xml(&xml, CONTAINER_PATH)?;

    doc.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "rootfile")
        .filter_map(|n| n.attribute("full-path"))
        .map(|p| p.trim().trim_start_matches('/'))
        .find(|p| !p.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ArchiveFormatError::MissingPackagePath.into())
}

/// 解析 OPF 包文档
///
/// 只读取书名、清单和阅读顺序，忽略其余元数据
pub fn parse_package(xml: &str, package_path: &str) -> Result<PackageDocument> {
    let doc = parse_xml(xml, package_path)?;
    let mut package = PackageDocument::default();

    for node in doc.root_element().children().filter(Node::is_element) {
        match node.tag_name().name() {
            "metadata" => {
                package.title = node
                    .children()
                    .find(|n| n.is_element() && n.tag_name().name() == "title")
                    .and_then(|n| n.text())
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty());
            }
            "manifest" => {
                for item in node
                    .children()
                    .filter(|n| n.is_element() && n.tag_name().name() == "item")
                {
                    let (Some(id), Some(href)) = (item.attribute("id"), item.attribute("href"))
                    else {
                        continue;
                    };
                    package.manifest.insert(
                        id.to_string(),
                        ManifestItem {
                            id: id.to_string(),
                            href: href.to_string(),
                            media_type: item.attribute("media-type").unwrap_or_default().to_string(),
                        },
                    );
                }
            }
            "spine" => {
                package.spine = node
                    .children()
                    .filter(|n| n.is_element() && n.tag_name().name() == "itemref")
                    .filter_map(|n| n.attribute("idref"))
                    .map(str::to_string)
                    .collect();
            }
            _ => {}
        }
    }

    Ok(package)
}

fn parse_xml<'a>(xml: &'a str, file: &str) -> Result<Document<'a>> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(xml, options).map_err(|e| {
        ArchiveFormatError::MalformedXml {
            file: file.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

/// HTML / XHTML / XML 类内容
///
/// 没有声明类型的条目也当作内容文档读取
pub fn is_content_media_type(media_type: &str) -> bool {
    let media_type = media_type.trim().to_ascii_lowercase();
    media_type.is_empty() || media_type.contains("html") || media_type.contains("xml")
}

/// OPF 所在目录（不带结尾的 `/`）
fn parent_dir(path: &str) -> String {
    path.rsplit_once('/')
        .map(|(dir, _)| dir.to_string())
        .unwrap_or_default()
}

/// 把清单中的 href 解析为压缩包内路径
///
/// 去掉 `#片段`，以 `/` 开头的从压缩包根目录算起，支持 `.` 和 `..`
pub fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or_default();

    let (mut parts, href) = match href.strip_prefix('/') {
        Some(rest) => (Vec::new(), rest),
        None if base_dir.is_empty() => (Vec::new(), href),
        None => (base_dir.split('/').collect::<Vec<_>>(), href),
    };

    for segment in href.split('/') {
        match segment {
            ".." => {
                parts.pop();
            }
            "." | "" => {}
            s => parts.push(s),
        }
    }

    parts.join("/")
}

/// 读取压缩包中的文件
///
/// 先按原路径查找，找不到时再按百分号解码后的路径查找。
/// 文件不存在返回 `Ok(None)`，其他读取错误向上传递。
pub fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<Option<Vec<u8>>> {
    if let Some(data) = read_exact_entry(archive, path)? {
        return Ok(Some(data));
    }

    match percent_encoding::percent_decode_str(path).decode_utf8() {
        Ok(decoded) if decoded != path => read_exact_entry(archive, &decoded),
        _ => Ok(None),
    }
}

fn read_exact_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<Option<Vec<u8>>> {
    match archive.by_name(path) {
        Ok(mut file) => {
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            Ok(Some(contents))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Parser for EpubParser {
    fn parse(&self, bytes: &[u8], file_name: &str) -> Result<ExtractedBook> {
        let contents = self.read_documents(bytes)?;

        let mut blocks = Vec::new();
        for document in &contents.documents {
            let extracted = html_extractor::extract_blocks(&document.html);
            debug!(path = %document.path, blocks = extracted.len(), "已提取内容文档");
            blocks.extend(extracted);
        }
        renumber(&mut blocks);

        if blocks.iter().all(ContentBlock::is_blank) {
            return Err(ReaderError::ArchiveContent);
        }

        let title = contents.title.unwrap_or_else(|| display_name(file_name));
        info!(
            title = %title,
            documents = contents.documents.len(),
            skipped = contents.skipped.len(),
            blocks = blocks.len(),
            "EPUB 解析完成"
        );

        Ok(ExtractedBook {
            title,
            blocks,
            quality: ParseQuality::Native,
        })
    }

    fn get_quality(&self) -> ParseQuality {
        ParseQuality::Native
    }

    fn supported_extensions(&self) -> Vec<&str> {
        vec!["epub"]
    }
}

impl Default for EpubParser {
    fn default() -> Self {
        Self::new()
    }
}

/// 测试用：在内存中打包 EPUB
#[cfg(test)]
pub(crate) fn build_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// 测试用：指向 `opf_path` 的 container.xml
#[cfg(test)]
pub(crate) fn container_xml(opf_path: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="{}" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#,
        opf_path
    )
}

/// 测试用：生成 OPF，`items` 为 (id, href, media-type)，阅读顺序与 `spine` 一致
#[cfg(test)]
pub(crate) fn package_xml(title: &str, items: &[(&str, &str, &str)], spine: &[&str]) -> String {
    let manifest: String = items
        .iter()
        .map(|(id, href, media)| format!(r#"<item id="{}" href="{}" media-type="{}"/>"#, id, href, media))
        .collect();
    let itemrefs: String = spine
        .iter()
        .map(|id| format!(r#"<itemref idref="{}"/>"#, id))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>{}</dc:title></metadata>
  <manifest>{}</manifest>
  <spine>{}</spine>
</package>"#,
        title, manifest, itemrefs
    )
}

/// 测试用：把段落包成 XHTML 文档
#[cfg(test)]
pub(crate) fn xhtml(paragraphs: &[&str]) -> String {
    let body: String = paragraphs.iter().map(|p| format!("<p>{}</p>\n", p)).collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>t</title></head>
<body>
{}</body></html>"#,
        body
    )
}
