use thiserror::Error;

/// EPUB 容器结构错误
///
/// 按失败的阶段区分，便于定位到底是哪一步出了问题
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArchiveFormatError {
    /// 压缩包中没有 META-INF/container.xml
    #[error("找不到 META-INF/container.xml")]
    MissingContainer,
    /// container.xml 中没有 rootfile 的 full-path
    #[error("container.xml 中缺少 OPF 路径")]
    MissingPackagePath,
    /// container.xml 指向的 OPF 文件不存在
    #[error("找不到 OPF 文件: {0}")]
    MissingPackageDocument(String),
    /// container.xml 或 OPF 不是合法的 XML
    #[error("XML 解析错误 ({file}): {message}")]
    MalformedXml { file: String, message: String },
}

/// 阅读引擎统一错误类型
#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("无法打开 EPUB: {0}")]
    ArchiveFormat(#[from] ArchiveFormatError),

    #[error("EPUB 中没有可读的文本内容")]
    ArchiveContent,

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("读取压缩包失败: {0}")]
    ArchiveRead(#[from] zip::result::ZipError),

    #[error("不支持的文件格式: {0}")]
    UnsupportedFormat(String),

    #[error("请先选择要添加书签的文本")]
    EmptySelection,

    #[error("无法将选中内容定位到第 {page} 页，请尝试选择更简单的文本")]
    AnchorResolution { page: usize },

    #[error("当前分页中找不到书签文本")]
    SnippetNotFound,

    #[error("存储错误: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("后台任务失败: {0}")]
    Task(String),
}

impl ReaderError {
    /// 是否属于读取失败（文件或压缩包 IO）
    pub fn is_io(&self) -> bool {
        matches!(self, ReaderError::Io(_) | ReaderError::ArchiveRead(_))
    }
}

pub type Result<T> = std::result::Result<T, ReaderError>;
