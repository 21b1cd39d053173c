use std::path::Path;

use crate::error::ExtractError;
use crate::models::ExtractedLine;

/// 文档文本提取器
///
/// 同步接口, 由流水线放到阻塞线程池执行并加超时。
pub trait TextExtractor: Send + Sync + 'static {
    fn extract(&self, path: &Path) -> Result<Vec<ExtractedLine>, ExtractError>;
}

/// 纯文本提取: UTF-8 文件, 换页符 (\x0c) 分页, 页码从 1 开始
#[derive(Debug, Clone, Default)]
pub struct PlainTextExtractor;

const SUPPORTED_EXTENSIONS: [&str; 3] = ["txt", "text", "eml"];

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<ExtractedLine>, ExtractError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(ExtractError::Unsupported(path.display().to_string()));
        }

        let bytes = std::fs::read(path)?;
        let text = String::from_utf8(bytes)
            .map_err(|e| ExtractError::Failed(format!("{} is not UTF-8: {}", path.display(), e)))?;
        Ok(split_pages(&text))
    }
}

pub fn split_pages(text: &str) -> Vec<ExtractedLine> {
    text.split('\x0c')
        .enumerate()
        .flat_map(|(page, body)| {
            body.lines()
                .enumerate()
                .map(move |(idx, line)| ExtractedLine::new(page as u32 + 1, idx as u32, line))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_split_pages() {
        let lines = split_pages("a\nb\x0cc");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], ExtractedLine::new(1, 1, "b"));
        assert_eq!(lines[2], ExtractedLine::new(2, 0, "c"));
    }

    #[test]
    fn test_extract_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lpo.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "LPO 1001\nSUNFLOWER OIL 5L 10 TIN").unwrap();

        let lines = PlainTextExtractor.extract(&path).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "LPO 1001");
    }

    #[test]
    fn test_unsupported_extension() {
        let err = PlainTextExtractor.extract(Path::new("/tmp/order.pdf")).unwrap_err();
        assert!(matches!(err, ExtractError::Unsupported(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = PlainTextExtractor
            .extract(Path::new("/nonexistent/dir/order.txt"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::Io(_)));
    }
}
