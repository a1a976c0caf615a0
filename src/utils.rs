use thiserror::Error;
use std::path::{Path, PathBuf};

/// 自定义错误类型
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("Invalid bundle format")]
    InvalidFormat,

    #[error("Unsupported bundle version: {0}")]
    UnsupportedVersion(u32),

    #[error("Object decode failure: {0}")]
    SchemaDecode(String),

    #[error("Duplicate source pattern: {0}")]
    DuplicateSourcePattern(String),

    #[error("Source not found: {0}")]
    MissingSource(PathBuf),

    #[error("Missing required column '{column}' in {data_source}")]
    MissingRequiredColumn { data_source: String, column: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

/// 将pathID规范化为标准十进制字符串
///
/// 表格软件往返后数字常带有浮点痕迹("42.0")或前导零("0042")，
/// 规范化后 "42"、"42.0"、"0042" 都映射到同一个键。
/// 无法解析为整数的值原样返回（调用方负责告警）。
pub fn normalize_path_id(raw: &str) -> String {
    let trimmed = raw.trim();

    if let Ok(id) = trimmed.parse::<i64>() {
        return id.to_string();
    }

    // 浮点痕迹：小数部分全为0时截掉
    if let Some((int_part, frac)) = trimmed.split_once('.') {
        if !frac.is_empty() && frac.bytes().all(|b| b == b'0') {
            if let Ok(id) = int_part.parse::<i64>() {
                return id.to_string();
            }
        }
    }

    trimmed.to_string()
}

/// 备份原始bundle文件（仅在备份不存在时复制）
///
/// 备份保留相对于扫描根目录的路径，放入镜像目录。
/// 重复运行不会覆盖已有备份，保证备份始终是最初的原始字节。
///
/// # 返回
/// 新建备份时返回备份路径；备份已存在时返回None
pub fn backup_once(
    scan_root: &Path,
    bundle_path: &Path,
    backup_root: &Path,
) -> Result<Option<PathBuf>, PatchError> {
    let rel_path = bundle_path
        .strip_prefix(scan_root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| PathBuf::from(bundle_path.file_name().unwrap_or_default()));

    let backup_path = backup_root.join(rel_path);

    if backup_path.exists() {
        return Ok(None);
    }

    if let Some(parent) = backup_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(bundle_path, &backup_path)?;

    Ok(Some(backup_path))
}

/// 去除文本首尾空行并统一换行符
///
/// 行尾空白去掉，内部空行保留。
pub fn trim_blank_lines(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<&str> = normalized.split('\n').map(|ln| ln.trim_end()).collect();

    while lines.first().is_some_and(|ln| ln.trim().is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|ln| ln.trim().is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_path_id() {
        assert_eq!(normalize_path_id("42"), "42");
        assert_eq!(normalize_path_id("42.0"), "42");
        assert_eq!(normalize_path_id("0042"), "42");
        assert_eq!(normalize_path_id(" 42 "), "42");
        assert_eq!(normalize_path_id("-7545636390849209228"), "-7545636390849209228");
        assert_eq!(normalize_path_id("+17"), "17");

        // 非数字原样返回
        assert_eq!(normalize_path_id("abc"), "abc");
        assert_eq!(normalize_path_id("42.5"), "42.5");
    }

    #[test]
    fn test_trim_blank_lines() {
        assert_eq!(trim_blank_lines("\n\nHello\n你好\n\n"), "Hello\n你好");
        assert_eq!(trim_blank_lines("a\r\n\r\nb  \r\n"), "a\n\nb");
        assert_eq!(trim_blank_lines("   \n \n"), "");
    }

    #[test]
    fn test_backup_once() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("assets");
        let backup_root = temp_dir.path().join("assets_backup");
        std::fs::create_dir_all(root.join("sub")).unwrap();

        let bundle = root.join("sub").join("a.bundle");
        std::fs::write(&bundle, b"original").unwrap();

        let created = backup_once(&root, &bundle, &backup_root).unwrap();
        assert_eq!(created, Some(backup_root.join("sub").join("a.bundle")));
        assert_eq!(std::fs::read(created.unwrap()).unwrap(), b"original");

        // 第二次运行时文件已被修改，备份不应被覆盖
        std::fs::write(&bundle, b"patched").unwrap();
        let again = backup_once(&root, &bundle, &backup_root).unwrap();
        assert!(again.is_none());
        assert_eq!(
            std::fs::read(backup_root.join("sub").join("a.bundle")).unwrap(),
            b"original"
        );
    }
}
