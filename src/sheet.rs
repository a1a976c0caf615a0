use crate::utils::PatchError;
use std::path::Path;

// 补丁表的列名（与编辑表格的表头一致）
pub const COL_BUNDLE_SUFFIX: &str = "Bundle path suffix";
pub const COL_PATH_ID: &str = "PathID";
pub const COL_SELECTOR: &str = "Object selector";
pub const COL_ORIGINAL: &str = "Original";
pub const COL_TRANSLATED: &str = "Translated";
pub const COL_NOTES: &str = "Notes";

/// 命名列表格
///
/// 编辑界面的数据按CSV交换；列按表头名字定位，不按位置。
/// PathID列始终按原样文本处理，数字格式化交给 `normalize_path_id`。
#[derive(Debug, Clone)]
pub struct SheetTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl SheetTable {
    pub fn new(headers: Vec<String>) -> Self {
        SheetTable {
            headers,
            rows: Vec::new(),
        }
    }

    /// 从CSV文件读取（首行为表头）
    pub fn from_csv_path(path: &Path) -> Result<Self, PatchError> {
        if !path.exists() {
            return Err(PatchError::MissingSource(path.to_path_buf()));
        }

        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(SheetTable { headers, rows })
    }

    /// 写出CSV文件
    pub fn write_csv_path(&self, path: &Path) -> Result<(), PatchError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// 必需列缺失对该数据源是致命错误
    pub fn require_column(&self, source: &str, name: &str) -> Result<usize, PatchError> {
        self.column_index(name)
            .ok_or_else(|| PatchError::MissingRequiredColumn {
                data_source: source.to_string(),
                column: name.to_string(),
            })
    }

    /// 按下标取单元格，短行按空白处理
    pub fn cell<'r>(row: &'r [String], index: usize) -> &'r str {
        row.get(index).map(String::as_str).unwrap_or("")
    }
}
