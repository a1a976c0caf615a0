use crate::sheet::{
    SheetTable, COL_BUNDLE_SUFFIX, COL_ORIGINAL, COL_PATH_ID, COL_SELECTOR, COL_TRANSLATED,
};
use crate::utils::{normalize_path_id, PatchError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 单条补丁值（字段名与补丁文件保持一致）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchValue {
    pub object_selector: String,
    pub patched_value: String,
}

/// 归一化补丁映射：bundle后缀 → pathID → 补丁列表
///
/// 两层都用BTreeMap，序列化输出按键排序，重新生成时diff稳定。
pub type PatchMap = BTreeMap<String, BTreeMap<String, Vec<PatchValue>>>;

/// 展平的一条补丁记录
#[derive(Debug, Clone, PartialEq)]
pub struct PatchRecord {
    pub bundle_suffix: String,
    pub path_id: String,
    pub selector: String,
    pub value: String,
}

/// 补丁数据源
///
/// 结构化补丁文件和表格都实现此接口；合并按声明顺序进行，
/// 后加载的数据源对同一键有更高优先级。
pub trait PatchSource {
    fn label(&self) -> String;
    fn records(&self) -> Result<Vec<PatchRecord>, PatchError>;
}

/// 结构化补丁文件（排序JSON，人工可编辑）
pub struct AddressesFile {
    path: PathBuf,
}

impl AddressesFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        AddressesFile { path: path.into() }
    }
}

impl PatchSource for AddressesFile {
    fn label(&self) -> String {
        self.path.display().to_string()
    }

    /// 文件不存在视为空源（首次运行还没有补丁文件）；
    /// 内容损坏则是致命错误，整个补丁映射不可信。
    fn records(&self) -> Result<Vec<PatchRecord>, PatchError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "addresses file absent, empty source");
            return Ok(Vec::new());
        }

        let map = load_addresses(&self.path)?;
        let mut records = Vec::new();
        for (suffix, by_id) in &map {
            for (path_id, entries) in by_id {
                for entry in entries {
                    records.push(PatchRecord {
                        bundle_suffix: suffix.clone(),
                        path_id: path_id.clone(),
                        selector: entry.object_selector.clone(),
                        value: entry.patched_value.clone(),
                    });
                }
            }
        }
        Ok(records)
    }
}

/// 表格补丁源（编辑界面导出的补丁表）
///
/// 后缀列允许块状书写：空单元格沿用上一个非空后缀。
pub struct SheetPatchSource {
    path: PathBuf,
}

impl SheetPatchSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SheetPatchSource { path: path.into() }
    }
}

impl PatchSource for SheetPatchSource {
    fn label(&self) -> String {
        self.path.display().to_string()
    }

    fn records(&self) -> Result<Vec<PatchRecord>, PatchError> {
        let table = SheetTable::from_csv_path(&self.path)?;
        let label = self.label();

        let col_suffix = table.require_column(&label, COL_BUNDLE_SUFFIX)?;
        let col_path_id = table.require_column(&label, COL_PATH_ID)?;
        let col_selector = table.require_column(&label, COL_SELECTOR)?;
        table.require_column(&label, COL_ORIGINAL)?;
        let col_translated = table.require_column(&label, COL_TRANSLATED)?;

        let mut records = Vec::new();
        let mut current_suffix = String::new();

        for row in table.rows() {
            let suffix_cell = SheetTable::cell(row, col_suffix).trim();
            if !suffix_cell.is_empty() {
                current_suffix = suffix_cell.to_string();
            }

            let path_id = SheetTable::cell(row, col_path_id).trim();
            let value = SheetTable::cell(row, col_translated);
            if current_suffix.is_empty() || path_id.is_empty() || value.is_empty() {
                continue;
            }

            records.push(PatchRecord {
                bundle_suffix: current_suffix.clone(),
                path_id: path_id.to_string(),
                selector: SheetTable::cell(row, col_selector).trim().to_string(),
                value: value.to_string(),
            });
        }

        Ok(records)
    }
}

/// 合并结果：补丁映射 + 被跳过的数据源
#[derive(Debug, Default)]
pub struct PatchLoad {
    pub map: PatchMap,
    pub skipped: Vec<(String, PatchError)>,
}

/// 按声明顺序合并数据源（低优先级在前）
///
/// 同一键后来者覆盖先到者的值，其余条目保持先见顺序。
/// 数据源结构性缺陷（文件缺失、缺列、表格损坏）只废弃该源，
/// 其余数据源照常合并；同一源内重复键是致命错误。
pub fn load_patch_map(sources: &[&dyn PatchSource]) -> Result<PatchLoad, PatchError> {
    let mut load = PatchLoad::default();

    for source in sources {
        let records = match source.records() {
            Ok(records) => records,
            Err(
                error @ (PatchError::MissingSource(_)
                | PatchError::MissingRequiredColumn { .. }
                | PatchError::CsvError(_)),
            ) => {
                warn!(source = %source.label(), %error, "patch source skipped");
                load.skipped.push((source.label(), error));
                continue;
            }
            Err(error) => return Err(error),
        };

        fold_records(&mut load.map, records, &source.label())?;
    }

    Ok(load)
}

fn fold_records(
    map: &mut PatchMap,
    records: Vec<PatchRecord>,
    source_label: &str,
) -> Result<(), PatchError> {
    let mut seen: HashSet<(String, String, String)> = HashSet::new();

    for record in records {
        let path_id = normalize_path_id(&record.path_id);
        if path_id.parse::<i64>().is_err() {
            warn!(
                source = source_label,
                path_id = %record.path_id,
                "non-numeric pathID kept verbatim"
            );
        }

        let key = (
            record.bundle_suffix.clone(),
            path_id.clone(),
            record.selector.clone(),
        );
        if !seen.insert(key) {
            return Err(PatchError::DuplicateSourcePattern(format!(
                "{}: {} | {} | {}",
                source_label, record.bundle_suffix, path_id, record.selector
            )));
        }

        let entries = map
            .entry(record.bundle_suffix)
            .or_default()
            .entry(path_id)
            .or_default();

        match entries
            .iter_mut()
            .find(|entry| entry.object_selector == record.selector)
        {
            Some(entry) => entry.patched_value = record.value,
            None => entries.push(PatchValue {
                object_selector: record.selector,
                patched_value: record.value,
            }),
        }
    }

    Ok(())
}

/// 读取结构化补丁文件
pub fn load_addresses(path: &Path) -> Result<PatchMap, PatchError> {
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(PatchMap::new());
    }
    Ok(serde_json::from_str(&content)?)
}

/// 写出结构化补丁文件（按键排序，diff稳定）
pub fn save_addresses(map: &PatchMap, path: &Path) -> Result<(), PatchError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut content = serde_json::to_string_pretty(map)?;
    content.push('\n');
    std::fs::write(path, content)?;
    Ok(())
}

/// 映射中补丁条目总数
pub fn entry_count(map: &PatchMap) -> usize {
    map.values()
        .flat_map(|by_id| by_id.values())
        .map(Vec::len)
        .sum()
}
