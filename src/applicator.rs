use crate::bundle::{Bundle, BundleObject};
use crate::datatypes::RawString;
use crate::patch_store::{PatchMap, PatchValue};
use crate::resolver::set_by_selector;
use crate::selector::Selector;
use crate::tree::Tree;
use crate::utils::{backup_once, trim_blank_lines, PatchError};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// 按选择器打补丁的结构化类型
const SCHEMA_TYPES: &[&str] = &["MonoBehaviour"];
/// 文本资源类型
const TEXT_BLOB_TYPE: &str = "TextAsset";

/// 审计集合：尚未命中的 (后缀, pathID, 选择器) 键
///
/// 整轮处理开始时装入全部补丁键，命中一条移除一条，
/// 结束后剩下的就是需要人工排查的陈旧条目。
pub type UnresolvedSet = BTreeSet<(String, String, String)>;

/// 文本资源整体替换表：文件名 → 新内容
pub type BlobReplacements = BTreeMap<String, String>;

/// 单个bundle的最终去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerOutcome {
    /// 有修改，已备份并写回
    Saved,
    /// 无修改，原文件未动
    Skipped,
}

/// 一轮补丁应用的统计
#[derive(Debug, Default, Clone)]
pub struct ApplyStats {
    pub bundles_scanned: usize,
    pub bundles_patched: usize,
    pub objects_patched: usize,
    pub values_applied: usize,
    pub failures: usize,
}

/// 整轮处理结果
#[derive(Debug)]
pub struct ApplyReport {
    pub stats: ApplyStats,
    pub unresolved: UnresolvedSet,
}

/// 补丁应用器
///
/// 只读借用补丁映射，对打开的bundle就地修改对象。
/// 单个对象解码失败只记录并跳过，不影响同bundle的其他对象。
pub struct PatchApplicator<'a> {
    patches: &'a PatchMap,
    blobs: Option<&'a BlobReplacements>,
}

impl<'a> PatchApplicator<'a> {
    pub fn new(patches: &'a PatchMap) -> Self {
        PatchApplicator {
            patches,
            blobs: None,
        }
    }

    /// 附加整体替换表
    pub fn with_blob_replacements(mut self, blobs: &'a BlobReplacements) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// 生成初始审计集合（包含全部补丁键）
    pub fn seed_unresolved(&self) -> UnresolvedSet {
        let mut set = UnresolvedSet::new();
        for (suffix, by_id) in self.patches {
            for (path_id, entries) in by_id {
                for entry in entries {
                    set.insert((
                        suffix.clone(),
                        path_id.clone(),
                        entry.object_selector.clone(),
                    ));
                }
            }
        }
        set
    }

    /// 对已打开的bundle应用全部适用补丁
    ///
    /// 对象是否需要落盘由各自的修改标记决定，此处不做IO。
    pub fn patch_bundle(
        &self,
        bundle: &mut Bundle,
        suffix: &str,
        unresolved: &mut UnresolvedSet,
        stats: &mut ApplyStats,
    ) {
        let by_id = self.patches.get(suffix);

        for object in &mut bundle.objects {
            let path_id = object.path_id.to_string();
            let entries = by_id
                .and_then(|map| map.get(&path_id))
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            if SCHEMA_TYPES.contains(&object.type_name.as_str()) {
                if entries.is_empty() {
                    continue;
                }
                patch_structured(object, suffix, &path_id, entries, unresolved, stats);
            } else if object.type_name == TEXT_BLOB_TYPE {
                self.patch_text_blob(object, suffix, &path_id, entries, unresolved, stats);
            }
            // 其他类型（Texture2D、SpriteAtlas等）原样携带
        }
    }

    fn patch_text_blob(
        &self,
        object: &mut BundleObject,
        suffix: &str,
        path_id: &str,
        entries: &[PatchValue],
        unresolved: &mut UnresolvedSet,
        stats: &mut ApplyStats,
    ) {
        if !entries.is_empty() {
            patch_text_entries(object, suffix, path_id, entries, unresolved, stats);
            return;
        }

        // 没有细粒度补丁时才按文件名整体替换
        let Some(blobs) = self.blobs else { return };
        let Some(file_name) = object.container_file_name().map(str::to_owned) else {
            return;
        };
        if let Some(content) = blobs.get(&file_name) {
            object.write_bytes(content.clone().into_bytes());
            stats.objects_patched += 1;
            info!(suffix, file_name = file_name.as_str(), "text asset replaced from file");
        }
    }
}

/// 结构化对象：读树、逐条解析选择器写入、命中才写回
fn patch_structured(
    object: &mut BundleObject,
    suffix: &str,
    path_id: &str,
    entries: &[PatchValue],
    unresolved: &mut UnresolvedSet,
    stats: &mut ApplyStats,
) {
    let mut tree = match object.read_tree() {
        Ok(tree) => tree,
        Err(error) => {
            warn!(suffix, path_id, %error, "object skipped");
            stats.failures += 1;
            return;
        }
    };

    let mut any_applied = false;
    for entry in entries {
        let selector = Selector::parse(&entry.object_selector);
        if set_by_selector(&mut tree, &selector, Tree::from(entry.patched_value.clone())) {
            any_applied = true;
            stats.values_applied += 1;
            unresolved.remove(&(
                suffix.to_string(),
                path_id.to_string(),
                entry.object_selector.clone(),
            ));
        } else {
            warn!(
                suffix,
                path_id,
                selector = %entry.object_selector,
                "selector did not match, entry skipped"
            );
        }
    }

    if any_applied {
        match object.write_tree(&tree) {
            Ok(()) => stats.objects_patched += 1,
            Err(error) => {
                warn!(suffix, path_id, %error, "object write-back failed");
                stats.failures += 1;
            }
        }
    }
}

/// 文本资源补丁：带选择器的按JSON树处理，空选择器整体替换
fn patch_text_entries(
    object: &mut BundleObject,
    suffix: &str,
    path_id: &str,
    entries: &[PatchValue],
    unresolved: &mut UnresolvedSet,
    stats: &mut ApplyStats,
) {
    let has_selector = entries
        .iter()
        .any(|entry| !entry.object_selector.is_empty());

    if has_selector {
        let decoded = RawString::decode(object.read_bytes());
        let mut tree = match Tree::from_json_str(&decoded.content) {
            Ok(tree) => tree,
            Err(error) => {
                warn!(suffix, path_id, %error, "text asset is not JSON, entries skipped");
                stats.failures += 1;
                return;
            }
        };

        let mut any_applied = false;
        for entry in entries {
            if entry.object_selector.is_empty() {
                continue;
            }
            let selector = Selector::parse(&entry.object_selector);
            if set_by_selector(&mut tree, &selector, Tree::from(entry.patched_value.clone())) {
                any_applied = true;
                stats.values_applied += 1;
                unresolved.remove(&(
                    suffix.to_string(),
                    path_id.to_string(),
                    entry.object_selector.clone(),
                ));
            } else {
                warn!(
                    suffix,
                    path_id,
                    selector = %entry.object_selector,
                    "selector did not match, entry skipped"
                );
            }
        }

        if any_applied {
            match tree.to_json_string() {
                Ok(json) => {
                    object.write_bytes(json.into_bytes());
                    stats.objects_patched += 1;
                }
                Err(error) => {
                    warn!(suffix, path_id, %error, "text asset re-encode failed");
                    stats.failures += 1;
                }
            }
        }
        return;
    }

    // 全部条目都没有选择器：第一条整体替换
    if let Some(entry) = entries.first() {
        object.write_bytes(entry.patched_value.clone().into_bytes());
        stats.objects_patched += 1;
        stats.values_applied += 1;
        unresolved.remove(&(suffix.to_string(), path_id.to_string(), String::new()));
    }
}

/// 递归收集目录下的bundle文件（路径排序，处理顺序稳定）
pub fn find_bundles(root: &Path, ignored_suffixes: &[String]) -> Result<Vec<PathBuf>, PatchError> {
    let mut paths = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(crate::BUNDLE_EXTENSION) {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if ignored_suffixes.iter().any(|suffix| name.ends_with(suffix)) {
            debug!(path = %path.display(), "bundle ignored");
            continue;
        }
        paths.push(path.to_path_buf());
    }

    paths.sort();
    Ok(paths)
}

/// bundle相对扫描根目录的后缀（统一用`/`分隔，与补丁键一致）
pub fn bundle_suffix(scan_root: &Path, bundle_path: &Path) -> String {
    let rel = bundle_path.strip_prefix(scan_root).unwrap_or(bundle_path);
    rel.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// 从目录装载整体替换文本（文件名 → 内容）
pub fn load_blob_replacements(dir: &Path) -> Result<BlobReplacements, PatchError> {
    let mut map = BlobReplacements::new();
    if !dir.exists() {
        return Ok(map);
    }

    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|ext| ext.to_str()) != Some("txt") {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        // 编辑往返后常带多余首尾空行，入表前清理
        let content = trim_blank_lines(&RawString::decode(&std::fs::read(entry.path())?).content);
        if map.insert(name.clone(), content).is_some() {
            warn!(%name, "duplicate replacement file name, later file wins");
        }
    }

    Ok(map)
}

/// 对整个资产目录跑一轮补丁
///
/// 每个bundle独立走完 打开→扫描→修改→备份→写回；
/// 单个bundle失败只记录，不中断批处理。
pub fn apply_to_folder(
    scan_root: &Path,
    patches: &PatchMap,
    blobs: Option<&BlobReplacements>,
    ignored_suffixes: &[String],
) -> Result<ApplyReport, PatchError> {
    let backup_root = sibling_backup_root(scan_root);

    let mut applicator = PatchApplicator::new(patches);
    if let Some(blobs) = blobs {
        applicator = applicator.with_blob_replacements(blobs);
    }

    let mut unresolved = applicator.seed_unresolved();
    let mut stats = ApplyStats::default();

    for bundle_path in find_bundles(scan_root, ignored_suffixes)? {
        let suffix = bundle_suffix(scan_root, &bundle_path);
        stats.bundles_scanned += 1;

        let mut bundle = match Bundle::load(bundle_path.clone()) {
            Ok(bundle) => bundle,
            Err(error) => {
                warn!(%suffix, %error, "bundle skipped");
                stats.failures += 1;
                continue;
            }
        };

        applicator.patch_bundle(&mut bundle, &suffix, &mut unresolved, &mut stats);

        match finalize_bundle(scan_root, &bundle_path, &backup_root, &bundle) {
            Ok(ContainerOutcome::Saved) => {
                stats.bundles_patched += 1;
                info!(%suffix, "bundle patched and saved");
            }
            Ok(ContainerOutcome::Skipped) => {
                debug!(%suffix, "no applicable patches, bundle untouched");
            }
            Err(error) => {
                warn!(%suffix, %error, "bundle save failed");
                stats.failures += 1;
            }
        }
    }

    Ok(ApplyReport { stats, unresolved })
}

/// 落盘阶段：脏bundle先备份一次再写回，干净bundle不动
fn finalize_bundle(
    scan_root: &Path,
    bundle_path: &Path,
    backup_root: &Path,
    bundle: &Bundle,
) -> Result<ContainerOutcome, PatchError> {
    if !bundle.is_modified() {
        return Ok(ContainerOutcome::Skipped);
    }

    if let Some(backup_path) = backup_once(scan_root, bundle_path, backup_root)? {
        info!(backup = %backup_path.display(), "original bundle backed up");
    }
    bundle.save()?;

    Ok(ContainerOutcome::Saved)
}

/// 备份镜像目录：扫描根目录同级的 `<名称>_backup`
pub fn sibling_backup_root(scan_root: &Path) -> PathBuf {
    let mut name = scan_root.as_os_str().to_os_string();
    name.push("_backup");
    PathBuf::from(name)
}

/// 写审计报告：统计 + 从未命中的补丁条目清单
pub fn write_audit_report(
    path: &Path,
    stats: &ApplyStats,
    unresolved: &UnresolvedSet,
    total_entries: usize,
) -> Result<(), PatchError> {
    let mut out = String::new();
    out.push_str("=== PATCH APPLY REPORT ===\n");
    out.push_str(&format!(
        "Time: {}\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    out.push_str(&format!("Bundles scanned: {}\n", stats.bundles_scanned));
    out.push_str(&format!("Bundles patched: {}\n", stats.bundles_patched));
    out.push_str(&format!("Objects patched: {}\n", stats.objects_patched));
    out.push_str(&format!(
        "Values applied:  {} / {}\n",
        stats.values_applied, total_entries
    ));
    out.push_str(&format!("Failures:        {}\n", stats.failures));
    out.push_str(&"=".repeat(40));
    out.push('\n');

    if unresolved.is_empty() {
        out.push_str("\nAll patch entries matched.\n");
    } else {
        out.push_str(&format!(
            "\n>>> UNRESOLVED ENTRIES ({}) <<<\n\n",
            unresolved.len()
        ));
        for (suffix, path_id, selector) in unresolved {
            out.push_str(&format!("{} | {} | {}\n", suffix, path_id, selector));
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::BundleCompression;
    use crate::patch_store::PatchValue;

    fn patch_map(records: Vec<(&str, &str, &str, &str)>) -> PatchMap {
        let mut map = PatchMap::new();
        for (suffix, path_id, selector, value) in records {
            map.entry(suffix.to_string())
                .or_default()
                .entry(path_id.to_string())
                .or_default()
                .push(PatchValue {
                    object_selector: selector.to_string(),
                    patched_value: value.to_string(),
                });
        }
        map
    }

    fn dialogue_bundle() -> Bundle {
        let mut bundle = Bundle::new("a.bundle", BundleCompression::None);
        let tree = Tree::from_json_str(
            r#"{"_items":[{"_taggedText":[{"_locale":0,"_text":"Hello"},{"_locale":2,"_text":"你好"}]}]}"#,
        )
        .unwrap();
        bundle.objects.push(
            BundleObject::from_tree(100, "MonoBehaviour", "DialogueTable", None, &tree).unwrap(),
        );
        bundle
    }

    #[test]
    fn test_patch_structured_object() {
        let patches = patch_map(vec![(
            "a.bundle",
            "100",
            "_items[0]._taggedText[0]._text",
            "Xin chào",
        )]);
        let applicator = PatchApplicator::new(&patches);
        let mut unresolved = applicator.seed_unresolved();
        let mut stats = ApplyStats::default();

        let mut bundle = dialogue_bundle();
        applicator.patch_bundle(&mut bundle, "a.bundle", &mut unresolved, &mut stats);

        assert!(bundle.is_modified());
        assert_eq!(stats.values_applied, 1);
        assert!(unresolved.is_empty());

        let tree = bundle.objects[0].read_tree().unwrap();
        assert_eq!(
            crate::resolver::get_by_selector(
                &tree,
                &Selector::parse("_items[0]._taggedText[0]._text")
            )
            .and_then(Tree::as_str),
            Some("Xin chào")
        );
        // 相邻字段不变
        assert_eq!(
            crate::resolver::get_by_selector(
                &tree,
                &Selector::parse("_items[0]._taggedText[1]._text")
            )
            .and_then(Tree::as_str),
            Some("你好")
        );
    }

    #[test]
    fn test_no_matching_entries_leaves_bundle_clean() {
        let patches = patch_map(vec![("other.bundle", "999", "_x", "v")]);
        let applicator = PatchApplicator::new(&patches);
        let mut unresolved = applicator.seed_unresolved();
        let mut stats = ApplyStats::default();

        let mut bundle = dialogue_bundle();
        applicator.patch_bundle(&mut bundle, "a.bundle", &mut unresolved, &mut stats);

        assert!(!bundle.is_modified());
        assert_eq!(stats.values_applied, 0);
        assert_eq!(unresolved.len(), 1);
    }

    #[test]
    fn test_stale_selector_stays_unresolved() {
        let patches = patch_map(vec![
            ("a.bundle", "100", "_items[0]._taggedText[0]._text", "ok"),
            ("a.bundle", "100", "_items[5]._text", "stale"),
        ]);
        let applicator = PatchApplicator::new(&patches);
        let mut unresolved = applicator.seed_unresolved();
        let mut stats = ApplyStats::default();

        let mut bundle = dialogue_bundle();
        applicator.patch_bundle(&mut bundle, "a.bundle", &mut unresolved, &mut stats);

        assert!(bundle.is_modified());
        assert_eq!(unresolved.len(), 1);
        assert!(unresolved.contains(&(
            "a.bundle".to_string(),
            "100".to_string(),
            "_items[5]._text".to_string()
        )));
    }

    #[test]
    fn test_broken_object_does_not_abort_siblings() {
        let patches = patch_map(vec![
            ("a.bundle", "1", "_text", "第一"),
            ("a.bundle", "2", "_text", "第二"),
        ]);

        let mut bundle = Bundle::new("a.bundle", BundleCompression::None);
        bundle.objects.push(BundleObject::new(
            1,
            "MonoBehaviour",
            "broken",
            None,
            b"not json".to_vec(),
        ));
        let tree = Tree::from_json_str(r#"{"_text":"原文"}"#).unwrap();
        bundle
            .objects
            .push(BundleObject::from_tree(2, "MonoBehaviour", "good", None, &tree).unwrap());

        let applicator = PatchApplicator::new(&patches);
        let mut unresolved = applicator.seed_unresolved();
        let mut stats = ApplyStats::default();
        applicator.patch_bundle(&mut bundle, "a.bundle", &mut unresolved, &mut stats);

        assert_eq!(stats.failures, 1);
        assert_eq!(stats.values_applied, 1);
        let tree = bundle.objects[1].read_tree().unwrap();
        assert_eq!(tree.get("_text").and_then(Tree::as_str), Some("第二"));
    }

    #[test]
    fn test_text_blob_selector_patch() {
        let patches = patch_map(vec![(
            "a.bundle",
            "-7",
            "_taggedText[0]._text",
            "patched line",
        )]);

        let mut bundle = Bundle::new("a.bundle", BundleCompression::None);
        bundle.objects.push(BundleObject::new(
            -7,
            "TextAsset",
            "dialogue",
            None,
            br#"{"_taggedText":[{"_locale":0,"_text":"line"}]}"#.to_vec(),
        ));

        let applicator = PatchApplicator::new(&patches);
        let mut unresolved = applicator.seed_unresolved();
        let mut stats = ApplyStats::default();
        applicator.patch_bundle(&mut bundle, "a.bundle", &mut unresolved, &mut stats);

        assert!(unresolved.is_empty());
        let text = String::from_utf8(bundle.objects[0].read_bytes().to_vec()).unwrap();
        assert!(text.contains("patched line"));
        // 重编码后仍是合法JSON
        assert!(Tree::from_json_str(&text).is_ok());
    }

    #[test]
    fn test_text_blob_whole_replacement_entry() {
        let patches = patch_map(vec![("a.bundle", "-7", "", "整体替换的内容")]);

        let mut bundle = Bundle::new("a.bundle", BundleCompression::None);
        bundle.objects.push(BundleObject::new(
            -7,
            "TextAsset",
            "notes",
            None,
            b"old content".to_vec(),
        ));

        let applicator = PatchApplicator::new(&patches);
        let mut unresolved = applicator.seed_unresolved();
        let mut stats = ApplyStats::default();
        applicator.patch_bundle(&mut bundle, "a.bundle", &mut unresolved, &mut stats);

        assert!(unresolved.is_empty());
        assert_eq!(
            bundle.objects[0].read_bytes(),
            "整体替换的内容".as_bytes()
        );
    }

    #[test]
    fn test_blob_replacement_by_file_name() {
        let patches = PatchMap::new();
        let mut blobs = BlobReplacements::new();
        blobs.insert("notes.txt".to_string(), "translated file".to_string());

        let mut bundle = Bundle::new("a.bundle", BundleCompression::None);
        bundle.objects.push(BundleObject::new(
            -7,
            "TextAsset",
            "notes",
            Some("assets/text/notes.txt".to_string()),
            b"old".to_vec(),
        ));

        let applicator = PatchApplicator::new(&patches).with_blob_replacements(&blobs);
        let mut unresolved = applicator.seed_unresolved();
        let mut stats = ApplyStats::default();
        applicator.patch_bundle(&mut bundle, "a.bundle", &mut unresolved, &mut stats);

        assert_eq!(bundle.objects[0].read_bytes(), b"translated file");
        assert_eq!(stats.objects_patched, 1);
    }

    #[test]
    fn test_bundle_suffix_uses_forward_slashes() {
        let root = Path::new("/data/assets");
        let bundle = Path::new("/data/assets/scenes/song_17.bundle");
        assert_eq!(bundle_suffix(root, bundle), "scenes/song_17.bundle");
    }
}
