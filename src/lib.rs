pub mod datatypes;
pub mod tree;
pub mod selector;
pub mod resolver;
pub mod extractor;
pub mod sheet;
pub mod patch_store;
pub mod bundle;
pub mod applicator;
pub mod utils;

// 重新导出主要结构
pub use tree::Tree;
pub use selector::{Selector, SelectorToken};
pub use resolver::{get_by_selector, set_by_selector};
pub use extractor::{ExtractOptions, FallbackResolver, LocalizedEntry, TextExtractor, TextPair};
pub use sheet::SheetTable;
pub use patch_store::{
    load_patch_map, save_addresses, AddressesFile, PatchMap, PatchRecord, PatchSource,
    PatchValue, SheetPatchSource,
};
pub use bundle::{Bundle, BundleCompression, BundleObject};
pub use applicator::{
    apply_to_folder, ApplyReport, ApplyStats, BlobReplacements, PatchApplicator, UnresolvedSet,
};
pub use utils::{normalize_path_id, PatchError};

// 常量定义
pub const BUNDLE_EXTENSION: &str = "bundle";
/// 原文语言码
pub const LOCALE_ORIGINAL: i64 = 0;
/// 简体中文语言码
pub const LOCALE_CHINESE: i64 = 2;
