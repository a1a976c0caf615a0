use bundle_patcher::applicator::apply_to_folder;
use bundle_patcher::patch_store::load_patch_map;
use bundle_patcher::{
    Bundle, BundleCompression, BundleObject, PatchSource, Selector, SheetPatchSource,
    TextExtractor, Tree,
};
use std::path::Path;
use tempfile::TempDir;

fn build_bundle(path: &Path) {
    let tree = Tree::from_json_str(
        r#"{
            "m_Name": "QuestTable",
            "_items": [
                {"_taggedText": [{"_locale": 0, "_text": "Accept quest?"}, {"_locale": 2, "_text": "接受任务？"}]},
                {"_taggedText": [{"_locale": 0, "_text": "Well done."}, {"_locale": 2, "_text": "干得好。"}]}
            ]
        }"#,
    )
    .unwrap();

    let mut bundle = Bundle::new(path, BundleCompression::None);
    bundle
        .objects
        .push(BundleObject::from_tree(100, "MonoBehaviour", "QuestTable", None, &tree).unwrap());
    bundle.save().unwrap();
}

/// 提取出的选择器经表格往返后必须在新加载的树上原样命中
#[test]
fn test_extract_edit_apply_roundtrip() {
    let temp = TempDir::new().unwrap();
    let assets = temp.path().join("assets");
    std::fs::create_dir_all(&assets).unwrap();
    let bundle_path = assets.join("quests.bundle");
    build_bundle(&bundle_path);

    // 提取
    let bundle = Bundle::load(bundle_path.clone()).unwrap();
    let extractor = TextExtractor::default();
    let tree = bundle.objects[0].read_tree().unwrap();
    let pairs = extractor.extract_object_tree(&tree);

    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0].selector, "_items[0]._taggedText[0]._text");
    assert_eq!(pairs[0].chinese, "接受任务？");

    // 编辑表格：译文填入Translated列，选择器原样带回
    let sheet_path = temp.path().join("patch.csv");
    let mut csv = String::from("Bundle path suffix,PathID,Object selector,Original,Translated\n");
    for (pair, translated) in pairs.iter().zip(["Nhận nhiệm vụ?", "Làm tốt lắm."]) {
        csv.push_str(&format!(
            "quests.bundle,100,{},{},{}\n",
            pair.selector, pair.original, translated
        ));
    }
    std::fs::write(&sheet_path, csv).unwrap();

    // 合并并应用
    let sheet = SheetPatchSource::new(&sheet_path);
    let load = load_patch_map(&[&sheet as &dyn PatchSource]).unwrap();
    let report = apply_to_folder(&assets, &load.map, None, &[]).unwrap();

    assert_eq!(report.stats.values_applied, 2);
    assert!(report.unresolved.is_empty());

    // 重新加载验证
    let reloaded = Bundle::load(bundle_path).unwrap();
    let tree = reloaded.objects[0].read_tree().unwrap();
    assert_eq!(
        bundle_patcher::get_by_selector(&tree, &Selector::parse("_items[0]._taggedText[0]._text"))
            .and_then(Tree::as_str),
        Some("Nhận nhiệm vụ?")
    );
    assert_eq!(
        bundle_patcher::get_by_selector(&tree, &Selector::parse("_items[1]._taggedText[0]._text"))
            .and_then(Tree::as_str),
        Some("Làm tốt lắm.")
    );
    // 中文参考列不受影响
    assert_eq!(
        bundle_patcher::get_by_selector(&tree, &Selector::parse("_items[0]._taggedText[1]._text"))
            .and_then(Tree::as_str),
        Some("接受任务？")
    );
}

/// 同样的源按同样顺序加载，合并结果逐字节一致
#[test]
fn test_merge_is_deterministic() {
    let temp = TempDir::new().unwrap();
    let sheet_path = temp.path().join("patch.csv");
    std::fs::write(
        &sheet_path,
        "Bundle path suffix,PathID,Object selector,Original,Translated\n\
         b.bundle,2,_b,orig,v2\n\
         a.bundle,1,_a,orig,v1\n\
         a.bundle,10,_c,orig,v3\n",
    )
    .unwrap();

    let sheet = SheetPatchSource::new(&sheet_path);
    let first = load_patch_map(&[&sheet as &dyn PatchSource]).unwrap();
    let second = load_patch_map(&[&sheet as &dyn PatchSource]).unwrap();
    assert_eq!(first.map, second.map);

    let path_a = temp.path().join("a.json");
    let path_b = temp.path().join("b.json");
    bundle_patcher::save_addresses(&first.map, &path_a).unwrap();
    bundle_patcher::save_addresses(&second.map, &path_b).unwrap();
    assert_eq!(
        std::fs::read(&path_a).unwrap(),
        std::fs::read(&path_b).unwrap()
    );
}
