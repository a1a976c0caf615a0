use anyhow::{bail, Context};
use bundle_patcher::applicator::{
    apply_to_folder, find_bundles, load_blob_replacements, write_audit_report, BlobReplacements,
};
use bundle_patcher::patch_store::{entry_count, load_patch_map, save_addresses};
use bundle_patcher::{
    AddressesFile, Bundle, PatchSource, SheetPatchSource, SheetTable, TextExtractor, TextPair,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "bundle_patcher")]
#[command(about = "从游戏资产bundle提取可本地化文本，并把译文按选择器写回")]
#[command(version = "0.3.0")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// 静默模式(仅输出错误)
    #[arg(long, global = true)]
    quiet: bool,

    /// 结构化补丁文件路径
    #[arg(long, global = true, default_value = "patches/addresses.json")]
    addresses: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// 扫描bundle目录，提取文本并生成编辑表格
    Extract {
        /// bundle所在目录
        assets_folder: PathBuf,

        /// 输出CSV路径
        #[arg(short, long, default_value = "bundle_info.csv")]
        output: PathBuf,

        /// 跳过以该后缀结尾的bundle(可多次指定)
        #[arg(long = "ignore-suffix", default_value = "general-managedtext_assets_all.bundle")]
        ignored_suffixes: Vec<String>,

        /// 原文缺失时使用上层默认文本字段
        #[arg(long)]
        default_text_fallback: bool,
    },

    /// 合并表格补丁源并重写补丁文件
    BuildPatchFile {
        /// 表格CSV，按优先级从低到高排列
        #[arg(required = true)]
        sheets: Vec<PathBuf>,
    },

    /// 把补丁应用到bundle目录(自动备份被修改的bundle)
    ApplyPatches {
        /// bundle所在目录
        assets_folder: PathBuf,

        /// 追加的表格补丁源(优先级高于补丁文件)
        #[arg(long = "sheet")]
        sheets: Vec<PathBuf>,

        /// 整体替换文本所在目录(按文件名匹配TextAsset)
        #[arg(long)]
        translated_dir: Option<PathBuf>,

        /// 跳过以该后缀结尾的bundle(可多次指定)
        #[arg(long = "ignore-suffix", default_value = "general-managedtext_assets_all.bundle")]
        ignored_suffixes: Vec<String>,

        /// 审计报告输出路径
        #[arg(long, default_value = "report_patch.txt")]
        report: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match &cli.command {
        Command::Extract {
            assets_folder,
            output,
            ignored_suffixes,
            default_text_fallback,
        } => extract(
            &cli,
            assets_folder,
            output,
            ignored_suffixes,
            *default_text_fallback,
        ),
        Command::BuildPatchFile { sheets } => build_patch_file(&cli, sheets),
        Command::ApplyPatches {
            assets_folder,
            sheets,
            translated_dir,
            ignored_suffixes,
            report,
        } => apply_patches(
            &cli,
            assets_folder,
            sheets,
            translated_dir.as_deref(),
            ignored_suffixes,
            report,
        ),
    }
}

fn init_tracing(quiet: bool) {
    let max_level = if quiet {
        tracing::Level::ERROR
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_target(false)
        .init();
}

/// 验证输入目录
fn validate_folder(folder: &Path) -> anyhow::Result<()> {
    if !folder.is_dir() {
        bail!("目录不存在: {:?}", folder);
    }
    Ok(())
}

// 编辑表格的列（首列bundle后缀每个bundle只写一次）
const INFO_HEADER: &[&str] = &[
    "Bundle path suffix",
    "Container",
    "Name",
    "Type",
    "PathID",
    "Object selector",
    "Original",
    "Chinese",
    "Translated",
];

/// 提取模式：扫描目录，输出编辑表格
fn extract(
    cli: &Cli,
    assets_folder: &Path,
    output: &Path,
    ignored_suffixes: &[String],
    default_text_fallback: bool,
) -> anyhow::Result<()> {
    validate_folder(assets_folder)?;

    let bundle_paths = find_bundles(assets_folder, ignored_suffixes)
        .with_context(|| format!("扫描目录失败: {:?}", assets_folder))?;
    if bundle_paths.is_empty() {
        bail!("目录中没有bundle文件: {:?}", assets_folder);
    }

    let options = bundle_patcher::ExtractOptions {
        default_text_fallback,
        ..Default::default()
    };
    let extractor = TextExtractor::new(options);

    let mut table = SheetTable::new(INFO_HEADER.iter().map(|h| h.to_string()).collect());
    let mut pair_total = 0usize;

    for bundle_path in &bundle_paths {
        let suffix = bundle_patcher::applicator::bundle_suffix(assets_folder, bundle_path);

        let bundle = match Bundle::load(bundle_path.clone()) {
            Ok(bundle) => bundle,
            Err(error) => {
                eprintln!("跳过无法解析的bundle {}: {}", suffix, error);
                continue;
            }
        };

        // 后缀行：每个bundle只写一次
        let mut suffix_row = vec![suffix.clone()];
        suffix_row.resize(INFO_HEADER.len(), String::new());
        table.push_row(suffix_row);

        for object in &bundle.objects {
            let pairs = extract_object_pairs(&extractor, object, &suffix);
            pair_total += pairs.iter().filter(|p| !p.original.is_empty() || !p.chinese.is_empty()).count();

            for (position, pair) in pairs.iter().enumerate() {
                // 对象信息只在该对象的第一行写出
                let (container, name, type_name, path_id) = if position == 0 {
                    (
                        object.container.clone().unwrap_or_default(),
                        object.name.clone(),
                        object.type_name.clone(),
                        object.path_id.to_string(),
                    )
                } else {
                    Default::default()
                };

                table.push_row(vec![
                    String::new(),
                    container,
                    name,
                    type_name,
                    path_id,
                    pair.selector.clone(),
                    pair.original.clone(),
                    pair.chinese.clone(),
                    String::new(),
                ]);
            }
        }

        if !cli.quiet {
            println!("已处理 {}", suffix);
        }
    }

    table
        .write_csv_path(output)
        .with_context(|| format!("写出表格失败: {:?}", output))?;

    if !cli.quiet {
        println!("共提取 {} 条文本，表格已写入: {:?}", pair_total, output);
    }
    Ok(())
}

/// 按对象类型选择提取入口；提取不到内容时输出一条空行占位
fn extract_object_pairs(
    extractor: &TextExtractor,
    object: &bundle_patcher::BundleObject,
    suffix: &str,
) -> Vec<TextPair> {
    let empty_row = || {
        vec![TextPair {
            selector: String::new(),
            original: String::new(),
            selector_cn: String::new(),
            chinese: String::new(),
        }]
    };

    match object.type_name.as_str() {
        "TextAsset" => {
            let pairs = extractor.extract_text_blob(object.read_bytes());
            if pairs.is_empty() {
                empty_row()
            } else {
                pairs
            }
        }
        "MonoBehaviour" => match object.read_tree() {
            Ok(tree) => {
                let pairs = extractor.extract_object_tree(&tree);
                if pairs.is_empty() {
                    empty_row()
                } else {
                    pairs
                }
            }
            Err(error) => {
                eprintln!("跳过无法解码的对象 {} ({}): {}", object.path_id, suffix, error);
                empty_row()
            }
        },
        // 其他类型仅列入清单
        _ => empty_row(),
    }
}

/// 合并模式：补丁文件(低优先级) + 表格(高优先级) → 补丁文件
fn build_patch_file(cli: &Cli, sheets: &[PathBuf]) -> anyhow::Result<()> {
    let addresses = AddressesFile::new(&cli.addresses);
    let sheet_sources: Vec<SheetPatchSource> = sheets
        .iter()
        .map(|path| SheetPatchSource::new(path))
        .collect();

    let mut sources: Vec<&dyn PatchSource> = vec![&addresses];
    for source in &sheet_sources {
        sources.push(source);
    }

    let load = load_patch_map(&sources).context("合并补丁源失败")?;
    for (label, error) in &load.skipped {
        eprintln!("补丁源被跳过 {}: {}", label, error);
    }

    save_addresses(&load.map, &cli.addresses)
        .with_context(|| format!("写出补丁文件失败: {:?}", cli.addresses))?;

    if !cli.quiet {
        println!(
            "合并了 {} 个补丁条目，已写入: {:?}",
            entry_count(&load.map),
            cli.addresses
        );
    }
    Ok(())
}

/// 应用模式：整个目录跑一轮补丁并输出审计报告
fn apply_patches(
    cli: &Cli,
    assets_folder: &Path,
    sheets: &[PathBuf],
    translated_dir: Option<&Path>,
    ignored_suffixes: &[String],
    report: &Path,
) -> anyhow::Result<()> {
    validate_folder(assets_folder)?;

    let addresses = AddressesFile::new(&cli.addresses);
    let sheet_sources: Vec<SheetPatchSource> = sheets
        .iter()
        .map(|path| SheetPatchSource::new(path))
        .collect();

    let mut sources: Vec<&dyn PatchSource> = vec![&addresses];
    for source in &sheet_sources {
        sources.push(source);
    }

    let load = load_patch_map(&sources).context("加载补丁失败")?;
    for (label, error) in &load.skipped {
        eprintln!("补丁源被跳过 {}: {}", label, error);
    }

    let blobs: BlobReplacements = match translated_dir {
        Some(dir) => load_blob_replacements(dir)
            .with_context(|| format!("读取整体替换目录失败: {:?}", dir))?,
        None => BlobReplacements::new(),
    };

    let total_entries = entry_count(&load.map);
    if total_entries == 0 && blobs.is_empty() {
        println!("没有可应用的补丁");
        return Ok(());
    }

    let outcome = apply_to_folder(assets_folder, &load.map, Some(&blobs), ignored_suffixes)
        .context("应用补丁失败")?;

    write_audit_report(report, &outcome.stats, &outcome.unresolved, total_entries)
        .with_context(|| format!("写出审计报告失败: {:?}", report))?;

    if !cli.quiet {
        println!(
            "处理了 {} 个bundle，修改 {} 个，应用 {} 个补丁值",
            outcome.stats.bundles_scanned,
            outcome.stats.bundles_patched,
            outcome.stats.values_applied
        );
        if !outcome.unresolved.is_empty() {
            println!(
                "⚠️ {} 个补丁条目从未命中，详见报告: {:?}",
                outcome.unresolved.len(),
                report
            );
        } else {
            println!("报告已写入: {:?}", report);
        }
    }
    Ok(())
}
