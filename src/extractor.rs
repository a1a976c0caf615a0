use crate::datatypes::RawString;
use crate::selector::Selector;
use crate::tree::Tree;
use crate::{LOCALE_CHINESE, LOCALE_ORIGINAL};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// 结构化对象里常见的纯文本字段（没有多语言组时的兜底）
const PLAIN_TEXT_FIELD: &str = "m_Text";

/// 单条本地化文本：选择器 + 语言码 + 文本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizedEntry {
    pub selector: String,
    pub locale: i64,
    pub text: String,
}

/// 一条逻辑字符串的原文/中文配对
///
/// 选择器是持久化形态的字符串，缺失某一侧时选择器与文本均为空。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPair {
    pub selector: String,
    pub original: String,
    pub selector_cn: String,
    pub chinese: String,
}

/// 提取配置
///
/// 字段名默认取该资产格式的惯用名；defaultText回退启发式
/// 默认关闭（见 [`DefaultTextFallback`]）。
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub locale_field: String,
    pub text_field: String,
    pub default_text_field: String,
    pub default_text_fallback: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            locale_field: "_locale".to_string(),
            text_field: "_text".to_string(),
            default_text_field: "_defaultText".to_string(),
            default_text_fallback: false,
        }
    }
}

/// 原文缺失时的回退策略
///
/// `ancestors` 是从根到当前多语言序列（含序列本身）的节点链。
pub trait FallbackResolver: Send + Sync {
    fn resolve(&self, ancestors: &[&Tree]) -> Option<String>;
}

/// 从多语言序列上两层的节点读取默认文本字段
///
/// 对应 `item { _defaultText, _taggedText: [...] }` 形态：
/// 序列上一层是持有它的映射，再上一层的字段在此读取……实际数据里
/// 默认文本挂在持有序列的映射上，即链上倒数第二个节点。
/// 该启发式未经全量数据验证，仅在显式开启时生效。
pub struct DefaultTextFallback {
    field: String,
}

impl DefaultTextFallback {
    pub fn new(field: impl Into<String>) -> Self {
        DefaultTextFallback { field: field.into() }
    }
}

impl FallbackResolver for DefaultTextFallback {
    fn resolve(&self, ancestors: &[&Tree]) -> Option<String> {
        let owner = ancestors.get(ancestors.len().checked_sub(2)?)?;
        let text = owner.get(&self.field)?.as_str()?;
        (!text.is_empty()).then(|| text.to_string())
    }
}

/// 本地化文本提取器
///
/// 对树做确定性的先序深度遍历，定位"多语言组"：
/// 非空序列、首元素为同时带语言码字段和文本字段的映射。
/// 组内按元素下标生成选择器，语言码0作原文、2作中文配对输出。
pub struct TextExtractor {
    options: ExtractOptions,
    fallback: Option<Arc<dyn FallbackResolver>>,
}

impl TextExtractor {
    pub fn new(options: ExtractOptions) -> Self {
        let fallback: Option<Arc<dyn FallbackResolver>> = if options.default_text_fallback {
            Some(Arc::new(DefaultTextFallback::new(
                options.default_text_field.clone(),
            )))
        } else {
            None
        };
        TextExtractor { options, fallback }
    }

    /// 使用自定义回退策略
    pub fn with_fallback(options: ExtractOptions, fallback: Arc<dyn FallbackResolver>) -> Self {
        TextExtractor {
            options,
            fallback: Some(fallback),
        }
    }

    /// 遍历任意树，输出全部文本配对
    pub fn extract_tree(&self, tree: &Tree) -> Vec<TextPair> {
        let mut pairs = Vec::new();
        let mut ancestors: Vec<&Tree> = Vec::new();
        self.walk(tree, &Selector::new(), &mut ancestors, &mut pairs);
        pairs
    }

    /// 文本资源入口：先按JSON解码，失败则整体作为无选择器的原文
    pub fn extract_text_blob(&self, bytes: &[u8]) -> Vec<TextPair> {
        let decoded = RawString::decode(bytes);
        match Tree::from_json_str(&decoded.content) {
            Ok(tree) => self.extract_tree(&tree),
            Err(error) => {
                debug!(%error, "text blob is not JSON, treating as plain text");
                vec![TextPair {
                    selector: String::new(),
                    original: decoded.content,
                    selector_cn: String::new(),
                    chinese: String::new(),
                }]
            }
        }
    }

    /// 结构化对象入口：无配对时回退到纯文本字段
    pub fn extract_object_tree(&self, tree: &Tree) -> Vec<TextPair> {
        let pairs = self.extract_tree(tree);
        if !pairs.is_empty() {
            return pairs;
        }

        if let Some(text) = tree.get(PLAIN_TEXT_FIELD).and_then(Tree::as_str) {
            return vec![TextPair {
                selector: PLAIN_TEXT_FIELD.to_string(),
                original: text.to_string(),
                selector_cn: String::new(),
                chinese: String::new(),
            }];
        }

        Vec::new()
    }

    fn walk<'t>(
        &self,
        node: &'t Tree,
        path: &Selector,
        ancestors: &mut Vec<&'t Tree>,
        out: &mut Vec<TextPair>,
    ) {
        match node {
            Tree::Mapping(map) => {
                ancestors.push(node);
                for (key, value) in map {
                    let child_path = path.join_field(key);
                    if let Some(items) = self.locale_group(value) {
                        ancestors.push(value);
                        self.emit_group(items, &child_path, ancestors, out);
                        ancestors.pop();
                    } else if let Tree::Sequence(items) = value {
                        ancestors.push(value);
                        for (index, item) in items.iter().enumerate() {
                            self.walk(item, &child_path.join_index(index), ancestors, out);
                        }
                        ancestors.pop();
                    } else {
                        self.walk(value, &child_path, ancestors, out);
                    }
                }
                ancestors.pop();
            }
            Tree::Sequence(items) => {
                ancestors.push(node);
                for (index, item) in items.iter().enumerate() {
                    self.walk(item, &path.join_index(index), ancestors, out);
                }
                ancestors.pop();
            }
            _ => {}
        }
    }

    /// 多语言组判定：非空序列且首元素同时带语言码和文本字段
    fn locale_group<'t>(&self, value: &'t Tree) -> Option<&'t [Tree]> {
        let Tree::Sequence(items) = value else {
            return None;
        };
        let first = items.first()?;
        (first.get(&self.options.locale_field).is_some()
            && first.get(&self.options.text_field).is_some())
        .then_some(items.as_slice())
    }

    fn emit_group(
        &self,
        items: &[Tree],
        group_path: &Selector,
        ancestors: &[&Tree],
        out: &mut Vec<TextPair>,
    ) {
        let mut by_locale: IndexMap<i64, LocalizedEntry> = IndexMap::new();

        for (index, entry) in items.iter().enumerate() {
            let Some(locale) = entry.get(&self.options.locale_field).and_then(Tree::as_int)
            else {
                continue;
            };
            let text = entry
                .get(&self.options.text_field)
                .and_then(Tree::as_str)
                .unwrap_or("")
                .to_string();
            let selector = group_path
                .join_index(index)
                .join_field(&self.options.text_field);

            by_locale.insert(
                locale,
                LocalizedEntry {
                    selector: selector.to_string(),
                    locale,
                    text,
                },
            );
        }

        let (selector, mut original) = match by_locale.get(&LOCALE_ORIGINAL) {
            Some(entry) => (entry.selector.clone(), entry.text.clone()),
            None => (String::new(), String::new()),
        };
        let (selector_cn, chinese) = match by_locale.get(&LOCALE_CHINESE) {
            Some(entry) => (entry.selector.clone(), entry.text.clone()),
            None => (String::new(), String::new()),
        };

        if original.is_empty() && !chinese.is_empty() {
            if let Some(fallback) = &self.fallback {
                if let Some(default_text) = fallback.resolve(ancestors) {
                    original = default_text;
                }
            }
        }

        if !original.is_empty() || !chinese.is_empty() {
            out.push(TextPair {
                selector,
                original,
                selector_cn,
                chinese,
            });
        }
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        TextExtractor::new(ExtractOptions::default())
    }
}
