use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

// token = 字段名 + 任意个连续下标，如 a[1][2]
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w*)((?:\[\d+\])*)$").unwrap());
static INDEX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").unwrap());

/// 选择器token：字段名 + 连续下标
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectorToken {
    pub field: String,
    pub indices: Vec<usize>,
}

impl SelectorToken {
    pub fn field(name: impl Into<String>) -> Self {
        SelectorToken {
            field: name.into(),
            indices: Vec::new(),
        }
    }
}

/// 对象选择器：定位树中某个叶子的点分路径
///
/// 语法 `token ("." token)*`，`token = 字段名 ("[" 下标 "]")*`，
/// 例如 `_items[2]._taggedText[0]._text`。
///
/// 选择器以字符串形式存入补丁文件，应用补丁时重新解析。
/// 序列化与解析互为精确逆运算：提取阶段构造出的任何token序列，
/// 其字符串形式解析回来必须得到相同的token序列。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Selector {
    tokens: Vec<SelectorToken>,
}

impl Selector {
    pub fn new() -> Self {
        Selector::default()
    }

    /// 解析选择器字符串（总是成功）
    ///
    /// 在括号外按 `.` 分段；不符合token语法的段整体作为字段名保留，
    /// 不让个别畸形段拖垮整个解析（这样的token解析时原样往返，
    /// 应用补丁时自然软失败）。
    pub fn parse(selector: &str) -> Self {
        if selector.is_empty() {
            return Selector::new();
        }

        let tokens = split_outside_brackets(selector)
            .into_iter()
            .map(parse_token)
            .collect();

        Selector { tokens }
    }

    pub fn tokens(&self) -> &[SelectorToken] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// 追加一个字段token
    pub fn join_field(&self, name: &str) -> Selector {
        let mut tokens = self.tokens.clone();
        tokens.push(SelectorToken::field(name));
        Selector { tokens }
    }

    /// 给末尾token追加一个下标
    ///
    /// 空选择器（根节点即是序列）产生一个空字段名token，
    /// 序列化为 `[i]` 开头的路径。
    pub fn join_index(&self, index: usize) -> Selector {
        let mut tokens = self.tokens.clone();
        match tokens.last_mut() {
            Some(token) => token.indices.push(index),
            None => tokens.push(SelectorToken {
                field: String::new(),
                indices: vec![index],
            }),
        }
        Selector { tokens }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, token) in self.tokens.iter().enumerate() {
            if position > 0 {
                f.write_str(".")?;
            }
            f.write_str(&token.field)?;
            for index in &token.indices {
                write!(f, "[{}]", index)?;
            }
        }
        Ok(())
    }
}

/// 在括号外按 `.` 切分
fn split_outside_brackets(selector: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for (offset, ch) in selector.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => {
                segments.push(&selector[start..offset]);
                start = offset + 1;
            }
            _ => {}
        }
    }
    segments.push(&selector[start..]);

    segments
}

fn parse_token(segment: &str) -> SelectorToken {
    match TOKEN_RE.captures(segment) {
        Some(captures) => {
            let field = captures.get(1).map_or("", |m| m.as_str()).to_string();
            let indices = INDEX_RE
                .captures_iter(captures.get(2).map_or("", |m| m.as_str()))
                .filter_map(|c| c.get(1)?.as_str().parse::<usize>().ok())
                .collect();
            SelectorToken { field, indices }
        }
        // 畸形段：整段作为字段名保留
        None => SelectorToken::field(segment),
    }
}
