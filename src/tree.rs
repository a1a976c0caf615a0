use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 反序列化后的对象树
///
/// 叶子 / 映射 / 序列三种形态，全部遍历点用穷举匹配处理。
/// 映射保持插入顺序，保证提取遍历和JSON重编码的确定性。
#[derive(Debug, Clone, PartialEq)]
pub enum Tree {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Sequence(Vec<Tree>),
    Mapping(IndexMap<String, Tree>),
}

impl Tree {
    /// 从JSON文本解析
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        Ok(Self::from(value))
    }

    /// 序列化为紧凑JSON文本（非ASCII字符不转义）
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tree::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Tree::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, Tree::Mapping(_))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Tree::Sequence(_))
    }

    /// 映射字段访问（非映射节点返回None）
    pub fn get(&self, key: &str) -> Option<&Tree> {
        match self {
            Tree::Mapping(map) => map.get(key),
            _ => None,
        }
    }

    /// 序列元素访问（非序列节点返回None）
    pub fn at(&self, index: usize) -> Option<&Tree> {
        match self {
            Tree::Sequence(items) => items.get(index),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for Tree {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Tree::Null,
            serde_json::Value::Bool(flag) => Tree::Bool(flag),
            serde_json::Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Tree::Int(int)
                } else {
                    Tree::Float(number.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(text) => Tree::Text(text),
            serde_json::Value::Array(items) => {
                Tree::Sequence(items.into_iter().map(Tree::from).collect())
            }
            serde_json::Value::Object(map) => {
                // preserve_order：对象键按原始顺序进入映射
                Tree::Mapping(map.into_iter().map(|(k, v)| (k, Tree::from(v))).collect())
            }
        }
    }
}

impl From<&Tree> for serde_json::Value {
    fn from(tree: &Tree) -> Self {
        match tree {
            Tree::Null => serde_json::Value::Null,
            Tree::Bool(flag) => serde_json::Value::Bool(*flag),
            Tree::Int(value) => serde_json::Value::from(*value),
            Tree::Float(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Tree::Text(text) => serde_json::Value::String(text.clone()),
            Tree::Sequence(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            Tree::Mapping(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Tree {
    fn from(text: &str) -> Self {
        Tree::Text(text.to_string())
    }
}

impl From<String> for Tree {
    fn from(text: String) -> Self {
        Tree::Text(text)
    }
}

impl Serialize for Tree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Tree::Null => serializer.serialize_unit(),
            Tree::Bool(flag) => serializer.serialize_bool(*flag),
            Tree::Int(value) => serializer.serialize_i64(*value),
            Tree::Float(value) => serializer.serialize_f64(*value),
            Tree::Text(text) => serializer.serialize_str(text),
            Tree::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Tree::Mapping(map) => {
                let mut entries = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    entries.serialize_entry(key, value)?;
                }
                entries.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Tree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(Tree::from(value))
    }
}
