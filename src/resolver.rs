use crate::selector::{Selector, SelectorToken};
use crate::tree::Tree;

/// 单步访问：先字段后下标展开
enum Step<'a> {
    Field(&'a str),
    Index(usize),
}

fn flatten_steps(tokens: &[SelectorToken]) -> Vec<Step<'_>> {
    let mut steps = Vec::new();
    for token in tokens {
        steps.push(Step::Field(&token.field));
        for &index in &token.indices {
            steps.push(Step::Index(index));
        }
    }
    steps
}

/// 按选择器读取叶子节点
///
/// 任何一步失配（键不存在、节点类型不符、下标越界）返回None。
pub fn get_by_selector<'t>(root: &'t Tree, selector: &Selector) -> Option<&'t Tree> {
    if selector.is_empty() {
        return None;
    }

    let mut current = root;
    for step in flatten_steps(selector.tokens()) {
        current = match step {
            Step::Field(name) => current.get(name)?,
            Step::Index(index) => current.at(index)?,
        };
    }
    Some(current)
}

/// 按选择器写入值
///
/// 提取和应用之间树结构可能已经漂移（字段被删、序列变短），
/// 所以失配一律软失败：返回false且不触碰树，绝不panic。
/// 只覆盖已存在的字段/下标，不创建新键，不做类型转换。
pub fn set_by_selector(root: &mut Tree, selector: &Selector, value: Tree) -> bool {
    let steps = flatten_steps(selector.tokens());
    let Some((last, inner)) = steps.split_last() else {
        return false;
    };

    let mut current = root;
    for step in inner {
        current = match step {
            Step::Field(name) => match current {
                Tree::Mapping(map) => match map.get_mut(*name) {
                    Some(child) => child,
                    None => return false,
                },
                _ => return false,
            },
            Step::Index(index) => match current {
                Tree::Sequence(items) => match items.get_mut(*index) {
                    Some(child) => child,
                    None => return false,
                },
                _ => return false,
            },
        };
    }

    // 最后一步决定写入位置：字段写映射，下标写序列
    match last {
        Step::Field(name) => match current {
            Tree::Mapping(map) => match map.get_mut(*name) {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            },
            _ => false,
        },
        Step::Index(index) => match current {
            Tree::Sequence(items) => match items.get_mut(*index) {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            },
            _ => false,
        },
    }
}
