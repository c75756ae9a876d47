//! 分类排序计划
//!
//! 纯函数，不做任何 IO：根据当前同级集合计算移动后的 `parent_id` / `scope_id` /
//! `sort_order`，由 `QbankCategoryRepo` 在同一个 SAVEPOINT 内落库。
//!
//! 所有计划都满足：受影响的同级集合在应用后 `sort_order` 恰好为 `1..N`。
//! 计划只包含值实际发生变化的记录。

use serde::{Deserialize, Serialize};

use super::error::{QbankError, QbankResult};
use super::types::QuestionCategory;

/// 单条排序赋值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortAssignment {
    pub id: i64,
    pub sort_order: i64,
}

/// 插入位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// 第一个
    First,
    /// 最后一个
    Last,
    /// 紧跟在指定兄弟之后
    After(i64),
    /// 指定位置（1 起，越界时夹到 `1..=N+1`）
    At(i64),
}

/// 一次移动的完整计划
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    pub moved_id: i64,
    pub new_parent_id: i64,
    pub new_scope_id: i64,
    pub moved_sort_order: i64,
    /// 除被移动节点外需要改写 sort_order 的兄弟（新旧两个集合）
    pub assignments: Vec<SortAssignment>,
    pub parent_changed: bool,
    pub scope_changed: bool,
}

impl MovePlan {
    /// 计划是否不改变任何数据
    pub fn is_noop(&self, moved: &QuestionCategory) -> bool {
        !self.parent_changed
            && !self.scope_changed
            && self.assignments.is_empty()
            && moved.sort_order == self.moved_sort_order
    }
}

/// 按 (sort_order, id) 排序后的兄弟 ID，排除 `exclude`
fn ordered_ids(siblings: &[QuestionCategory], exclude: Option<i64>) -> Vec<i64> {
    let mut sorted: Vec<&QuestionCategory> = siblings
        .iter()
        .filter(|c| Some(c.id) != exclude)
        .collect();
    sorted.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.id.cmp(&b.id)));
    sorted.into_iter().map(|c| c.id).collect()
}

/// 给有序 ID 列表编号 `1..N`，只返回与当前值不同的赋值
fn changed_assignments(order: &[i64], current: &[QuestionCategory]) -> Vec<SortAssignment> {
    order
        .iter()
        .enumerate()
        .filter_map(|(index, id)| {
            let sort_order = index as i64 + 1;
            let unchanged = current
                .iter()
                .any(|c| c.id == *id && c.sort_order == sort_order);
            (!unchanged).then_some(SortAssignment {
                id: *id,
                sort_order,
            })
        })
        .collect()
}

/// 把同级集合压紧为 `1..N`（保持相对顺序），`exclude` 不参与编号
pub fn renumber(siblings: &[QuestionCategory], exclude: Option<i64>) -> Vec<SortAssignment> {
    let order = ordered_ids(siblings, exclude);
    changed_assignments(&order, siblings)
}

/// 计算把 `moved_id` 按 `placement` 放入同级集合后的顺序
///
/// `siblings` 可以包含也可以不包含被移动节点本身。
/// 返回 (完整顺序, 被移动节点的新位置)。
pub fn plan_insert(
    siblings: &[QuestionCategory],
    moved_id: i64,
    placement: Placement,
) -> QbankResult<(Vec<i64>, i64)> {
    let mut order = ordered_ids(siblings, Some(moved_id));
    let index = match placement {
        Placement::First => 0,
        Placement::Last => order.len(),
        Placement::After(reference_id) => {
            let position = order
                .iter()
                .position(|id| *id == reference_id)
                .ok_or_else(|| QbankError::InvalidParent {
                    category_id: moved_id,
                    target_id: reference_id,
                    reason: "Reference category is not a sibling of the target position"
                        .to_string(),
                })?;
            position + 1
        }
        Placement::At(position) => {
            let max = order.len() as i64 + 1;
            (position.clamp(1, max) - 1) as usize
        }
    };
    order.insert(index, moved_id);
    Ok((order, index as i64 + 1))
}

/// 计算一次移动
///
/// - `old_siblings`: 被移动节点当前所在的同级集合（含自身）
/// - `new_siblings`: 目标 `(new_scope_id, new_parent_id)` 下的同级集合
///
/// 同一集合内移动时两者相同，只做一次编号。
pub fn plan_move(
    moved: &QuestionCategory,
    old_siblings: &[QuestionCategory],
    new_siblings: &[QuestionCategory],
    new_parent_id: i64,
    new_scope_id: i64,
    placement: Placement,
) -> QbankResult<MovePlan> {
    let same_set = moved.sibling_key() == (new_scope_id, new_parent_id);

    let (order, moved_sort_order) = plan_insert(new_siblings, moved.id, placement)?;
    let mut assignments: Vec<SortAssignment> = changed_assignments(&order, new_siblings)
        .into_iter()
        .filter(|a| a.id != moved.id)
        .collect();

    if !same_set {
        assignments.extend(renumber(old_siblings, Some(moved.id)));
    }

    Ok(MovePlan {
        moved_id: moved.id,
        new_parent_id,
        new_scope_id,
        moved_sort_order,
        assignments,
        parent_changed: moved.parent_id != new_parent_id,
        scope_changed: moved.scope_id != new_scope_id,
    })
}

/// 删除节点时把其子节点拼接到它原来的位置
///
/// 返回父级集合的新编号：被删节点移除，子节点按原顺序占据它的位置。
/// 子节点总是出现在结果中（它们的父节点随后会被改写）。
pub fn splice_children(
    parent_siblings: &[QuestionCategory],
    removed_id: i64,
    children: &[QuestionCategory],
) -> Vec<SortAssignment> {
    let child_order = ordered_ids(children, None);
    let mut order = Vec::with_capacity(parent_siblings.len() + child_order.len());
    let mut spliced = false;
    for id in ordered_ids(parent_siblings, None) {
        if id == removed_id {
            order.extend(child_order.iter().copied());
            spliced = true;
        } else {
            order.push(id);
        }
    }
    if !spliced {
        order.extend(child_order.iter().copied());
    }

    order
        .iter()
        .enumerate()
        .filter_map(|(index, id)| {
            let sort_order = index as i64 + 1;
            let is_child = child_order.contains(id);
            let unchanged = parent_siblings
                .iter()
                .any(|c| c.id == *id && c.sort_order == sort_order);
            (is_child || !unchanged).then_some(SortAssignment {
                id: *id,
                sort_order,
            })
        })
        .collect()
}
