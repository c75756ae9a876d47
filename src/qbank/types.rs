//! Qbank 核心类型定义
//!
//! 本模块定义题库分类相关的核心数据结构。
//! 所有结构体使用 camelCase 序列化，与展示层保持一致。
//!
//! ## 核心概念
//! - `QuestionCategory`: 分类实体（question_categories 表）
//! - `NewCategory` / `UpdateCategory`: 创建、更新参数
//! - `MoveTarget`: 移动目标位置描述
//! - `CategoryTree`: 以 ID 索引的分类 arena，用于组装嵌套树
//! - `RequestContext`: 每次调用显式传入的请求上下文

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ROOT_PARENT_ID;

// ============================================================================
// 分类实体
// ============================================================================

/// 题库分类实体（question_categories 表）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionCategory {
    /// 分类 ID（自增）
    pub id: i64,

    /// 父分类 ID（0 表示根级）
    pub parent_id: i64,

    /// 所属 scope（上下文）ID
    pub scope_id: i64,

    /// 名称
    pub name: String,

    /// 描述
    pub description: String,

    /// 同级排序（1..N）
    pub sort_order: i64,

    /// 全局唯一标识，创建后不变
    pub stamp: String,

    /// 创建时间（毫秒时间戳）
    pub created_at: i64,

    /// 更新时间（毫秒时间戳）
    pub updated_at: i64,

    /// 顶层题目数量（只读，由题目存储统计）
    #[serde(default)]
    pub item_count: usize,
}

impl QuestionCategory {
    /// 生成分类 stamp
    pub fn generate_stamp() -> String {
        format!("qc_{}", uuid::Uuid::new_v4().simple())
    }

    /// 是否为根级分类
    pub fn is_root(&self) -> bool {
        self.parent_id == ROOT_PARENT_ID
    }

    /// 同级集合键 `(scope_id, parent_id)`
    pub fn sibling_key(&self) -> (i64, i64) {
        (self.scope_id, self.parent_id)
    }
}

/// 创建分类参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    /// 父分类 ID（0 表示根级）
    #[serde(default)]
    pub parent_id: i64,

    pub scope_id: i64,

    pub name: String,

    #[serde(default)]
    pub description: String,
}

impl NewCategory {
    pub fn root(scope_id: i64, name: impl Into<String>) -> Self {
        Self {
            parent_id: ROOT_PARENT_ID,
            scope_id,
            name: name.into(),
            description: String::new(),
        }
    }

    pub fn child(parent: &QuestionCategory, name: impl Into<String>) -> Self {
        Self {
            parent_id: parent.id,
            scope_id: parent.scope_id,
            name: name.into(),
            description: String::new(),
        }
    }
}

/// 更新分类参数（重命名 / 重新挂载）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategory {
    pub id: i64,

    /// 新父分类 ID（0 表示根级）
    pub parent_id: i64,

    /// 新 scope ID
    pub scope_id: i64,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// 可选的同级位置（1 起），缺省时同级集合不变则保持原位，变化则追加到末尾
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,
}

impl UpdateCategory {
    /// 以当前记录为基础构造更新参数（只改名称时使用）
    pub fn from_existing(category: &QuestionCategory) -> Self {
        Self {
            id: category.id,
            parent_id: category.parent_id,
            scope_id: category.scope_id,
            name: category.name.clone(),
            description: category.description.clone(),
            sort_order: None,
        }
    }
}

// ============================================================================
// 移动
// ============================================================================

/// 移动目标位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum MoveTarget {
    /// 成为指定 scope 的第一个根分类
    #[serde(rename_all = "camelCase")]
    ScopeRoot { scope_id: i64 },
    /// 紧跟在参照分类之后
    #[serde(rename_all = "camelCase")]
    After { reference_id: i64 },
    /// 成为父分类的第一个子分类
    #[serde(rename_all = "camelCase")]
    Into { parent_id: i64 },
}

// ============================================================================
// 请求上下文
// ============================================================================

/// 请求上下文，替代框架全局状态（当前用户、会话）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub user_id: i64,
    #[serde(default)]
    pub session_key: String,
}

impl RequestContext {
    pub fn new(user_id: i64, session_key: impl Into<String>) -> Self {
        Self {
            user_id,
            session_key: session_key.into(),
        }
    }
}

// ============================================================================
// 分类树
// ============================================================================

/// 分类树节点（用于展示层渲染嵌套列表）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTreeNode {
    pub category: QuestionCategory,
    pub children: Vec<CategoryTreeNode>,
}

/// 以 ID 索引的分类 arena
///
/// 父子关系通过 ID 查找解析，不持有对象间引用。
#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    nodes: Vec<QuestionCategory>,
    index: HashMap<i64, usize>,
    children: HashMap<i64, Vec<usize>>,
}

impl CategoryTree {
    pub fn new(categories: Vec<QuestionCategory>) -> Self {
        let index: HashMap<i64, usize> = categories
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id, i))
            .collect();

        let mut children: HashMap<i64, Vec<usize>> = HashMap::new();
        for (i, category) in categories.iter().enumerate() {
            // 父节点不在 arena 内时按根级处理
            let parent = if index.contains_key(&category.parent_id) {
                category.parent_id
            } else {
                ROOT_PARENT_ID
            };
            children.entry(parent).or_default().push(i);
        }
        for list in children.values_mut() {
            list.sort_by(|a, b| {
                let (a, b) = (&categories[*a], &categories[*b]);
                a.sort_order.cmp(&b.sort_order).then(a.id.cmp(&b.id))
            });
        }

        Self {
            nodes: categories,
            index,
            children,
        }
    }

    pub fn get(&self, id: i64) -> Option<&QuestionCategory> {
        self.index.get(&id).map(|i| &self.nodes[*i])
    }

    /// 直接子节点（按 sort_order）
    pub fn children_of(&self, id: i64) -> Vec<&QuestionCategory> {
        self.children
            .get(&id)
            .map(|list| list.iter().map(|i| &self.nodes[*i]).collect())
            .unwrap_or_default()
    }

    /// 节点本身及全部子孙节点的 ID（先序）
    pub fn subtree_ids(&self, id: i64) -> Vec<i64> {
        let mut out = Vec::new();
        if !self.index.contains_key(&id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(list) = self.children.get(&current) {
                for i in list.iter().rev() {
                    stack.push(self.nodes[*i].id);
                }
            }
        }
        out
    }

    /// `candidate` 是否为 `ancestor` 本身或其子孙
    pub fn is_in_subtree(&self, ancestor: i64, candidate: i64) -> bool {
        let mut current = candidate;
        let mut steps = 0;
        while let Some(node) = self.get(current) {
            if node.id == ancestor {
                return true;
            }
            if node.is_root() || steps > self.nodes.len() {
                return false;
            }
            current = node.parent_id;
            steps += 1;
        }
        false
    }

    /// 组装嵌套树
    pub fn to_nodes(&self) -> Vec<CategoryTreeNode> {
        self.build_level(ROOT_PARENT_ID)
    }

    fn build_level(&self, parent_id: i64) -> Vec<CategoryTreeNode> {
        self.children_of(parent_id)
            .into_iter()
            .map(|category| CategoryTreeNode {
                category: category.clone(),
                children: self.build_level(category.id),
            })
            .collect()
    }
}

// ============================================================================
// 题目（默认题目存储使用）
// ============================================================================

/// 题目记录（questions 表，仅包含分类迁移与自动命名需要的字段）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionItem {
    pub id: i64,
    pub category_id: i64,
    /// 父题目 ID（0 或等于自身 ID 表示顶层题目）
    pub parent_id: i64,
    pub name: String,
    pub qtype: String,
    pub question_text: String,
}
