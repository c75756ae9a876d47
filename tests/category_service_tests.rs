//! 分类服务集成测试
//!
//! ## 测试覆盖
//!
//! 1. 三种移动后同级 sort_order 连续为 1..N
//! 2. 删除时子分类拼接到被删位置
//! 3. 唯一根分类的删除/移走保护
//! 4. 跨 scope 移动的子树级联与题目迁移
//! 5. 失败操作不留下部分写入

use std::collections::HashMap;
use std::sync::Arc;

use assert_matches::assert_matches;
use rusqlite::Connection;
use tempfile::TempDir;

use qbank_lib::qbank::{
    CategoryService, ItemMigrationHook, NewCategory, QbankDatabase, QbankError, QbankResult,
    QuestionCategory, RequestContext, SqliteQuestionStore, UpdateCategory,
};

/// 题目迁移成功、scope 迁移失败的钩子
struct FailingScopeHook;

impl ItemMigrationHook for FailingScopeHook {
    fn count_items(&self, conn: &Connection, category_id: i64) -> QbankResult<usize> {
        SqliteQuestionStore.count_items(conn, category_id)
    }

    fn move_items(&self, conn: &Connection, from: i64, to: i64) -> QbankResult<usize> {
        SqliteQuestionStore.move_items(conn, from, to)
    }

    fn move_category_to_scope(
        &self,
        _conn: &Connection,
        _category_id: i64,
        _old_scope_id: i64,
        _new_scope_id: i64,
    ) -> QbankResult<()> {
        Err(QbankError::Io("boom".to_string()))
    }
}

fn setup_service() -> (TempDir, CategoryService) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db = QbankDatabase::new(temp_dir.path()).expect("Failed to create database");
    (temp_dir, CategoryService::new(Arc::new(db)))
}

fn ctx() -> RequestContext {
    RequestContext::new(2, "sesskey")
}

fn root(service: &CategoryService, scope_id: i64, name: &str) -> QuestionCategory {
    service
        .create(&ctx(), &NewCategory::root(scope_id, name))
        .expect("create root")
}

fn child(service: &CategoryService, parent: &QuestionCategory, name: &str) -> QuestionCategory {
    service
        .create(&ctx(), &NewCategory::child(parent, name))
        .expect("create child")
}

/// (id, sort_order) 列表，按 sort_order
fn roots_of(service: &CategoryService, scope_id: i64) -> Vec<(i64, i64)> {
    service
        .list_roots(scope_id)
        .unwrap()
        .into_iter()
        .map(|c| (c.id, c.sort_order))
        .collect()
}

fn children_of(service: &CategoryService, parent_id: i64) -> Vec<(i64, i64)> {
    service
        .list_children(parent_id)
        .unwrap()
        .into_iter()
        .map(|c| (c.id, c.sort_order))
        .collect()
}

/// 每个同级集合的 sort_order 都是 1..N
fn assert_contiguous(service: &CategoryService, scope_id: i64) {
    let mut sets: HashMap<i64, Vec<i64>> = HashMap::new();
    for c in service.list_by_scope(scope_id).unwrap() {
        sets.entry(c.parent_id).or_default().push(c.sort_order);
    }
    for (parent_id, mut orders) in sets {
        orders.sort_unstable();
        let expected: Vec<i64> = (1..=orders.len() as i64).collect();
        assert_eq!(orders, expected, "siblings of {} not contiguous", parent_id);
    }
}

// ============================================================================
// 移动
// ============================================================================

#[test]
fn move_after_within_same_set() {
    let (_temp_dir, service) = setup_service();
    let a = root(&service, 1, "A");
    let b = root(&service, 1, "B");
    let c = root(&service, 1, "C");

    service.move_after(&ctx(), a.id, c.id).unwrap();
    assert_eq!(roots_of(&service, 1), vec![(b.id, 1), (c.id, 2), (a.id, 3)]);
}

#[test]
fn move_after_from_other_set_shifts_followers() {
    let (_temp_dir, service) = setup_service();
    let p = root(&service, 1, "P");
    let b = root(&service, 1, "B");
    let c = root(&service, 1, "C");
    let a = child(&service, &p, "A");
    let sibling = child(&service, &p, "sibling");

    let moved = service.move_after(&ctx(), a.id, p.id).unwrap();
    assert_eq!(moved.sort_order, p.sort_order + 1);
    assert_eq!(moved.parent_id, 0);
    assert_eq!(
        roots_of(&service, 1),
        vec![(p.id, 1), (a.id, 2), (b.id, 3), (c.id, 4)]
    );
    assert_eq!(children_of(&service, p.id), vec![(sibling.id, 1)]);
    assert_contiguous(&service, 1);
}

#[test]
fn move_into_places_first_child() {
    let (_temp_dir, service) = setup_service();
    let a = root(&service, 1, "A");
    let d = root(&service, 1, "D");
    let e = child(&service, &d, "E");
    let f = child(&service, &d, "F");

    service.move_into(&ctx(), a.id, d.id).unwrap();
    assert_eq!(
        children_of(&service, d.id),
        vec![(a.id, 1), (e.id, 2), (f.id, 3)]
    );
    assert_eq!(roots_of(&service, 1), vec![(d.id, 1)]);
}

#[test]
fn move_into_descendant_leaves_store_unchanged() {
    let (_temp_dir, service) = setup_service();
    let a = root(&service, 1, "A");
    root(&service, 1, "B");
    let mid = child(&service, &a, "mid");
    let leaf = child(&service, &mid, "leaf");
    let before = service.list_by_scope(1).unwrap();

    assert_matches!(
        service.move_into(&ctx(), a.id, leaf.id),
        Err(QbankError::InvalidParent { .. })
    );
    assert_matches!(
        service.move_after(&ctx(), a.id, mid.id),
        Err(QbankError::InvalidParent { .. })
    );
    assert_eq!(service.list_by_scope(1).unwrap(), before);
}

#[test]
fn move_after_unknown_reference_is_not_found() {
    let (_temp_dir, service) = setup_service();
    let a = root(&service, 1, "A");
    root(&service, 1, "B");
    assert_matches!(
        service.move_after(&ctx(), a.id, 12345),
        Err(QbankError::NotFound { category_id: 12345 })
    );
}

#[test]
fn cross_scope_move_cascades_subtree_and_items() {
    let (_temp_dir, service) = setup_service();
    root(&service, 1, "stay");
    let moved = root(&service, 1, "moved");
    let sub = child(&service, &moved, "sub");
    let leaf = child(&service, &sub, "leaf");
    let target = root(&service, 2, "target");

    let question = {
        let conn = service.database().get_conn().unwrap();
        SqliteQuestionStore::insert_question_with_conn(&conn, leaf.id, 1, "q", "essay", "").unwrap()
    };

    let result = service.move_to_scope_root(&ctx(), moved.id, 2).unwrap();
    assert_eq!(result.scope_id, 2);
    assert_eq!(result.sort_order, 1);

    assert_eq!(roots_of(&service, 2), vec![(moved.id, 1), (target.id, 2)]);
    assert_eq!(service.get_category(sub.id).unwrap().scope_id, 2);
    assert_eq!(service.get_category(leaf.id).unwrap().scope_id, 2);
    assert_eq!(service.list_by_scope(1).unwrap().len(), 1);

    let conn = service.database().get_conn().unwrap();
    assert_eq!(
        SqliteQuestionStore::question_scope_with_conn(&conn, question).unwrap(),
        2
    );
    assert_contiguous(&service, 1);
    assert_contiguous(&service, 2);
}

#[test]
fn failed_scope_hook_rolls_back_cascade() {
    let (_temp_dir, service) = setup_service();
    let service = service.with_item_hook(Arc::new(FailingScopeHook));
    root(&service, 1, "stay");
    let a = root(&service, 1, "A");
    child(&service, &a, "sub");
    root(&service, 2, "target");

    let before_source = service.list_by_scope(1).unwrap();
    let before_target = service.list_by_scope(2).unwrap();

    assert_matches!(
        service.move_to_scope_root(&ctx(), a.id, 2),
        Err(QbankError::Io(_))
    );
    assert_eq!(service.list_by_scope(1).unwrap(), before_source);
    assert_eq!(service.list_by_scope(2).unwrap(), before_target);
}

#[test]
fn move_into_other_scope_adopts_parent_scope() {
    let (_temp_dir, service) = setup_service();
    root(&service, 1, "stay");
    let a = root(&service, 1, "A");
    let host = root(&service, 3, "host");

    let moved = service.move_into(&ctx(), a.id, host.id).unwrap();
    assert_eq!(moved.scope_id, 3);
    assert_eq!(moved.parent_id, host.id);
    assert_eq!(moved.sort_order, 1);
}

#[test]
fn sole_root_cannot_be_moved_away() {
    let (_temp_dir, service) = setup_service();
    let only = root(&service, 1, "only");
    let elsewhere = root(&service, 2, "elsewhere");

    assert_matches!(
        service.move_into(&ctx(), only.id, elsewhere.id),
        Err(QbankError::LastCategory { scope_id: 1, .. })
    );
    assert_matches!(
        service.move_after(&ctx(), only.id, elsewhere.id),
        Err(QbankError::LastCategory { .. })
    );
    assert_eq!(service.get_category(only.id).unwrap().scope_id, 1);
}

// ============================================================================
// 更新
// ============================================================================

#[test]
fn rename_to_same_name_is_noop_on_position() {
    let (_temp_dir, service) = setup_service();
    root(&service, 1, "first");
    let x = root(&service, 1, "X");

    let updated = service
        .update(&ctx(), &UpdateCategory::from_existing(&x))
        .unwrap();
    assert_eq!(updated.sort_order, x.sort_order);
    assert_eq!(updated.parent_id, x.parent_id);
    assert_eq!(updated.scope_id, x.scope_id);
    assert_eq!(updated.stamp, x.stamp);
}

#[test]
fn update_scope_cascades_subtree() {
    let (_temp_dir, service) = setup_service();
    root(&service, 1, "stay");
    let a = root(&service, 1, "A");
    let sub = child(&service, &a, "sub");

    let mut update = UpdateCategory::from_existing(&a);
    update.scope_id = 4;
    let updated = service.update(&ctx(), &update).unwrap();
    assert_eq!(updated.scope_id, 4);
    assert_eq!(updated.sort_order, 1);
    assert_eq!(service.get_category(sub.id).unwrap().scope_id, 4);
}

#[test]
fn update_with_parent_in_other_scope_is_mismatch() {
    let (_temp_dir, service) = setup_service();
    root(&service, 1, "stay");
    let a = root(&service, 1, "A");
    let foreign = root(&service, 2, "foreign");

    let mut update = UpdateCategory::from_existing(&a);
    update.parent_id = foreign.id;
    assert_matches!(
        service.update(&ctx(), &update),
        Err(QbankError::ScopeMismatch { .. })
    );
}

#[test]
fn update_rejects_empty_name() {
    let (_temp_dir, service) = setup_service();
    let a = root(&service, 1, "A");
    let mut update = UpdateCategory::from_existing(&a);
    update.name = "  ".to_string();
    assert_matches!(
        service.update(&ctx(), &update),
        Err(QbankError::Validation { .. })
    );
}

// ============================================================================
// 删除
// ============================================================================

#[test]
fn delete_splices_children_into_slot() {
    let (_temp_dir, service) = setup_service();
    let x = root(&service, 1, "X");
    let d = root(&service, 1, "D");
    let y = root(&service, 1, "Y");
    let c1 = child(&service, &d, "c1");
    let c2 = child(&service, &d, "c2");
    let grandchild = child(&service, &c1, "g");
    let before = service.list_roots(1).unwrap().len();

    service.delete(&ctx(), d.id).unwrap();

    let roots = roots_of(&service, 1);
    assert_eq!(roots.len(), before - 1 + 2);
    assert_eq!(roots, vec![(x.id, 1), (c1.id, 2), (c2.id, 3), (y.id, 4)]);
    assert_eq!(service.get_category(grandchild.id).unwrap().parent_id, c1.id);
    assert_contiguous(&service, 1);
}

#[test]
fn delete_nested_category_keeps_grandparent_order() {
    let (_temp_dir, service) = setup_service();
    let top = root(&service, 1, "top");
    let first = child(&service, &top, "first");
    let doomed = child(&service, &top, "doomed");
    let last = child(&service, &top, "last");
    let inner = child(&service, &doomed, "inner");

    service.delete(&ctx(), doomed.id).unwrap();
    assert_eq!(
        children_of(&service, top.id),
        vec![(first.id, 1), (inner.id, 2), (last.id, 3)]
    );
}

#[test]
fn delete_only_root_fails_without_changes() {
    let (_temp_dir, service) = setup_service();
    let only = root(&service, 1, "only");
    child(&service, &only, "kid");
    let before = service.list_by_scope(1).unwrap();

    assert_matches!(
        service.delete(&ctx(), only.id),
        Err(QbankError::LastCategory { .. })
    );
    assert_eq!(service.list_by_scope(1).unwrap(), before);
}

#[test]
fn move_items_and_delete_migrates_questions() {
    let (_temp_dir, service) = setup_service();
    let keep = root(&service, 1, "keep");
    let doomed = root(&service, 1, "doomed");
    {
        let conn = service.database().get_conn().unwrap();
        for name in ["q1", "q2", "q3"] {
            SqliteQuestionStore::insert_question_with_conn(&conn, doomed.id, 1, name, "essay", "")
                .unwrap();
        }
    }

    assert_matches!(
        service.delete(&ctx(), doomed.id),
        Err(QbankError::HasItems { item_count: 3, .. })
    );
    assert_eq!(
        service.move_items_and_delete(&ctx(), doomed.id, keep.id).unwrap(),
        3
    );

    let conn = service.database().get_conn().unwrap();
    assert_eq!(SqliteQuestionStore.count_items(&conn, keep.id).unwrap(), 3);
    assert_eq!(roots_of(&service, 1), vec![(keep.id, 1)]);
}

#[test]
fn delete_blocked_by_sub_question_with_parent_elsewhere() {
    let (_temp_dir, service) = setup_service();
    let keep = root(&service, 1, "keep");
    let doomed = root(&service, 1, "doomed");
    {
        let conn = service.database().get_conn().unwrap();
        let parent =
            SqliteQuestionStore::insert_question_with_conn(&conn, keep.id, 1, "p", "multianswer", "")
                .unwrap();
        SqliteQuestionStore::insert_child_question_with_conn(
            &conn,
            parent,
            doomed.id,
            1,
            "sub",
            "shortanswer",
        )
        .unwrap();
    }

    assert_matches!(
        service.delete(&ctx(), doomed.id),
        Err(QbankError::HasItems { item_count: 1, .. })
    );
    assert_eq!(roots_of(&service, 1), vec![(keep.id, 1), (doomed.id, 2)]);

    // 没有顶层题目，但子题目仍随之迁走
    assert_eq!(
        service.move_items_and_delete(&ctx(), doomed.id, keep.id).unwrap(),
        0
    );
    let conn = service.database().get_conn().unwrap();
    assert!(SqliteQuestionStore::list_questions_by_category_with_conn(&conn, doomed.id)
        .unwrap()
        .is_empty());
    assert_eq!(SqliteQuestionStore.count_owned_rows(&conn, keep.id).unwrap(), 2);
    assert_eq!(roots_of(&service, 1), vec![(keep.id, 1)]);
}

#[test]
fn statistics_reflect_store() {
    let (_temp_dir, service) = setup_service();
    let a = root(&service, 1, "A");
    root(&service, 2, "B");
    {
        let conn = service.database().get_conn().unwrap();
        SqliteQuestionStore::insert_question_with_conn(&conn, a.id, 1, "q", "essay", "").unwrap();
    }
    let stats = service.database().get_statistics().unwrap();
    assert_eq!(stats.category_count, 2);
    assert_eq!(stats.scope_count, 2);
    assert_eq!(stats.question_count, 1);
}
