//! qbank 命令行入口
//!
//! 从 stdin 读取一条 JSON 请求，交给 `CategoryService` 执行，结果以 JSON 打印到 stdout：
//!
//! ```json
//! {"userId": 2, "sessionKey": "abc", "command": {"op": "moveAfter", "id": 5, "referenceId": 3}}
//! ```

use std::io::Read;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use qbank_lib::config::QbankConfig;
use qbank_lib::logging::init_tracing;
use qbank_lib::qbank::{
    CategoryService, MoveTarget, NewCategory, QbankDatabase, QbankResult, RequestContext,
    StaticSessionKey, UpdateCategory,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Request {
    #[serde(flatten)]
    ctx: RequestContext,
    command: Command,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", tag = "op")]
enum Command {
    Create(NewCategory),
    Update(UpdateCategory),
    #[serde(rename_all = "camelCase")]
    Delete { id: i64 },
    #[serde(rename_all = "camelCase")]
    MoveItemsAndDelete { id: i64, destination_id: i64 },
    #[serde(rename_all = "camelCase")]
    MoveToScopeRoot { id: i64, scope_id: i64 },
    #[serde(rename_all = "camelCase")]
    MoveAfter { id: i64, reference_id: i64 },
    #[serde(rename_all = "camelCase")]
    MoveInto { id: i64, parent_id: i64 },
    #[serde(rename_all = "camelCase")]
    Move { id: i64, target: MoveTarget },
    #[serde(rename_all = "camelCase")]
    Get { id: i64 },
    #[serde(rename_all = "camelCase")]
    ListByScope { scope_id: i64 },
    #[serde(rename_all = "camelCase")]
    ListRoots { scope_id: i64 },
    #[serde(rename_all = "camelCase")]
    ListChildren { parent_id: i64 },
    #[serde(rename_all = "camelCase")]
    Tree { scope_id: i64 },
    #[serde(rename_all = "camelCase")]
    ViableParents { id: i64 },
    Stats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    code: &'static str,
    message: String,
}

fn execute(
    service: &CategoryService,
    ctx: &RequestContext,
    command: Command,
) -> QbankResult<serde_json::Value> {
    let value = match command {
        Command::Create(new) => serde_json::to_value(service.create(ctx, &new)?)?,
        Command::Update(update) => serde_json::to_value(service.update(ctx, &update)?)?,
        Command::Delete { id } => {
            service.delete(ctx, id)?;
            json!({ "deleted": id })
        }
        Command::MoveItemsAndDelete { id, destination_id } => {
            let moved = service.move_items_and_delete(ctx, id, destination_id)?;
            json!({ "deleted": id, "movedItems": moved })
        }
        Command::MoveToScopeRoot { id, scope_id } => {
            serde_json::to_value(service.move_to_scope_root(ctx, id, scope_id)?)?
        }
        Command::MoveAfter { id, reference_id } => {
            serde_json::to_value(service.move_after(ctx, id, reference_id)?)?
        }
        Command::MoveInto { id, parent_id } => {
            serde_json::to_value(service.move_into(ctx, id, parent_id)?)?
        }
        Command::Move { id, target } => serde_json::to_value(service.move_to(ctx, id, target)?)?,
        Command::Get { id } => serde_json::to_value(service.get_category(id)?)?,
        Command::ListByScope { scope_id } => serde_json::to_value(service.list_by_scope(scope_id)?)?,
        Command::ListRoots { scope_id } => serde_json::to_value(service.list_roots(scope_id)?)?,
        Command::ListChildren { parent_id } => {
            serde_json::to_value(service.list_children(parent_id)?)?
        }
        Command::Tree { scope_id } => serde_json::to_value(service.category_tree(scope_id)?)?,
        Command::ViableParents { id } => serde_json::to_value(service.viable_parents(id)?)?,
        Command::Stats => serde_json::to_value(service.database().get_statistics()?)?,
    };
    Ok(value)
}

fn main() -> anyhow::Result<()> {
    let cfg = QbankConfig::from_env_and_file()?;
    init_tracing(&cfg.log_filter);

    let db = Arc::new(QbankDatabase::from_config(&cfg)?);
    let mut service = CategoryService::new(db);
    if let Some(key) = cfg.session_key.as_deref().filter(|k| !k.is_empty()) {
        service = service.with_session_guard(Arc::new(StaticSessionKey::new(key)));
    }

    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    let request: Request = serde_json::from_str(&buf)?;

    let out = match execute(&service, &request.ctx, request.command) {
        Ok(result) => json!({ "ok": true, "result": result }),
        Err(e) => {
            if e.is_business_rule() {
                tracing::info!("[Qbank::Cli] Request rejected: {}", e);
            } else {
                tracing::warn!("[Qbank::Cli] Request failed: {}", e);
            }
            let body = ErrorBody {
                code: e.code(),
                message: e.to_string(),
            };
            json!({ "ok": false, "error": body })
        }
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
