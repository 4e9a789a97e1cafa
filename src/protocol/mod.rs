use std::collections::HashMap;

use chrono::Local;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::ClientConfig;
use crate::config::ServerConfig;
use crate::services::access::{self, Caller};
use crate::services::editor::{self, EditorError, Filter, SaveRequest};
use crate::services::store::Repository;
use crate::services::{export, suggest, token};

mod command;
pub mod sync;

use command::Command;

/// Everything a request may touch.
pub struct Context<R> {
    pub repo: R,
    pub cfg: ServerConfig,
}

impl<R: Repository> Context<R> {
    pub fn new(repo: R, cfg: ServerConfig) -> Self {
        Self { repo, cfg }
    }
}

fn get_cmd(req: &Value) -> &str {
    req.get("cmd").and_then(|v| v.as_str()).unwrap_or("")
}

fn get_id(req: &Value) -> Value {
    req.get("id").cloned().unwrap_or(Value::Null)
}

fn get_payload(req: &Value) -> &Value {
    static EMPTY: Value = Value::Null;
    req.get("payload").unwrap_or(&EMPTY)
}

fn ok(id: Value, payload: Value) -> String {
    json!({
        "id": id,
        "status": "ok",
        "payload": payload
    })
    .to_string()
}

fn err(id: Value, message: impl Into<String>) -> String {
    json!({
        "id": id,
        "status": "error",
        "message": message.into()
    })
    .to_string()
}

fn parse_payload<T: for<'de> Deserialize<'de>>(payload: &Value) -> Result<T, String> {
    serde_json::from_value(payload.clone()).map_err(|e| format!("invalid payload: {e}"))
}

#[derive(Debug, Deserialize)]
struct SessionPayload {
    #[serde(default)]
    user_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CatalogPayload {
    #[serde(default)]
    user_id: Option<u64>,
    project: String,
    language_code: String,
    domain: String,
    #[serde(default)]
    filter: Filter,
    #[serde(default)]
    form: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SuggestPayload {
    #[serde(default)]
    user_id: Option<u64>,
    language_code: String,
    msgid: String,
}

#[derive(Debug, Deserialize)]
struct ProjectPayload {
    #[serde(default)]
    user_id: Option<u64>,
    project: String,
}

#[derive(Debug, Deserialize)]
struct ClientConfigPayload {
    #[serde(default)]
    user_id: Option<u64>,
    base_url: String,
}

fn editor_message(e: &EditorError) -> String {
    match e {
        EditorError::Access(a) => a.to_string(),
        other => other.to_string(),
    }
}

pub fn handle<R: Repository>(ctx: &mut Context<R>, input: &str) -> String {
    let req: Value = match serde_json::from_str(input) {
        Ok(v) => v,
        Err(_) => {
            return json!({
                "status": "error",
                "message": "invalid json"
            })
            .to_string();
        }
    };

    let id = get_id(&req);
    let payload = get_payload(&req);

    match Command::from(get_cmd(&req)) {
        Command::Ping => ok(id, json!({ "message": "traduire-core alive" })),

        Command::Sync => {
            let mut sync_req: sync::SyncRequest = match parse_payload(payload) {
                Ok(v) => v,
                Err(e) => return err(id, e),
            };
            sync_req.body = payload
                .get("body")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .as_bytes()
                .to_vec();
            let resp = sync::handle(&mut ctx.repo, &ctx.cfg, &sync_req);
            ok(id, serde_json::to_value(resp).unwrap_or(Value::Null))
        }

        Command::EditorEntries => {
            let p: CatalogPayload = match parse_payload(payload) {
                Ok(v) => v,
                Err(e) => return err(id, e),
            };
            let result = access::session(&ctx.repo, p.user_id)
                .map_err(EditorError::from)
                .and_then(|caller| editor::open(&ctx.repo, &caller, &p.project, &p.language_code, &p.domain))
                .and_then(|(_, catalog)| Ok(catalog.po()?));
            match result {
                Ok(po) => ok(
                    id,
                    json!({
                        "page": editor::entries_page(&po, &p.filter),
                        "metadata": po.metadata,
                    }),
                ),
                Err(e) => err(id, editor_message(&e)),
            }
        }

        Command::EditorSave => {
            let p: CatalogPayload = match parse_payload(payload) {
                Ok(v) => v,
                Err(e) => return err(id, e),
            };
            let caller = match access::session(&ctx.repo, p.user_id) {
                Ok(c) => c,
                Err(e) => return err(id, e.to_string()),
            };
            let save_req = SaveRequest {
                project: &p.project,
                language_code: &p.language_code,
                domain: &p.domain,
                filter: &p.filter,
                form: &p.form,
                tool: &ctx.cfg.tool,
                now: Local::now().fixed_offset(),
            };
            match editor::save(&mut ctx.repo, &caller, save_req) {
                Ok(outcome) => ok(
                    id,
                    json!({ "message": outcome.message(), "outcome": outcome }),
                ),
                Err(e) => err(id, editor_message(&e)),
            }
        }

        Command::Suggest => {
            let p: SuggestPayload = match parse_payload(payload) {
                Ok(v) => v,
                Err(e) => return err(id, e),
            };
            match access::session(&ctx.repo, p.user_id) {
                Ok(Caller::Session(_)) => {}
                Ok(_) => return err(id, "forbidden"),
                Err(e) => return err(id, e.to_string()),
            }
            match suggest::translate_by_deepl(&p.msgid, &p.language_code, ctx.cfg.deepl_auth_key.as_deref()) {
                Ok(translation) => ok(id, json!({ "translation": translation })),
                Err(e) => {
                    tracing::warn!(error = %e, "translation suggestion failed");
                    ok(id, e.to_payload())
                }
            }
        }

        Command::ProjectMessages => {
            let p: ProjectPayload = match parse_payload(payload) {
                Ok(v) => v,
                Err(e) => return err(id, e),
            };
            let rows = access::session(&ctx.repo, p.user_id)
                .and_then(|caller| {
                    let user = access::require_user(&caller)?.clone();
                    access::visible_project(&ctx.repo, &user, &p.project)
                })
                .map_err(|e| e.to_string())
                .and_then(|project| ctx.repo.project_catalogs(project.id).map_err(|e| e.to_string()))
                .and_then(|catalogs| export::messages_as_table(&catalogs).map_err(|e| e.to_string()));
            match rows {
                Ok(rows) => ok(id, json!({ "rows": rows })),
                Err(e) => err(id, e),
            }
        }

        Command::ClientConfig => {
            let p: ClientConfigPayload = match parse_payload(payload) {
                Ok(v) => v,
                Err(e) => return err(id, e),
            };
            let user = match access::session(&ctx.repo, p.user_id) {
                Ok(Caller::Session(u)) => u,
                Ok(_) => return err(id, "forbidden"),
                Err(e) => return err(id, e.to_string()),
            };
            let rendered = access::visible_projects(&ctx.repo, &user)
                .map_err(|e| e.to_string())
                .and_then(|projects| {
                    ClientConfig::for_projects(&p.base_url, &user.token, &projects)
                        .and_then(|cfg| cfg.to_toml())
                        .map_err(|e| e.to_string())
                });
            match rendered {
                Ok(toml) => ok(id, json!({ "filename": "traduire.toml", "content": toml })),
                Err(e) => err(id, e),
            }
        }

        Command::CycleToken => {
            let p: SessionPayload = match parse_payload(payload) {
                Ok(v) => v,
                Err(e) => return err(id, e),
            };
            let mut user = match access::session(&ctx.repo, p.user_id) {
                Ok(Caller::Session(u)) => u,
                Ok(_) => return err(id, "forbidden"),
                Err(e) => return err(id, e.to_string()),
            };
            token::cycle(&mut user);
            match ctx.repo.save_user(&user) {
                Ok(()) => {
                    tracing::info!(user = user.id, "token cycled");
                    ok(id, json!({ "token": user.token }))
                }
                Err(e) => err(id, e.to_string()),
            }
        }

        Command::Unknown => err(id, "unknown command"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::catalog::NewCatalog;
    use crate::model::project::Project;
    use crate::model::user::User;
    use crate::services::store::FileStore;

    fn ctx() -> (Context<FileStore>, User) {
        let mut store = FileStore::in_memory();
        let user = store
            .add_user(User { id: 1, email: "t@example.com".into(), ..Default::default() })
            .unwrap();
        store
            .add_project(Project { id: 1, slug: "test".into(), users: vec![1], ..Default::default() })
            .unwrap();
        store
            .add_catalog(NewCatalog {
                project_id: 1,
                language_code: "fr".into(),
                domain: "djangojs".into(),
                pofile: "msgid \"Continue\"\nmsgstr \"Continuer\"\n".into(),
            })
            .unwrap();
        (Context::new(store, ServerConfig::default()), user)
    }

    fn call(ctx: &mut Context<FileStore>, line: Value) -> Value {
        serde_json::from_str(&handle(ctx, &line.to_string())).unwrap()
    }

    #[test]
    fn rejects_invalid_json_and_unknown_commands() {
        let (mut ctx, _) = ctx();
        let out: Value = serde_json::from_str(&handle(&mut ctx, "{nope")).unwrap();
        assert_eq!(out["message"], "invalid json");

        let out = call(&mut ctx, json!({"id": 1, "cmd": "frobnicate"}));
        assert_eq!(out["status"], "error");
        assert_eq!(out["id"], 1);
    }

    #[test]
    fn sync_read_goes_through_the_endpoint() {
        let (mut ctx, user) = ctx();
        let out = call(
            &mut ctx,
            json!({
                "id": "r1",
                "cmd": "sync",
                "payload": {
                    "method": "GET",
                    "project": "test",
                    "language_code": "fr",
                    "domain": "djangojs",
                    "headers": {"x-cli-version": "1", "x-token": user.token}
                }
            }),
        );
        assert_eq!(out["status"], "ok");
        assert_eq!(out["payload"]["status"], 200);
        assert_eq!(out["payload"]["body"], "msgid \"Continue\"\nmsgstr \"Continuer\"\n");
    }

    #[test]
    fn editor_save_reports_changes() {
        let (mut ctx, _) = ctx();
        let out = call(
            &mut ctx,
            json!({
                "cmd": "editor.save",
                "payload": {
                    "user_id": 1,
                    "project": "test",
                    "language_code": "fr",
                    "domain": "djangojs",
                    "form": {"msgid_0": "Continue", "msgstr_0": "Continuer", "fuzzy_0": "on"}
                }
            }),
        );
        assert_eq!(out["payload"]["outcome"]["status"]["status"], "updated");
        assert_eq!(out["payload"]["message"], "Successfully updated 1 message.");
        assert_eq!(ctx.repo.events().unwrap().len(), 1);
    }

    #[test]
    fn editor_requires_a_session() {
        let (mut ctx, _) = ctx();
        let out = call(
            &mut ctx,
            json!({
                "cmd": "editor.entries",
                "payload": {"project": "test", "language_code": "fr", "domain": "djangojs"}
            }),
        );
        assert_eq!(out["status"], "error");
        assert_eq!(out["message"], "forbidden");
    }

    #[test]
    fn cycling_a_token_invalidates_the_old_one() {
        let (mut ctx, user) = ctx();
        let out = call(&mut ctx, json!({"cmd": "user.cycle_token", "payload": {"user_id": 1}}));
        let fresh = out["payload"]["token"].as_str().unwrap().to_string();

        assert_ne!(fresh, user.token);
        assert!(ctx.repo.user_by_token(&user.token).unwrap().is_none());
        assert!(ctx.repo.user_by_token(&fresh).unwrap().is_some());
    }

    #[test]
    fn client_config_lists_visible_projects_with_the_callers_token() {
        let (mut ctx, user) = ctx();
        ctx.repo
            .add_project(Project { id: 2, slug: "hidden".into(), users: vec![9], ..Default::default() })
            .unwrap();

        let out = call(
            &mut ctx,
            json!({"cmd": "project.client_config", "payload": {"user_id": 1, "base_url": "https://t.example.com/"}}),
        );
        assert_eq!(out["status"], "ok");
        assert_eq!(out["payload"]["filename"], "traduire.toml");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traduire.toml");
        std::fs::write(&path, out["payload"]["content"].as_str().unwrap()).unwrap();
        let cfg = ClientConfig::read_from_path(&path).unwrap();

        assert_eq!(cfg.project.len(), 1);
        assert_eq!(cfg.project[0].url, "https://t.example.com/api/pofile/test/");
        assert_eq!(cfg.project[0].token, user.token);

        let anon = call(&mut ctx, json!({"cmd": "project.client_config", "payload": {"base_url": "https://t.example.com/"}}));
        assert_eq!(anon["message"], "forbidden");
    }

    #[test]
    fn suggest_without_key_is_a_structured_error() {
        let (mut ctx, _) = ctx();
        let out = call(
            &mut ctx,
            json!({"cmd": "suggest", "payload": {"user_id": 1, "language_code": "fr", "msgid": "Hello"}}),
        );
        assert_eq!(out["status"], "ok");
        assert_eq!(out["payload"]["error"]["kind"], "not_configured");
    }
}
