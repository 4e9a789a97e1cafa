use std::cell::Cell;
use std::collections::HashMap;

use traduire_core::config::ServerConfig;
use traduire_core::model::catalog::Catalog;
use traduire_core::model::event::{Action, NewEvent};
use traduire_core::model::project::Project;
use traduire_core::model::user::User;
use traduire_core::parsers::po;
use traduire_core::protocol::sync::{self, Status, SyncRequest, SyncResponse, DIGEST_HEADER};
use traduire_core::services::digest;
use traduire_core::services::store::{CatalogWrite, Committed, FileStore, Repository, StoreError};

const BODY: &str = "msgid \"K\"\nmsgstr \"A\"\n";

struct Fixture {
    store: FileStore,
    cfg: ServerConfig,
    member: User,
    outsider: User,
}

fn fixture() -> Fixture {
    let mut store = FileStore::in_memory();
    let member = store
        .add_user(User { id: 1, email: "member@example.com".into(), ..Default::default() })
        .unwrap();
    let outsider = store
        .add_user(User { id: 2, email: "outsider@example.com".into(), ..Default::default() })
        .unwrap();
    store
        .add_project(Project { id: 1, name: "Test".into(), slug: "test".into(), users: vec![1] })
        .unwrap();
    Fixture { store, cfg: ServerConfig::default(), member, outsider }
}

fn request(method: &str, token: &str, domain: &str, body: &str) -> SyncRequest {
    let mut headers = HashMap::new();
    headers.insert("x-cli-version".to_string(), "1".to_string());
    headers.insert("x-token".to_string(), token.to_string());
    SyncRequest {
        method: method.into(),
        project: "test".into(),
        language_code: "fr".into(),
        domain: domain.into(),
        headers,
        body: body.as_bytes().to_vec(),
    }
}

impl Fixture {
    fn send(&mut self, req: &SyncRequest) -> SyncResponse {
        sync::handle(&mut self.store, &self.cfg, req)
    }

    fn stored(&self, domain: &str) -> Option<Catalog> {
        self.store.catalog(1, "fr", domain).unwrap()
    }
}

#[test]
fn first_write_creates_the_catalog_verbatim() {
    let mut fx = fixture();
    let token = fx.member.token.clone();

    let resp = fx.send(&request("POST", &token, "djangojs", BODY));

    assert_eq!(resp.status, Status::Accepted);
    assert_eq!(resp.body, "created");
    let catalog = fx.stored("djangojs").unwrap();
    assert_eq!(catalog.pofile, BODY);
    assert_eq!(resp.headers[DIGEST_HEADER], digest::body_digest(BODY));

    let events = fx.store.events().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, Action::Created);
    assert_eq!(events[0].user_id, 1);
}

#[test]
fn write_merges_and_keeps_existing_translations() {
    let mut fx = fixture();
    let token = fx.member.token.clone();
    fx.send(&request("POST", &token, "django", BODY));

    let incoming = "msgid \"K\"\nmsgstr \"B\"\n\nmsgid \"K2\"\nmsgstr \"\"\n";
    let resp = fx.send(&request("POST", &token, "django", incoming));
    assert_eq!(resp.status, Status::Accepted);
    assert_eq!(resp.body, "updated");

    let po = fx.stored("django").unwrap().po().unwrap();
    let ids: Vec<(&str, &str)> = po
        .entries
        .iter()
        .map(|e| (e.msgid.as_str(), e.msgstr.as_str()))
        .collect();
    assert_eq!(ids, vec![("K", "A"), ("K2", "")]);
    assert_eq!(fx.store.events().unwrap().len(), 2);
}

#[test]
fn replace_overwrites_byte_for_byte() {
    let mut fx = fixture();
    let token = fx.member.token.clone();
    fx.send(&request("POST", &token, "django", BODY));

    let fresh = "msgid \"Other\"\nmsgstr \"Autre\"\n";
    let resp = fx.send(&request("PUT", &token, "django", fresh));

    assert_eq!(resp.status, Status::Accepted);
    assert_eq!(resp.body, "replaced");
    assert_eq!(fx.stored("django").unwrap().pofile, fresh);
    assert_eq!(fx.store.events().unwrap()[1].action, Action::Replaced);
}

#[test]
fn read_returns_the_stored_body() {
    let mut fx = fixture();
    let token = fx.member.token.clone();
    fx.send(&request("POST", &token, "django", BODY));

    let resp = fx.send(&request("GET", &token, "django", ""));
    assert_eq!(resp.status, Status::Ok);
    assert_eq!(resp.body, BODY);

    let missing = fx.send(&request("GET", &token, "djangojs", ""));
    assert_eq!(missing.status, Status::NotFound);
}

/// Counts every lookup so the version gate can be shown to run first.
struct Counting {
    inner: FileStore,
    lookups: Cell<usize>,
}

impl Counting {
    fn hit(&self) {
        self.lookups.set(self.lookups.get() + 1);
    }
}

impl Repository for Counting {
    fn user(&self, id: u64) -> Result<Option<User>, StoreError> {
        self.hit();
        self.inner.user(id)
    }

    fn user_by_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        self.hit();
        self.inner.user_by_token(token)
    }

    fn save_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.hit();
        self.inner.save_user(user)
    }

    fn projects(&self) -> Result<Vec<Project>, StoreError> {
        self.hit();
        self.inner.projects()
    }

    fn project_by_slug(&self, slug: &str) -> Result<Option<Project>, StoreError> {
        self.hit();
        self.inner.project_by_slug(slug)
    }

    fn project_catalogs(&self, project_id: u64) -> Result<Vec<Catalog>, StoreError> {
        self.hit();
        self.inner.project_catalogs(project_id)
    }

    fn catalog(&self, project_id: u64, language_code: &str, domain: &str) -> Result<Option<Catalog>, StoreError> {
        self.hit();
        self.inner.catalog(project_id, language_code, domain)
    }

    fn commit_catalog(&mut self, write: CatalogWrite, audit: NewEvent) -> Result<Committed, StoreError> {
        self.hit();
        self.inner.commit_catalog(write, audit)
    }
}

#[test]
fn version_mismatch_is_rejected_before_any_lookup() {
    let fx = fixture();
    let cfg = fx.cfg.clone();
    let mut req = request("POST", &fx.member.token, "django", BODY);
    let mut repo = Counting { inner: fx.store, lookups: Cell::new(0) };

    req.headers.insert("x-cli-version".into(), "0".into());
    let resp = sync::handle(&mut repo, &cfg, &req);
    assert_eq!(resp.status, Status::BadRequest);
    assert!(resp.body.contains("\"0\""));

    req.headers.remove("x-cli-version");
    let resp = sync::handle(&mut repo, &cfg, &req);
    assert_eq!(resp.status, Status::BadRequest);

    assert_eq!(repo.lookups.get(), 0);
    assert!(repo.inner.events().unwrap().is_empty());
}

#[test]
fn missing_or_wrong_token_is_forbidden() {
    let mut fx = fixture();

    let mut req = request("POST", "", "django", BODY);
    req.headers.remove("x-token");
    assert_eq!(fx.send(&req).status, Status::Forbidden);

    let resp = fx.send(&request("POST", "not-a-token", "django", BODY));
    assert_eq!(resp.status, Status::Forbidden);
    assert!(fx.stored("django").is_none());
}

#[test]
fn outsiders_see_the_same_answer_as_for_a_missing_project() {
    let mut fx = fixture();
    let member = fx.member.token.clone();
    let outsider = fx.outsider.token.clone();
    fx.send(&request("POST", &member, "django", BODY));

    let hidden = fx.send(&request("GET", &outsider, "django", ""));
    let mut absent_req = request("GET", &member, "django", "");
    absent_req.project = "nope".into();
    let absent = fx.send(&absent_req);

    assert_eq!(hidden.status, Status::NotFound);
    assert_eq!(hidden, absent);

    let write = fx.send(&request("PUT", &outsider, "django", "msgid \"x\"\nmsgstr \"y\"\n"));
    assert_eq!(write.status, Status::NotFound);
    assert_eq!(fx.stored("django").unwrap().pofile, BODY);
}

#[test]
fn delete_twice_is_no_content_then_not_found() {
    let mut fx = fixture();
    let token = fx.member.token.clone();
    fx.send(&request("POST", &token, "django", BODY));

    assert_eq!(fx.send(&request("DELETE", &token, "django", "")).status, Status::NoContent);
    assert!(fx.stored("django").is_none());
    assert_eq!(fx.send(&request("DELETE", &token, "django", "")).status, Status::NotFound);

    let actions: Vec<Action> = fx.store.events().unwrap().iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![Action::Created, Action::Deleted]);
}

#[test]
fn unparseable_payload_writes_nothing() {
    let mut fx = fixture();
    let token = fx.member.token.clone();
    fx.send(&request("POST", &token, "django", BODY));

    let resp = fx.send(&request("POST", &token, "django", "msgid \"broken\n"));
    assert_eq!(resp.status, Status::BadRequest);
    assert_eq!(fx.stored("django").unwrap().pofile, BODY);

    let resp = fx.send(&request("PUT", &token, "djangojs", ""));
    assert_eq!(resp.status, Status::BadRequest);
    assert!(fx.stored("djangojs").is_none());
    assert_eq!(fx.store.events().unwrap().len(), 1);
}

#[test]
fn unknown_methods_are_not_allowed() {
    let mut fx = fixture();
    let token = fx.member.token.clone();

    let resp = fx.send(&request("PATCH", &token, "django", BODY));
    assert_eq!(resp.status, Status::MethodNotAllowed);
    assert_eq!(resp.status.code(), 405);
}

#[test]
fn pushing_the_same_payload_twice_is_stable() {
    let mut fx = fixture();
    let token = fx.member.token.clone();
    fx.send(&request("POST", &token, "django", BODY));
    let first = po::parse(&fx.stored("django").unwrap().pofile).unwrap();

    let resp = fx.send(&request("POST", &token, "django", BODY));
    assert_eq!(resp.body, "updated");
    let second = po::parse(&fx.stored("django").unwrap().pofile).unwrap();
    assert_eq!(first.entries, second.entries);
}

#[test]
fn failed_persist_stores_neither_row_nor_event() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let mut store = FileStore::open(&path).unwrap();
    let member = store
        .add_user(User { id: 1, email: "member@example.com".into(), ..Default::default() })
        .unwrap();
    store
        .add_project(Project { id: 1, name: "Test".into(), slug: "test".into(), users: vec![1] })
        .unwrap();
    let cfg = ServerConfig::default();

    let blocker = dir.path().join("store.json.tmp");
    std::fs::create_dir(&blocker).unwrap();

    let resp = sync::handle(&mut store, &cfg, &request("POST", &member.token, "django", BODY));
    assert_eq!(resp.status, Status::InternalError);
    assert!(store.catalog(1, "fr", "django").unwrap().is_none());
    assert!(store.events().unwrap().is_empty());

    std::fs::remove_dir(&blocker).unwrap();
    let resp = sync::handle(&mut store, &cfg, &request("POST", &member.token, "django", BODY));
    assert_eq!(resp.status, Status::Accepted);
    assert_eq!(resp.body, "created");
    assert_eq!(store.events().unwrap().len(), 1);
}

#[test]
fn two_store_handles_keep_each_others_catalogs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let mut first = FileStore::open(&path).unwrap();
    let member = first
        .add_user(User { id: 1, email: "member@example.com".into(), ..Default::default() })
        .unwrap();
    first
        .add_project(Project { id: 1, name: "Test".into(), slug: "test".into(), users: vec![1] })
        .unwrap();
    let mut second = FileStore::open(&path).unwrap();
    let cfg = ServerConfig::default();

    let resp = sync::handle(&mut first, &cfg, &request("POST", &member.token, "django", BODY));
    assert_eq!(resp.status, Status::Accepted);
    let resp = sync::handle(&mut second, &cfg, &request("POST", &member.token, "djangojs", BODY));
    assert_eq!(resp.status, Status::Accepted);

    let domains: Vec<String> = first
        .project_catalogs(1)
        .unwrap()
        .into_iter()
        .map(|c| c.domain)
        .collect();
    assert_eq!(domains, vec!["django", "djangojs"]);
    assert_eq!(second.events().unwrap().len(), 2);
}
