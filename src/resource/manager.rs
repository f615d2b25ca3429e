//! Resource Manager
//!
//! The lifecycle contract every resource kind shares, implemented once and
//! driven by the kind's [`ResourceDef`]. Reads go through the session cache;
//! mutations invalidate exactly the keys they affect before returning and
//! keep the state ledger in step with what this session created. In plan
//! mode mutations are rendered and recorded but never sent.

use super::fetcher::{self, read_error};
use super::record::{Identity, ResourceRecord};
use super::registry::{get_registry, insert_path, ResourceDef};
use crate::ado::http::TransportResponse;
use crate::cache::CacheKey;
use crate::error::{AdoError, Result};
use crate::ledger::LedgerEntry;
use crate::plan::{PlannedAction, PlannedChange};
use crate::session::{CachedValue, Session};
use reqwest::Method;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

const OP_GET_BY_ID: &str = "get_by_id";
const OP_GET_ALL: &str = "get_all";

/// CRUD for one resource kind, optionally under a parent scope
#[derive(Clone)]
pub struct ResourceManager {
    session: Arc<Session>,
    kind: &'static str,
    def: &'static ResourceDef,
    scope: BTreeMap<String, String>,
}

impl ResourceManager {
    pub fn new(session: Arc<Session>, kind: &str) -> Result<Self> {
        let (kind, def) = get_registry()
            .resources
            .get_key_value(kind)
            .ok_or_else(|| AdoError::UnknownKind(kind.to_string()))?;

        Ok(Self {
            session,
            kind: kind.as_str(),
            def,
            scope: BTreeMap::new(),
        })
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn def(&self) -> &'static ResourceDef {
        self.def
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn scope(&self) -> &BTreeMap<String, String> {
        &self.scope
    }

    /// Address resources under a parent, e.g. `scoped("repository_id", repo)`
    pub fn scoped(mut self, var: &str, value: impl ToString) -> Self {
        self.scope.insert(var.to_string(), value.to_string());
        self
    }

    pub fn with_scope(mut self, scope: BTreeMap<String, String>) -> Self {
        self.scope.extend(scope);
        self
    }

    pub fn supports_delete(&self) -> bool {
        self.def.delete.is_some()
    }

    // =========================================================================
    // Cache keys
    // =========================================================================

    fn scope_params(&self) -> Vec<String> {
        self.scope
            .iter()
            .map(|(k, v)| scope_param(k, v))
            .collect()
    }

    fn get_all_key(&self) -> CacheKey {
        CacheKey::new(self.kind, OP_GET_ALL, self.scope_params())
    }

    fn get_by_id_key(&self, identity: &Identity) -> CacheKey {
        let mut params = self.scope_params();
        params.push(identity.to_string());
        CacheKey::new(self.kind, OP_GET_BY_ID, params)
    }

    fn vars_with_id(&self, identity: &Identity) -> BTreeMap<String, String> {
        let mut vars = self.scope.clone();
        vars.insert("id".to_string(), identity.to_string());
        vars
    }

    fn record(&self, payload: Value) -> Result<ResourceRecord> {
        ResourceRecord::from_payload(self.kind, self.def, payload)
    }

    /// Some endpoints answer with a one-element listing instead of the item
    fn single_item(&self, body: Value) -> Value {
        if fetcher::lookup_path(&body, &self.def.id_field).is_some() {
            return body;
        }
        fetcher::extract_items(&body, &self.def.response_path)
            .into_iter()
            .next()
            .unwrap_or(body)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Every resource of this kind, in the order the backend returns them
    pub async fn get_all(&self) -> Result<Vec<ResourceRecord>> {
        let records = self
            .session
            .cache()
            .get_or_compute(self.get_all_key(), || async {
                let items =
                    fetcher::fetch_resources(self.session.client(), self.kind, self.def, &self.scope)
                        .await?;
                let records = items
                    .into_iter()
                    .map(|item| self.record(item))
                    .collect::<Result<Vec<_>>>()?;
                Ok::<_, AdoError>(CachedValue::Many(Arc::new(records)))
            })
            .await?
            .into_records()?;

        Ok((*records).clone())
    }

    pub async fn get_by_id(&self, identity: &Identity) -> Result<ResourceRecord> {
        self.session
            .cache()
            .get_or_compute(self.get_by_id_key(identity), || async {
                self.fetch_by_id(identity).await.map(CachedValue::One)
            })
            .await?
            .into_record()
    }

    async fn fetch_by_id(&self, identity: &Identity) -> Result<ResourceRecord> {
        let Some(item_path) = &self.def.item_path else {
            // No item endpoint: resolve through the listing
            return self
                .find(|r| &r.identity == identity)
                .await?
                .ok_or_else(|| AdoError::not_found(self.kind, identity));
        };

        let url = self.session.client().resource_url(
            item_path,
            &self.vars_with_id(identity),
            &self.def.api_version,
            &[],
        )?;
        let response = self.session.client().get(&url).await?;

        if !response.is_success() {
            return Err(read_error(self.kind, &identity.to_string(), &response));
        }
        self.record(self.single_item(response.body))
    }

    /// Drop the cached copy and read the resource again
    pub async fn refresh(&self, identity: &Identity) -> Result<ResourceRecord> {
        self.session.cache().invalidate(&self.get_by_id_key(identity));
        self.get_by_id(identity).await
    }

    /// Exact, case-sensitive match on the kind's name field
    pub async fn get_by_name(&self, name: &str) -> Result<ResourceRecord> {
        let mut matches: Vec<ResourceRecord> = self
            .get_all()
            .await?
            .into_iter()
            .filter(|r| r.name(self.def) == Some(name))
            .collect();

        match matches.len() {
            0 => Err(AdoError::not_found(self.kind, name)),
            1 => Ok(matches.remove(0)),
            _ if self.def.unique_names => Ok(matches.remove(0)),
            count => Err(AdoError::Ambiguous {
                kind: self.kind.to_string(),
                name: name.to_string(),
                count,
            }),
        }
    }

    /// First resource matching `predicate`
    pub async fn find<P>(&self, predicate: P) -> Result<Option<ResourceRecord>>
    where
        P: Fn(&ResourceRecord) -> bool,
    {
        Ok(self.get_all().await?.into_iter().find(|r| predicate(r)))
    }

    /// Every resource matching `predicate`, in backend order
    pub async fn filter<P>(&self, predicate: P) -> Result<Vec<ResourceRecord>>
    where
        P: Fn(&ResourceRecord) -> bool,
    {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|r| predicate(r))
            .collect())
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Create a resource and record it in the ledger.
    ///
    /// Parameters naming a placeholder of the create path (e.g. `pipeline_id`)
    /// address the parent instead of going into the body. Follow-up calls
    /// (a new repository's first commit) run once the resource is tracked.
    pub async fn create(&self, params: Map<String, Value>) -> Result<ResourceRecord> {
        let Some(create_path) = &self.def.create_path else {
            return Err(AdoError::Unsupported {
                kind: self.kind.to_string(),
                operation: "create",
            });
        };

        let payload = self
            .def
            .build_create_payload(&params)
            .map_err(|m| AdoError::creation(self.kind, m))?;

        let mut scope = self.scope.clone();
        for (key, value) in &params {
            if create_path.contains(&format!("{{{}}}", key)) {
                scope.insert(key.clone(), value_as_scope(value));
            }
        }

        let client = self.session.client();
        let url = client.resource_url(create_path, &scope, &self.def.api_version, &[])?;

        if self.session.is_planning() {
            return self.plan_create(url, payload, &scope, &params);
        }

        let response = client.post(&url, Some(&payload)).await?;
        if !response.is_success() {
            return Err(self.creation_error(&response));
        }

        let record = self.record(self.single_item(response.body))?;

        // Tracked before anything else can fail, so teardown always sees it
        let kind = self.kind;
        self.session
            .cache()
            .invalidate_where(|k| k.kind == kind && k.operation == OP_GET_ALL);
        self.session
            .ledger()
            .add(LedgerEntry::new(kind, record.identity.clone(), scope.clone()));
        tracing::info!("Created {} {}", kind, record.identity);

        self.run_follow_ups(&record.identity, &scope, &params).await?;

        if !self.def.refetch_after_create {
            return Ok(record);
        }
        let manager = self.clone().with_scope(scope);
        match manager.refresh(&record.identity).await {
            Ok(full) => Ok(full),
            Err(e) => {
                tracing::warn!(
                    "Created {} {} but could not re-read it: {}",
                    kind,
                    record.identity,
                    e
                );
                Ok(record)
            },
        }
    }

    async fn run_follow_ups(
        &self,
        identity: &Identity,
        scope: &BTreeMap<String, String>,
        params: &Map<String, Value>,
    ) -> Result<()> {
        let client = self.session.client();
        let mut vars = scope.clone();
        vars.insert("id".to_string(), identity.to_string());

        for follow_up in self.def.after_create.iter().filter(|f| f.enabled(params)) {
            let url = client.resource_url(&follow_up.path, &vars, &self.def.api_version, &[])?;
            let response = client
                .request(follow_up.method.as_method(), &url, follow_up.body.as_ref())
                .await?;
            if !response.is_success() {
                return Err(AdoError::creation(
                    self.kind,
                    format!(
                        "{} {} was created but its follow-up call failed ({}): {}",
                        self.kind,
                        identity,
                        response.status,
                        response.backend_message()
                    ),
                ));
            }
        }
        Ok(())
    }

    fn plan_create(
        &self,
        url: String,
        payload: Value,
        scope: &BTreeMap<String, String>,
        params: &Map<String, Value>,
    ) -> Result<ResourceRecord> {
        let item = match &payload {
            Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };
        // Payloads that already carry the identity (branch names) keep it
        let record = self.record(item.clone()).unwrap_or_else(|_| ResourceRecord {
            kind: self.kind.to_string(),
            identity: Identity::Str(format!("planned-{}", Uuid::new_v4())),
            fields: item.as_object().cloned().unwrap_or_default(),
        });

        self.plan_change(PlannedAction::Create, &record.identity, Method::POST, url, Some(payload));

        let mut vars = scope.clone();
        vars.insert("id".to_string(), record.identity.to_string());
        for follow_up in self.def.after_create.iter().filter(|f| f.enabled(params)) {
            let client = self.session.client();
            let url = client.resource_url(&follow_up.path, &vars, &self.def.api_version, &[])?;
            self.plan_change(
                PlannedAction::Create,
                &record.identity,
                follow_up.method.as_method(),
                url,
                follow_up.body.clone(),
            );
        }

        Ok(record)
    }

    fn plan_change(
        &self,
        action: PlannedAction,
        identity: &Identity,
        method: Method,
        url: String,
        body: Option<Value>,
    ) {
        if let Some(plan) = self.session.plan() {
            plan.record(PlannedChange {
                action,
                kind: self.kind.to_string(),
                identity: identity.clone(),
                method: method.to_string(),
                url,
                body,
            });
        }
    }

    fn creation_error(&self, response: &TransportResponse) -> AdoError {
        if response.is_permission_denied() {
            return AdoError::Permission {
                status: response.status,
                message: format!(
                    "cannot create {}: {}",
                    self.kind,
                    response.backend_message()
                ),
            };
        }
        if response.status == 409 {
            return AdoError::creation(
                self.kind,
                format!("already exists: {}", response.backend_message()),
            );
        }
        AdoError::creation(
            self.kind,
            format!("{} - {}", response.status, response.backend_message()),
        )
    }

    /// Change exactly one updatable field
    pub async fn update(
        &self,
        identity: &Identity,
        field: &str,
        value: Value,
    ) -> Result<ResourceRecord> {
        let Some(field_def) = self.def.updatable_field(field) else {
            return Err(AdoError::update(
                self.kind,
                identity,
                format!(
                    "`{}` is not editable, editable fields are: {:?}",
                    field,
                    self.def.updatable_keys()
                ),
            ));
        };
        let wire = field_def
            .serialize(&value)
            .map_err(|m| AdoError::update(self.kind, identity, m))?;

        let Some(item_path) = &self.def.item_path else {
            return Err(AdoError::Unsupported {
                kind: self.kind.to_string(),
                operation: "update",
            });
        };

        let mut body = Value::Object(Map::new());
        insert_path(&mut body, &field_def.internal_name, wire);

        let client = self.session.client();
        let url = client.resource_url(
            item_path,
            &self.vars_with_id(identity),
            &self.def.api_version,
            &[],
        )?;
        let method = self.def.update_method.as_method();

        if self.session.is_planning() {
            let mut fields = body.as_object().cloned().unwrap_or_default();
            fields.insert(self.def.id_field.clone(), identity.to_value());
            self.plan_change(PlannedAction::Update, identity, method, url, Some(body));
            return Ok(ResourceRecord {
                kind: self.kind.to_string(),
                identity: identity.clone(),
                fields,
            });
        }

        let response = client.request(method, &url, Some(&body)).await?;

        if !response.is_success() {
            return Err(AdoError::update(
                self.kind,
                identity,
                format!(
                    "setting {} failed ({}): {}",
                    field,
                    response.status,
                    response.backend_message()
                ),
            ));
        }

        self.invalidate_identity(identity);
        tracing::info!("Updated {} {} field {}", self.kind, identity, field);

        match self.record(response.body) {
            Ok(record) if &record.identity == identity => Ok(record),
            _ => self.get_by_id(identity).await,
        }
    }

    /// Delete a resource; forgetting it in the ledger is a no-op when this
    /// session did not create it
    pub async fn delete(&self, identity: &Identity) -> Result<()> {
        let Some(delete) = &self.def.delete else {
            return Err(AdoError::Unsupported {
                kind: self.kind.to_string(),
                operation: "delete",
            });
        };
        let Some(path) = delete.path.as_ref().or(self.def.item_path.as_ref()) else {
            return Err(AdoError::Registry(format!("{} has no delete path", self.kind)));
        };

        let client = self.session.client();
        let url = client.resource_url(path, &self.vars_with_id(identity), &self.def.api_version, &[])?;
        let method: Method = delete.method.as_method();

        if self.session.is_planning() {
            self.plan_change(PlannedAction::Delete, identity, method, url, delete.body.clone());
            return Ok(());
        }

        let response = client.request(method, &url, delete.body.as_ref()).await?;

        if response.status == 404 {
            tracing::warn!(
                "{} {} not found, probably already deleted, removing from state",
                self.kind,
                identity
            );
        } else if !response.is_success() {
            return Err(AdoError::deletion(
                self.kind,
                identity,
                format!("{} - {}", response.status, response.backend_message()),
            ));
        }

        self.invalidate_identity(identity);
        self.forget_owned(identity);
        self.session.ledger().remove(self.kind, identity);

        tracing::info!("Deleted {} {}", self.kind, identity);
        Ok(())
    }

    /// Drop every listing of this kind and every entry naming `identity`
    fn invalidate_identity(&self, identity: &Identity) {
        let kind = self.kind;
        let id = identity.to_string();
        self.session.cache().invalidate_where(|k| {
            k.kind == kind && (k.operation == OP_GET_ALL || k.references(&id))
        });
    }

    /// Resources of owned kinds scoped under `identity` go with it
    fn forget_owned(&self, identity: &Identity) {
        let id = identity.to_string();
        for (child, child_def) in &get_registry().resources {
            if child_def.owned_by.as_deref() != Some(self.kind) {
                continue;
            }
            let Some(param) = child_def.owner_param.as_deref() else {
                continue;
            };

            let marker = scope_param(param, &id);
            self.session
                .cache()
                .invalidate_where(|k| &k.kind == child && k.references(&marker));
            self.session.ledger().remove_owned(child, param, &id);
        }
    }
}

fn scope_param(key: &str, value: &str) -> String {
    format!("{}={}", key, value)
}

fn value_as_scope(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
