//! Shared test doubles: an in-memory relationship store, a scripted registry
//! and fixed clocks on either side of the submission window.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_bacen_api::ccs_storage::RelationshipStore;
use rust_bacen_api::ccs_workflow::CcsWorkflow;
use rust_bacen_api::errors::AppError;
use rust_bacen_api::models::{
    AssetValue, CallerIdentity, DetailingStatus, DetailingUpdate, Relationship,
    RelationshipRequest, REQUEST_STATUS_SUCCESS,
};
use rust_bacen_api::registry_client::{DetailingTarget, RegistryApi, RegistryReply};
use rust_bacen_api::registry_models::{
    AssetValueXml, ClientListXml, ClientXml, DetailingRequestItemXml, DetailingRequestXml,
    DetailingResponseItemXml, Participant, PeriodListXml, PeriodXml, RelationshipListXml,
    RelationshipRequestXml, RelationshipXml,
};
use rust_bacen_api::time_window::{FixedClock, SubmissionWindow};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const OWNER: &str = "11122233344";
pub const OTHER_USER: &str = "55566677788";

pub const BB_CNPJ: &str = "00000000";
pub const ITAU_CNPJ: &str = "60701190";
pub const UNKNOWN_CNPJ: &str = "99999999";

/// Monday 2024-06-03 14:00 in Brasília.
pub fn inside_window() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 17, 0, 0).unwrap()
}

/// Saturday 2024-06-08 12:00 in Brasília.
pub fn outside_window() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 8, 15, 0, 0).unwrap()
}

pub fn caller(document: &str) -> CallerIdentity {
    CallerIdentity {
        document: document.to_string(),
        name: "Analista de Teste".to_string(),
        unit: "DRACO".to_string(),
        token_fingerprint: "ab".repeat(32),
    }
}

pub fn workflow(
    registry: Arc<FakeRegistry>,
    store: Arc<InMemoryStore>,
    now: DateTime<Utc>,
) -> CcsWorkflow {
    CcsWorkflow::new(
        registry,
        store,
        Arc::new(FixedClock(now)),
        SubmissionWindow::brasilia(),
        4,
    )
}

// ============ Store ============

#[derive(Default)]
struct StoreState {
    requests: Vec<RelationshipRequest>,
    next_id: i32,
}

impl StoreState {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn relationship_mut(&mut self, id: i32) -> Option<(&mut bool, &mut Relationship)> {
        self.requests.iter_mut().find_map(|request| {
            let flag = &mut request.detailing_requested;
            request
                .relationships
                .iter_mut()
                .find(|r| r.id == id)
                .map(|r| (flag, r))
        })
    }
}

fn assign_asset_ids(state: &mut StoreState, relationship_id: i32, assets: &[AssetValue]) -> Vec<AssetValue> {
    assets
        .iter()
        .map(|asset| {
            let mut asset = asset.clone();
            asset.id = state.next_id();
            asset.relationship_id = relationship_id;
            for party in &mut asset.linked_parties {
                party.id = state.next_id();
                party.asset_value_id = asset.id;
            }
            asset
        })
        .collect()
}

fn sorted(mut request: RelationshipRequest) -> RelationshipRequest {
    request.relationships.sort_by(|a, b| {
        a.responsible_bank_number
            .cmp(&b.responsible_bank_number)
            .then(a.id.cmp(&b.id))
    });
    for relationship in &mut request.relationships {
        relationship
            .asset_values
            .sort_by(|a, b| b.start_date.cmp(&a.start_date).then(a.id.cmp(&b.id)));
    }
    request
}

/// [`RelationshipStore`] over a `Vec`, counting every call.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
    pub accesses: AtomicUsize,
    pub writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn accesses(&self) -> usize {
        self.accesses.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RelationshipRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn relationship(&self, id: i32) -> Relationship {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .flat_map(|r| r.relationships.iter())
            .find(|r| r.id == id)
            .cloned()
            .unwrap_or_else(|| panic!("relationship {} not stored", id))
    }

    /// Stores one request owned by `owner` with a relationship per entry of
    /// `statuses`; returns the relationship ids.
    pub async fn seed(&self, owner: &str, statuses: &[DetailingStatus]) -> Vec<i32> {
        let request = RelationshipRequest {
            requested_at: "2024-06-01T10:00:00-03:00".into(),
            queried_document: "12345678901".into(),
            responsible_document: owner.into(),
            request_number: "20240601000001".into(),
            subject_document: "12345678901".into(),
            status: REQUEST_STATUS_SUCCESS.into(),
            relationships: statuses
                .iter()
                .enumerate()
                .map(|(i, status)| Relationship {
                    request_number: "20240601000001".into(),
                    person_id: "12345678901".into(),
                    responsible_cnpj: format!("{:08}", i + 1),
                    responsible_bank_name: format!("BANCO {}", i + 1),
                    participant_cnpj: format!("{:08}", i + 1),
                    start_date: "2015-01-01".into(),
                    detailing_status: *status,
                    detailing_requested_at: match status {
                        DetailingStatus::AwaitingResponse => "2024-06-01T11:00:00".into(),
                        _ => String::new(),
                    },
                    responds_to_detailing: *status == DetailingStatus::AwaitingResponse,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let id = self.create_request_graph(&request).await.unwrap();
        let stored = self.find_request(id).await.unwrap().unwrap();
        let mut ids: Vec<i32> = stored.relationships.iter().map(|r| r.id).collect();
        ids.sort();
        self.accesses.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
        ids
    }

    fn touch(&self, write: bool) {
        self.accesses.fetch_add(1, Ordering::SeqCst);
        if write {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl RelationshipStore for InMemoryStore {
    async fn create_request_graph(&self, request: &RelationshipRequest) -> Result<i32, AppError> {
        self.touch(true);
        let mut state = self.state.lock().unwrap();
        let mut stored = request.clone();
        stored.id = state.next_id();
        for relationship in &mut stored.relationships {
            relationship.id = state.next_id();
            relationship.request_id = stored.id;
            let assets = relationship.asset_values.clone();
            relationship.asset_values = assign_asset_ids(&mut state, relationship.id, &assets);
        }
        let id = stored.id;
        state.requests.push(stored);
        Ok(id)
    }

    async fn find_request(&self, id: i32) -> Result<Option<RelationshipRequest>, AppError> {
        self.touch(false);
        let state = self.state.lock().unwrap();
        Ok(state
            .requests
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .map(sorted))
    }

    async fn list_by_responsible(
        &self,
        document: &str,
    ) -> Result<Vec<RelationshipRequest>, AppError> {
        self.touch(false);
        let state = self.state.lock().unwrap();
        let mut requests: Vec<_> = state
            .requests
            .iter()
            .filter(|r| r.responsible_document == document)
            .cloned()
            .map(sorted)
            .collect();
        requests.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(requests)
    }

    async fn find_owned_relationship(
        &self,
        id: i32,
        responsible: &str,
    ) -> Result<Option<Relationship>, AppError> {
        self.touch(false);
        let state = self.state.lock().unwrap();
        Ok(state
            .requests
            .iter()
            .filter(|r| r.responsible_document == responsible)
            .flat_map(|r| r.relationships.iter())
            .find(|r| r.id == id)
            .cloned())
    }

    async fn list_by_detailing_status(
        &self,
        status: DetailingStatus,
    ) -> Result<Vec<Relationship>, AppError> {
        self.touch(false);
        let state = self.state.lock().unwrap();
        let mut relationships: Vec<_> = state
            .requests
            .iter()
            .flat_map(|r| r.relationships.iter())
            .filter(|r| r.detailing_status == status)
            .cloned()
            .collect();
        relationships.sort_by_key(|r| r.id);
        Ok(relationships)
    }

    async fn update_detailing(
        &self,
        id: i32,
        expected: DetailingStatus,
        update: &DetailingUpdate,
    ) -> Result<bool, AppError> {
        self.touch(true);
        let mut state = self.state.lock().unwrap();
        let Some((flag, relationship)) = state.relationship_mut(id) else {
            return Ok(false);
        };
        if relationship.detailing_status != expected {
            return Ok(false);
        }
        apply(relationship, update);
        *flag = true;
        Ok(true)
    }

    async fn complete_detailing(
        &self,
        id: i32,
        update: &DetailingUpdate,
        assets: &[AssetValue],
    ) -> Result<bool, AppError> {
        self.touch(true);
        let mut state = self.state.lock().unwrap();
        let assets = assign_asset_ids(&mut state, id, assets);
        let Some((flag, relationship)) = state.relationship_mut(id) else {
            return Ok(false);
        };
        if relationship.detailing_status != DetailingStatus::AwaitingResponse {
            return Ok(false);
        }
        apply(relationship, update);
        relationship.asset_values.extend(assets);
        *flag = true;
        Ok(true)
    }

    async fn delete_request(&self, id: i32) -> Result<bool, AppError> {
        self.touch(true);
        let mut state = self.state.lock().unwrap();
        let before = state.requests.len();
        state.requests.retain(|r| r.id != id);
        Ok(state.requests.len() < before)
    }
}

fn apply(relationship: &mut Relationship, update: &DetailingUpdate) {
    relationship.detailing_status = update.status;
    relationship.responds_to_detailing = update.responds_to_detailing;
    relationship.has_response = update.has_response;
    relationship.detailing_requested_at = update.requested_at.clone();
    relationship.response_code = update.response_code.clone();
    relationship.response_if_code = update.response_if_code.clone();
    relationship.response_nuop = update.response_nuop.clone();
}

// ============ Registry ============

/// Registry double answering from scripted replies and counting calls.
pub struct FakeRegistry {
    pub query_reply: Mutex<RegistryReply<RelationshipRequestXml>>,
    pub detailing_reply: Mutex<RegistryReply<DetailingRequestXml>>,
    /// Keyed by responsible CNPJ; absent keys answer `NotFound`.
    pub responses: Mutex<HashMap<String, RegistryReply<Vec<DetailingResponseItemXml>>>>,
    /// Keyed by response code; absent keys answer an empty list.
    pub assets: Mutex<HashMap<String, Vec<AssetValueXml>>>,
    pub participants: Mutex<HashMap<String, Participant>>,
    pub participants_down: AtomicBool,
    pub query_calls: AtomicUsize,
    pub detailing_calls: AtomicUsize,
    pub response_calls: AtomicUsize,
    pub asset_calls: AtomicUsize,
    pub participant_calls: AtomicUsize,
}

impl Default for FakeRegistry {
    fn default() -> Self {
        let participants = HashMap::from([
            (
                BB_CNPJ.to_string(),
                Participant {
                    codigo_compensacao: Some(1),
                    nome: "BANCO DO BRASIL S.A.".into(),
                },
            ),
            (
                ITAU_CNPJ.to_string(),
                Participant {
                    codigo_compensacao: Some(341),
                    nome: "ITAÚ UNIBANCO S.A.".into(),
                },
            ),
        ]);

        Self {
            query_reply: Mutex::new(RegistryReply::TransportFailure("not scripted".into())),
            detailing_reply: Mutex::new(RegistryReply::TransportFailure("not scripted".into())),
            responses: Mutex::new(HashMap::new()),
            assets: Mutex::new(HashMap::new()),
            participants: Mutex::new(participants),
            participants_down: AtomicBool::new(false),
            query_calls: AtomicUsize::new(0),
            detailing_calls: AtomicUsize::new(0),
            response_calls: AtomicUsize::new(0),
            asset_calls: AtomicUsize::new(0),
            participant_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeRegistry {
    pub fn with_query(reply: RegistryReply<RelationshipRequestXml>) -> Self {
        let registry = Self::default();
        *registry.query_reply.lock().unwrap() = reply;
        registry
    }

    pub fn with_detailing(reply: RegistryReply<DetailingRequestXml>) -> Self {
        let registry = Self::default();
        *registry.detailing_reply.lock().unwrap() = reply;
        registry
    }

    pub fn respond(&self, responsible_cnpj: &str, reply: RegistryReply<Vec<DetailingResponseItemXml>>) {
        self.responses
            .lock()
            .unwrap()
            .insert(responsible_cnpj.to_string(), reply);
    }

    pub fn assets_for(&self, code: &str, assets: Vec<AssetValueXml>) {
        self.assets.lock().unwrap().insert(code.to_string(), assets);
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryApi for FakeRegistry {
    async fn query_relationships(
        &self,
        _query: &rust_bacen_api::models::RelationshipQuery,
    ) -> RegistryReply<RelationshipRequestXml> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.query_reply.lock().unwrap().clone()
    }

    async fn request_detailing(
        &self,
        _target: &DetailingTarget,
    ) -> RegistryReply<DetailingRequestXml> {
        self.detailing_calls.fetch_add(1, Ordering::SeqCst);
        self.detailing_reply.lock().unwrap().clone()
    }

    async fn fetch_detailing_response(
        &self,
        target: &DetailingTarget,
    ) -> RegistryReply<Vec<DetailingResponseItemXml>> {
        self.response_calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .get(&target.responsible_cnpj)
            .cloned()
            .unwrap_or(RegistryReply::NotFound)
    }

    async fn fetch_asset_values(&self, response_code: &str) -> RegistryReply<Vec<AssetValueXml>> {
        self.asset_calls.fetch_add(1, Ordering::SeqCst);
        RegistryReply::Data(
            self.assets
                .lock()
                .unwrap()
                .get(response_code)
                .cloned()
                .unwrap_or_default(),
        )
    }

    async fn lookup_participant(&self, cnpj: &str) -> RegistryReply<Participant> {
        self.participant_calls.fetch_add(1, Ordering::SeqCst);
        if self.participants_down.load(Ordering::SeqCst) {
            return RegistryReply::TransportFailure("connection refused".into());
        }
        match self.participants.lock().unwrap().get(cnpj) {
            Some(p) => RegistryReply::Data(p.clone()),
            None => RegistryReply::NotFound,
        }
    }
}

// ============ Payload builders ============

/// Registry answer for one subject with one relationship per
/// `(responsible, participant, start, end)` tuple.
pub fn relationships_reply(entries: &[(&str, &str, &str, &str)]) -> RelationshipRequestXml {
    RelationshipRequestXml {
        request_number: "20240603000123".into(),
        movement_date: "2024-06-03".into(),
        process_number: "0001234-56.2024.8.22.0001".into(),
        reason: "Investigação".into(),
        clients: ClientListXml {
            items: vec![ClientXml {
                id: "12345678901".into(),
                name: "FULANO DE TAL".into(),
                person_type: "F".into(),
                relationships: RelationshipListXml {
                    items: entries
                        .iter()
                        .map(|(responsible, participant, start, end)| RelationshipXml {
                            responsible_cnpj: responsible.to_string(),
                            participant_cnpj: participant.to_string(),
                            periods: PeriodListXml {
                                items: vec![PeriodXml {
                                    start: start.to_string(),
                                    end: end.to_string(),
                                }],
                            },
                        })
                        .collect(),
                },
            }],
        },
    }
}

pub fn detailing_reply(requested_at: &str) -> DetailingRequestXml {
    DetailingRequestXml {
        items: vec![DetailingRequestItemXml {
            requested_at: requested_at.to_string(),
        }],
    }
}

pub fn response_item(code: &str, if_code: &str, nuop: &str) -> DetailingResponseItemXml {
    DetailingResponseItemXml {
        code: code.to_string(),
        if_code: if_code.to_string(),
        nuop: nuop.to_string(),
    }
}

pub fn query_params(document: &str) -> rust_bacen_api::models::RelationshipQueryParams {
    rust_bacen_api::models::RelationshipQueryParams {
        cpf_cnpj: Some(document.to_string()),
        data_inicio: Some("2020-01-01".into()),
        data_fim: Some("2024-06-01".into()),
        num_processo: Some("0001234-56.2024.8.22.0001".into()),
        motivo: Some("Investigação patrimonial".into()),
        caso: Some("Operação Teste".into()),
    }
}
