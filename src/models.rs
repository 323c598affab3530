use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

// ============ Database Models ============

/// Outcome stored in `requisicao_relacionamento_ccs.status`.
pub const REQUEST_STATUS_SUCCESS: &str = "Sucesso";
pub const REQUEST_STATUS_FAILURE: &str = "Falha";

/// Sentinel used whenever a participant lookup does not resolve.
pub const UNKNOWN_BANK_NUMBER: &str = "000";
pub const UNKNOWN_BANK_NAME: &str = "BANCO NÃO INFORMADO";

/// Detailing sub-lifecycle of a [`Relationship`].
///
/// Stored as free text; the strings match the values already present in
/// production tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum DetailingStatus {
    NotRequested,
    Queued,
    AwaitingResponse,
    InstitutionDoesNotDetail,
    Completed,
}

impl DetailingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetailingStatus::NotRequested => "Nao Solicitado",
            DetailingStatus::Queued => "Na fila",
            DetailingStatus::AwaitingResponse => "Solicitado. Aguardando...",
            DetailingStatus::InstitutionDoesNotDetail => "IF não detalha",
            DetailingStatus::Completed => "Concluído",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: DetailingStatus) -> bool {
        use DetailingStatus::*;
        matches!(
            (self, next),
            (NotRequested, Queued)
                | (NotRequested, AwaitingResponse)
                | (NotRequested, InstitutionDoesNotDetail)
                | (Queued, AwaitingResponse)
                | (Queued, InstitutionDoesNotDetail)
                | (AwaitingResponse, InstitutionDoesNotDetail)
                | (AwaitingResponse, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DetailingStatus::InstitutionDoesNotDetail | DetailingStatus::Completed
        )
    }
}

impl fmt::Display for DetailingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetailingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Nao Solicitado" => Ok(DetailingStatus::NotRequested),
            "Na fila" => Ok(DetailingStatus::Queued),
            "Solicitado. Aguardando..." => Ok(DetailingStatus::AwaitingResponse),
            "IF não detalha" => Ok(DetailingStatus::InstitutionDoesNotDetail),
            "Concluído" => Ok(DetailingStatus::Completed),
            other => Err(format!("unknown detailing status '{}'", other)),
        }
    }
}

impl From<DetailingStatus> for String {
    fn from(status: DetailingStatus) -> Self {
        status.as_str().to_string()
    }
}

impl TryFrom<String> for DetailingStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One CCS query submitted by a responsible user (`requisicao_relacionamento_ccs`).
#[derive(Debug, Clone, Default, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipRequest {
    pub id: i32,
    #[sqlx(rename = "data_requisicao")]
    pub requested_at: String,
    #[sqlx(rename = "data_inicio_consulta")]
    pub query_start: String,
    #[sqlx(rename = "data_fim_consulta")]
    pub query_end: String,
    #[sqlx(rename = "cpf_cnpj_consulta")]
    pub queried_document: String,
    #[sqlx(rename = "numero_processo")]
    pub process_number: String,
    #[sqlx(rename = "motivo_busca")]
    pub search_reason: String,
    #[sqlx(rename = "cpf_responsavel")]
    pub responsible_document: String,
    #[sqlx(rename = "lotacao")]
    pub responsible_unit: String,
    #[sqlx(rename = "caso")]
    pub case_label: String,
    #[sqlx(rename = "numero_requisicao")]
    pub request_number: String,
    #[sqlx(rename = "cpf_cnpj")]
    pub subject_document: String,
    #[sqlx(rename = "tipo_pessoa")]
    pub subject_type: String,
    #[sqlx(rename = "nome")]
    pub subject_name: String,
    #[sqlx(rename = "autorizado")]
    pub authorized: bool,
    #[sqlx(rename = "cpf_autorizacao")]
    pub authorizer_document: String,
    #[sqlx(rename = "nome_autorizacao")]
    pub authorizer_name: String,
    #[sqlx(rename = "data_hora_autorizacao")]
    pub authorized_at: String,
    #[sqlx(rename = "token_autorizacao")]
    pub authorization_token: String,
    pub status: String,
    /// Set once any child relationship had detailing requested.
    #[sqlx(rename = "detalhamento")]
    pub detailing_requested: bool,
    #[sqlx(skip)]
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

/// One bank-account relationship of the request subject (`relacionamento_ccs`).
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: i32,
    #[sqlx(rename = "id_requisicao")]
    pub request_id: i32,
    #[sqlx(rename = "numero_requisicao")]
    pub request_number: String,
    #[sqlx(rename = "id_pessoa")]
    pub person_id: String,
    #[sqlx(rename = "nome_pessoa")]
    pub person_name: String,
    #[sqlx(rename = "tipo_pessoa")]
    pub person_type: String,
    #[sqlx(rename = "cnpj_responsavel")]
    pub responsible_cnpj: String,
    #[sqlx(rename = "numero_banco_responsavel")]
    pub responsible_bank_number: String,
    #[sqlx(rename = "nome_banco_responsavel")]
    pub responsible_bank_name: String,
    #[sqlx(rename = "cnpj_participante")]
    pub participant_cnpj: String,
    #[sqlx(rename = "numero_banco_participante")]
    pub participant_bank_number: String,
    #[sqlx(rename = "nome_banco_participante")]
    pub participant_bank_name: String,
    #[sqlx(rename = "data_inicio_relacionamento")]
    pub start_date: String,
    #[sqlx(rename = "data_fim_relacionamento")]
    pub end_date: Option<String>,
    #[sqlx(rename = "data_requisicao_detalhamento")]
    pub detailing_requested_at: String,
    #[sqlx(rename = "status_detalhamento", try_from = "String")]
    pub detailing_status: DetailingStatus,
    #[sqlx(rename = "responde_detalhamento")]
    pub responds_to_detailing: bool,
    #[sqlx(rename = "resposta")]
    pub has_response: bool,
    #[sqlx(rename = "codigo_resposta")]
    pub response_code: String,
    #[sqlx(rename = "codigo_if_resposta")]
    pub response_if_code: String,
    #[sqlx(rename = "nuop_resposta")]
    pub response_nuop: String,
    #[sqlx(skip)]
    #[serde(default)]
    pub asset_values: Vec<AssetValue>,
}

impl Default for Relationship {
    fn default() -> Self {
        Self {
            id: 0,
            request_id: 0,
            request_number: String::new(),
            person_id: String::new(),
            person_name: String::new(),
            person_type: String::new(),
            responsible_cnpj: String::new(),
            responsible_bank_number: UNKNOWN_BANK_NUMBER.to_string(),
            responsible_bank_name: UNKNOWN_BANK_NAME.to_string(),
            participant_cnpj: String::new(),
            participant_bank_number: UNKNOWN_BANK_NUMBER.to_string(),
            participant_bank_name: UNKNOWN_BANK_NAME.to_string(),
            start_date: String::new(),
            end_date: None,
            detailing_requested_at: String::new(),
            detailing_status: DetailingStatus::NotRequested,
            responds_to_detailing: false,
            has_response: false,
            response_code: String::new(),
            response_if_code: String::new(),
            response_nuop: String::new(),
            asset_values: Vec::new(),
        }
    }
}

/// Asset, right or value ("bem, direito ou valor") tied to a relationship
/// (`bem_direito_valor_ccs`).
#[derive(Debug, Clone, Default, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetValue {
    pub id: i32,
    #[sqlx(rename = "id_relacionamento")]
    pub relationship_id: i32,
    #[sqlx(rename = "cnpj_participante")]
    pub participant_cnpj: String,
    #[sqlx(rename = "tipo")]
    pub kind: String,
    #[sqlx(rename = "agencia")]
    pub branch: String,
    #[sqlx(rename = "conta")]
    pub account: String,
    #[sqlx(rename = "vinculo")]
    pub link_type: String,
    #[sqlx(rename = "nome_pessoa")]
    pub person_name: String,
    #[sqlx(rename = "data_inicio")]
    pub start_date: String,
    #[sqlx(rename = "data_fim")]
    pub end_date: Option<String>,
    #[sqlx(skip)]
    #[serde(default)]
    pub linked_parties: Vec<LinkedParty>,
}

/// Person linked to an [`AssetValue`] (`vinculados_bdv_ccs`).
#[derive(Debug, Clone, Default, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedParty {
    pub id: i32,
    #[sqlx(rename = "id_bdv")]
    pub asset_value_id: i32,
    #[sqlx(rename = "id_pessoa")]
    pub person_id: String,
    #[sqlx(rename = "nome_pessoa")]
    pub person_name: String,
    #[sqlx(rename = "nome_pessoa_receita")]
    pub tax_authority_name: String,
    #[sqlx(rename = "tipo")]
    pub link_type: String,
    #[sqlx(rename = "data_inicio")]
    pub start_date: String,
    #[sqlx(rename = "data_fim")]
    pub end_date: Option<String>,
}

/// Field set written by every detailing transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailingUpdate {
    pub status: DetailingStatus,
    pub responds_to_detailing: bool,
    pub has_response: bool,
    pub requested_at: String,
    pub response_code: String,
    pub response_if_code: String,
    pub response_nuop: String,
}

impl DetailingUpdate {
    pub fn queued() -> Self {
        Self {
            status: DetailingStatus::Queued,
            responds_to_detailing: false,
            has_response: false,
            requested_at: String::new(),
            response_code: String::new(),
            response_if_code: String::new(),
            response_nuop: String::new(),
        }
    }

    pub fn institution_does_not_detail(at: String) -> Self {
        Self {
            status: DetailingStatus::InstitutionDoesNotDetail,
            responds_to_detailing: false,
            has_response: true,
            requested_at: at,
            ..Self::queued()
        }
    }

    pub fn awaiting_response(at: String) -> Self {
        Self {
            status: DetailingStatus::AwaitingResponse,
            responds_to_detailing: true,
            has_response: false,
            requested_at: at,
            ..Self::queued()
        }
    }

    /// Keeps the original detailing timestamp; absent codes are stored as `""`.
    pub fn completed(
        requested_at: String,
        response_code: String,
        response_if_code: Option<String>,
        response_nuop: Option<String>,
    ) -> Self {
        Self {
            status: DetailingStatus::Completed,
            responds_to_detailing: true,
            has_response: true,
            requested_at,
            response_code,
            response_if_code: response_if_code.unwrap_or_default(),
            response_nuop: response_nuop.unwrap_or_default(),
        }
    }
}

// ============ Workflow Results ============

/// Authenticated case worker on whose behalf a workflow operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// CPF of the user.
    pub document: String,
    pub name: String,
    /// Organisational unit ("lotação").
    pub unit: String,
    /// SHA-256 hex digest of the presented token, kept for audit.
    pub token_fingerprint: String,
}

/// Validated input of a relationship query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipQuery {
    pub document: String,
    pub start_date: String,
    pub end_date: String,
    pub process_number: String,
    pub reason: String,
    pub case_label: String,
}

/// Synthetic record returned instead of a stored request when the registry
/// produced no relationships (or could not be reached).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryNotice {
    pub cpf_cnpj_consulta: String,
    pub status: String,
    #[serde(rename = "nome")]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Stored(RelationshipRequest),
    Notice(QueryNotice),
}

/// Per-relationship outcome message of a detailing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailingResult {
    #[serde(rename = "banco", skip_serializing_if = "Option::is_none")]
    pub bank: Option<String>,
    #[serde(rename = "msg")]
    pub message: String,
    pub status: String,
}

impl DetailingResult {
    pub const PENDING: &'static str = "pendente";
    pub const SUCCESS: &'static str = "sucesso";
    pub const FAILURE: &'static str = "falha";

    pub fn queued(bank: &str) -> Self {
        Self {
            bank: Some(bank.to_string()),
            message: "Na fila de processamento".to_string(),
            status: Self::PENDING.to_string(),
        }
    }

    pub fn submitted(bank: &str) -> Self {
        Self {
            bank: Some(bank.to_string()),
            message: "Detalhamento Solicitado".to_string(),
            status: Self::SUCCESS.to_string(),
        }
    }

    pub fn not_detailed(bank: &str) -> Self {
        Self {
            bank: Some(bank.to_string()),
            message: "Sem detalhamento".to_string(),
            status: Self::FAILURE.to_string(),
        }
    }

    pub fn outside_window() -> Self {
        Self {
            bank: None,
            message: "Detalhamento somente pode ser solicitado em dias úteis entre 10h e 18h55"
                .to_string(),
            status: Self::FAILURE.to_string(),
        }
    }
}

/// Counters reported by a harvesting run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HarvestSummary {
    pub checked: usize,
    pub completed: usize,
    pub pending: usize,
    pub failed: usize,
}

// ============ API Request Models ============

/// Query string of `GET /api/bacen/ccs/relacionamento`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipQueryParams {
    pub cpf_cnpj: Option<String>,
    pub data_inicio: Option<String>,
    pub data_fim: Option<String>,
    pub num_processo: Option<String>,
    pub motivo: Option<String>,
    pub caso: Option<String>,
}

/// Query string of `GET /api/bacen/ccs/detalhamento`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailingParams {
    pub id_relacionamento: Option<String>,
}
