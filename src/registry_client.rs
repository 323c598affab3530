use crate::config::Config;
use crate::errors::AppError;
use crate::models::{Relationship, RelationshipQuery};
use crate::registry_models::{
    parse_xml, AssetValueListXml, AssetValueXml, DetailingRequestXml, DetailingResponseItemXml,
    DetailingResponseXml, Participant, RelationshipRequestXml,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Outcome of a registry call.
///
/// `NotFound` and `DomainRefusal` are answers the registry gives on purpose;
/// only `TransportFailure` means the call itself went wrong.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryReply<T> {
    Data(T),
    NotFound,
    /// The institution does not support detailing (HTTP 500 on request-detailing).
    DomainRefusal,
    TransportFailure(String),
}

impl<T> RegistryReply<T> {
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, RegistryReply::TransportFailure(_))
    }
}

/// Key identifying one relationship on the registry side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailingTarget {
    pub request_number: String,
    pub person_id: String,
    pub responsible_cnpj: String,
    pub participant_cnpj: String,
    pub relationship_start: String,
}

impl From<&Relationship> for DetailingTarget {
    fn from(r: &Relationship) -> Self {
        Self {
            request_number: r.request_number.clone(),
            person_id: r.person_id.clone(),
            responsible_cnpj: r.responsible_cnpj.clone(),
            participant_cnpj: r.participant_cnpj.clone(),
            relationship_start: r.start_date.clone(),
        }
    }
}

#[async_trait]
pub trait RegistryApi: Send + Sync {
    async fn query_relationships(
        &self,
        query: &RelationshipQuery,
    ) -> RegistryReply<RelationshipRequestXml>;

    async fn request_detailing(&self, target: &DetailingTarget)
        -> RegistryReply<DetailingRequestXml>;

    /// `NotFound` while the institution has not answered yet.
    async fn fetch_detailing_response(
        &self,
        target: &DetailingTarget,
    ) -> RegistryReply<Vec<DetailingResponseItemXml>>;

    async fn fetch_asset_values(&self, response_code: &str) -> RegistryReply<Vec<AssetValueXml>>;

    async fn lookup_participant(&self, cnpj: &str) -> RegistryReply<Participant>;
}

/// HTTP client for the BACEN CCS REST endpoints and the participant registry.
#[derive(Clone)]
pub struct BacenRegistryClient {
    client: Client,
    ccs_base_url: String,
    participants_base_url: String,
    username: String,
    password: String,
}

impl BacenRegistryClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.bacen_timeout_secs))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create BACEN client: {}", e))
            })?;

        Ok(Self {
            client,
            ccs_base_url: config.bacen_ccs_base_url.clone(),
            participants_base_url: config.bacen_participants_base_url.clone(),
            username: config.bacen_username.clone(),
            password: config.bacen_password.clone(),
        })
    }

    /// Issues an authenticated GET and returns the status with the raw body.
    async fn get(
        &self,
        url: String,
        params: &[(&str, &str)],
    ) -> Result<(StatusCode, String), String> {
        let response = self
            .client
            .get(&url)
            .query(params)
            .header("Accept", "*/*")
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| format!("BACEN request to {} failed: {}", url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read BACEN response from {}: {}", url, e))?;

        Ok((status, body))
    }

    /// GET an XML document. Any non-2xx status is a transport failure and an
    /// empty body is `NotFound`.
    async fn get_xml<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> RegistryReply<T> {
        let url = format!("{}/{}", self.ccs_base_url, endpoint);
        let (status, body) = match self.get(url, params).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("{}", e);
                return RegistryReply::TransportFailure(e);
            }
        };

        if !status.is_success() {
            tracing::warn!("BACEN {} returned status {}", endpoint, status);
            return RegistryReply::TransportFailure(format!(
                "BACEN {} returned status {}",
                endpoint, status
            ));
        }

        // The registry answers "no results yet" with an empty body.
        if body.trim().is_empty() {
            tracing::debug!("BACEN {} returned an empty body", endpoint);
            return RegistryReply::NotFound;
        }

        match parse_xml(&body, endpoint) {
            Ok(parsed) => RegistryReply::Data(parsed),
            Err(e) => {
                tracing::warn!("{}", e);
                RegistryReply::TransportFailure(e)
            }
        }
    }
}

#[async_trait]
impl RegistryApi for BacenRegistryClient {
    async fn query_relationships(
        &self,
        query: &RelationshipQuery,
    ) -> RegistryReply<RelationshipRequestXml> {
        tracing::info!(
            "Requesting CCS relationships for {} ({} to {})",
            query.document,
            query.start_date,
            query.end_date
        );

        self.get_xml(
            "requisitar-relacionamentos",
            &[
                ("id-cliente", query.document.as_str()),
                ("data-inicio", query.start_date.as_str()),
                ("data-fim", query.end_date.as_str()),
                ("numero-processo", query.process_number.as_str()),
                ("motivo", query.reason.as_str()),
            ],
        )
        .await
    }

    async fn request_detailing(
        &self,
        target: &DetailingTarget,
    ) -> RegistryReply<DetailingRequestXml> {
        tracing::info!(
            "Requesting detailing for request {} (responsible {}, participant {})",
            target.request_number,
            target.responsible_cnpj,
            target.participant_cnpj
        );

        let url = format!("{}/requisitar-detalhamentos", self.ccs_base_url);
        let params = [
            ("numeros-requisicoes", target.request_number.as_str()),
            ("ids-pessoa", target.person_id.as_str()),
            ("cnpj-responsaveis", target.responsible_cnpj.as_str()),
            ("cnpj-participantes", target.participant_cnpj.as_str()),
            ("datas-inicio", target.relationship_start.as_str()),
        ];

        let (status, body) = match self.get(url, &params).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("{}", e);
                return RegistryReply::TransportFailure(e);
            }
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::info!(
                "Institution {} does not support detailing",
                target.responsible_cnpj
            );
            return RegistryReply::DomainRefusal;
        }

        if !status.is_success() {
            return RegistryReply::TransportFailure(format!(
                "BACEN requisitar-detalhamentos returned status {}",
                status
            ));
        }

        match parse_xml(&body, "requisitar-detalhamentos") {
            Ok(parsed) => RegistryReply::Data(parsed),
            Err(e) => RegistryReply::TransportFailure(e),
        }
    }

    async fn fetch_detailing_response(
        &self,
        target: &DetailingTarget,
    ) -> RegistryReply<Vec<DetailingResponseItemXml>> {
        let reply: RegistryReply<DetailingResponseXml> = self
            .get_xml(
                "obter-respostas-detalhamento",
                &[
                    ("numero-requisicao", target.request_number.as_str()),
                    ("id-pessoa", target.person_id.as_str()),
                    ("cnpj-responsavel", target.responsible_cnpj.as_str()),
                    ("cnpj-participante", target.participant_cnpj.as_str()),
                ],
            )
            .await;

        match reply {
            RegistryReply::Data(parsed) if parsed.items.is_empty() => RegistryReply::NotFound,
            RegistryReply::Data(parsed) => RegistryReply::Data(parsed.items),
            RegistryReply::NotFound => RegistryReply::NotFound,
            RegistryReply::DomainRefusal => RegistryReply::DomainRefusal,
            RegistryReply::TransportFailure(e) => RegistryReply::TransportFailure(e),
        }
    }

    async fn fetch_asset_values(&self, response_code: &str) -> RegistryReply<Vec<AssetValueXml>> {
        let reply: RegistryReply<AssetValueListXml> = self
            .get_xml(
                "obter-bdvs-resposta",
                &[("numero-controle-resposta", response_code)],
            )
            .await;

        match reply {
            RegistryReply::Data(parsed) => RegistryReply::Data(parsed.items),
            RegistryReply::NotFound => RegistryReply::NotFound,
            RegistryReply::DomainRefusal => RegistryReply::DomainRefusal,
            RegistryReply::TransportFailure(e) => RegistryReply::TransportFailure(e),
        }
    }

    async fn lookup_participant(&self, cnpj: &str) -> RegistryReply<Participant> {
        let url = format!("{}/pessoasJuridicas", self.participants_base_url);
        tracing::debug!("Looking up participant {}", cnpj);

        let (status, body) = match self.get(url, &[("cnpj", cnpj)]).await {
            Ok(reply) => reply,
            Err(e) => return RegistryReply::TransportFailure(e),
        };

        if status != StatusCode::OK {
            tracing::debug!("Participant {} not resolved (status {})", cnpj, status);
            return RegistryReply::NotFound;
        }

        match serde_json::from_str::<Participant>(&body) {
            Ok(participant) => RegistryReply::Data(participant),
            Err(e) => RegistryReply::TransportFailure(format!(
                "Failed to parse participant {}: {}",
                cnpj, e
            )),
        }
    }
}
