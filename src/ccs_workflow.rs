//! CCS workflow: relationship queries, the detailing state machine, the queue
//! processor and the response harvester.

use crate::bank_enricher::BankNameEnricher;
use crate::ccs_storage::{PgRelationshipStore, RelationshipStore};
use crate::config::Config;
use crate::errors::{AppError, ResultExt};
use crate::models::{
    CallerIdentity, DetailingResult, DetailingStatus, DetailingUpdate, HarvestSummary,
    QueryNotice, QueryResult, Relationship, RelationshipRequest, RelationshipQueryParams,
    REQUEST_STATUS_FAILURE, REQUEST_STATUS_SUCCESS,
};
use crate::registry_client::{BacenRegistryClient, DetailingTarget, RegistryApi, RegistryReply};
use crate::registry_models::{ClientXml, RelationshipXml};
use crate::time_window::{Clock, SubmissionWindow, SystemClock};
use crate::validation::validate_relationship_query;
use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const MSG_INVALID_DOCUMENT: &str = "CPF ou CNPJ incorreto";
pub const MSG_NO_RELATIONSHIPS: &str = "CPF / CNPJ Não possui relacionamentos no período informado";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HarvestOutcome {
    Completed,
    Pending,
}

#[derive(Clone)]
pub struct CcsWorkflow {
    registry: Arc<dyn RegistryApi>,
    store: Arc<dyn RelationshipStore>,
    enricher: BankNameEnricher,
    clock: Arc<dyn Clock>,
    window: SubmissionWindow,
    batch_concurrency: usize,
}

impl CcsWorkflow {
    pub fn new(
        registry: Arc<dyn RegistryApi>,
        store: Arc<dyn RelationshipStore>,
        clock: Arc<dyn Clock>,
        window: SubmissionWindow,
        batch_concurrency: usize,
    ) -> Self {
        Self {
            enricher: BankNameEnricher::new(registry.clone()),
            registry,
            store,
            clock,
            window,
            batch_concurrency: batch_concurrency.max(1),
        }
    }

    /// Wires the BACEN HTTP client, PostgreSQL store and wall clock.
    pub fn from_config(config: &Config, pool: PgPool) -> Result<Self, AppError> {
        let registry: Arc<dyn RegistryApi> = Arc::new(BacenRegistryClient::new(config)?);
        let store: Arc<dyn RelationshipStore> = Arc::new(PgRelationshipStore::new(pool));

        Ok(Self::new(
            registry,
            store,
            Arc::new(SystemClock),
            SubmissionWindow::new(config.window_utc_offset_hours),
            config.batch_concurrency,
        ))
    }

    /// Timestamp in the registry's civil time, RFC 3339.
    fn timestamp(&self) -> String {
        self.window.local(self.clock.now()).to_rfc3339()
    }

    /// Queries the registry for the subject's relationships and persists the
    /// outcome.
    ///
    /// Returns the stored request with its tree, or a single notice when the
    /// registry failed or found nothing.
    pub async fn query_relationships(
        &self,
        caller: &CallerIdentity,
        params: &RelationshipQueryParams,
    ) -> Result<Vec<QueryResult>, AppError> {
        let query = validate_relationship_query(params)?;
        let now = self.timestamp();

        let mut request = RelationshipRequest {
            requested_at: now.clone(),
            query_start: query.start_date.clone(),
            query_end: query.end_date.clone(),
            queried_document: query.document.clone(),
            process_number: query.process_number.clone(),
            search_reason: query.reason.clone(),
            responsible_document: caller.document.clone(),
            responsible_unit: caller.unit.clone(),
            case_label: query.case_label.clone(),
            authorized: true,
            authorizer_document: caller.document.clone(),
            authorizer_name: caller.name.clone(),
            authorized_at: now,
            authorization_token: caller.token_fingerprint.clone(),
            ..Default::default()
        };

        let reply = match self.registry.query_relationships(&query).await {
            RegistryReply::Data(reply) => reply,
            other => {
                if let RegistryReply::TransportFailure(e) = &other {
                    tracing::warn!("CCS query for {} failed: {}", query.document, e);
                }
                request.status = REQUEST_STATUS_FAILURE.to_string();
                self.store
                    .create_request_graph(&request)
                    .await
                    .context("storing failed CCS request")?;

                return Ok(vec![QueryResult::Notice(QueryNotice {
                    cpf_cnpj_consulta: query.document,
                    status: REQUEST_STATUS_FAILURE.to_string(),
                    message: MSG_INVALID_DOCUMENT.to_string(),
                })]);
            }
        };

        request.status = REQUEST_STATUS_SUCCESS.to_string();
        request.request_number = reply.request_number.clone();

        let subject = reply.subject();
        if let Some(subject) = subject {
            request.subject_document = subject.id.clone();
            request.subject_type = subject.person_type.clone();
            request.subject_name = subject.name.clone();
        }

        let subject = match subject {
            Some(subject) if !subject.relationships.items.is_empty() => subject,
            _ => {
                tracing::info!("No CCS relationships for {} in period", query.document);
                self.store
                    .create_request_graph(&request)
                    .await
                    .context("storing empty CCS request")?;

                return Ok(vec![QueryResult::Notice(QueryNotice {
                    cpf_cnpj_consulta: query.document,
                    status: REQUEST_STATUS_SUCCESS.to_string(),
                    message: MSG_NO_RELATIONSHIPS.to_string(),
                })]);
            }
        };

        for item in &subject.relationships.items {
            let relationship = self
                .build_relationship(&reply.request_number, subject, item)
                .await;
            request.relationships.push(relationship);
        }

        let id = self
            .store
            .create_request_graph(&request)
            .await
            .context("storing CCS request")?;

        tracing::info!(
            "✓ CCS request {} stored for {} ({} relationships)",
            id,
            query.document,
            request.relationships.len()
        );

        let stored = self.store.find_request(id).await?.ok_or_else(|| {
            AppError::InternalError(format!("CCS request {} vanished after insert", id))
        })?;

        Ok(vec![QueryResult::Stored(stored)])
    }

    async fn build_relationship(
        &self,
        request_number: &str,
        subject: &ClientXml,
        item: &RelationshipXml,
    ) -> Relationship {
        let responsible = self.enricher.resolve(&item.responsible_cnpj).await;
        let participant = self.enricher.resolve(&item.participant_cnpj).await;
        let (start_date, end_date) = item.first_period();

        Relationship {
            request_number: request_number.to_string(),
            person_id: subject.id.clone(),
            person_name: subject.name.clone(),
            person_type: subject.person_type.clone(),
            responsible_cnpj: item.responsible_cnpj.clone(),
            responsible_bank_number: responsible.number,
            responsible_bank_name: responsible.name,
            participant_cnpj: item.participant_cnpj.clone(),
            participant_bank_number: participant.number,
            participant_bank_name: participant.name,
            start_date,
            end_date,
            detailing_status: DetailingStatus::NotRequested,
            ..Default::default()
        }
    }

    /// Requests detailing of one of the caller's relationships.
    pub async fn request_detailing(
        &self,
        caller: &CallerIdentity,
        relationship_id: i32,
    ) -> Result<Vec<DetailingResult>, AppError> {
        let relationship = self
            .store
            .find_owned_relationship(relationship_id, &caller.document)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Relationship {} not found", relationship_id))
            })?;

        let status = relationship.detailing_status;
        if !status.can_transition_to(DetailingStatus::AwaitingResponse) {
            let reason = if status.is_terminal() {
                "already finished"
            } else {
                "already requested"
            };
            return Err(AppError::BadRequest(format!(
                "Detailing of relationship {} {} ('{}')",
                relationship_id, reason, status
            )));
        }

        let result = self.submit_detailing(&relationship).await?;
        Ok(vec![result])
    }

    /// One detailing step for a `NotRequested` or `Queued` relationship.
    async fn submit_detailing(&self, relationship: &Relationship) -> Result<DetailingResult, AppError> {
        let bank = relationship.responsible_bank_name.as_str();
        let current = relationship.detailing_status;

        if !self.window.is_open(self.clock.now()) {
            if current != DetailingStatus::Queued {
                self.transition(relationship, &DetailingUpdate::queued())
                    .await?;
            }
            tracing::info!("Relationship {} queued for detailing", relationship.id);
            return Ok(DetailingResult::queued(bank));
        }

        let target = DetailingTarget::from(relationship);
        match self.registry.request_detailing(&target).await {
            RegistryReply::DomainRefusal => {
                let update = DetailingUpdate::institution_does_not_detail(self.timestamp());
                self.transition(relationship, &update).await?;
                Ok(DetailingResult::not_detailed(bank))
            }
            RegistryReply::Data(reply) => {
                let at = reply.requested_at().unwrap_or_else(|| self.timestamp());
                self.transition(relationship, &DetailingUpdate::awaiting_response(at))
                    .await?;
                tracing::info!("✓ Detailing requested for relationship {}", relationship.id);
                Ok(DetailingResult::submitted(bank))
            }
            RegistryReply::NotFound => Err(AppError::ExternalApiError(format!(
                "BACEN gave no answer to detailing of relationship {}",
                relationship.id
            ))),
            RegistryReply::TransportFailure(e) => Err(AppError::ExternalApiError(e)),
        }
    }

    async fn transition(
        &self,
        relationship: &Relationship,
        update: &DetailingUpdate,
    ) -> Result<(), AppError> {
        let current = relationship.detailing_status;
        if !current.can_transition_to(update.status) {
            return Err(AppError::BadRequest(format!(
                "Relationship {} cannot move from '{}' to '{}'",
                relationship.id, current, update.status
            )));
        }

        let changed = self
            .store
            .update_detailing(relationship.id, relationship.detailing_status, update)
            .await?;

        if !changed {
            return Err(AppError::BadRequest(format!(
                "Relationship {} changed status concurrently",
                relationship.id
            )));
        }
        Ok(())
    }

    /// Submits every queued relationship. Outside the submission window this
    /// returns a single failure message without touching storage.
    pub async fn process_queue(&self) -> Result<Vec<DetailingResult>, AppError> {
        if !self.window.is_open(self.clock.now()) {
            tracing::info!("Detailing queue not processed: outside submission window");
            return Ok(vec![DetailingResult::outside_window()]);
        }

        let queued = self
            .store
            .list_by_detailing_status(DetailingStatus::Queued)
            .await?;
        tracing::info!("Processing {} queued detailing requests", queued.len());

        let outcomes = self
            .run_bounded(queued, |workflow, relationship| async move {
                workflow.submit_detailing(&relationship).await
            })
            .await?;

        Ok(outcomes.into_iter().map(|(_, result)| result).collect())
    }

    /// Collects answers for every relationship awaiting a detailing response.
    pub async fn harvest_responses(&self) -> Result<HarvestSummary, AppError> {
        let awaiting = self
            .store
            .list_by_detailing_status(DetailingStatus::AwaitingResponse)
            .await?;

        let mut summary = HarvestSummary {
            checked: awaiting.len(),
            ..Default::default()
        };

        let outcomes = self
            .run_bounded(awaiting, |workflow, relationship| async move {
                workflow.harvest_one(&relationship).await
            })
            .await?;

        for (_, outcome) in &outcomes {
            match outcome {
                HarvestOutcome::Completed => summary.completed += 1,
                HarvestOutcome::Pending => summary.pending += 1,
            }
        }
        summary.failed = summary.checked - outcomes.len();

        tracing::info!(
            "Harvest finished: {} checked, {} completed, {} pending, {} failed",
            summary.checked,
            summary.completed,
            summary.pending,
            summary.failed
        );
        Ok(summary)
    }

    async fn harvest_one(&self, relationship: &Relationship) -> Result<HarvestOutcome, AppError> {
        let target = DetailingTarget::from(relationship);
        let responses = match self.registry.fetch_detailing_response(&target).await {
            RegistryReply::Data(items) => items,
            RegistryReply::NotFound | RegistryReply::DomainRefusal => {
                return Ok(HarvestOutcome::Pending)
            }
            RegistryReply::TransportFailure(e) => return Err(AppError::ExternalApiError(e)),
        };

        let Some(response) = responses.into_iter().next() else {
            return Ok(HarvestOutcome::Pending);
        };

        let assets = match self.registry.fetch_asset_values(&response.code).await {
            RegistryReply::Data(items) => items,
            RegistryReply::NotFound => Vec::new(),
            RegistryReply::DomainRefusal => {
                return Err(AppError::ExternalApiError(format!(
                    "BACEN refused asset values for response {}",
                    response.code
                )))
            }
            RegistryReply::TransportFailure(e) => return Err(AppError::ExternalApiError(e)),
        };

        let assets: Vec<_> = assets
            .into_iter()
            .map(|asset| asset.into_asset_value(relationship.id))
            .collect();

        let update = DetailingUpdate::completed(
            relationship.detailing_requested_at.clone(),
            response.code.clone(),
            response.if_code(),
            response.nuop(),
        );

        let changed = self
            .store
            .complete_detailing(relationship.id, &update, &assets)
            .await?;
        if !changed {
            tracing::debug!("Relationship {} already harvested", relationship.id);
            return Ok(HarvestOutcome::Pending);
        }

        tracing::info!(
            "✓ Relationship {} completed ({} asset values)",
            relationship.id,
            assets.len()
        );
        Ok(HarvestOutcome::Completed)
    }

    /// Runs `step` for every relationship with at most `batch_concurrency` in
    /// flight. Failed items are logged and left out; the rest come back
    /// ordered by relationship id.
    async fn run_bounded<T, F, Fut>(
        &self,
        relationships: Vec<Relationship>,
        step: F,
    ) -> Result<Vec<(i32, T)>, AppError>
    where
        T: Send + 'static,
        F: Fn(CcsWorkflow, Relationship) -> Fut,
        Fut: Future<Output = Result<T, AppError>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.batch_concurrency));
        let mut handles = Vec::with_capacity(relationships.len());

        for relationship in relationships {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AppError::InternalError(format!("Batch semaphore closed: {}", e)))?;
            let id = relationship.id;
            let fut = step(self.clone(), relationship);

            let handle = tokio::spawn(async move {
                let _permit = permit;
                fut.await
            });
            handles.push((id, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            match handle.await {
                Ok(Ok(outcome)) => outcomes.push((id, outcome)),
                Ok(Err(e)) => tracing::warn!("Skipping relationship {}: {}", id, e),
                Err(e) => tracing::error!("Batch task for relationship {} panicked: {}", id, e),
            }
        }

        outcomes.sort_by_key(|(id, _)| *id);
        Ok(outcomes)
    }

    /// Every request of the caller, newest first, with full trees.
    pub async fn list_by_responsible(
        &self,
        caller: &CallerIdentity,
    ) -> Result<Vec<RelationshipRequest>, AppError> {
        self.store.list_by_responsible(&caller.document).await
    }
}
