use crate::errors::{AppError, ResultExt};
use crate::models::{
    AssetValue, DetailingStatus, DetailingUpdate, LinkedParty, Relationship, RelationshipRequest,
};
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;

/// Persistence of the request → relationship → asset value → linked party tree.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Inserts the request and every descendant in one transaction; returns the
    /// new request id.
    async fn create_request_graph(&self, request: &RelationshipRequest) -> Result<i32, AppError>;

    async fn find_request(&self, id: i32) -> Result<Option<RelationshipRequest>, AppError>;

    /// Newest first, each with its full tree.
    async fn list_by_responsible(
        &self,
        document: &str,
    ) -> Result<Vec<RelationshipRequest>, AppError>;

    /// Relationship `id` if its request belongs to `responsible`.
    async fn find_owned_relationship(
        &self,
        id: i32,
        responsible: &str,
    ) -> Result<Option<Relationship>, AppError>;

    async fn list_by_detailing_status(
        &self,
        status: DetailingStatus,
    ) -> Result<Vec<Relationship>, AppError>;

    /// Applies `update` only while the row is still in `expected`. Also flags
    /// the parent request as having detailing activity. Returns whether the
    /// row changed.
    async fn update_detailing(
        &self,
        id: i32,
        expected: DetailingStatus,
        update: &DetailingUpdate,
    ) -> Result<bool, AppError>;

    /// Moves an `AwaitingResponse` row to `update.status` and stores the asset
    /// subtree, atomically.
    async fn complete_detailing(
        &self,
        id: i32,
        update: &DetailingUpdate,
        assets: &[AssetValue],
    ) -> Result<bool, AppError>;

    async fn delete_request(&self, id: i32) -> Result<bool, AppError>;
}

/// PostgreSQL implementation of [`RelationshipStore`].
#[derive(Clone)]
pub struct PgRelationshipStore {
    pool: PgPool,
}

impl PgRelationshipStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attaches relationships, asset values and linked parties to `requests`,
    /// one query per level.
    async fn load_trees(
        &self,
        mut requests: Vec<RelationshipRequest>,
    ) -> Result<Vec<RelationshipRequest>, AppError> {
        if requests.is_empty() {
            return Ok(requests);
        }

        let request_ids: Vec<i32> = requests.iter().map(|r| r.id).collect();
        let mut relationships = sqlx::query_as::<_, Relationship>(
            r#"
            SELECT * FROM relacionamento_ccs
            WHERE id_requisicao = ANY($1)
            ORDER BY numero_banco_responsavel ASC, id ASC
            "#,
        )
        .bind(&request_ids)
        .fetch_all(&self.pool)
        .await
        .context("loading CCS relationships")?;

        self.attach_asset_values(&mut relationships).await?;

        let mut by_request: HashMap<i32, Vec<Relationship>> = HashMap::new();
        for relationship in relationships {
            by_request
                .entry(relationship.request_id)
                .or_default()
                .push(relationship);
        }
        for request in &mut requests {
            request.relationships = by_request.remove(&request.id).unwrap_or_default();
        }

        Ok(requests)
    }

    async fn attach_asset_values(&self, relationships: &mut [Relationship]) -> Result<(), AppError> {
        if relationships.is_empty() {
            return Ok(());
        }

        let relationship_ids: Vec<i32> = relationships.iter().map(|r| r.id).collect();
        let mut assets = sqlx::query_as::<_, AssetValue>(
            r#"
            SELECT * FROM bem_direito_valor_ccs
            WHERE id_relacionamento = ANY($1)
            ORDER BY data_inicio DESC, id ASC
            "#,
        )
        .bind(&relationship_ids)
        .fetch_all(&self.pool)
        .await
        .context("loading CCS asset values")?;

        if !assets.is_empty() {
            let asset_ids: Vec<i32> = assets.iter().map(|a| a.id).collect();
            let linked = sqlx::query_as::<_, LinkedParty>(
                r#"
                SELECT * FROM vinculados_bdv_ccs
                WHERE id_bdv = ANY($1)
                ORDER BY id ASC
                "#,
            )
            .bind(&asset_ids)
            .fetch_all(&self.pool)
            .await
            .context("loading CCS linked parties")?;

            let mut by_asset: HashMap<i32, Vec<LinkedParty>> = HashMap::new();
            for party in linked {
                by_asset.entry(party.asset_value_id).or_default().push(party);
            }
            for asset in &mut assets {
                asset.linked_parties = by_asset.remove(&asset.id).unwrap_or_default();
            }
        }

        let mut by_relationship: HashMap<i32, Vec<AssetValue>> = HashMap::new();
        for asset in assets {
            by_relationship
                .entry(asset.relationship_id)
                .or_default()
                .push(asset);
        }
        for relationship in relationships {
            relationship.asset_values = by_relationship
                .remove(&relationship.id)
                .unwrap_or_default();
        }

        Ok(())
    }
}

async fn insert_asset_values(
    conn: &mut PgConnection,
    relationship_id: i32,
    assets: &[AssetValue],
) -> Result<(), AppError> {
    for asset in assets {
        let asset_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO bem_direito_valor_ccs (
                id_relacionamento, cnpj_participante, tipo, agencia, conta,
                vinculo, nome_pessoa, data_inicio, data_fim
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(relationship_id)
        .bind(&asset.participant_cnpj)
        .bind(&asset.kind)
        .bind(&asset.branch)
        .bind(&asset.account)
        .bind(&asset.link_type)
        .bind(&asset.person_name)
        .bind(&asset.start_date)
        .bind(&asset.end_date)
        .fetch_one(&mut *conn)
        .await
        .context("inserting CCS asset value")?;

        for party in &asset.linked_parties {
            sqlx::query(
                r#"
                INSERT INTO vinculados_bdv_ccs (
                    id_bdv, id_pessoa, nome_pessoa, nome_pessoa_receita, tipo,
                    data_inicio, data_fim
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(asset_id)
            .bind(&party.person_id)
            .bind(&party.person_name)
            .bind(&party.tax_authority_name)
            .bind(&party.link_type)
            .bind(&party.start_date)
            .bind(&party.end_date)
            .execute(&mut *conn)
            .await
            .context("inserting CCS linked party")?;
        }
    }

    Ok(())
}

#[async_trait]
impl RelationshipStore for PgRelationshipStore {
    async fn create_request_graph(&self, request: &RelationshipRequest) -> Result<i32, AppError> {
        let mut tx = self.pool.begin().await?;

        let request_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO requisicao_relacionamento_ccs (
                data_requisicao, data_inicio_consulta, data_fim_consulta,
                cpf_cnpj_consulta, numero_processo, motivo_busca, cpf_responsavel,
                lotacao, caso, numero_requisicao, cpf_cnpj, tipo_pessoa, nome,
                autorizado, cpf_autorizacao, nome_autorizacao, data_hora_autorizacao,
                token_autorizacao, status, detalhamento
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            RETURNING id
            "#,
        )
        .bind(&request.requested_at)
        .bind(&request.query_start)
        .bind(&request.query_end)
        .bind(&request.queried_document)
        .bind(&request.process_number)
        .bind(&request.search_reason)
        .bind(&request.responsible_document)
        .bind(&request.responsible_unit)
        .bind(&request.case_label)
        .bind(&request.request_number)
        .bind(&request.subject_document)
        .bind(&request.subject_type)
        .bind(&request.subject_name)
        .bind(request.authorized)
        .bind(&request.authorizer_document)
        .bind(&request.authorizer_name)
        .bind(&request.authorized_at)
        .bind(&request.authorization_token)
        .bind(&request.status)
        .bind(request.detailing_requested)
        .fetch_one(&mut *tx)
        .await
        .context("inserting CCS request")?;

        for relationship in &request.relationships {
            let relationship_id: i32 = sqlx::query_scalar(
                r#"
                INSERT INTO relacionamento_ccs (
                    id_requisicao, numero_requisicao, id_pessoa, nome_pessoa, tipo_pessoa,
                    cnpj_responsavel, numero_banco_responsavel, nome_banco_responsavel,
                    cnpj_participante, numero_banco_participante, nome_banco_participante,
                    data_inicio_relacionamento, data_fim_relacionamento,
                    data_requisicao_detalhamento, status_detalhamento,
                    responde_detalhamento, resposta, codigo_resposta,
                    codigo_if_resposta, nuop_resposta
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                        $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
                RETURNING id
                "#,
            )
            .bind(request_id)
            .bind(&relationship.request_number)
            .bind(&relationship.person_id)
            .bind(&relationship.person_name)
            .bind(&relationship.person_type)
            .bind(&relationship.responsible_cnpj)
            .bind(&relationship.responsible_bank_number)
            .bind(&relationship.responsible_bank_name)
            .bind(&relationship.participant_cnpj)
            .bind(&relationship.participant_bank_number)
            .bind(&relationship.participant_bank_name)
            .bind(&relationship.start_date)
            .bind(&relationship.end_date)
            .bind(&relationship.detailing_requested_at)
            .bind(relationship.detailing_status.as_str())
            .bind(relationship.responds_to_detailing)
            .bind(relationship.has_response)
            .bind(&relationship.response_code)
            .bind(&relationship.response_if_code)
            .bind(&relationship.response_nuop)
            .fetch_one(&mut *tx)
            .await
            .context("inserting CCS relationship")?;

            insert_asset_values(&mut tx, relationship_id, &relationship.asset_values).await?;
        }

        tx.commit().await?;

        tracing::info!(
            "Stored CCS request {} with {} relationships",
            request_id,
            request.relationships.len()
        );
        Ok(request_id)
    }

    async fn find_request(&self, id: i32) -> Result<Option<RelationshipRequest>, AppError> {
        let request = sqlx::query_as::<_, RelationshipRequest>(
            "SELECT * FROM requisicao_relacionamento_ccs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("loading CCS request {}", id))?;

        match request {
            Some(request) => Ok(self.load_trees(vec![request]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_by_responsible(
        &self,
        document: &str,
    ) -> Result<Vec<RelationshipRequest>, AppError> {
        let requests = sqlx::query_as::<_, RelationshipRequest>(
            r#"
            SELECT * FROM requisicao_relacionamento_ccs
            WHERE cpf_responsavel = $1
            ORDER BY id DESC
            "#,
        )
        .bind(document)
        .fetch_all(&self.pool)
        .await
        .context("listing CCS requests")?;

        self.load_trees(requests).await
    }

    async fn find_owned_relationship(
        &self,
        id: i32,
        responsible: &str,
    ) -> Result<Option<Relationship>, AppError> {
        let relationship = sqlx::query_as::<_, Relationship>(
            r#"
            SELECT r.* FROM relacionamento_ccs r
            JOIN requisicao_relacionamento_ccs q ON q.id = r.id_requisicao
            WHERE r.id = $1 AND q.cpf_responsavel = $2
            "#,
        )
        .bind(id)
        .bind(responsible)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("loading CCS relationship {}", id))?;

        Ok(relationship)
    }

    async fn list_by_detailing_status(
        &self,
        status: DetailingStatus,
    ) -> Result<Vec<Relationship>, AppError> {
        let relationships = sqlx::query_as::<_, Relationship>(
            r#"
            SELECT r.* FROM relacionamento_ccs r
            JOIN requisicao_relacionamento_ccs q ON q.id = r.id_requisicao
            WHERE r.status_detalhamento = $1
            ORDER BY r.id ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("listing relationships in '{}'", status))?;

        Ok(relationships)
    }

    async fn update_detailing(
        &self,
        id: i32,
        expected: DetailingStatus,
        update: &DetailingUpdate,
    ) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let changed = apply_detailing_update(&mut tx, id, expected, update).await?;
        if !changed {
            tracing::debug!("Relationship {} no longer in '{}', skipping", id, expected);
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn complete_detailing(
        &self,
        id: i32,
        update: &DetailingUpdate,
        assets: &[AssetValue],
    ) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let changed =
            apply_detailing_update(&mut tx, id, DetailingStatus::AwaitingResponse, update).await?;
        if !changed {
            return Ok(false);
        }

        insert_asset_values(&mut tx, id, assets).await?;
        tx.commit().await?;

        tracing::info!(
            "Relationship {} completed with {} asset values",
            id,
            assets.len()
        );
        Ok(true)
    }

    async fn delete_request(&self, id: i32) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM requisicao_relacionamento_ccs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("deleting CCS request")?;

        Ok(result.rows_affected() > 0)
    }
}

/// Compare-and-set on `status_detalhamento`; flags the parent request when the
/// row changed.
async fn apply_detailing_update(
    conn: &mut PgConnection,
    id: i32,
    expected: DetailingStatus,
    update: &DetailingUpdate,
) -> Result<bool, AppError> {
    let request_id: Option<i32> = sqlx::query_scalar(
        r#"
        UPDATE relacionamento_ccs
        SET status_detalhamento = $3,
            responde_detalhamento = $4,
            resposta = $5,
            data_requisicao_detalhamento = $6,
            codigo_resposta = $7,
            codigo_if_resposta = $8,
            nuop_resposta = $9
        WHERE id = $1 AND status_detalhamento = $2
        RETURNING id_requisicao
        "#,
    )
    .bind(id)
    .bind(expected.as_str())
    .bind(update.status.as_str())
    .bind(update.responds_to_detailing)
    .bind(update.has_response)
    .bind(&update.requested_at)
    .bind(&update.response_code)
    .bind(&update.response_if_code)
    .bind(&update.response_nuop)
    .fetch_optional(&mut *conn)
    .await
    .with_context(|| format!("updating detailing of relationship {}", id))?;

    let Some(request_id) = request_id else {
        return Ok(false);
    };

    sqlx::query("UPDATE requisicao_relacionamento_ccs SET detalhamento = TRUE WHERE id = $1")
        .bind(request_id)
        .execute(&mut *conn)
        .await
        .context("flagging CCS request detailing")?;

    Ok(true)
}
