//! Payloads exchanged with the BACEN CCS registry.
//!
//! Every CCS endpoint answers in XML; the participant registry answers in JSON.
//! Lists are wrapped the way the registry wraps them, e.g.
//! `<clientes><clientes>..</clientes><clientes>..</clientes></clientes>`.

use crate::models::{AssetValue, LinkedParty};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Answer of `requisitar-relacionamentos`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelationshipRequestXml {
    #[serde(rename = "numeroRequisicao", default)]
    pub request_number: String,
    #[serde(rename = "dataMovimento", default)]
    pub movement_date: String,
    #[serde(rename = "numeroProcesso", default)]
    pub process_number: String,
    #[serde(rename = "motivo", default)]
    pub reason: String,
    #[serde(rename = "clientes", default)]
    pub clients: ClientListXml,
}

impl RelationshipRequestXml {
    /// The registry answers for a single subject; extra entries are ignored.
    pub fn subject(&self) -> Option<&ClientXml> {
        self.clients.items.first()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientListXml {
    #[serde(rename = "clientes", default)]
    pub items: Vec<ClientXml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientXml {
    #[serde(rename = "id", default)]
    pub id: String,
    #[serde(rename = "nome", default)]
    pub name: String,
    #[serde(rename = "tipoPessoa", default)]
    pub person_type: String,
    #[serde(rename = "relacionamentos", default)]
    pub relationships: RelationshipListXml,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelationshipListXml {
    #[serde(rename = "relacionamentos", default)]
    pub items: Vec<RelationshipXml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelationshipXml {
    /// CNPJ of the institution responsible for the relationship.
    #[serde(rename = "cnpj", default)]
    pub responsible_cnpj: String,
    #[serde(rename = "cnpjParticipante", default)]
    pub participant_cnpj: String,
    #[serde(rename = "periodos", default)]
    pub periods: PeriodListXml,
}

impl RelationshipXml {
    /// Start and (open) end of the first reported period.
    pub fn first_period(&self) -> (String, Option<String>) {
        match self.periods.items.first() {
            Some(p) => (p.start.clone(), non_empty(&p.end)),
            None => (String::new(), None),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeriodListXml {
    #[serde(rename = "periodos", default)]
    pub items: Vec<PeriodXml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeriodXml {
    #[serde(rename = "dataInicio", default)]
    pub start: String,
    #[serde(rename = "dataFim", default)]
    pub end: String,
}

/// Answer of `requisitar-detalhamentos`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailingRequestXml {
    #[serde(rename = "requisicaoDetalhamento", default)]
    pub items: Vec<DetailingRequestItemXml>,
}

impl DetailingRequestXml {
    pub fn requested_at(&self) -> Option<String> {
        self.items.first().and_then(|i| non_empty(&i.requested_at))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailingRequestItemXml {
    #[serde(rename = "dataHoraRequisicao", default)]
    pub requested_at: String,
}

/// Answer of `obter-respostas-detalhamento`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailingResponseXml {
    #[serde(rename = "respostaDetalhamento", default)]
    pub items: Vec<DetailingResponseItemXml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailingResponseItemXml {
    #[serde(rename = "codigo", default)]
    pub code: String,
    #[serde(rename = "codigoIf", default)]
    pub if_code: String,
    #[serde(rename = "nuop", default)]
    pub nuop: String,
}

impl DetailingResponseItemXml {
    pub fn if_code(&self) -> Option<String> {
        non_empty(&self.if_code)
    }

    pub fn nuop(&self) -> Option<String> {
        non_empty(&self.nuop)
    }
}

/// Answer of `obter-bdvs-resposta`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetValueListXml {
    #[serde(rename = "bemDireitoValor", default)]
    pub items: Vec<AssetValueXml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetValueXml {
    #[serde(rename = "cnpjParticipante", default)]
    pub participant_cnpj: String,
    #[serde(rename = "tipo", default)]
    pub kind: String,
    #[serde(rename = "agencia", default)]
    pub branch: String,
    #[serde(rename = "conta", default)]
    pub account: String,
    #[serde(rename = "vinculo", default)]
    pub link_type: String,
    #[serde(rename = "nomePessoa", default)]
    pub person_name: String,
    #[serde(rename = "dataInicio", default)]
    pub start: String,
    #[serde(rename = "dataFim", default)]
    pub end: String,
    #[serde(rename = "vinculados", default)]
    pub linked: LinkedPartyListXml,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkedPartyListXml {
    #[serde(rename = "vinculados", default)]
    pub items: Vec<LinkedPartyXml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkedPartyXml {
    #[serde(rename = "idPessoa", default)]
    pub person_id: String,
    #[serde(rename = "dataInicio", default)]
    pub start: String,
    #[serde(rename = "dataFim", default)]
    pub end: String,
    #[serde(rename = "nomePessoa", default)]
    pub person_name: String,
    #[serde(rename = "nomePessoaReceita", default)]
    pub tax_authority_name: String,
    #[serde(rename = "tipo", default)]
    pub link_type: String,
}

impl AssetValueXml {
    /// Converts into an unsaved [`AssetValue`] subtree (ids are assigned on insert).
    pub fn into_asset_value(self, relationship_id: i32) -> AssetValue {
        AssetValue {
            id: 0,
            relationship_id,
            participant_cnpj: self.participant_cnpj,
            kind: self.kind,
            branch: self.branch,
            account: self.account,
            link_type: self.link_type,
            person_name: self.person_name,
            start_date: self.start,
            end_date: non_empty(&self.end),
            linked_parties: self
                .linked
                .items
                .into_iter()
                .map(|l| LinkedParty {
                    id: 0,
                    asset_value_id: 0,
                    person_id: l.person_id,
                    person_name: l.person_name,
                    tax_authority_name: l.tax_authority_name,
                    link_type: l.link_type,
                    start_date: l.start,
                    end_date: non_empty(&l.end),
                })
                .collect(),
        }
    }
}

/// Participant registry entry (`pessoasJuridicas?cnpj=`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(default)]
    pub codigo_compensacao: Option<u32>,
    #[serde(default)]
    pub nome: String,
}

/// Parses a registry XML payload. No partial records: any structural error
/// fails the whole document. The error is the bare message, ready to become a
/// transport failure.
pub fn parse_xml<T: DeserializeOwned>(body: &str, what: &str) -> Result<T, String> {
    quick_xml::de::from_str(body).map_err(|e| format!("Failed to parse {} XML: {}", what, e))
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
