//! Resolves institution CNPJs to compensation code and display name.

use crate::circuit_breaker::{create_participant_circuit_breaker, ParticipantCircuitBreaker};
use crate::models::{UNKNOWN_BANK_NAME, UNKNOWN_BANK_NUMBER};
use crate::registry_client::{RegistryApi, RegistryReply};
use crate::registry_models::Participant;
use failsafe::futures::CircuitBreaker;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

const CACHE_TTL: Duration = Duration::from_secs(86400);
const CACHE_CAPACITY: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankIdentity {
    /// Three-digit, zero-padded compensation code.
    pub number: String,
    pub name: String,
}

impl BankIdentity {
    pub fn unknown() -> Self {
        Self {
            number: UNKNOWN_BANK_NUMBER.to_string(),
            name: UNKNOWN_BANK_NAME.to_string(),
        }
    }

    pub fn from_participant(participant: &Participant) -> Self {
        let number = participant
            .codigo_compensacao
            .map(|code| format!("{:03}", code))
            .unwrap_or_else(|| UNKNOWN_BANK_NUMBER.to_string());
        let name = if participant.nome.trim().is_empty() {
            UNKNOWN_BANK_NAME.to_string()
        } else {
            participant.nome.trim().to_string()
        };

        Self { number, name }
    }
}

/// Never fails: every lookup problem resolves to [`BankIdentity::unknown`].
#[derive(Clone)]
pub struct BankNameEnricher {
    registry: Arc<dyn RegistryApi>,
    cache: Cache<String, BankIdentity>,
    breaker: ParticipantCircuitBreaker,
}

impl BankNameEnricher {
    pub fn new(registry: Arc<dyn RegistryApi>) -> Self {
        let cache = Cache::builder()
            .time_to_live(CACHE_TTL)
            .max_capacity(CACHE_CAPACITY)
            .build();

        Self {
            registry,
            cache,
            breaker: create_participant_circuit_breaker(),
        }
    }

    pub async fn resolve(&self, cnpj: &str) -> BankIdentity {
        let cnpj = cnpj.trim();
        if cnpj.is_empty() {
            return BankIdentity::unknown();
        }

        if let Some(cached) = self.cache.get(cnpj).await {
            return cached;
        }

        let registry = self.registry.clone();
        let key = cnpj.to_string();
        // Only transport failures count against the breaker.
        let lookup = self
            .breaker
            .call(Box::pin(async move {
                match registry.lookup_participant(&key).await {
                    RegistryReply::Data(participant) => Ok(Some(participant)),
                    RegistryReply::NotFound | RegistryReply::DomainRefusal => Ok(None),
                    RegistryReply::TransportFailure(e) => Err(e),
                }
            }))
            .await;

        match lookup {
            Ok(Some(participant)) => {
                let identity = BankIdentity::from_participant(&participant);
                self.cache.insert(cnpj.to_string(), identity.clone()).await;
                identity
            }
            Ok(None) => BankIdentity::unknown(),
            Err(failsafe::Error::Rejected) => {
                tracing::debug!("Participant lookup for {} rejected by circuit breaker", cnpj);
                BankIdentity::unknown()
            }
            Err(failsafe::Error::Inner(e)) => {
                tracing::warn!("Participant lookup for {} failed: {}", cnpj, e);
                BankIdentity::unknown()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_pads_code() {
        let identity = BankIdentity::from_participant(&Participant {
            codigo_compensacao: Some(1),
            nome: "BANCO DO BRASIL S.A.".into(),
        });
        assert_eq!(identity.number, "001");
        assert_eq!(identity.name, "BANCO DO BRASIL S.A.");

        let identity = BankIdentity::from_participant(&Participant {
            codigo_compensacao: Some(341),
            nome: "ITAÚ UNIBANCO S.A.".into(),
        });
        assert_eq!(identity.number, "341");
    }

    #[test]
    fn test_identity_without_code_or_name() {
        let identity = BankIdentity::from_participant(&Participant {
            codigo_compensacao: None,
            nome: "  ".into(),
        });
        assert_eq!(identity, BankIdentity::unknown());
    }
}
