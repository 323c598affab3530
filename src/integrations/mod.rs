//! External service integrations.

pub mod registry_client {
    pub use crate::registry_client::*;
}

pub mod registry_models {
    pub use crate::registry_models::*;
}

pub mod bank_enricher {
    pub use crate::bank_enricher::*;
}
