// Domain-layer modules and shared errors/models
pub mod workflow {
    pub use crate::ccs_workflow::*;
}

pub mod storage {
    pub use crate::ccs_storage::*;
}

pub mod time_window {
    pub use crate::time_window::*;
}

pub mod validation {
    pub use crate::validation::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
