use failsafe::{backoff, failure_policy, Config, StateMachine};
use std::time::Duration;

/// Circuit breaker guarding the participant registry.
pub type ParticipantCircuitBreaker =
    StateMachine<failure_policy::ConsecutiveFailures<backoff::Exponential>, ()>;

/// Creates the circuit breaker for participant lookups.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive transport failures trigger OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// # States
///
/// - **CLOSED**: Normal operation, lookups reach the registry.
/// - **OPEN**: Lookups are rejected at once and resolve to the unknown bank.
/// - **HALF_OPEN**: Testing if the registry recovered.
///
/// The breaker is cheap to clone; clones share state.
pub fn create_participant_circuit_breaker() -> ParticipantCircuitBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}
