use std::future::Future;

use tracing::warn;

use crate::domain::error::DomainError;

/// Run `operation`, and run it once more if the first attempt hit a
/// transient store failure. Each attempt must start its own transaction.
pub async fn retry_transient_once<T, F, Fut>(
    operation_name: &'static str,
    mut operation: F,
) -> Result<T, DomainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DomainError>>,
{
    match operation().await {
        Err(err) if err.is_transient() => {
            warn!(
                operation = operation_name,
                error = %err,
                "transient store failure; retrying once"
            );
            operation().await
        }
        outcome => outcome,
    }
}
