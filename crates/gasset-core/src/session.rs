use gasset_store::Repository;
use tracing::{debug, warn};

use crate::error::{GassetError, GassetResult};

/// Close `repo` and combine the close result with the session body's.
///
/// The repository is closed whatever `result` holds. A body error wins over
/// a close error; the close error is then only logged.
pub async fn finish_session<R: Repository, T>(repo: &R, result: GassetResult<T>) -> GassetResult<T> {
    let closed = repo.close().await;
    debug!(ok = result.is_ok(), "session closed");
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(GassetError::connect("closing session")(e)),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_error)) => {
            warn!(error = %close_error, "closing session after failure also failed");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    #[tokio::test]
    async fn body_error_wins_over_close_error() {
        let backend = FakeBackend::initialized().failing("close");
        let repo = backend.open_for_tests().await;
        let result: GassetResult<()> = Err(GassetError::IdentityMissing);
        let err = finish_session(&repo, result).await.unwrap_err();
        assert!(matches!(err, GassetError::IdentityMissing));
        assert_eq!(backend.closed_count(), 1);
    }

    #[tokio::test]
    async fn close_error_surfaces_after_success() {
        let backend = FakeBackend::initialized().failing("close");
        let repo = backend.open_for_tests().await;
        let err = finish_session(&repo, Ok(5)).await.unwrap_err();
        assert!(matches!(err, GassetError::BackendConnect { .. }));
    }

    #[tokio::test]
    async fn success_returns_value() {
        let backend = FakeBackend::initialized();
        let repo = backend.open_for_tests().await;
        assert_eq!(finish_session(&repo, Ok(5)).await.unwrap(), 5);
        assert_eq!(backend.closed_count(), 1);
    }
}
