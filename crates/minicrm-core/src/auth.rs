//! Bearer credentials and workspace membership.

use std::sync::Arc;

use crate::error::{GenerationError, GenerationResult};
use crate::store::CrmStore;

/// Resolved caller for one workspace. Built once per event and shared by concurrent sub-tasks
/// instead of re-checking membership for each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    pub workspace_id: String,
}

/// Token from an `Authorization` header value (`Bearer <token>`, scheme case-insensitive).
pub fn bearer_token(header: Option<&str>) -> GenerationResult<&str> {
    let header = header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| GenerationError::Auth("missing Authorization header".into()))?;
    let (scheme, token) = header
        .split_once(char::is_whitespace)
        .ok_or_else(|| GenerationError::Auth("malformed Authorization header".into()))?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(GenerationError::Auth("malformed Authorization header".into()));
    }
    Ok(token)
}

#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn CrmStore>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }

    /// User id for a bearer token.
    pub fn authenticate(&self, token: &str) -> GenerationResult<String> {
        self.store
            .resolve_session(token)?
            .ok_or_else(|| GenerationError::Auth("invalid or expired credential".into()))
    }

    /// Membership check for `workspace_id`.
    pub fn authorize(&self, user_id: &str, workspace_id: &str) -> GenerationResult<AuthContext> {
        if !self.store.is_member(workspace_id, user_id)? {
            tracing::warn!(user_id, workspace_id, "workspace access denied");
            return Err(GenerationError::Forbidden(
                "caller is not a member of this workspace".into(),
            ));
        }
        Ok(AuthContext {
            user_id: user_id.to_string(),
            workspace_id: workspace_id.to_string(),
        })
    }

    /// Header → token → user → membership, in one step.
    pub fn context_for(
        &self,
        authorization: Option<&str>,
        workspace_id: &str,
    ) -> GenerationResult<AuthContext> {
        let token = bearer_token(authorization)?;
        let user_id = self.authenticate(token)?;
        self.authorize(&user_id, workspace_id)
    }
}
