//! Approval policy
//!
//! Any request naming this signer is approved automatically. This trusts the
//! surrounding access control: whoever may create a request for this signer
//! is entitled to a certificate from it. There is no quota, no requester
//! identity check and no rate limit here.

use crate::models::{ConditionType, RequestCondition, SigningRequest};
use crate::services::store::RequestStore;
use crate::utils::error::StoreResult;

/// Reason recorded on automatically approved requests
pub const AUTO_APPROVED_REASON: &str = "AutoApproved";

/// Outcome of evaluating a request's conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Undecided,
    Approved,
    Denied,
}

/// Decide from the recorded conditions. Only presence matters; a Denied
/// condition wins over any Approved condition.
pub fn decide(conditions: &[RequestCondition]) -> ApprovalDecision {
    let mut approved = false;
    for condition in conditions {
        match condition.type_ {
            ConditionType::Denied => return ApprovalDecision::Denied,
            ConditionType::Approved => approved = true,
            ConditionType::Failed => {}
        }
    }

    if approved {
        ApprovalDecision::Approved
    } else {
        ApprovalDecision::Undecided
    }
}

/// Append the auto-approval condition and write it through the approval
/// subresource. Returns the object as stored.
pub async fn approve(
    store: &dyn RequestStore,
    mut request: SigningRequest,
    signer_name: &str,
) -> StoreResult<SigningRequest> {
    request.status.conditions.push(RequestCondition::new(
        ConditionType::Approved,
        AUTO_APPROVED_REASON,
        format!("Automatically approved by {}", signer_name),
    ));
    store.update_approval(&request).await
}
