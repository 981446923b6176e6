//! Consensus route handlers
//!
//! Proposal intake, vote submission, and the read-only tally views.

use crate::auth::Caller;
use crate::consensus::reporter::{ConsensusMetrics, ProposalTally, Visibility};
use crate::error::{validation_error, ApiResult};
use crate::models::{
    AuditLogResponse, CastVoteRequest, CreateProposalRequest, CreateProposalResponse, ProposalListQuery,
    ProposalListResponse, SuccessResponse, VoteResponse, VoteTalliesResponse,
};
use crate::proposal::{Proposal, ProposalFilter};
use crate::state::SharedState;
use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    Json,
};
use tracing::{debug, info};
use validator::Validate;

pub const PROPOSAL_STATE_HEADER: &str = "x-proposal-state";
pub const CONSENSUS_REACHED_HEADER: &str = "x-consensus-reached";

/// Create a proposal, subject to the zeroth-gate
pub async fn create_proposal(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<CreateProposalRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<CreateProposalResponse>>)> {
    let Json(payload) = payload?;
    payload.validate().map_err(|e| validation_error(e.to_string()))?;
    debug!("Creating proposal: {}", payload.title);

    let proposal = state.intake.create(&caller, payload.into()).await?;

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data(
            "Proposal created and awaiting votes.",
            CreateProposalResponse {
                id: proposal.id.clone(),
                status: proposal.status,
                proposal,
            },
        )),
    ))
}

/// Cast one vote on one track
pub async fn cast_vote(
    State(state): State<SharedState>,
    Path(proposal_id): Path<String>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<CastVoteRequest>, JsonRejection>,
) -> ApiResult<(HeaderMap, Json<SuccessResponse<VoteResponse>>)> {
    let Json(payload) = payload?;
    payload.validate().map_err(|e| validation_error(e.to_string()))?;
    let ballot = payload.into_ballot(&proposal_id)?;

    let mut outcome = state.ingestion.submit_vote(&caller, ballot).await?;
    outcome.proposal = Visibility::for_role(caller.effective_role()).redact(outcome.proposal);

    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static(PROPOSAL_STATE_HEADER),
        HeaderValue::from_static(outcome.proposal.status.as_str()),
    );
    headers.insert(
        HeaderName::from_static(CONSENSUS_REACHED_HEADER),
        HeaderValue::from_static(if outcome.consensus_reached { "true" } else { "false" }),
    );

    let message = if outcome.consensus_reached {
        "Vote recorded. Consensus reached."
    } else {
        "Vote recorded."
    };

    Ok((headers, Json(SuccessResponse::with_data(message, outcome.into()))))
}

/// One proposal, as the caller's role may see it
pub async fn get_proposal(
    State(state): State<SharedState>,
    Path(proposal_id): Path<String>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<SuccessResponse<Proposal>>> {
    let proposal = state.reporter.get_proposal(&proposal_id, caller.effective_role()).await?;
    Ok(Json(SuccessResponse::with_data("Proposal retrieved.", proposal)))
}

/// Per-track counts and consensus status for one proposal
pub async fn get_tally(
    State(state): State<SharedState>,
    Path(proposal_id): Path<String>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<SuccessResponse<ProposalTally>>> {
    let tally = state
        .reporter
        .proposal_tally(&proposal_id, caller.effective_role())
        .await?;
    Ok(Json(SuccessResponse::with_data("Tally retrieved.", tally)))
}

/// List proposals, optionally by status. Agent-view callers only ever see
/// approved proposals.
pub async fn list_proposals(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ProposalListQuery>,
) -> ApiResult<Json<SuccessResponse<ProposalListResponse>>> {
    let filter = query
        .status()?
        .map_or_else(ProposalFilter::default, ProposalFilter::with_status);
    let proposals = state
        .reporter
        .list_proposals(filter, caller.effective_role())
        .await?;

    debug!("Listed {} proposals for {}", proposals.len(), caller.effective_role());

    Ok(Json(SuccessResponse::with_data(
        "Proposals retrieved.",
        ProposalListResponse {
            count: proposals.len(),
            proposals,
        },
    )))
}

/// Tallies for every proposal the caller's role may see
pub async fn vote_tallies(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<SuccessResponse<VoteTalliesResponse>>> {
    let role = caller.effective_role();
    let tallies = state.reporter.get_vote_tallies(role).await?;

    Ok(Json(SuccessResponse::with_data(
        "Vote tallies retrieved.",
        VoteTalliesResponse {
            role,
            count: tallies.len(),
            tallies,
        },
    )))
}

pub async fn consensus_metrics(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<ConsensusMetrics>>> {
    let metrics = state.reporter.consensus_metrics().await?;
    Ok(Json(SuccessResponse::with_data("Consensus metrics retrieved.", metrics)))
}

/// Audit trail for one proposal, oldest first. Redacted entries keep their
/// original hashes.
pub async fn audit_log(
    State(state): State<SharedState>,
    Path(proposal_id): Path<String>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<SuccessResponse<AuditLogResponse>>> {
    let role = caller.effective_role();
    // 404 for unknown or hidden ids rather than an empty trail
    state.reporter.get_proposal(&proposal_id, role).await?;

    let visibility = Visibility::for_role(role);
    let mut entries = state.audit.entries(Some(&proposal_id)).await?;
    entries.iter_mut().for_each(|e| visibility.redact_entry(e));
    info!("Serving {} audit entries for proposal {}", entries.len(), proposal_id);

    Ok(Json(SuccessResponse::with_data(
        "Audit trail retrieved.",
        AuditLogResponse {
            proposal_id,
            count: entries.len(),
            entries,
        },
    )))
}

#[cfg(test)]
mod tests {
    use crate::audit::MemoryAuditSink;
    use crate::config::{ConsensusConfig, Settings};
    use crate::proposal::{InMemoryProposalStore, StaticGate};
    use crate::routes::create_router;
    use crate::state::AppState;
    use axum::{
        body::Body,
        http::{HeaderMap, Request, StatusCode},
        Router,
    };
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app_with_gate(open: bool) -> Router {
        let state = AppState::new(
            Arc::new(InMemoryProposalStore::new()),
            Arc::new(MemoryAuditSink::new()),
            Arc::new(StaticGate::new(open)),
            &ConsensusConfig::default(),
        );
        create_router(Arc::new(state), &Settings::default())
    }

    fn app() -> Router {
        app_with_gate(true)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        role: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(role) = role {
            builder = builder.header("x-actor-role", role);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, json)
    }

    async fn create(app: &Router) -> String {
        let (status, _, body) = send(
            app,
            "POST",
            "/consensus/create",
            None,
            Some(json!({"title": "Raise rate limits", "summary": "Double the per-key quota"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "pending");
        body["id"].as_str().unwrap().to_string()
    }

    async fn vote(app: &Router, id: &str, role: &str, voter: &str, track: &str, decision: &str) -> (StatusCode, HeaderMap, Value) {
        send(
            app,
            "POST",
            &format!("/consensus/vote/{}", id),
            Some(role),
            Some(json!({"voterId": voter, "voterType": track, "vote": decision, "rationale": "ok"})),
        )
        .await
    }

    #[tokio::test]
    async fn test_health() {
        let (status, _, body) = send(&app(), "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_vote_flow_to_approval() {
        let app = app();
        let id = create(&app).await;

        let (status, headers, body) = vote(&app, &id, "synthient-consensus", "s1", "synthient", "approve").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["x-proposal-state"], "pending");
        assert_eq!(headers["x-consensus-reached"], "false");
        assert_eq!(body["nextAction"], "await human consensus");

        let (status, headers, body) = vote(&app, &id, "human-consensus", "h1", "human", "approve").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["x-proposal-state"], "approved");
        assert_eq!(headers["x-consensus-reached"], "true");
        assert_eq!(body["consensusReached"], true);
        assert_eq!(body["nextAction"], "execute approved changes");
        assert_eq!(body["proposal"]["status"], "approved");

        let (status, _, body) = send(&app, "GET", &format!("/consensus/tally/{}", id), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["consensusStatus"]["consensusReached"], true);
        assert_eq!(body["metrics"]["synthient"]["approve"], 1);
    }

    #[tokio::test]
    async fn test_vote_on_unknown_proposal_is_404() {
        let (status, _, body) = vote(&app(), "missing", "synthient-consensus", "s1", "synthient", "approve").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_duplicate_vote_is_400_conflict() {
        let app = app();
        let id = create(&app).await;

        vote(&app, &id, "synthient-consensus", "s1", "synthient", "approve").await;
        let (status, _, body) = vote(&app, &id, "synthient-consensus", "s1", "synthient", "veto").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_role_mismatch_is_403() {
        let app = app();
        let id = create(&app).await;

        let (status, _, body) = vote(&app, &id, "human-consensus", "s1", "synthient", "approve").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_bad_vote_value_is_validation_error() {
        let app = app();
        let id = create(&app).await;

        let (status, _, body) = vote(&app, &id, "synthient-consensus", "s1", "synthient", "abstain").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_malformed_json_is_validation_error() {
        let request = Request::builder()
            .method("POST")
            .uri("/consensus/create")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_role_header_is_rejected() {
        let (status, _, body) = send(&app(), "GET", "/consensus/vote-tallies", Some("root"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_closed_gate_forbids_creation() {
        let (status, _, body) = send(
            &app_with_gate(false),
            "POST",
            "/consensus/create",
            None,
            Some(json!({"title": "t", "summary": "s"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_vote_tallies_follow_role() {
        let app = app();
        let approved = create(&app).await;
        let _pending = create(&app).await;
        vote(&app, &approved, "synthient-consensus", "s1", "synthient", "approve").await;
        vote(&app, &approved, "human-consensus", "h1", "human", "approve").await;

        let (_, _, body) = send(&app, "GET", "/consensus/vote-tallies", Some("human-consensus"), None).await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["role"], "human-consensus");

        let (_, _, body) = send(&app, "GET", "/consensus/vote-tallies", Some("synthient-consensus"), None).await;
        assert_eq!(body["count"], 2);
        let tally = body["tallies"]
            .as_array()
            .unwrap()
            .iter()
            .find(|t| t["proposalId"] == approved.as_str())
            .unwrap();
        assert_eq!(tally["synthientVotes"]["voters"][0]["voterId"], "s1");
        assert_eq!(tally["humanVotes"]["voters"], Value::Null);

        let (_, _, body) = send(&app, "GET", "/consensus/vote-tallies", None, None).await;
        assert_eq!(body["role"], "agent-view");
        assert_eq!(body["count"], 1);
        assert_eq!(body["tallies"][0]["proposalId"], approved.as_str());
        assert_eq!(body["tallies"][0]["synthientVotes"]["voters"], Value::Null);
    }

    #[tokio::test]
    async fn test_list_proposals_by_status() {
        let app = app();
        let id = create(&app).await;
        create(&app).await;
        vote(&app, &id, "synthient-consensus", "s1", "synthient", "veto").await;

        let (status, _, body) = send(&app, "GET", "/consensus/proposals?status=vetoed", Some("human-consensus"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["proposals"][0]["id"], id.as_str());

        let (status, _, _) = send(&app, "GET", "/consensus/proposals?status=bogus", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Agent-view sees approved proposals only
        let (_, _, body) = send(&app, "GET", "/consensus/proposals", None, None).await;
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn test_metrics_and_audit_trail() {
        let app = app();
        let id = create(&app).await;
        vote(&app, &id, "synthient-consensus", "s1", "synthient", "approve").await;

        let (status, _, body) = send(&app, "GET", "/consensus/metrics", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["proposalsByStatus"]["pending"], 1);

        let (status, _, body) = send(&app, "GET", &format!("/consensus/audit/{}", id), Some("human-consensus"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["entries"][0]["action"], "proposal_created");
        assert_eq!(body["entries"][1]["action"], "vote_cast");

        let (status, _, _) = send(&app, "GET", "/consensus/audit/missing", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    /// Pending proposal with a synthient approval and a human veto from "alice"
    async fn contested(app: &Router) -> String {
        let id = create(app).await;
        vote(app, &id, "synthient-consensus", "s1", "synthient", "approve").await;
        let (status, _, body) = vote(app, &id, "human-consensus", "alice", "human", "veto").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["proposal"]["status"], "pending");
        id
    }

    #[tokio::test]
    async fn test_get_proposal_by_id() {
        let app = app();
        let id = contested(&app).await;

        let (status, _, body) = send(&app, "GET", &format!("/consensus/proposals/{}", id), Some("human-consensus"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id.as_str());
        assert_eq!(body["humanVotes"]["alice"]["decision"], "veto");

        let (status, _, _) = send(&app, "GET", "/consensus/proposals/missing", Some("human-consensus"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_synthient_role_never_sees_human_voters() {
        let app = app();
        let id = contested(&app).await;
        let role = Some("synthient-consensus");

        for uri in [
            format!("/consensus/proposals/{}", id),
            format!("/consensus/tally/{}", id),
            format!("/consensus/audit/{}", id),
            "/consensus/proposals".to_string(),
            "/consensus/vote-tallies".to_string(),
        ] {
            let (status, _, body) = send(&app, "GET", &uri, role, None).await;
            assert_eq!(status, StatusCode::OK, "{}", uri);
            assert!(!body.to_string().contains("alice"), "{} exposes a human voter", uri);
        }

        let (_, _, body) = send(&app, "GET", &format!("/consensus/proposals/{}", id), role, None).await;
        assert_eq!(body["humanVotes"]["redacted-001"]["decision"], "veto");
        assert_eq!(body["synthientVotes"]["s1"]["decision"], "approve");

        let (_, _, body) = send(&app, "GET", &format!("/consensus/tally/{}", id), role, None).await;
        assert_eq!(body["metrics"]["human"]["veto"], 1);
    }

    #[tokio::test]
    async fn test_agent_view_cannot_read_pending_proposal() {
        let app = app();
        let id = contested(&app).await;

        for uri in [
            format!("/consensus/proposals/{}", id),
            format!("/consensus/tally/{}", id),
            format!("/consensus/audit/{}", id),
        ] {
            let (status, _, body) = send(&app, "GET", &uri, Some("agent-view"), None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
            assert!(!body.to_string().contains("alice"));
        }
    }

    #[tokio::test]
    async fn test_vote_response_is_redacted_for_voter_role() {
        let app = app();
        let id = contested(&app).await;

        let (status, _, body) = vote(&app, &id, "synthient-consensus", "s2", "synthient", "approve").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.to_string().contains("alice"));
        assert_eq!(body["proposal"]["humanVotes"]["redacted-001"]["decision"], "veto");
    }
}
