use std::collections::BTreeMap;

use chrono::Utc;
use shared::{
    domain::{Rfq, RfqId, RfqStatus, UserId, WIZARD_STEPS},
    error::ApiError,
    protocol::{CreateRfqRequest, RfqAnalytics, RfqList, UpdateRfqRequest},
};
use tracing::info;

use crate::ApiContext;

pub async fn create_rfq(ctx: &ApiContext, req: CreateRfqRequest) -> Result<Rfq, ApiError> {
    ensure_user(&req.user_id)?;
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::validation("title is required"));
    }

    let now = Utc::now();
    let rfq = Rfq {
        id: RfqId::generate(),
        user_id: req.user_id,
        title: title.to_string(),
        description: req.description,
        status: RfqStatus::Draft,
        current_step: 1,
        completed_steps: Vec::new(),
        commercial_terms: req.commercial_terms,
        created_at: now,
        updated_at: now,
    };
    info!(rfq_id = %rfq.id, user_id = %rfq.user_id.0, "rfq created");
    Ok(ctx.storage.insert_rfq(rfq).await)
}

pub async fn list_rfqs(ctx: &ApiContext, user_id: &UserId) -> Result<RfqList, ApiError> {
    ensure_user(user_id)?;
    let rfqs = ctx.storage.list_rfqs_for_user(user_id).await;
    Ok(RfqList {
        total: rfqs.len(),
        rfqs,
    })
}

pub async fn get_rfq(ctx: &ApiContext, user_id: &UserId, rfq_id: RfqId) -> Result<Rfq, ApiError> {
    ensure_user(user_id)?;
    ensure_owned(ctx, user_id, rfq_id).await
}

pub async fn update_rfq(
    ctx: &ApiContext,
    user_id: &UserId,
    rfq_id: RfqId,
    req: UpdateRfqRequest,
) -> Result<Rfq, ApiError> {
    ensure_user(user_id)?;
    if let Some(title) = &req.title {
        if title.trim().is_empty() {
            return Err(ApiError::validation("title cannot be empty"));
        }
    }
    if let Some(step) = req.current_step {
        ensure_step(step)?;
    }
    ensure_owned(ctx, user_id, rfq_id).await?;

    ctx.storage
        .update_rfq(rfq_id, |rfq| {
            if let Some(title) = req.title {
                rfq.title = title.trim().to_string();
            }
            if let Some(description) = req.description {
                rfq.description = description;
            }
            if let Some(status) = req.status {
                rfq.status = status;
            }
            if let Some(step) = req.current_step {
                rfq.current_step = step;
            }
            if let Some(terms) = req.commercial_terms {
                rfq.commercial_terms = terms;
            }
        })
        .await
        .ok_or_else(|| ApiError::not_found("rfq"))
}

pub async fn delete_rfq(ctx: &ApiContext, user_id: &UserId, rfq_id: RfqId) -> Result<Rfq, ApiError> {
    ensure_user(user_id)?;
    ensure_owned(ctx, user_id, rfq_id).await?;
    ctx.storage
        .delete_rfq(rfq_id)
        .await
        .ok_or_else(|| ApiError::not_found("rfq"))
}

/// Records a finished wizard step. The wizard advances to the following step
/// (never past the last one) and the final step submits the RFQ.
pub async fn mark_step_complete(
    ctx: &ApiContext,
    user_id: &UserId,
    rfq_id: RfqId,
    step: u8,
) -> Result<Rfq, ApiError> {
    ensure_user(user_id)?;
    ensure_step(step)?;
    ensure_owned(ctx, user_id, rfq_id).await?;

    let rfq = ctx
        .storage
        .update_rfq(rfq_id, |rfq| {
            if let Err(pos) = rfq.completed_steps.binary_search(&step) {
                rfq.completed_steps.insert(pos, step);
            }
            rfq.current_step = rfq.current_step.max(step + 1).min(WIZARD_STEPS);
            if step == WIZARD_STEPS {
                rfq.status = RfqStatus::Submitted;
            } else if rfq.status == RfqStatus::Draft {
                rfq.status = RfqStatus::InProgress;
            }
        })
        .await
        .ok_or_else(|| ApiError::not_found("rfq"))?;
    info!(%rfq_id, step, status = rfq.status.as_str(), "rfq step completed");
    Ok(rfq)
}

pub async fn rfq_analytics(ctx: &ApiContext, user_id: &UserId) -> Result<RfqAnalytics, ApiError> {
    ensure_user(user_id)?;
    let rfqs = ctx.storage.list_rfqs_for_user(user_id).await;

    let mut by_status: BTreeMap<String, usize> = RfqStatus::ALL
        .iter()
        .map(|status| (status.as_str().to_string(), 0))
        .collect();
    for rfq in &rfqs {
        *by_status.entry(rfq.status.as_str().to_string()).or_default() += 1;
    }

    Ok(RfqAnalytics {
        total: rfqs.len(),
        by_status,
        completed_steps: rfqs.iter().map(|rfq| rfq.completed_steps.len()).sum(),
    })
}

fn ensure_user(user_id: &UserId) -> Result<(), ApiError> {
    if user_id.0.trim().is_empty() {
        return Err(ApiError::validation("userId is required"));
    }
    Ok(())
}

fn ensure_step(step: u8) -> Result<(), ApiError> {
    if !(1..=WIZARD_STEPS).contains(&step) {
        return Err(ApiError::validation(format!(
            "step must be between 1 and {WIZARD_STEPS}"
        )));
    }
    Ok(())
}

/// Records owned by another user are reported as missing.
async fn ensure_owned(ctx: &ApiContext, user_id: &UserId, rfq_id: RfqId) -> Result<Rfq, ApiError> {
    match ctx.storage.load_rfq(rfq_id).await {
        Some(rfq) if &rfq.user_id == user_id => Ok(rfq),
        _ => Err(ApiError::not_found("rfq")),
    }
}

#[cfg(test)]
#[path = "tests/rfq_tests.rs"]
mod tests;
