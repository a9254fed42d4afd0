use super::*;
use chrono::{Duration, Utc};
use shared::domain::{CommercialTerms, RfqStatus};

fn rfq_for(user: &str, title: &str, age_minutes: i64) -> Rfq {
    let created_at = Utc::now() - Duration::minutes(age_minutes);
    Rfq {
        id: RfqId::generate(),
        user_id: UserId(user.to_string()),
        title: title.to_string(),
        description: String::new(),
        status: RfqStatus::Draft,
        current_step: 1,
        completed_steps: Vec::new(),
        commercial_terms: CommercialTerms::default(),
        created_at,
        updated_at: created_at,
    }
}

#[tokio::test]
async fn stores_and_loads_rfq() {
    let storage = Storage::new();
    let rfq = storage.insert_rfq(rfq_for("alice", "brackets", 0)).await;
    let loaded = storage.load_rfq(rfq.id).await.expect("rfq");
    assert_eq!(loaded, rfq);
    assert_eq!(storage.rfq_count().await, 1);
}

#[tokio::test]
async fn lists_only_user_rfqs_newest_first() {
    let storage = Storage::new();
    storage.insert_rfq(rfq_for("alice", "older", 30)).await;
    storage.insert_rfq(rfq_for("alice", "newer", 1)).await;
    storage.insert_rfq(rfq_for("bob", "other", 0)).await;

    let rfqs = storage
        .list_rfqs_for_user(&UserId("alice".to_string()))
        .await;
    let titles: Vec<&str> = rfqs.iter().map(|rfq| rfq.title.as_str()).collect();
    assert_eq!(titles, vec!["newer", "older"]);
}

#[tokio::test]
async fn update_applies_changes_and_bumps_timestamp() {
    let storage = Storage::new();
    let rfq = storage.insert_rfq(rfq_for("alice", "brackets", 10)).await;

    let updated = storage
        .update_rfq(rfq.id, |stored| stored.title = "housings".to_string())
        .await
        .expect("updated");
    assert_eq!(updated.title, "housings");
    assert!(updated.updated_at > rfq.updated_at);
}

#[tokio::test]
async fn update_and_delete_unknown_id_return_none() {
    let storage = Storage::new();
    let unknown = RfqId(uuid::Uuid::new_v4());
    assert!(storage.update_rfq(unknown, |_| {}).await.is_none());
    assert!(storage.delete_rfq(unknown).await.is_none());
}

#[tokio::test]
async fn second_insert_with_same_id_wins() {
    let storage = Storage::new();
    let mut rfq = storage.insert_rfq(rfq_for("alice", "first", 0)).await;
    rfq.title = "second".to_string();
    storage.insert_rfq(rfq.clone()).await;

    assert_eq!(storage.rfq_count().await, 1);
    assert_eq!(storage.load_rfq(rfq.id).await.expect("rfq").title, "second");
}
