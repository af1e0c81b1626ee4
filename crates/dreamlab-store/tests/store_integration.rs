//! Supabase/PostgREST integration tests.

/// Test store connectivity and job round-trip.
#[tokio::test]
#[ignore = "requires Supabase"]
async fn test_store_connection() {
    dotenvy::dotenv().ok();

    let client = dreamlab_store::StoreClient::from_env().expect("Failed to create store client");
    let jobs = dreamlab_store::JobsRepo::new(client);

    // A bogus id must come back as a typed not-found, not a transport error
    match jobs.get(dreamlab_models::JobId(i64::MAX)).await {
        Err(dreamlab_store::StoreError::NotFound(_)) => {}
        other => panic!("Expected NotFound, got {:?}", other.map(|_| ())),
    }
}

/// Refund claim must be single-use against the live database.
#[tokio::test]
#[ignore = "requires Supabase and a seeded failed job"]
async fn test_refund_claim_is_single_use() {
    dotenvy::dotenv().ok();

    let job_id: i64 = std::env::var("TEST_FAILED_JOB_ID")
        .expect("set TEST_FAILED_JOB_ID to a failed, unrefunded job")
        .parse()
        .expect("TEST_FAILED_JOB_ID must be an integer");

    let client = dreamlab_store::StoreClient::from_env().expect("Failed to create store client");
    let jobs = dreamlab_store::JobsRepo::new(client);

    let first = jobs
        .try_mark_refunded(dreamlab_models::JobId(job_id))
        .await
        .expect("claim failed");
    let second = jobs
        .try_mark_refunded(dreamlab_models::JobId(job_id))
        .await
        .expect("claim failed");

    assert!(first);
    assert!(!second);
}
