use purgelink::application::repos::CacheStore;
use purgelink::domain::entries::CacheEntry;
use purgelink::infra::db::PostgresCacheStore;
use sqlx::PgPool;
use time::OffsetDateTime;
use time::macros::datetime;

const NOW: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);

fn entry(identifier: &str, tags: &[&str], expires_at: OffsetDateTime) -> CacheEntry {
    CacheEntry::new(
        identifier,
        format!("http://example.com/{identifier}.html"),
        tags.iter().map(|tag| tag.to_string()),
        expires_at,
    )
    .expect("valid entry")
}

fn live(identifier: &str, tags: &[&str]) -> CacheEntry {
    entry(identifier, tags, datetime!(2030-01-01 0:00 UTC))
}

fn tags(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[sqlx::test(migrations = "./migrations")]
async fn set_replaces_entry_and_tags(pool: PgPool) {
    let store = PostgresCacheStore::new(pool);
    store.health_check().await.expect("database reachable");

    store.set(&live("a", &["x", "y"])).await.expect("set");
    store.set(&live("a", &["z"])).await.expect("replace");

    assert_eq!(
        store.get("a", NOW).await.expect("get").as_deref(),
        Some("http://example.com/a.html")
    );
    assert!(
        store
            .find_by_tags(&tags(&["x", "y"]), NOW)
            .await
            .expect("find")
            .is_empty()
    );
    assert_eq!(
        store
            .find_by_tags(&tags(&["z"]), NOW)
            .await
            .expect("find")
            .len(),
        1
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn find_by_tags_filters_expired_and_deduplicates(pool: PgPool) {
    let store = PostgresCacheStore::new(pool);
    store.set(&live("a", &["x", "y"])).await.expect("set");
    store.set(&live("b", &["y"])).await.expect("set");
    store
        .set(&entry("old", &["x"], datetime!(2024-01-01 0:00 UTC)))
        .await
        .expect("set");

    let found = store
        .find_by_tags(&tags(&["x", "y"]), NOW)
        .await
        .expect("find");
    let identifiers: Vec<_> = found.iter().map(|l| l.identifier.as_str()).collect();
    assert_eq!(identifiers, vec!["a", "b"]);
    assert!(store.get("old", NOW).await.expect("get").is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn deletes_by_key_tag_and_all(pool: PgPool) {
    let store = PostgresCacheStore::new(pool);
    store.set(&live("a", &["x"])).await.expect("set");
    store.set(&live("b", &["y"])).await.expect("set");
    store.set(&live("c", &["z"])).await.expect("set");
    store.set(&live("d", &[])).await.expect("set");

    assert!(store.remove("a").await.expect("remove"));
    assert!(!store.remove("a").await.expect("remove again"));

    assert_eq!(
        store
            .flush_by_tag("y", &tags(&["b"]))
            .await
            .expect("flush tag"),
        1
    );
    assert!(store.get("b", NOW).await.expect("get").is_none());

    assert_eq!(
        store
            .flush_by_tags(&tags(&["z"]), &tags(&["c", "d"]))
            .await
            .expect("flush tags"),
        1
    );
    assert!(store.get("c", NOW).await.expect("get").is_none());
    assert!(store.get("d", NOW).await.expect("get").is_some());

    store.flush_all().await.expect("flush all");
    assert!(store.get("d", NOW).await.expect("get").is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn collect_garbage_removes_expired_rows(pool: PgPool) {
    let store = PostgresCacheStore::new(pool);
    store
        .set(&entry("old", &["x"], datetime!(2024-01-01 0:00 UTC)))
        .await
        .expect("set");
    store.set(&live("fresh", &["x"])).await.expect("set");

    assert_eq!(store.collect_garbage(NOW).await.expect("gc"), 1);
    assert_eq!(
        store
            .find_by_tags(&tags(&["x"]), NOW)
            .await
            .expect("find")
            .len(),
        1
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn tag_flush_is_bounded_to_given_identifiers(pool: PgPool) {
    let store = PostgresCacheStore::new(pool);
    store.set(&live("a", &["t"])).await.expect("set");
    store.set(&live("late", &["t"])).await.expect("set");

    let deleted = store
        .flush_by_tags(&tags(&["t"]), &tags(&["a"]))
        .await
        .expect("flush tags");

    assert_eq!(deleted, 1);
    assert!(store.get("a", NOW).await.expect("get").is_none());
    assert!(store.get("late", NOW).await.expect("get").is_some());
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_sets_of_one_entry_both_succeed(pool: PgPool) {
    let store = PostgresCacheStore::new(pool);
    let first = live("a", &["x", "y"]);
    let second = live("a", &["x", "y"]);

    let (left, right) = tokio::join!(store.set(&first), store.set(&second));
    left.expect("first set");
    right.expect("second set");

    assert_eq!(
        store
            .find_by_tags(&tags(&["x"]), NOW)
            .await
            .expect("find")
            .len(),
        1
    );
}
