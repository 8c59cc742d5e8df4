//! Repository behavior over the in-memory session backend.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use repository::{
    check_health, Capabilities, Filter, MemorySession, Record, RecordValues, Repository,
    RepositoryError, RepositoryResult, SlugRepository, SluggedRecord, Value, CREATED, ID, UPDATED,
};

#[derive(Debug, Clone, PartialEq)]
struct Author {
    id: Option<Uuid>,
    created: Option<DateTime<Utc>>,
    updated: Option<DateTime<Utc>>,
    name: String,
    genre: Option<String>,
    rank: i64,
}

impl Record for Author {
    const TABLE: &'static str = "author";

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn to_values(&self) -> RecordValues {
        RecordValues::new()
            .with(ID, self.id)
            .with(CREATED, self.created)
            .with(UPDATED, self.updated)
            .with("name", self.name.clone())
            .with("genre", self.genre.clone())
            .with("rank", self.rank)
    }

    fn from_values(values: &RecordValues) -> RepositoryResult<Self> {
        Ok(Self {
            id: values.get(ID).and_then(Value::as_uuid),
            created: values.datetime_opt(CREATED),
            updated: values.datetime_opt(UPDATED),
            name: values.text_opt("name").unwrap_or_default(),
            genre: values.text_opt("genre"),
            rank: values.get("rank").and_then(Value::as_i64).unwrap_or(0),
        })
    }
}

fn author(name: &str, genre: Option<&str>, rank: i64) -> Author {
    Author {
        id: None,
        created: None,
        updated: None,
        name: name.to_string(),
        genre: genre.map(str::to_string),
        rank,
    }
}

async fn seed(session: &mut MemorySession, authors: Vec<Author>) -> Vec<Author> {
    let repo = Repository::<Author>::new();
    let mut stored = Vec::new();
    for record in authors {
        stored.push(repo.add(session, record).await.unwrap());
    }
    stored
}

fn default_set() -> Vec<Author> {
    vec![
        author("Ada", Some("science"), 1),
        author("Grace", Some("science"), 2),
        author("Mary", Some("gothic"), 3),
        author("Emily", Some("gothic"), 4),
        author("Jane", None, 5),
    ]
}

#[tokio::test]
async fn test_add_assigns_generated_fields_and_detaches() {
    let mut session = MemorySession::new();
    let repo = Repository::<Author>::new();

    let stored = repo
        .add(&mut session, author("Ada", Some("science"), 1))
        .await
        .unwrap();

    assert!(stored.id.is_some());
    assert!(stored.created.is_some());
    assert!(stored.updated.is_some());
    assert_eq!(stored.name, "Ada");
    assert_eq!(session.attached_len(), 0);
    assert_eq!(repo.count(&mut session, &[], &[]).await.unwrap(), 1);
}

#[tokio::test]
async fn test_add_get_round_trip() {
    let mut session = MemorySession::new();
    let repo = Repository::<Author>::new();

    let stored = repo
        .add(&mut session, author("Ada", Some("science"), 1))
        .await
        .unwrap();
    let fetched = repo.get(&mut session, stored.id.unwrap()).await.unwrap();

    assert_eq!(fetched, stored);
}

#[tokio::test]
async fn test_get_missing_is_not_found() {
    let mut session = MemorySession::new();
    let repo = Repository::<Author>::new();

    let err = repo.get(&mut session, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound { .. }));
}

#[tokio::test]
async fn test_get_one_ambiguity_is_a_storage_error() {
    let mut session = MemorySession::new();
    let repo = Repository::<Author>::new();
    seed(
        &mut session,
        vec![author("Ada", None, 1), author("Ada", None, 2)],
    )
    .await;

    let err = repo
        .get_one(&mut session, &[("name", Value::Text("Ada".into()))])
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Storage { .. }));
}

#[tokio::test]
async fn test_get_one_or_none_absent() {
    let mut session = MemorySession::new();
    let repo = Repository::<Author>::new();

    let found = repo
        .get_one_or_none(&mut session, &[("name", Value::Text("Nobody".into()))])
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_get_or_create_creates_then_reuses() {
    let mut session = MemorySession::new();
    let repo = Repository::<Author>::new();
    let eq = [
        ("name", Value::Text("Ada".into())),
        ("rank", Value::Int(7)),
    ];

    let (created, was_created) = repo.get_or_create(&mut session, &eq).await.unwrap();
    assert!(was_created);
    assert!(created.id.is_some());
    assert_eq!(created.name, "Ada");
    assert_eq!(created.rank, 7);

    let (found, was_created) = repo.get_or_create(&mut session, &eq).await.unwrap();
    assert!(!was_created);
    assert_eq!(found.id, created.id);
    assert_eq!(repo.count(&mut session, &[], &[]).await.unwrap(), 1);
}

#[tokio::test]
async fn test_count_is_pagination_invariant() {
    let mut session = MemorySession::new();
    let repo = Repository::<Author>::new();
    seed(&mut session, default_set()).await;

    let filters = [Filter::page(2, 0)];
    assert_eq!(repo.count(&mut session, &filters, &[]).await.unwrap(), 5);
    assert_eq!(repo.list(&mut session, &filters, &[]).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_list_applies_filter_conjunction_in_any_order() {
    let mut session = MemorySession::new();
    let repo = Repository::<Author>::new();
    seed(&mut session, default_set()).await;

    let range = Filter::range("rank", Some(Value::Int(1)), Some(Value::Int(5)));
    let membership = Filter::membership(
        "genre",
        vec![Value::Text("science".into()), Value::Text("gothic".into())],
    );

    let forward = repo
        .list(&mut session, &[range.clone(), membership.clone()], &[])
        .await
        .unwrap();
    let backward = repo
        .list(&mut session, &[membership, range], &[])
        .await
        .unwrap();

    let mut forward_names: Vec<_> = forward.iter().map(|a| a.name.clone()).collect();
    let mut backward_names: Vec<_> = backward.iter().map(|a| a.name.clone()).collect();
    forward_names.sort();
    backward_names.sort();
    // strictly between the bounds and in one of the two genres
    assert_eq!(forward_names, vec!["Emily", "Grace", "Mary"]);
    assert_eq!(forward_names, backward_names);
}

#[tokio::test]
async fn test_range_filter_compares_each_bound_against_its_own_value() {
    let mut session = MemorySession::new();
    let repo = Repository::<Author>::new();
    seed(&mut session, default_set()).await;

    let filters = [Filter::range(
        "rank",
        Some(Value::Int(1)),
        Some(Value::Int(4)),
    )];
    let mut ranks: Vec<i64> = repo
        .list(&mut session, &filters, &[])
        .await
        .unwrap()
        .iter()
        .map(|a| a.rank)
        .collect();
    ranks.sort_unstable();
    assert_eq!(ranks, vec![2, 3]);
}

#[tokio::test]
async fn test_empty_membership_matches_everything() {
    let mut session = MemorySession::new();
    let repo = Repository::<Author>::new();
    seed(&mut session, default_set()).await;

    let filters = [Filter::membership("genre", vec![])];
    assert_eq!(repo.list(&mut session, &filters, &[]).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_equality_constraints_compose_with_filters() {
    let mut session = MemorySession::new();
    let repo = Repository::<Author>::new();
    seed(&mut session, default_set()).await;

    let filters = [Filter::range("rank", Some(Value::Int(0)), None)];
    let eq = [("genre", Value::Text("science".into()))];
    let names: Vec<_> = repo
        .list(&mut session, &filters, &eq)
        .await
        .unwrap()
        .iter()
        .map(|a| a.name.clone())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"Ada".to_string()));
    assert!(names.contains(&"Grace".to_string()));
}

#[tokio::test]
async fn test_list_and_count_totals_ignore_pagination() {
    let mut session = MemorySession::new();
    let repo = Repository::<Author>::new();
    seed(&mut session, default_set()).await;

    let (page, total) = repo
        .list_and_count(&mut session, &[Filter::page(2, 0)], &[])
        .await
        .unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(total, 5);

    let (page, total) = repo
        .list_and_count(&mut session, &[], &[("name", Value::Text("Nobody".into()))])
        .await
        .unwrap();
    assert!(page.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_add_many_with_and_without_returning_support() {
    for capabilities in [Capabilities::ALL, Capabilities::NONE] {
        let mut session = MemorySession::with_capabilities(capabilities);
        let repo = Repository::<Author>::new();

        let stored = repo
            .add_many(
                &mut session,
                vec![author("Ada", None, 1), author("Grace", None, 2)],
            )
            .await
            .unwrap();

        assert_eq!(stored.len(), 2);
        for record in &stored {
            assert!(record.id.is_some());
            assert!(record.created.is_some());
        }
        assert_eq!(repo.count(&mut session, &[], &[]).await.unwrap(), 2);
        assert_eq!(session.attached_len(), 0);
    }
}

#[tokio::test]
async fn test_update_merges_and_bumps_updated_timestamp() {
    let mut session = MemorySession::new();
    let repo = Repository::<Author>::new();

    let stored = repo
        .add(&mut session, author("Ada", None, 1))
        .await
        .unwrap();
    let first_updated = stored.updated.unwrap();

    let mut changed = stored.clone();
    changed.name = "Lovelace".to_string();
    let updated = repo.update(&mut session, changed).await.unwrap();

    assert_eq!(updated.id, stored.id);
    assert_eq!(updated.name, "Lovelace");
    assert!(updated.updated.unwrap() >= first_updated);

    let fetched = repo.get(&mut session, stored.id.unwrap()).await.unwrap();
    assert_eq!(fetched.name, "Lovelace");
}

#[tokio::test]
async fn test_update_missing_record_is_not_found() {
    let mut session = MemorySession::new();
    let repo = Repository::<Author>::new();

    let mut ghost = author("Ghost", None, 0);
    ghost.id = Some(Uuid::new_v4());
    let err = repo.update(&mut session, ghost).await.unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound { .. }));

    let err = repo
        .update(&mut session, author("NoId", None, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound { .. }));
}

#[tokio::test]
async fn test_update_many_with_and_without_returning_support() {
    for capabilities in [Capabilities::ALL, Capabilities::NONE] {
        let mut session = MemorySession::with_capabilities(capabilities);
        let repo = Repository::<Author>::new();
        let stored = seed(
            &mut session,
            vec![author("Ada", None, 1), author("Grace", None, 2)],
        )
        .await;

        let changed: Vec<Author> = stored
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let mut record = record.clone();
                record.name = format!("Update {i}");
                record
            })
            .collect();

        let updated = repo.update_many(&mut session, changed).await.unwrap();
        assert_eq!(updated.len(), 2);
        for record in &updated {
            assert!(record.name.starts_with("Update"));
        }
    }
}

#[tokio::test]
async fn test_delete_returns_pre_deletion_snapshot() {
    let mut session = MemorySession::new();
    let repo = Repository::<Author>::new();

    let stored = repo
        .add(&mut session, author("Ada", None, 1))
        .await
        .unwrap();
    let deleted = repo
        .delete(&mut session, stored.id.unwrap())
        .await
        .unwrap();

    assert_eq!(deleted, stored);
    assert_eq!(repo.count(&mut session, &[], &[]).await.unwrap(), 0);

    let err = repo
        .delete(&mut session, stored.id.unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound { .. }));
}

#[tokio::test]
async fn test_delete_many_removes_exactly_the_requested_set() {
    for capabilities in [Capabilities::ALL, Capabilities::NONE] {
        let mut session = MemorySession::with_capabilities(capabilities);
        let repo = Repository::<Author>::new();
        let stored = seed(
            &mut session,
            vec![
                author("A", None, 1),
                author("B", None, 2),
                author("C", None, 3),
            ],
        )
        .await;

        let targets = [stored[0].id.unwrap(), stored[2].id.unwrap()];
        let deleted = repo.delete_many(&mut session, &targets).await.unwrap();

        let mut deleted_names: Vec<_> = deleted.iter().map(|a| a.name.clone()).collect();
        deleted_names.sort();
        assert_eq!(deleted_names, vec!["A", "C"]);

        let remaining = repo.list(&mut session, &[], &[]).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "B");
    }
}

#[tokio::test]
async fn test_upsert_creates_then_updates() {
    let mut session = MemorySession::new();
    let repo = Repository::<Author>::new();

    let created = repo
        .upsert(&mut session, author("Ada", None, 1))
        .await
        .unwrap();
    assert!(created.id.is_some());
    assert_eq!(repo.count(&mut session, &[], &[]).await.unwrap(), 1);

    let mut changed = created.clone();
    changed.rank = 9;
    let updated = repo.upsert(&mut session, changed).await.unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.rank, 9);
    assert_eq!(repo.count(&mut session, &[], &[]).await.unwrap(), 1);
}

#[tokio::test]
async fn test_returned_records_are_detached_snapshots() {
    let mut session = MemorySession::new();
    let repo = Repository::<Author>::new();

    let mut stored = repo
        .add(&mut session, author("Ada", None, 1))
        .await
        .unwrap();
    let id = stored.id.unwrap();

    // caller-side mutation of a returned record must not leak back
    stored.name = "Scribbled".to_string();
    let fetched = repo.get(&mut session, id).await.unwrap();
    assert_eq!(fetched.name, "Ada");
    assert_eq!(session.attached_len(), 0);
}

#[tokio::test]
async fn test_duplicate_identifier_surfaces_as_conflict() {
    let mut session = MemorySession::new();
    let repo = Repository::<Author>::new();

    let stored = repo
        .add(&mut session, author("Ada", None, 1))
        .await
        .unwrap();
    let mut copy = author("Impostor", None, 2);
    copy.id = stored.id;

    let err = repo.add(&mut session, copy).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict { .. }));
}

#[tokio::test]
async fn test_check_health_probe() {
    let mut session = MemorySession::new();
    assert!(check_health(&mut session, None).await.unwrap());
    assert!(check_health(&mut session, Some("SELECT 2")).await.is_err());
}

#[tokio::test]
async fn test_filter_collection_by_kwargs_is_pure_composition() {
    let repo = Repository::<Author>::new();
    let scope = repo.filter_collection_by_kwargs(
        repository::SelectScope::new(Author::TABLE),
        &[
            ("name", Value::Text("Ada".into())),
            ("rank", Value::Int(1)),
        ],
    );
    assert_eq!(scope.predicates().len(), 2);
}

// --- slug extension ------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Post {
    id: Option<Uuid>,
    created: Option<DateTime<Utc>>,
    updated: Option<DateTime<Utc>>,
    title: String,
    slug: String,
}

impl Record for Post {
    const TABLE: &'static str = "post";

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn to_values(&self) -> RecordValues {
        RecordValues::new()
            .with(ID, self.id)
            .with(CREATED, self.created)
            .with(UPDATED, self.updated)
            .with("title", self.title.clone())
            .with("slug", self.slug.clone())
    }

    fn from_values(values: &RecordValues) -> RepositoryResult<Self> {
        Ok(Self {
            id: values.get(ID).and_then(Value::as_uuid),
            created: values.datetime_opt(CREATED),
            updated: values.datetime_opt(UPDATED),
            title: values.text_opt("title").unwrap_or_default(),
            slug: values.text_opt("slug").unwrap_or_default(),
        })
    }
}

impl SluggedRecord for Post {
    fn slug(&self) -> &str {
        &self.slug
    }
}

#[tokio::test]
async fn test_get_available_slug_prefers_the_plain_slug() {
    let mut session = MemorySession::new();
    let repo = Repository::<Post>::new();

    let slug = repo
        .get_available_slug(&mut session, "Hello World")
        .await
        .unwrap();
    assert_eq!(slug, "hello-world");
}

#[tokio::test]
async fn test_get_available_slug_appends_suffix_on_collision() {
    let mut session = MemorySession::new();
    let repo = Repository::<Post>::new();

    repo.add(
        &mut session,
        Post {
            id: None,
            created: None,
            updated: None,
            title: "Hello World".to_string(),
            slug: "hello-world".to_string(),
        },
    )
    .await
    .unwrap();

    let slug = repo
        .get_available_slug(&mut session, "Hello World")
        .await
        .unwrap();
    let suffix = slug.strip_prefix("hello-world-").unwrap();
    assert_eq!(suffix.len(), 4);
    assert!(suffix
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
}

#[tokio::test]
async fn test_get_by_slug() {
    let mut session = MemorySession::new();
    let repo = Repository::<Post>::new();

    let stored = repo
        .add(
            &mut session,
            Post {
                id: None,
                created: None,
                updated: None,
                title: "Hello World".to_string(),
                slug: "hello-world".to_string(),
            },
        )
        .await
        .unwrap();

    let found = repo
        .get_by_slug(&mut session, "hello-world")
        .await
        .unwrap();
    assert_eq!(found.map(|post| post.id), Some(stored.id));

    let missing = repo.get_by_slug(&mut session, "absent").await.unwrap();
    assert!(missing.is_none());
}
