use cmig_content::ContentRecord;
use cmig_core::{
    ConfirmFn, ImportTarget, MappingStore, MigrateError, MigrationConfig, Migrator,
    PendingAssignment, PublishQueueConfig, RecordAction, Validator,
};
use cmig_test_utils::{
    record, source, sources, FakeHub, HubCall, ScriptedConfirm, PAGE_SCHEMA, REPO_ID, REPO_NAME,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

fn target() -> ImportTarget {
    ImportTarget::Repository(REPO_ID.to_string())
}

fn forced() -> MigrationConfig {
    MigrationConfig::new().with_force(true)
}

fn quick_publish() -> MigrationConfig {
    forced().with_publish(true).with_publish_queue(PublishQueueConfig {
        max_in_flight: 4,
        poll_interval_ms: 10,
        max_poll_attempts: 5,
    })
}

fn new_id<'a>(mapping: &'a MappingStore, old: &str) -> &'a str {
    mapping.content_item(old).expect("record was mapped")
}

struct RejectAll;

#[async_trait::async_trait]
impl Validator for RejectAll {
    async fn validate(&self, _body: &Value) -> Vec<String> {
        vec!["rejected".to_string()]
    }
}

#[tokio::test]
async fn chain_is_created_in_order_with_rewritten_references() {
    let hub = Arc::new(FakeHub::standard());
    let migrator = Migrator::new(hub.clone(), MigrationConfig::new());
    let mut mapping = MappingStore::in_memory();

    let batch = sources(vec![
        record("id3", &["id2"]),
        record("id2", &["id1"]),
        record("id1", &[]),
    ]);
    let report = migrator.run(&target(), batch, &mut mapping).await.unwrap();

    assert_eq!(report.levels, 3);
    assert_eq!(report.circular, 0);
    assert_eq!(hub.created_labels(), vec!["page id1", "page id2", "page id3"]);

    let two = hub.item(new_id(&mapping, "id2")).unwrap();
    let three = hub.item(new_id(&mapping, "id3")).unwrap();
    assert_eq!(two.body["links"][0]["id"], new_id(&mapping, "id1"));
    assert_eq!(three.body["links"][0]["id"], new_id(&mapping, "id2"));
}

#[tokio::test]
async fn premapped_reference_is_rewritten_without_prompting() {
    let hub = Arc::new(FakeHub::standard());
    let confirm = Arc::new(ScriptedConfirm::always(false));
    let migrator = Migrator::new(hub.clone(), MigrationConfig::new()).with_confirm(confirm.clone());
    let mut mapping = MappingStore::in_memory();
    mapping.register_content_item("old", "new");

    let report = migrator
        .run(&target(), sources(vec![record("a", &["old"])]), &mut mapping)
        .await
        .unwrap();

    assert_eq!(confirm.asked(), 0);
    assert_eq!(report.created(), 1);
    let created = hub.item(new_id(&mapping, "a")).unwrap();
    assert_eq!(created.body["links"][0]["id"], "new");
}

#[tokio::test]
async fn three_cycle_is_created_then_updated_once_each() {
    let hub = Arc::new(FakeHub::standard());
    let migrator = Migrator::new(hub.clone(), MigrationConfig::new());
    let mut mapping = MappingStore::in_memory();

    let batch = sources(vec![
        record("a", &["b"]),
        record("b", &["c"]),
        record("c", &["a"]),
    ]);
    let report = migrator.run(&target(), batch, &mut mapping).await.unwrap();

    assert_eq!(report.levels, 0);
    assert_eq!(report.circular, 3);
    assert_eq!(hub.creates(), 3);
    assert_eq!(hub.updates(), 3);
    assert_eq!(report.created(), 3);

    for (from, to) in [("a", "b"), ("b", "c"), ("c", "a")] {
        let remote = hub.item(new_id(&mapping, from)).unwrap();
        assert_eq!(remote.body["links"][0]["id"], new_id(&mapping, to));
    }
}

#[tokio::test]
async fn cycle_dependant_without_id_is_created_once() {
    let hub = Arc::new(FakeHub::standard());
    let migrator = Migrator::new(hub.clone(), forced());
    let mut mapping = MappingStore::in_memory();

    let mut top = record("top", &["a"]);
    top.id = None;
    let batch = sources(vec![record("a", &["b"]), record("b", &["a"]), top]);
    let report = migrator.run(&target(), batch, &mut mapping).await.unwrap();

    assert_eq!(report.circular, 3);
    assert_eq!(hub.creates(), 3);
    assert_eq!(hub.updates(), 3);
    assert_eq!(report.created(), 3);

    let mut labels = hub.created_labels();
    labels.sort();
    assert_eq!(labels, vec!["page a", "page b", "page top"]);
    let top = hub.item_by_label("page top").unwrap();
    assert_eq!(top.body["links"][0]["id"], new_id(&mapping, "a"));
}

#[tokio::test(start_paused = true)]
async fn two_cycle_publishes_only_the_published_record() {
    let hub = Arc::new(FakeHub::standard());
    let migrator = Migrator::new(hub.clone(), quick_publish()).with_publisher(hub.clone());
    let mut mapping = MappingStore::in_memory();

    let batch = sources(vec![
        record("a", &["b"]).with_last_published_version(3),
        record("b", &["a"]),
    ]);
    let report = migrator.run(&target(), batch, &mut mapping).await.unwrap();

    assert_eq!(hub.publish_starts(), 1);
    assert_eq!(report.publish.succeeded.len(), 1);
    assert_eq!(report.publish.succeeded[0].id, new_id(&mapping, "a"));
    assert!(report.publish.failed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn container_publish_covers_its_references() {
    let hub = Arc::new(FakeHub::standard());
    let migrator = Migrator::new(hub.clone(), quick_publish()).with_publisher(hub.clone());
    let mut mapping = MappingStore::in_memory();

    let batch = sources(vec![
        record("page", &["card"]).with_last_published_version(1),
        record("card", &[]).with_last_published_version(1),
    ]);
    let report = migrator.run(&target(), batch, &mut mapping).await.unwrap();

    assert_eq!(hub.publish_starts(), 1);
    assert_eq!(report.publish.succeeded[0].label, "page page");
}

#[tokio::test(start_paused = true)]
async fn hierarchy_children_do_not_cover_parents() {
    let hub = Arc::new(FakeHub::standard());
    let migrator = Migrator::new(hub.clone(), quick_publish()).with_publisher(hub.clone());
    let mut mapping = MappingStore::in_memory();

    let parent = record("parent", &[]).with_last_published_version(1);
    let mut child = record("child", &[]).with_last_published_version(1);
    child.body["_meta"]["hierarchy"] = json!({ "parentId": "parent" });

    let report = migrator
        .run(&target(), sources(vec![child, parent]), &mut mapping)
        .await
        .unwrap();

    assert_eq!(report.levels, 2);
    assert_eq!(hub.publish_starts(), 2);
    let child = hub.item(new_id(&mapping, "child")).unwrap();
    assert_eq!(
        child.body["_meta"]["hierarchy"]["parentId"],
        new_id(&mapping, "parent")
    );
}

#[tokio::test(start_paused = true)]
async fn unchanged_records_publish_only_with_republish() {
    let existing = record("a", &[]).with_id("remote-a");
    let hub = Arc::new(FakeHub::standard().with_item(ContentRecord {
        version: Some(4),
        ..existing
    }));

    let mut mapping = MappingStore::in_memory();
    mapping.register_content_item("a", "remote-a");
    let batch = || sources(vec![record("a", &[]).with_last_published_version(4)]);

    let migrator = Migrator::new(hub.clone(), quick_publish()).with_publisher(hub.clone());
    let report = migrator.run(&target(), batch(), &mut mapping).await.unwrap();
    assert_eq!(report.records[0].action, RecordAction::Unchanged);
    assert_eq!(hub.publish_starts(), 0);

    let migrator = Migrator::new(hub.clone(), quick_publish().with_republish(true))
        .with_publisher(hub.clone());
    migrator.run(&target(), batch(), &mut mapping).await.unwrap();
    assert_eq!(hub.publish_starts(), 1);
}

#[tokio::test]
async fn declined_update_skips_known_records() {
    let hub = Arc::new(FakeHub::standard().with_item(record("a", &[]).with_id("remote-a")));
    let confirm = Arc::new(ScriptedConfirm::new([false]));
    let migrator = Migrator::new(hub.clone(), MigrationConfig::new()).with_confirm(confirm.clone());
    let mut mapping = MappingStore::in_memory();
    mapping.register_content_item("a", "remote-a");

    let report = migrator
        .run(
            &target(),
            sources(vec![record("a", &[]), record("b", &[])]),
            &mut mapping,
        )
        .await
        .unwrap();

    assert_eq!(confirm.asked(), 1);
    assert_eq!(report.skipped(), 1);
    assert_eq!(hub.created_labels(), vec!["page b"]);
    assert_eq!(hub.updates(), 0);
}

#[tokio::test]
async fn accepted_update_unarchives_and_bumps_version() {
    let mut archived = record("a", &["x"]).with_id("remote-a");
    archived.version = Some(2);
    archived.status = cmig_content::ContentStatus::Archived;
    let hub = Arc::new(FakeHub::standard().with_item(archived));

    let mut mapping = MappingStore::in_memory();
    mapping.register_content_item("a", "remote-a");
    mapping.register_content_item("x", "remote-x");

    let migrator = Migrator::new(hub.clone(), forced());
    let report = migrator
        .run(&target(), sources(vec![record("a", &["x"])]), &mut mapping)
        .await
        .unwrap();

    assert_eq!(hub.count(|c| matches!(c, HubCall::Unarchive { .. })), 1);
    assert_eq!(
        report.records[0].action,
        RecordAction::Updated {
            from: Some(2),
            to: Some(3)
        }
    );
    let remote = hub.item("remote-a").unwrap();
    assert_eq!(remote.body["links"][0]["id"], "remote-x");
    assert!(!remote.is_archived());
}

#[tokio::test]
async fn stale_mapping_entry_is_recreated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mapping.json");
    std::fs::write(&path, r#"{ "contentItems": [["a", "deleted"]] }"#).unwrap();

    let hub = Arc::new(FakeHub::standard());
    let mut mapping = MappingStore::load(&path).await;
    assert_eq!(mapping.content_item("a"), Some("deleted"));

    let migrator = Migrator::new(hub.clone(), forced());
    migrator
        .run(&target(), sources(vec![record("a", &[])]), &mut mapping)
        .await
        .unwrap();

    assert_eq!(hub.creates(), 1);
    assert_ne!(new_id(&mapping, "a"), "deleted");
}

#[tokio::test]
async fn missing_schema_drops_record_and_dependants() {
    let hub = Arc::new(FakeHub::standard());
    let mut orphan = record("orphan", &[]);
    orphan.body["_meta"]["schema"] = json!("https://schema.example.com/unknown.json");

    let batch = || {
        sources(vec![
            orphan.clone(),
            record("user", &["orphan"]),
            record("free", &[]),
        ])
    };

    let strict = Migrator::new(hub.clone(), MigrationConfig::new());
    let err = strict
        .run(&target(), batch(), &mut MappingStore::in_memory())
        .await
        .unwrap_err();
    assert!(err.is_declined());
    assert_eq!(hub.creates(), 0);

    let migrator = Migrator::new(hub.clone(), forced());
    let report = migrator
        .run(&target(), batch(), &mut MappingStore::in_memory())
        .await
        .unwrap();
    assert_eq!(report.skipped(), 2);
    assert_eq!(hub.created_labels(), vec!["page free"]);
}

#[tokio::test]
async fn missing_type_is_registered_and_assigned() {
    let blog = "https://schema.example.com/blog.json";
    let hub = Arc::new(
        FakeHub::new()
            .with_repository(REPO_ID, REPO_NAME)
            .with_schema(blog, r#"{"type":"object"}"#),
    );
    let mut post = record("post", &[]);
    post.body["_meta"]["schema"] = json!(blog);

    let mut mapping = MappingStore::in_memory();
    let migrator = Migrator::new(hub.clone(), forced());
    migrator
        .run(&target(), sources(vec![post]), &mut mapping)
        .await
        .unwrap();

    assert_eq!(hub.count(|c| matches!(c, HubCall::RegisterType { .. })), 1);
    assert_eq!(hub.count(|c| matches!(c, HubCall::AssignType { .. })), 1);
    assert!(mapping.content_type(blog).is_some());
    assert!(hub.repository(REPO_ID).unwrap().has_content_type(blog));
    assert_eq!(hub.creates(), 1);
}

#[tokio::test]
async fn declining_type_assignment_aborts() {
    let hub = Arc::new(
        FakeHub::new()
            .with_repository(REPO_ID, REPO_NAME)
            .with_unassigned_type(PAGE_SCHEMA),
    );
    let migrator = Migrator::new(hub.clone(), MigrationConfig::new())
        .with_confirm(Arc::new(ConfirmFn(|_: &str| false)));

    let err = migrator
        .run(&target(), sources(vec![record("a", &[])]), &mut MappingStore::in_memory())
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::Declined { ref gate } if gate == "content type assignment"));
    assert_eq!(hub.creates(), 0);
}

#[tokio::test]
async fn registered_type_is_saved_when_assignment_is_declined() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mapping.json");
    let blog = "https://schema.example.com/blog.json";
    let hub = Arc::new(
        FakeHub::new()
            .with_repository(REPO_ID, REPO_NAME)
            .with_schema(blog, r#"{"type":"object"}"#),
    );
    let mut post = record("post", &[]);
    post.body["_meta"]["schema"] = json!(blog);

    let migrator = Migrator::new(hub.clone(), MigrationConfig::new())
        .with_confirm(Arc::new(ScriptedConfirm::new([true, false])));
    let mut mapping = MappingStore::load(&path).await;
    let err = migrator
        .run(&target(), sources(vec![post]), &mut mapping)
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::Declined { ref gate } if gate == "content type assignment"));
    assert_eq!(hub.count(|c| matches!(c, HubCall::RegisterType { .. })), 1);
    assert_eq!(hub.creates(), 0);

    let saved = MappingStore::load(&path).await;
    assert!(saved.content_type(blog).is_some());
}

#[tokio::test]
async fn dangling_reference_is_nulled_when_schema_allows() {
    let hub = Arc::new(FakeHub::standard());
    let migrator = Migrator::new(hub.clone(), forced());
    let mut mapping = MappingStore::in_memory();

    let report = migrator
        .run(&target(), sources(vec![record("a", &["ghost", "b"]), record("b", &[])]), &mut mapping)
        .await
        .unwrap();

    assert_eq!(report.nulled.len(), 1);
    assert_eq!(report.nulled[0].target_id, "ghost");
    let remote = hub.item(new_id(&mapping, "a")).unwrap();
    assert!(remote.body["links"][0].is_null());
    assert_eq!(remote.body["links"][1]["id"], new_id(&mapping, "b"));
}

#[tokio::test]
async fn dangling_reference_that_breaks_schema_drops_record() {
    let hub = Arc::new(FakeHub::standard());
    let migrator = Migrator::new(hub.clone(), forced()).with_validator(Arc::new(RejectAll));

    let report = migrator
        .run(
            &target(),
            sources(vec![
                record("a", &["ghost"]),
                record("b", &["a"]),
                record("c", &[]),
            ]),
            &mut MappingStore::in_memory(),
        )
        .await
        .unwrap();

    assert!(report.nulled.is_empty());
    assert_eq!(report.skipped(), 2);
    assert_eq!(hub.created_labels(), vec!["page c"]);
}

#[tokio::test]
async fn skip_incomplete_drops_instead_of_nulling() {
    let hub = Arc::new(FakeHub::standard());
    let migrator = Migrator::new(hub.clone(), forced().with_skip_incomplete(true));

    let report = migrator
        .run(
            &target(),
            sources(vec![record("a", &["ghost"]), record("b", &["a"]), record("c", &[])]),
            &mut MappingStore::in_memory(),
        )
        .await
        .unwrap();

    assert_eq!(report.skipped(), 2);
    assert!(report.nulled.is_empty());
    assert_eq!(hub.created_labels(), vec!["page c"]);
}

#[tokio::test]
async fn failed_create_is_fatal_and_keeps_progress() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mapping.json");
    let hub = Arc::new(FakeHub::standard().fail_create("page id2"));
    let migrator = Migrator::new(hub.clone(), forced());

    let mut mapping = MappingStore::load(&path).await;
    let err = migrator
        .run(
            &target(),
            sources(vec![record("id1", &[]), record("id2", &["id1"]), record("id3", &["id2"])]),
            &mut mapping,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::RecordFailed { action: "create", .. }));
    assert!(err.is_fatal());
    assert_eq!(hub.created_labels(), vec!["page id1"]);

    let saved = MappingStore::load(&path).await;
    assert!(saved.content_item("id1").is_some());
    assert!(saved.content_item("id2").is_none());
}

#[tokio::test]
async fn validate_only_reports_without_writing() {
    let strict = json!({
        "type": "object",
        "required": ["title"]
    });
    let blog = "https://schema.example.com/blog.json";
    let news = "https://schema.example.com/news.json";
    let hub = Arc::new(
        FakeHub::new()
            .with_repository(REPO_ID, REPO_NAME)
            .with_content_type_schema(PAGE_SCHEMA, &strict)
            .with_schema(blog, r#"{"type":"object"}"#)
            .with_unassigned_type(news),
    );
    let mut titled = record("titled", &[]);
    titled.body["title"] = json!("Hello");
    let mut post = record("post", &[]);
    post.body["_meta"]["schema"] = json!(blog);
    let mut story = record("story", &[]);
    story.body["_meta"]["schema"] = json!(news);

    let mut mapping = MappingStore::in_memory();
    let migrator = Migrator::new(hub.clone(), forced().with_validate_only(true));
    let report = migrator
        .run(
            &target(),
            sources(vec![titled, record("untitled", &[]), post, story]),
            &mut mapping,
        )
        .await
        .unwrap();

    assert_eq!(report.validation.len(), 1);
    assert_eq!(report.validation[0].label, "page untitled");
    assert_eq!(report.skipped(), 0);
    assert_eq!(report.pending_registrations, vec![blog.to_string()]);
    assert_eq!(
        report.pending_assignments,
        vec![
            PendingAssignment {
                repository_id: REPO_ID.to_string(),
                content_type_uri: blog.to_string(),
            },
            PendingAssignment {
                repository_id: REPO_ID.to_string(),
                content_type_uri: news.to_string(),
            },
        ]
    );
    assert!(hub.calls().is_empty());
    assert!(mapping.content_type(blog).is_none());
    assert!(!hub.repository(REPO_ID).unwrap().has_content_type(news));
}

#[tokio::test]
async fn hub_target_routes_by_repository_name() {
    let hub = Arc::new(FakeHub::standard());
    let migrator = Migrator::new(hub.clone(), forced());
    let mut mapping = MappingStore::in_memory();

    migrator
        .run(
            &ImportTarget::Hub,
            vec![source(record("a", &[]), &[REPO_NAME, "blog", "2024"])],
            &mut mapping,
        )
        .await
        .unwrap();

    assert_eq!(hub.folder_creations(), 2);
    let remote = hub.item(new_id(&mapping, "a")).unwrap();
    assert_eq!(remote.repository_id.as_deref(), Some(REPO_ID));
    assert!(remote.folder_id.is_some());

    let err = migrator
        .run(
            &ImportTarget::Hub,
            vec![source(record("b", &[]), &["nope"])],
            &mut mapping,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::UnknownRepository(ref name) if name == "nope"));
}

#[tokio::test]
async fn locale_and_delivery_key_are_applied() {
    let hub = Arc::new(FakeHub::standard());
    let migrator = Migrator::new(hub.clone(), forced().with_exclude_delivery_keys(true));
    let mut mapping = MappingStore::in_memory();

    let mut home = record("home", &[]).with_locale("en-GB");
    home.body["_meta"]["deliveryKey"] = json!("home");

    migrator
        .run(&target(), sources(vec![home]), &mut mapping)
        .await
        .unwrap();

    let remote = hub.item(new_id(&mapping, "home")).unwrap();
    assert_eq!(remote.locale.as_deref(), Some("en-GB"));
    assert!(remote.body["_meta"].get("deliveryKey").is_none());
    assert_eq!(hub.count(|c| matches!(c, HubCall::SetLocale { .. })), 1);
}

#[tokio::test]
async fn rerun_updates_instead_of_duplicating() {
    let hub = Arc::new(FakeHub::standard());
    let migrator = Migrator::new(hub.clone(), forced());
    let mut mapping = MappingStore::in_memory();
    let batch = || sources(vec![record("a", &["b"]), record("b", &[])]);

    migrator.run(&target(), batch(), &mut mapping).await.unwrap();
    let report = migrator.run(&target(), batch(), &mut mapping).await.unwrap();

    assert_eq!(hub.creates(), 2);
    assert_eq!(report.created(), 0);
    assert_eq!(report.updated(), 2);
    assert_eq!(report.levels, 1);
}
