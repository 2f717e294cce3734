//! End-to-end workflow tests: raw interaction payloads in, forum thread
//! out, driven through the dispatcher and engine exactly as the event loop
//! would.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use trinketbot::config::Config;
use trinketbot::error::{PublishError, RestError, WorkflowError};
use trinketbot::gateway::dispatcher::normalize;
use trinketbot::listing::Publisher;
use trinketbot::rest::{ForumTag, InteractionResponse, Platform, ThreadRequest};
use trinketbot::store::MemoryStore;
use trinketbot::workflow::Engine;

#[derive(Default)]
struct RecordingPlatform {
    catalog: Vec<ForumTag>,
    responses: Mutex<Vec<InteractionResponse>>,
    created: Mutex<Vec<ThreadRequest>>,
    archived: Mutex<Vec<String>>,
    posted: Mutex<Vec<(String, Value)>>,
}

impl RecordingPlatform {
    fn with_catalog(catalog: Vec<ForumTag>) -> Self {
        Self {
            catalog,
            ..Self::default()
        }
    }

    fn last_response(&self) -> InteractionResponse {
        self.responses.lock().unwrap().last().cloned().unwrap()
    }

    fn last_modal_id(&self) -> String {
        match self.last_response() {
            InteractionResponse::Modal(modal) => {
                modal["custom_id"].as_str().unwrap().to_string()
            }
            other => panic!("expected a modal response, got {other:?}"),
        }
    }
}

#[async_trait]
impl Platform for RecordingPlatform {
    async fn respond(
        &self,
        _interaction_id: &str,
        _token: &str,
        response: InteractionResponse,
    ) -> Result<(), RestError> {
        self.responses.lock().unwrap().push(response);
        Ok(())
    }

    async fn fetch_tag_catalog(&self, _forum_channel_id: &str) -> Result<Vec<ForumTag>, RestError> {
        Ok(self.catalog.clone())
    }

    async fn create_forum_thread(
        &self,
        _forum_channel_id: &str,
        request: ThreadRequest,
    ) -> Result<String, RestError> {
        self.created.lock().unwrap().push(request);
        Ok("thread-1".to_string())
    }

    async fn archive_thread(&self, thread_id: &str) -> Result<(), RestError> {
        self.archived.lock().unwrap().push(thread_id.to_string());
        Ok(())
    }

    async fn post_message(&self, channel_id: &str, body: Value) -> Result<(), RestError> {
        self.posted
            .lock()
            .unwrap()
            .push((channel_id.to_string(), body));
        Ok(())
    }
}

fn test_config() -> Config {
    Config {
        token: secrecy::SecretString::from("test-token"),
        api_base_url: "https://api.example".to_string(),
        gateway_url: "wss://gateway.example".to_string(),
        forum_channel_id: "forum-1".to_string(),
        panel_channel_id: "panel-1".to_string(),
        admin_role_ids: vec!["mods".to_string()],
        allowed_tag_ids: vec!["t1".to_string(), "t2".to_string()],
        cooldown_days: 14,
        reconnect_delay: Duration::from_secs(5),
        workflow_ttl: Duration::from_secs(1800),
        embed_color: 0xe0ad76,
        data_dir: PathBuf::from("data"),
    }
}

fn engine(platform: Arc<RecordingPlatform>) -> Engine<MemoryStore> {
    let config = test_config();
    let publisher = Publisher::new(platform.clone(), MemoryStore::new(), &config);
    Engine::new(platform, publisher, &config)
}

fn user() -> Value {
    json!({ "id": "u1", "username": "seller", "global_name": "Seller", "avatar": "abc" })
}

fn button_press(custom_id: &str) -> Value {
    json!({
        "id": "i-button",
        "token": "tok-button",
        "type": 3,
        "member": { "user": user(), "roles": [], "permissions": "0" },
        "data": { "component_type": 2, "custom_id": custom_id },
    })
}

fn text(field: &str, value: &str) -> Value {
    json!({ "type": 18, "component": { "type": 4, "custom_id": field, "value": value } })
}

fn selection(field: &str, values: &[&str]) -> Value {
    json!({ "type": 18, "component": { "type": 3, "custom_id": field, "values": values } })
}

fn form_submit(custom_id: &str, components: Vec<Value>, resolved: Value) -> Value {
    json!({
        "id": format!("i-{custom_id}"),
        "token": format!("tok-{custom_id}"),
        "type": 5,
        "member": { "user": user(), "roles": [], "permissions": "0" },
        "data": {
            "custom_id": custom_id,
            "components": components,
            "resolved": resolved,
        },
    })
}

fn photos_submit(confirm: &str, photo_count: usize) -> Value {
    let ids: Vec<String> = (0..photo_count).map(|n| format!("a{n}")).collect();
    let mut attachments = serde_json::Map::new();
    for id in &ids {
        attachments.insert(
            id.clone(),
            json!({ "url": format!("https://cdn.example/{id}.png") }),
        );
    }
    form_submit(
        "listing.photos",
        vec![
            text("confirm", confirm),
            json!({ "type": 18, "component": { "type": 19, "custom_id": "photos", "values": ids } }),
        ],
        json!({ "attachments": attachments }),
    )
}

async fn handle(engine: &mut Engine<MemoryStore>, payload: Value) -> Result<(), WorkflowError> {
    let event = normalize(&payload).expect("payload should normalize");
    engine.handle(&event).await
}

async fn run_through_items(engine: &mut Engine<MemoryStore>, platform: &RecordingPlatform) {
    handle(engine, button_press("listing.start")).await.unwrap();
    assert_eq!(platform.last_modal_id(), "listing.count");

    handle(
        engine,
        form_submit(
            "listing.count",
            vec![text("count", "3"), text("info", "Ships from EU")],
            Value::Null,
        ),
    )
    .await
    .unwrap();
    assert_eq!(platform.last_modal_id(), "listing.payment");

    handle(
        engine,
        form_submit(
            "listing.payment",
            vec![
                selection("payment", &["PayPal G&S"]),
                selection("shipping", &["included"]),
            ],
            Value::Null,
        ),
    )
    .await
    .unwrap();
    assert_eq!(platform.last_modal_id(), "listing.item.0");

    for index in 0..3 {
        handle(
            engine,
            form_submit(
                &format!("listing.item.{index}"),
                vec![
                    text("name", &format!("Item {index}")),
                    text("price", "$25,000.5"),
                    text("notes", ""),
                    selection("packaging", &["Box sealed"]),
                    selection("condition", &["New"]),
                ],
                Value::Null,
            ),
        )
        .await
        .unwrap();
    }
}

#[tokio::test]
async fn full_workflow_publishes_a_tagged_thread() {
    let platform = Arc::new(RecordingPlatform::with_catalog(vec![
        ForumTag { id: "t1".into(), name: "Plush".into() },
        ForumTag { id: "t2".into(), name: "Figure".into() },
    ]));
    let mut engine = engine(platform.clone());

    run_through_items(&mut engine, &platform).await;
    assert_eq!(platform.last_modal_id(), "listing.tags");

    handle(
        &mut engine,
        form_submit(
            "listing.tags",
            vec![selection("tags", &["t1", "unknown"])],
            Value::Null,
        ),
    )
    .await
    .unwrap();
    assert_eq!(platform.last_modal_id(), "listing.photos");

    handle(&mut engine, photos_submit("YES", 2)).await.unwrap();

    // Unknown tag ids are dropped; the thread carries only resolved tags.
    let created = platform.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].applied_tags, vec!["t1".to_string()]);
    assert_eq!(created[0].name, "Seller's Shop");
    let embeds = created[0].message["embeds"].as_array().unwrap();
    // Main embed plus one per photo.
    assert_eq!(embeds.len(), 3);
    assert_eq!(embeds[0]["fields"].as_array().unwrap().len(), 5);
    assert_eq!(embeds[0]["description"], "Ships from EU");
    drop(created);

    match platform.last_response() {
        InteractionResponse::Ephemeral(message) => assert!(message.contains("<#thread-1>")),
        other => panic!("expected ephemeral confirmation, got {other:?}"),
    }

    // The run is over: its forms are dead.
    let err = handle(&mut engine, photos_submit("YES", 2)).await.unwrap_err();
    assert!(matches!(err, WorkflowError::SessionExpired));
}

#[tokio::test]
async fn cooldown_blocks_a_second_listing_and_names_the_date() {
    let platform = Arc::new(RecordingPlatform::default());
    let mut engine = engine(platform.clone());

    run_through_items(&mut engine, &platform).await;
    // Empty catalog skips the tag step.
    assert_eq!(platform.last_modal_id(), "listing.photos");
    handle(&mut engine, photos_submit("yes", 1)).await.unwrap();

    // Skipped tag step publishes untagged.
    assert!(platform.created.lock().unwrap()[0].applied_tags.is_empty());

    let err = handle(&mut engine, button_press("listing.start"))
        .await
        .unwrap_err();
    match err {
        WorkflowError::CooldownActive {
            window_days,
            next_eligible,
        } => {
            assert_eq!(window_days, 14);
            let expected = (Utc::now() + chrono::Duration::days(14))
                .format("%b %-d, %Y")
                .to_string();
            assert_eq!(next_eligible, expected);
        }
        other => panic!("expected cooldown error, got {other:?}"),
    }
}

#[tokio::test]
async fn publishing_again_archives_the_previous_thread() {
    let platform = Arc::new(RecordingPlatform::default());
    let config = test_config();
    let publisher = Publisher::new(platform.clone(), MemoryStore::new(), &config);
    // Prior listing outside the cooldown window.
    publisher
        .ledger()
        .stamp("u1", "thread-old", Utc::now() - chrono::Duration::days(30))
        .unwrap();
    let mut engine = Engine::new(platform.clone(), publisher, &config);

    run_through_items(&mut engine, &platform).await;
    handle(&mut engine, photos_submit("YES", 1)).await.unwrap();

    assert_eq!(*platform.archived.lock().unwrap(), vec!["thread-old".to_string()]);
    assert_eq!(platform.created.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn selection_resolving_to_nothing_refuses_and_keeps_the_run() {
    let platform = Arc::new(RecordingPlatform::with_catalog(vec![ForumTag {
        id: "t1".into(),
        name: "Plush".into(),
    }]));
    let mut engine = engine(platform.clone());

    run_through_items(&mut engine, &platform).await;
    handle(
        &mut engine,
        form_submit(
            "listing.tags",
            // Valid at selection time in principle, but resolves to nothing
            // at publish.
            vec![selection("tags", &["gone"])],
            Value::Null,
        ),
    )
    .await
    .unwrap();

    let err = handle(&mut engine, photos_submit("YES", 1)).await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Publish(PublishError::NoValidTags)
    ));
    assert!(platform.created.lock().unwrap().is_empty());

    // The run survives the refusal; the same form is still answerable.
    let err = handle(&mut engine, photos_submit("nope", 1)).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidInput(_)));
}

#[tokio::test]
async fn invalid_count_keeps_the_workflow_on_the_same_step() {
    let platform = Arc::new(RecordingPlatform::default());
    let mut engine = engine(platform.clone());

    handle(&mut engine, button_press("listing.start")).await.unwrap();
    let err = handle(
        &mut engine,
        form_submit("listing.count", vec![text("count", "40")], Value::Null),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidInput(_)));

    // Still on the count step: a corrected submission goes through.
    handle(
        &mut engine,
        form_submit("listing.count", vec![text("count", "1")], Value::Null),
    )
    .await
    .unwrap();
    assert_eq!(platform.last_modal_id(), "listing.payment");
}

#[tokio::test]
async fn stale_form_without_a_run_reports_session_expired() {
    let platform = Arc::new(RecordingPlatform::default());
    let mut engine = engine(platform.clone());

    let err = handle(
        &mut engine,
        form_submit("listing.count", vec![text("count", "2")], Value::Null),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, WorkflowError::SessionExpired));
}

#[tokio::test]
async fn out_of_order_item_form_is_rejected() {
    let platform = Arc::new(RecordingPlatform::default());
    let mut engine = engine(platform.clone());

    run_through_items(&mut engine, &platform).await;
    // A stale copy of the first item form arrives after the run moved on.
    let err = handle(
        &mut engine,
        form_submit(
            "listing.item.0",
            vec![
                text("name", "Dup"),
                text("price", "5"),
                selection("packaging", &["No box"]),
                selection("condition", &["New"]),
            ],
            Value::Null,
        ),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, WorkflowError::SessionExpired));
}

#[tokio::test]
async fn setup_command_requires_admin_and_posts_the_panel() {
    let platform = Arc::new(RecordingPlatform::default());
    let mut engine = engine(platform.clone());

    let plain = json!({
        "id": "i-cmd",
        "token": "tok-cmd",
        "type": 2,
        "member": { "user": user(), "roles": [], "permissions": "0" },
        "data": { "name": "setup_marketplace" },
    });
    let err = handle(&mut engine, plain.clone()).await.unwrap_err();
    assert!(matches!(err, WorkflowError::PermissionDenied));
    assert!(platform.posted.lock().unwrap().is_empty());

    let mut admin = plain;
    admin["member"]["roles"] = json!(["mods"]);
    handle(&mut engine, admin).await.unwrap();

    let posted = platform.posted.lock().unwrap();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].0, "panel-1");
    assert_eq!(
        posted[0].1["components"][0]["components"][0]["custom_id"],
        "listing.start"
    );
}

#[tokio::test]
async fn foreign_custom_ids_are_ignored() {
    let platform = Arc::new(RecordingPlatform::default());
    let mut engine = engine(platform.clone());

    handle(&mut engine, button_press("other.module.button"))
        .await
        .unwrap();
    assert!(platform.responses.lock().unwrap().is_empty());
}
