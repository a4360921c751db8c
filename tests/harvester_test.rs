//! End-to-end harvest scenarios through the orchestrator, on scripted DOM.

mod common;

use std::sync::Arc;

use parking_lot::Mutex;

use common::{FakeDocument, FakePage, FakeProvider, reply_card, root_card, test_budgets, test_pacer};
use threadharvest::orchestrator::{Orchestrator, ScrapeMethod};
use threadharvest::progress::ProgressChannel;
use threadharvest::records::{ReplyScrapeOptions, ScrapeStage};
use threadharvest::store::{MemoryConfig, MemoryStore};
use threadharvest::{HarvestCallbacks, LoginProbe};

const AUTH_COOKIES: &str = r#"[{"name":"auth_token","value":"tok"},{"name":"ct0","value":"csrf"}]"#;

struct Harness {
    page: Arc<FakePage>,
    store: Arc<MemoryStore>,
    progress: Arc<ProgressChannel>,
    orchestrator: Orchestrator,
    events: Arc<Mutex<Vec<String>>>,
}

fn harness(config: MemoryConfig) -> Harness {
    common::init_tracing();
    let page = FakePage::new();
    let store = Arc::new(MemoryStore::new());
    let progress = Arc::new(ProgressChannel::new());
    let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let root_events = Arc::clone(&events);
    let reply_events = Arc::clone(&events);
    let callbacks = HarvestCallbacks {
        on_root_post: Some(Arc::new(move |root| {
            root_events.lock().push(format!("root:{}", root.id));
            Ok(())
        })),
        on_reply: Some(Arc::new(move |reply| {
            reply_events.lock().push(format!("reply:{}:{}", reply.root_id, reply.id));
            Ok(())
        })),
    };

    let orchestrator = Orchestrator::new(
        Arc::clone(&store) as _,
        Arc::new(config) as _,
        Arc::clone(&progress),
        FakeProvider::with_page(Arc::clone(&page)),
    )
    .with_pacer(Arc::new(test_pacer()))
    .with_budgets(test_budgets())
    .with_callbacks(callbacks);

    Harness {
        page,
        store,
        progress,
        orchestrator,
        events,
    }
}

fn conversation(root_id: &str, author: &str, replies: &[&str]) -> FakeDocument {
    let mut cards = vec![root_card(root_id, author, 0.0)];
    for (i, id) in replies.iter().enumerate() {
        cards.push(reply_card(id, &format!("user{i}"), 100.0 + i as f64 * 80.0));
    }
    FakeDocument::with_views(vec![cards])
}

#[tokio::test(start_paused = true)]
async fn happy_account_harvest_three_roots_five_replies_each() {
    let h = harness(MemoryConfig::with(&[("X_COOKIES", AUTH_COOKIES)]));

    h.page.add_document(
        "https://x.com/demo",
        FakeDocument::with_views(vec![vec![
            root_card("A", "demo", 0.0),
            root_card("B", "demo", 200.0),
            root_card("C", "demo", 400.0),
        ]]),
    );
    h.page.add_document(
        "https://x.com/i/status/A",
        conversation("A", "demo", &["A1", "A2", "A3", "A4", "A5"]),
    );
    h.page.add_document(
        "https://x.com/i/status/B",
        conversation("B", "demo", &["B1", "B2", "B3", "B4", "B5"]),
    );
    h.page.add_document(
        "https://x.com/i/status/C",
        conversation("C", "demo", &["C1", "C2", "C3", "C4", "C5"]),
    );

    let outcome = h
        .orchestrator
        .scrape_account("demo", 3, ReplyScrapeOptions::default(), ScrapeMethod::Browser)
        .await;

    assert!(outcome.success, "outcome: {outcome:?}");
    assert_eq!(outcome.method, "browser");
    assert_eq!(outcome.posts_found, 3);
    assert_eq!(outcome.replies_found, 15);

    assert_eq!(h.store.root_posts().len(), 3);
    assert_eq!(h.store.replies().len(), 15);

    // every root is observed before any of its replies
    let events = h.events.lock().clone();
    for root in ["A", "B", "C"] {
        let root_pos = events
            .iter()
            .position(|e| e == &format!("root:{root}"))
            .expect("root event present");
        let first_reply_pos = events
            .iter()
            .position(|e| e.starts_with(&format!("reply:{root}:")))
            .expect("reply events present");
        assert!(root_pos < first_reply_pos, "root {root} must precede its replies");
    }

    let progress = h.progress.get("account:demo").expect("terminal progress");
    assert_eq!(progress.stage, ScrapeStage::Complete);
    assert_eq!(progress.posts_found, 3);
    assert_eq!(progress.replies_found, 15);
    assert_eq!(progress.total_credentials, 1);

    assert!(h.page.closed(), "page must be released");
}

#[tokio::test(start_paused = true)]
async fn single_post_happy_path() {
    let root_id = "1728108619189874825";
    let h = harness(MemoryConfig::with(&[("X_COOKIES", AUTH_COOKIES)]));
    h.page.add_document(
        &format!("https://x.com/i/status/{root_id}"),
        conversation(root_id, "author", &["R1", "R2"]),
    );

    let outcome = h
        .orchestrator
        .scrape_root_post(root_id, ReplyScrapeOptions::default())
        .await;

    assert!(outcome.success, "outcome: {outcome:?}");
    assert_eq!(outcome.method, "browser");
    assert_eq!(outcome.replies_found, 2);

    let roots = h.store.root_posts();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].id, root_id);

    let replies = h.store.replies();
    assert_eq!(replies.len(), 2);
    for reply in &replies {
        assert_eq!(reply.reply_to, root_id);
        assert_eq!(reply.root_id, root_id);
    }

    let progress = h.progress.get(&format!("tweet:{root_id}")).unwrap();
    assert_eq!(progress.stage, ScrapeStage::Complete);
}

#[tokio::test(start_paused = true)]
async fn login_wall_terminates_with_reconfigure_message() {
    // Bundle without auth_token: the platform answers with a login wall.
    let cookies = r#"[{"name":"ct0","value":"csrf-only"}]"#;
    let h = harness(MemoryConfig::with(&[("X_COOKIES", cookies)]));

    let mut doc = FakeDocument::with_views(vec![vec![root_card("55", "author", 0.0)]]);
    doc.login_probe = LoginProbe {
        has_login_prompt: true,
        has_replies_teaser: true,
        card_count: 1,
    };
    h.page.add_document("https://x.com/i/status/55", doc);

    let outcome = h
        .orchestrator
        .scrape_root_post_with("55", ReplyScrapeOptions::default(), ScrapeMethod::Browser)
        .await;

    assert!(!outcome.success);
    let error = outcome.error.expect("terminal error");
    assert!(error.contains("reconfigure X_COOKIES"), "error: {error}");
    assert!(h.store.replies().is_empty(), "no replies persisted");

    let progress = h.progress.get("tweet:55").unwrap();
    assert_eq!(progress.stage, ScrapeStage::Error);
    assert!(h.page.closed());
}

#[tokio::test(start_paused = true)]
async fn deleted_post_is_reported_unavailable_via_body_probe() {
    let h = harness(MemoryConfig::with(&[("X_COOKIES", AUTH_COOKIES)]));

    // The conversation never renders; the body carries the platform's
    // "gone" copy, so this is an unavailable post, not a login wall.
    let doc = FakeDocument {
        body_text: "Hmm...this page doesn't exist. Try searching for something else.".into(),
        selector_ok: false,
        ..FakeDocument::default()
    };
    h.page.add_document("https://x.com/i/status/91", doc);

    let outcome = h
        .orchestrator
        .scrape_root_post_with("91", ReplyScrapeOptions::default(), ScrapeMethod::Browser)
        .await;

    assert!(!outcome.success);
    let error = outcome.error.expect("terminal error");
    assert!(error.contains("root post unavailable"), "error: {error}");
    assert!(error.contains("deleted or restricted"), "error: {error}");
    assert!(h.store.root_posts().is_empty(), "nothing persisted");
    assert_eq!(h.progress.get("tweet:91").unwrap().stage, ScrapeStage::Error);
}

#[tokio::test(start_paused = true)]
async fn missing_conversation_with_login_copy_is_a_login_wall() {
    let h = harness(MemoryConfig::with(&[("X_COOKIES", AUTH_COOKIES)]));

    let doc = FakeDocument {
        body_text: "Don't miss what's happening. Log in Sign up".into(),
        selector_ok: false,
        ..FakeDocument::default()
    };
    h.page.add_document("https://x.com/i/status/92", doc);

    let outcome = h
        .orchestrator
        .scrape_root_post_with("92", ReplyScrapeOptions::default(), ScrapeMethod::Browser)
        .await;

    assert!(!outcome.success);
    let error = outcome.error.expect("terminal error");
    assert!(error.contains("login required"), "error: {error}");
    assert!(error.contains("reconfigure X_COOKIES"), "error: {error}");
    assert!(h.store.replies().is_empty());
}

#[tokio::test(start_paused = true)]
async fn recommendation_cutoff_limits_collected_roots() {
    let h = harness(MemoryConfig::with(&[("X_COOKIES", AUTH_COOKIES)]));

    // Three posts above the "More posts" heading at y=500, two below it.
    let mut profile = FakeDocument::with_views(vec![vec![
        root_card("A", "demo", 0.0),
        root_card("B", "demo", 150.0),
        root_card("C", "demo", 300.0),
        root_card("REC1", "other", 600.0),
        root_card("REC2", "other", 750.0),
    ]]);
    profile.cutoff_y = 500.0;
    h.page.add_document("https://x.com/demo", profile);

    for id in ["A", "B", "C"] {
        h.page.add_document(
            &format!("https://x.com/i/status/{id}"),
            conversation(id, "demo", &[]),
        );
    }

    let outcome = h
        .orchestrator
        .scrape_account("demo", 10, ReplyScrapeOptions::default(), ScrapeMethod::Browser)
        .await;

    assert!(outcome.success, "outcome: {outcome:?}");
    assert_eq!(outcome.posts_found, 3, "recommendations must not be collected");
    let ids: Vec<String> = h.store.root_posts().iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids, ["A", "B", "C"]);
}
