use super::*;
use crate::test_support::{message, Call, FakeTransport};

fn cache(
    transport: Arc<FakeTransport>,
) -> (Arc<MessageThreadCache>, broadcast::Receiver<ChatEvent>) {
    let (events, rx) = broadcast::channel(32);
    (Arc::new(MessageThreadCache::new(transport, events)), rx)
}

#[tokio::test]
async fn load_without_active_discussion_is_a_no_op() {
    let transport = FakeTransport::new();
    let (cache, _rx) = cache(Arc::clone(&transport));

    assert!(matches!(cache.load().await, ThreadLoad::Skipped));
    assert!(transport.calls().await.is_empty());
}

#[tokio::test]
async fn load_preserves_backend_order() {
    let transport = FakeTransport::new()
        .with_thread(
            "d1",
            vec![
                message("m3", "d1", "a@example.com", "third", 300),
                message("m1", "d1", "b@example.com", "first", 100),
                message("m2", "d1", "a@example.com", "second", 200),
            ],
        )
        .await;
    let (cache, _rx) = cache(transport);

    cache.activate(DiscussionId::new("d1")).await;
    let loaded = cache.load().await;

    let ids: Vec<&str> = loaded
        .messages()
        .expect("loaded")
        .iter()
        .map(|message| message.id.as_str())
        .collect();
    assert_eq!(ids, vec!["m3", "m1", "m2"]);
}

#[tokio::test]
async fn switching_discussion_replaces_the_thread() {
    let transport = FakeTransport::new()
        .with_thread("d1", vec![message("m1", "d1", "a@example.com", "hi", 100)])
        .await
        .with_thread("d2", vec![message("m9", "d2", "c@example.com", "yo", 200)])
        .await;
    let (cache, mut rx) = cache(transport);

    cache.activate(DiscussionId::new("d1")).await;
    cache.load().await;
    assert!(cache.activate(DiscussionId::new("d2")).await);
    assert!(cache.messages().await.is_empty());
    cache.load().await;

    let messages = cache.messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].discussion_id, DiscussionId::new("d2"));
    assert_eq!(cache.active().await, Some(DiscussionId::new("d2")));

    let mut switches = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ChatEvent::ActiveDiscussionChanged(active) = event {
            switches.push(active);
        }
    }
    assert_eq!(
        switches,
        vec![Some(DiscussionId::new("d1")), Some(DiscussionId::new("d2"))]
    );
}

#[tokio::test]
async fn reactivating_the_same_discussion_keeps_messages() {
    let transport = FakeTransport::new()
        .with_thread("d1", vec![message("m1", "d1", "a@example.com", "hi", 100)])
        .await;
    let (cache, _rx) = cache(transport);

    cache.activate(DiscussionId::new("d1")).await;
    cache.load().await;

    assert!(!cache.activate(DiscussionId::new("d1")).await);
    assert_eq!(cache.messages().await.len(), 1);
}

#[tokio::test]
async fn failed_load_keeps_current_messages() {
    let transport = FakeTransport::new()
        .with_thread("d1", vec![message("m1", "d1", "a@example.com", "hi", 100)])
        .await;
    let (cache, _rx) = cache(Arc::clone(&transport));

    cache.activate(DiscussionId::new("d1")).await;
    cache.load().await;
    transport.fail("list_messages").await;

    assert!(matches!(cache.load().await, ThreadLoad::Failed(_)));
    assert_eq!(cache.messages().await.len(), 1);
}

#[tokio::test]
async fn invalidate_toggles_token_and_reloads_once() {
    let transport = FakeTransport::new();
    let (cache, _rx) = cache(Arc::clone(&transport));
    cache.activate(DiscussionId::new("d1")).await;

    let before = cache.refresh_token().await;
    cache.invalidate().await;
    assert_ne!(cache.refresh_token().await, before);
    cache.invalidate().await;
    assert_eq!(cache.refresh_token().await, before);

    let reloads = transport
        .count(|call| matches!(call, Call::ListMessages(_)))
        .await;
    assert_eq!(reloads, 2);
}

#[tokio::test]
async fn response_for_previous_discussion_is_discarded() {
    let transport = FakeTransport::new()
        .with_thread("d1", vec![message("m1", "d1", "a@example.com", "old", 100)])
        .await
        .with_thread("d2", vec![message("m2", "d2", "b@example.com", "new", 200)])
        .await;
    let gate = transport.gate("d1").await;
    let (cache, _rx) = cache(Arc::clone(&transport));

    cache.activate(DiscussionId::new("d1")).await;
    let slow = tokio::spawn({
        let cache = Arc::clone(&cache);
        async move { cache.load().await }
    });
    while transport
        .count(|call| matches!(call, Call::ListMessages(_)))
        .await
        == 0
    {
        tokio::task::yield_now().await;
    }

    cache.activate(DiscussionId::new("d2")).await;
    assert!(matches!(cache.load().await, ThreadLoad::Loaded(_)));

    gate.notify_one();
    let late = slow.await.expect("join");

    assert!(matches!(late, ThreadLoad::Stale));
    let messages = cache.messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "new");
}

#[tokio::test]
async fn clear_forgets_active_discussion() {
    let transport = FakeTransport::new()
        .with_thread("d1", vec![message("m1", "d1", "a@example.com", "hi", 100)])
        .await;
    let (cache, _rx) = cache(transport);

    cache.activate(DiscussionId::new("d1")).await;
    cache.load().await;
    cache.clear().await;

    assert_eq!(cache.active().await, None);
    assert!(cache.messages().await.is_empty());
    assert!(matches!(cache.load().await, ThreadLoad::Skipped));
}

#[tokio::test]
async fn cleared_cache_refuses_activation() {
    let transport = FakeTransport::new();
    let (cache, _rx) = cache(Arc::clone(&transport));

    cache.clear().await;

    assert!(!cache.activate(DiscussionId::new("d1")).await);
    assert_eq!(cache.active().await, None);
    assert!(matches!(cache.load().await, ThreadLoad::Skipped));
    assert!(transport.calls().await.is_empty());
}

#[tokio::test]
async fn invalidate_if_active_only_reloads_matching_discussion() {
    let transport = FakeTransport::new();
    let (cache, _rx) = cache(Arc::clone(&transport));
    cache.activate(DiscussionId::new("d2")).await;
    let token = cache.refresh_token().await;

    let skipped = cache.invalidate_if_active(&DiscussionId::new("d1")).await;
    assert!(matches!(skipped, ThreadLoad::Skipped));
    assert_eq!(cache.refresh_token().await, token);

    let reloaded = cache.invalidate_if_active(&DiscussionId::new("d2")).await;
    assert!(matches!(reloaded, ThreadLoad::Loaded(_)));
    assert_ne!(cache.refresh_token().await, token);
    assert_eq!(
        transport.calls().await,
        vec![Call::ListMessages(DiscussionId::new("d2"))]
    );
}
