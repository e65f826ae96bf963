//! # Delivery Integration Tests
//!
//! Ordering under concurrent producers, cursor resume, long-poll wake-up,
//! batch pagination, and streaming delivery through the full bus facade.

#[cfg(test)]
mod tests {
    use channel_bus::{
        BusConfig, ChannelDelivery, ChannelPath, MessageBus, Publisher, SubscriberIdentity,
    };
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_stream::StreamExt;

    fn path(s: &str) -> ChannelPath {
        ChannelPath::new(s).unwrap()
    }

    // =========================================================================
    // ORDERING
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publishers_yield_dense_sequences() {
        crate::init_logging();
        let bus = Arc::new(MessageBus::new());
        let channel = path("/topic/9");

        let mut handles = Vec::new();
        for publisher in 0..10u64 {
            let bus = Arc::clone(&bus);
            let channel = channel.clone();
            handles.push(tokio::spawn(async move {
                let mut assigned = Vec::new();
                for i in 0..10u64 {
                    if rand::random::<bool>() {
                        tokio::time::sleep(Duration::from_micros(50)).await;
                    }
                    let sequence = bus
                        .publish(&channel, json!({ "publisher": publisher, "i": i }))
                        .unwrap();
                    assigned.push(sequence);
                }
                assigned
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_unstable();
        let expected: Vec<u64> = (1..=100).collect();
        assert_eq!(all, expected, "sequences must be dense and unique");

        // A subscriber draining from zero sees exactly publish order
        let id = bus
            .subscribe(SubscriberIdentity::user(1), "/topic/9", 0)
            .unwrap();
        let outcome = bus.poll(id, Duration::from_millis(200)).await;
        let delivered: Vec<u64> = outcome.messages().iter().map(|m| m.sequence).collect();
        assert_eq!(delivered, expected);
    }

    #[tokio::test]
    async fn test_subscribe_since_resumes_midstream() {
        let bus = MessageBus::new();
        let channel = path("/topic/42");
        for i in 0..10 {
            bus.publish(&channel, json!({ "i": i })).unwrap();
        }

        let id = bus
            .subscribe(SubscriberIdentity::user(7), "/topic/42", 4)
            .unwrap();
        let outcome = bus.poll(id, Duration::from_millis(100)).await;
        let sequences: Vec<u64> = outcome.messages().iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, vec![5, 6, 7, 8, 9, 10]);
    }

    #[tokio::test]
    async fn test_poll_batch_cap_paginates() {
        let config = BusConfig {
            poll_batch: 4,
            ..BusConfig::default()
        };
        let bus = MessageBus::with_config(config);
        let channel = path("/topic/1");
        for i in 0..10 {
            bus.publish(&channel, json!({ "i": i })).unwrap();
        }

        let id = bus
            .subscribe(SubscriberIdentity::user(1), "/topic/1", 0)
            .unwrap();

        let first: Vec<u64> = bus
            .poll(id, Duration::from_millis(100))
            .await
            .messages()
            .iter()
            .map(|m| m.sequence)
            .collect();
        assert_eq!(first, vec![1, 2, 3, 4]);

        let second: Vec<u64> = bus
            .poll(id, Duration::from_millis(100))
            .await
            .messages()
            .iter()
            .map(|m| m.sequence)
            .collect();
        assert_eq!(second, vec![5, 6, 7, 8]);

        let third: Vec<u64> = bus
            .poll(id, Duration::from_millis(100))
            .await
            .messages()
            .iter()
            .map(|m| m.sequence)
            .collect();
        assert_eq!(third, vec![9, 10]);
    }

    // =========================================================================
    // LONG-POLL
    // =========================================================================

    #[tokio::test]
    async fn test_long_poll_wakes_on_wildcard_match() {
        let bus = Arc::new(MessageBus::new());
        let id = bus
            .subscribe(SubscriberIdentity::user(1), "/notification/*", 0)
            .unwrap();

        let pending = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move { bus.poll(id, Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        bus.publish(&path("/notification/77"), json!({ "unread": 3 }))
            .unwrap();

        let outcome = timeout(Duration::from_secs(1), pending)
            .await
            .expect("poll should wake on publish")
            .unwrap();
        assert_eq!(outcome.deliveries.len(), 1);
        assert_eq!(outcome.deliveries[0].channel().as_str(), "/notification/77");
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_blocked_poll() {
        let bus = Arc::new(MessageBus::new());
        let id = bus
            .subscribe(SubscriberIdentity::user(1), "/topic/1", 0)
            .unwrap();

        let pending = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move { bus.poll(id, Duration::from_secs(10)).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        bus.unsubscribe(id);

        let outcome = timeout(Duration::from_secs(1), pending)
            .await
            .expect("poll should release on unsubscribe")
            .unwrap();
        assert!(outcome.is_empty());
    }

    // =========================================================================
    // CURSORS
    // =========================================================================

    #[tokio::test]
    async fn test_backward_ack_does_not_rewind() {
        let bus = MessageBus::new();
        let channel = path("/topic/3");
        for i in 0..5 {
            bus.publish(&channel, json!({ "i": i })).unwrap();
        }

        let id = bus
            .subscribe(SubscriberIdentity::user(1), "/topic/3", 0)
            .unwrap();
        let outcome = bus.poll(id, Duration::from_millis(100)).await;
        assert_eq!(outcome.messages().len(), 5);

        // Stale acknowledgment from a retried request: silently ignored
        bus.ack(id, &channel, 2);
        let replay = bus.poll(id, Duration::from_millis(30)).await;
        assert!(replay.is_empty(), "cursor must never move backward");

        bus.publish(&channel, json!({ "i": 5 })).unwrap();
        let next: Vec<u64> = bus
            .poll(id, Duration::from_millis(100))
            .await
            .messages()
            .iter()
            .map(|m| m.sequence)
            .collect();
        assert_eq!(next, vec![6]);
    }

    // =========================================================================
    // STREAMING
    // =========================================================================

    #[tokio::test]
    async fn test_stream_delivers_in_order_and_cleans_up() {
        let bus = Arc::new(MessageBus::new());
        let channel = path("/topic/8");
        let id = bus
            .subscribe(SubscriberIdentity::user(1), "/topic/8", 0)
            .unwrap();
        let mut stream = bus.stream(id);

        for i in 0..3 {
            bus.publish(&channel, json!({ "i": i })).unwrap();
        }

        let mut got = Vec::new();
        while got.len() < 3 {
            let delivery = timeout(Duration::from_secs(1), stream.next())
                .await
                .expect("stream should produce deliveries")
                .expect("stream still open");
            if let ChannelDelivery::Batch { messages, .. } = delivery {
                got.extend(messages.iter().map(|m| m.sequence));
            }
        }
        assert_eq!(got, vec![1, 2, 3]);

        // Dropping the stream is connection loss: the subscription goes away
        drop(stream);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fanout_to_many_subscribers() {
        let bus = Arc::new(MessageBus::new());
        let channel = path("/topic/100");

        let ids: Vec<_> = (0..25)
            .map(|user| {
                bus.subscribe(SubscriberIdentity::user(user), "/topic/100", 0)
                    .unwrap()
            })
            .collect();

        bus.publish(&channel, json!({ "type": "created" })).unwrap();

        let mut polls = Vec::new();
        for id in ids {
            let bus = Arc::clone(&bus);
            polls.push(tokio::spawn(async move {
                bus.poll(id, Duration::from_millis(500)).await
            }));
        }

        for poll in polls {
            let outcome = poll.await.unwrap();
            let sequences: Vec<u64> = outcome.messages().iter().map(|m| m.sequence).collect();
            assert_eq!(sequences, vec![1], "every subscriber sees the message");
        }
    }
}
