//! # End-to-End Choreography Tests
//!
//! Forum-shaped scenarios: a topic update fanning out to a mixed audience,
//! the logout broadcast with its duplicate-handler latch, and a client
//! watching several patterns through one subscription.

#[cfg(test)]
mod tests {
    use channel_bus::{
        ChannelPath, MessageBus, PublishOptions, Publisher, SubscriberIdentity,
    };
    use serde_json::json;
    use std::time::Duration;

    fn path(s: &str) -> ChannelPath {
        ChannelPath::new(s).unwrap()
    }

    /// A new post lands in topic 5: everyone watching sees the public
    /// "created" event, but the follow-up notification is scoped to the
    /// two mentioned users.
    #[tokio::test]
    async fn test_topic_update_fans_out_to_mixed_audience() {
        crate::init_logging();
        let bus = MessageBus::new();

        let user_1 = bus
            .subscribe(SubscriberIdentity::user(1), "/topic/5", 0)
            .unwrap();
        let user_2 = bus
            .subscribe(SubscriberIdentity::user(2), "/topic/5", 0)
            .unwrap();
        let user_3 = bus
            .subscribe(SubscriberIdentity::user(3), "/topic/5", 0)
            .unwrap();
        let lurker = bus
            .subscribe(SubscriberIdentity::anonymous(), "/topic/5", 0)
            .unwrap();

        bus.publish(
            &path("/topic/5"),
            json!({ "type": "created", "post_number": 2 }),
        )
        .unwrap();
        bus.publish_with_options(
            "/topic/5",
            json!({ "type": "mentioned", "post_number": 2 }),
            PublishOptions {
                user_ids: Some([1, 2].into_iter().collect()),
                group_ids: None,
            },
        )
        .unwrap();

        for (id, expected) in [
            (user_1, vec![1, 2]),
            (user_2, vec![1, 2]),
            (user_3, vec![1]),
            (lurker, vec![1]),
        ] {
            let seen: Vec<u64> = bus
                .poll(id, Duration::from_millis(100))
                .await
                .messages()
                .iter()
                .map(|m| m.sequence)
                .collect();
            assert_eq!(seen, expected);
        }

        // A later public edit reaches every subscriber exactly once,
        // regardless of what was withheld before.
        bus.publish(
            &path("/topic/5"),
            json!({ "type": "revised", "post_number": 2 }),
        )
        .unwrap();
        for id in [user_1, user_2, user_3, lurker] {
            let seen: Vec<u64> = bus
                .poll(id, Duration::from_millis(100))
                .await
                .messages()
                .iter()
                .map(|m| m.sequence)
                .collect();
            assert_eq!(seen, vec![3]);
        }
    }

    /// The logout broadcast: the first consumer to claim the handler latch
    /// reacts, duplicates are suppressed until release.
    #[tokio::test]
    async fn test_logout_broadcast_handler_latch() {
        let bus = MessageBus::new();
        let id = bus
            .subscribe(SubscriberIdentity::user(4), "/logout", 0)
            .unwrap();

        bus.publish_with_options(
            "/logout",
            json!({ "redirect": "/" }),
            PublishOptions {
                user_ids: Some([4].into_iter().collect()),
                group_ids: None,
            },
        )
        .unwrap();

        let outcome = bus.poll(id, Duration::from_millis(100)).await;
        assert_eq!(outcome.messages().len(), 1);

        assert!(bus.claim_handler(id), "first claimant wins");
        assert!(!bus.claim_handler(id), "duplicate handling suppressed");

        bus.release_handler(id);
        assert!(bus.claim_handler(id), "latch reusable after release");
    }

    /// One subscription watching a wildcard plus an exact channel added
    /// after the fact.
    #[tokio::test]
    async fn test_multi_pattern_subscription() {
        let bus = MessageBus::new();
        let id = bus
            .subscribe(SubscriberIdentity::user(1), "/topic/*", 0)
            .unwrap();
        assert!(bus.add_pattern(id, "/notification/1", 0).unwrap());

        bus.publish(&path("/topic/2"), json!({ "n": 1 })).unwrap();
        bus.publish(&path("/notification/1"), json!({ "unread": 1 }))
            .unwrap();
        bus.publish(&path("/user/3"), json!({ "n": 2 })).unwrap();

        let outcome = bus.poll(id, Duration::from_millis(100)).await;
        let mut channels: Vec<String> = outcome
            .deliveries
            .iter()
            .map(|d| d.channel().to_string())
            .collect();
        channels.sort();
        assert_eq!(channels, vec!["/notification/1", "/topic/2"]);

        // Unknown handles reject pattern additions without error
        bus.unsubscribe(id);
        assert!(!bus.add_pattern(id, "/topic/9", 0).unwrap());
    }
}
