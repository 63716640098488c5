// src/storage/tests/mod.rs


// Contract checks every event store must pass
pub(crate) mod common {
    use crate::error::Result;
    use crate::storage::EventStore;

    // Counting uses an inclusive lower bound and never deduplicates
    pub async fn test_record_and_count<S: EventStore>(store: &S, throttle: &str) -> Result<()> {
        store.record(throttle, "user1", 100).await?;
        store.record(throttle, "user1", 100).await?;
        store.record(throttle, "user1", 105).await?;
        store.record(throttle, "user1", 110).await?;

        assert_eq!(store.count_since(throttle, "user1", 0).await?, 4);
        assert_eq!(store.count_since(throttle, "user1", 100).await?, 4);
        assert_eq!(store.count_since(throttle, "user1", 101).await?, 2);
        assert_eq!(store.count_since(throttle, "user1", 110).await?, 1);
        assert_eq!(store.count_since(throttle, "user1", 111).await?, 0);

        // Unknown pair
        assert_eq!(store.count_since(throttle, "nobody", 0).await?, 0);

        Ok(())
    }

    // Prune removes strictly older events for every requestor of one throttle
    pub async fn test_prune_scope<S: EventStore>(
        store: &S,
        throttle: &str,
        other_throttle: &str,
    ) -> Result<()> {
        store.record(throttle, "user1", 10).await?;
        store.record(throttle, "user1", 20).await?;
        store.record(throttle, "user2", 15).await?;
        store.record(other_throttle, "user1", 10).await?;

        store.prune(throttle, 20).await?;

        assert_eq!(store.count_since(throttle, "user1", 0).await?, 1);
        assert_eq!(store.count_since(throttle, "user2", 0).await?, 0);
        assert_eq!(store.count_since(other_throttle, "user1", 0).await?, 1);

        Ok(())
    }

    pub async fn test_prune_idempotent<S: EventStore>(store: &S, throttle: &str) -> Result<()> {
        for at in [5, 10, 15, 20] {
            store.record(throttle, "user1", at).await?;
        }

        store.prune(throttle, 12).await?;
        let once = store.count_since(throttle, "user1", 0).await?;

        store.prune(throttle, 12).await?;
        let twice = store.count_since(throttle, "user1", 0).await?;

        assert_eq!(once, 2);
        assert_eq!(once, twice);

        // Nothing to remove is fine too
        store.prune("never-used", 1_000).await?;

        Ok(())
    }

    // Identifiers that could collide if keys were naively concatenated
    pub async fn test_identifiers_do_not_collide<S: EventStore>(
        store: &S,
        prefix: &str,
    ) -> Result<()> {
        let a = format!("{}a:b", prefix);
        let a_short = format!("{}a", prefix);

        store.record(&a, "c", 1).await?;
        store.record(&a_short, "b:c", 1).await?;
        store.record(&a_short, "b:c", 1).await?;

        assert_eq!(store.count_since(&a, "c", 0).await?, 1);
        assert_eq!(store.count_since(&a_short, "b:c", 0).await?, 2);

        Ok(())
    }
}
