// Allow missing docs in integration test.
#![allow(missing_docs)]

use metricity_adapters::MemoryStore;
use metricity_domain::Metric;
use metricity_ports::MetricStore;
use metricity_shared::RequestContext;
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

proptest! {
    #[test]
    fn counter_total_is_the_sum_of_deltas(deltas in prop::collection::vec(-1_000i64..1_000, 1..40)) {
        let store = MemoryStore::new();
        let ctx = RequestContext::new_request();
        let rendered = runtime().block_on(async {
            for delta in &deltas {
                store
                    .update_counter(&ctx, "Prop".into(), delta.to_string().into())
                    .await
                    .expect("update");
            }
            store.get_counter(&ctx, "Prop".into()).await.expect("read")
        });

        prop_assert_eq!(rendered, deltas.iter().sum::<i64>().to_string());
    }

    #[test]
    fn batch_equals_sequential_updates(deltas in prop::collection::vec(0i64..500, 1..20)) {
        let batched = MemoryStore::new();
        let sequential = MemoryStore::new();
        let ctx = RequestContext::new_request();
        let (left, right) = runtime().block_on(async {
            let batch = deltas.iter().map(|delta| Metric::counter("Prop", *delta)).collect();
            batched.update_batch(&ctx, batch).await.expect("batch");
            for delta in &deltas {
                sequential
                    .update_counter(&ctx, "Prop".into(), delta.to_string().into())
                    .await
                    .expect("update");
            }
            (
                batched.get_counter(&ctx, "Prop".into()).await.expect("read"),
                sequential.get_counter(&ctx, "Prop".into()).await.expect("read"),
            )
        });

        prop_assert_eq!(left, right);
    }
}
