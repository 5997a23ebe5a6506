//! Cross-thread behavior of the id generator, resource store and executor.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use scriptbridge_core::{
    ByteStream, Completion, CorrelationId, Executor, IdGenerator, Payload, ResourceStore,
    StoredResource,
};
use serde_json::json;

#[test]
fn ten_thousand_concurrent_ids_are_distinct() {
    let generator = Arc::new(IdGenerator::new());

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let generator = Arc::clone(&generator);
            thread::spawn(move || (0..100).map(|_| generator.generate()).collect::<Vec<_>>())
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(CorrelationId::is_correlation_id(id.as_str()), "bad id {id}");
            assert!(seen.insert(id), "duplicate id");
        }
    }
    assert_eq!(seen.len(), 10_000);
}

#[test]
fn global_generator_is_shared_across_threads() {
    let handles: Vec<_> = (0..8)
        .map(|_| thread::spawn(|| IdGenerator::global().generate()))
        .collect();
    let ids: HashSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids.len(), 8);
}

#[test]
fn interleaved_store_access_keeps_entries_isolated() {
    let store = ResourceStore::new();
    let generator = IdGenerator::global();

    // Entries owned by no worker must survive untouched.
    let bystanders: Vec<CorrelationId> = (0..20)
        .map(|i| {
            let id = generator.generate();
            store.put(id.clone(), ByteStream::from_bytes(format!("bystander-{i}")));
            id
        })
        .collect();

    let workers: Vec<_> = (0..16)
        .map(|worker| {
            let store = store.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                let mut owned: Vec<CorrelationId> = (0..50)
                    .map(|_| IdGenerator::global().generate())
                    .collect();
                for id in &owned {
                    store.put(id.clone(), ByteStream::from_bytes(format!("{worker}:{id}")));
                }
                owned.shuffle(&mut rng);

                for id in &owned {
                    if rng.gen_bool(0.5) {
                        thread::yield_now();
                    }
                    let shared = store.get(id).expect("own entry visible");
                    assert!(shared.as_stream().is_some());

                    let removed = store.remove(id).expect("own entry removable");
                    let body = removed.as_stream().unwrap().read_to_end().unwrap();
                    assert_eq!(body, format!("{worker}:{id}").into_bytes());
                    assert!(!store.contains(id));
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(store.len(), bystanders.len());
    for (i, id) in bystanders.iter().enumerate() {
        let Some(StoredResource::ByteStream(stream)) = store.remove(id) else {
            panic!("bystander {i} missing");
        };
        assert_eq!(stream.read_to_end().unwrap(), format!("bystander-{i}").into_bytes());
    }
    assert!(store.is_empty());
}

#[test]
fn many_operations_settle_exactly_once() {
    let executor = Executor::default();
    let mut expected = HashSet::new();
    for n in 0..64u64 {
        let id = executor
            .spawn("square", move |_| {
                thread::sleep(Duration::from_millis(n % 7));
                Ok(Completion::json(json!(n * n)))
            })
            .unwrap();
        expected.insert(id);
    }

    let mut settled = HashSet::new();
    while settled.len() < expected.len() {
        let settlement = executor
            .settlements()
            .recv_timeout(Duration::from_secs(10))
            .expect("settlement");
        assert!(executor.claim(settlement.id).is_some());
        assert!(settled.insert(settlement.id));
        assert!(matches!(
            settlement.outcome.unwrap().payload,
            Payload::Json(serde_json::Value::Number(_))
        ));
    }

    assert_eq!(settled, expected);
    assert_eq!(executor.pending_count(), 0);
    assert!(executor.try_next().is_none());
}
