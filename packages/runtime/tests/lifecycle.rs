use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use scriptbridge_fetch::{FetchRequest, FetchResponse, FnHandler};
use scriptbridge_runtime::ScriptRuntime;

#[test]
fn concurrent_operations_each_settle_once() {
    let served = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&served);
    let rt = ScriptRuntime::builder()
        .local_handler(FnHandler::new(
            |_: &FetchRequest| true,
            move |request: &FetchRequest| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(FetchResponse::ok(request.path().into_bytes()))
            },
        ))
        .build()
        .unwrap();

    let value = rt
        .run(
            r#"
            const paths = Array.from({ length: 20 }, (_, i) => `/item/${i}`);
            let res = Promise.all(paths.map((p) => fetch(p).then((r) => r.text())));
            "#,
        )
        .unwrap();

    let expected: Vec<String> = (0..20).map(|i| format!("/item/{i}")).collect();
    assert_eq!(value, json!(expected));
    assert_eq!(served.load(Ordering::SeqCst), 20);
    assert_eq!(rt.pending_operations(), 0);
}

#[test]
fn settlements_outside_a_run_are_delivered_by_pump() {
    let rt = ScriptRuntime::builder()
        .local_handler(FnHandler::new(
            |_: &FetchRequest| true,
            |_: &FetchRequest| Ok(FetchResponse::ok("later")),
        ))
        .build()
        .unwrap();

    rt.eval("globalThis.seen = null; fetch('/x').then((r) => r.text()).then((t) => { seen = t; });")
        .unwrap();

    let mut delivered = 0;
    for _ in 0..200 {
        delivered += rt.pump().unwrap();
        if rt.eval("seen").unwrap() == json!("later") {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(delivered >= 1);
    assert_eq!(rt.eval("seen").unwrap(), json!("later"));
}
