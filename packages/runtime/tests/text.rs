use serde_json::json;

use scriptbridge_runtime::{RuntimeConfig, ScriptRuntime};

fn eval(source: &str) -> serde_json::Value {
    ScriptRuntime::new(RuntimeConfig::default()).unwrap().eval(source).unwrap()
}

#[test]
fn encoder_produces_utf8() {
    assert_eq!(
        eval("Array.from(new TextEncoder().encode('hé€'))"),
        json!([0x68, 0xC3, 0xA9, 0xE2, 0x82, 0xAC])
    );
    assert_eq!(eval("new TextEncoder().encoding"), json!("utf-8"));
}

#[test]
fn encode_into_never_splits_a_code_point() {
    assert_eq!(
        eval(
            r#"
            (() => {
                const target = new Uint8Array(4);
                const result = new TextEncoder().encodeInto("ab€", target);
                return [result.read, result.written, Array.from(target)];
            })()
            "#
        ),
        json!([2, 2, [0x61, 0x62, 0, 0]])
    );
}

#[test]
fn decoder_round_trips_and_handles_views() {
    assert_eq!(
        eval("new TextDecoder().decode(new TextEncoder().encode('grüße'))"),
        json!("grüße")
    );
    assert_eq!(
        eval("new TextDecoder().decode(new Uint8Array([0, 104, 105, 0]).subarray(1, 3))"),
        json!("hi")
    );
    assert_eq!(
        eval("new TextDecoder('utf-16le').decode(new Uint8Array([104, 0, 105, 0]))"),
        json!("hi")
    );
    assert_eq!(
        eval("new TextDecoder('latin1').decode(new Uint8Array([0xE9]))"),
        json!("é")
    );
}

#[test]
fn decoder_errors() {
    assert_eq!(
        eval(
            r#"
            (() => {
                const names = [];
                try { new TextDecoder("klingon"); } catch (e) { names.push(e.name); }
                try {
                    new TextDecoder("utf-8", { fatal: true }).decode(new Uint8Array([0xFF]));
                } catch (e) {
                    names.push(e.name);
                }
                names.push(new TextDecoder().decode(new Uint8Array([0xFF])));
                return names;
            })()
            "#
        ),
        json!(["RangeError", "TypeError", "\u{fffd}"])
    );
}

#[test]
fn base64_helpers() {
    assert_eq!(eval("btoa('hello')"), json!("aGVsbG8="));
    assert_eq!(eval("atob('aGVsbG8=')"), json!("hello"));
    assert_eq!(eval("atob(' aGVs bG8 ')"), json!("hello"));
    assert_eq!(
        eval(
            r#"
            (() => {
                const names = [];
                try { atob("*"); } catch (e) { names.push(e.name); }
                try { btoa("€"); } catch (e) { names.push(e.name); }
                return names;
            })()
            "#
        ),
        json!(["InvalidCharacterError", "InvalidCharacterError"])
    );
}

#[test]
fn console_does_not_disturb_the_script() {
    assert_eq!(
        eval("console.log('a', {b: 1}); console.error(new Error('c')); 'done'"),
        json!("done")
    );
}
