#![no_main]

use libfuzzer_sys::fuzz_target;
use mopidy_client::protocol::{snake_to_camel, ApiCatalog, Params, RpcErrorObject};
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = serde_json::from_slice::<Value>(data) else {
        return;
    };

    // The pieces of an inbound frame the session decodes.
    if let Some(error) = frame.get("error") {
        let _ = serde_json::from_value::<RpcErrorObject>(error.clone());
    }
    if let Some(Value::String(event)) = frame.get("event") {
        let _ = snake_to_camel(event);
    }
    if let Some(result) = frame.get("result") {
        if let Ok(catalog) = serde_json::from_value::<ApiCatalog>(result.clone()) {
            for name in catalog.keys() {
                let _ = name.split('.').map(snake_to_camel).collect::<Vec<_>>();
            }
        }
    }
    let _ = Params::try_from(frame);
});
