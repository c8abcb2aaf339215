use serde_json::{json, Map, Value};

use mbox_prefetch::{
    ExtensionConfig, ExtensionRuntime, PrefetchMbox, PrefetchRequestEvent, ResponseEvent,
    SharedStateName, TargetParameters,
};

/// A host with fixed shared states that prints everything the extension sends back.
struct StaticRuntime {
    client_code: String,
}

impl ExtensionRuntime for StaticRuntime {
    fn shared_state(&self, name: SharedStateName) -> Option<Value> {
        Some(match name {
            SharedStateName::Configuration => json!({
                "global.privacy": "optedin",
                "target.clientCode": self.client_code,
            }),
            SharedStateName::Lifecycle => json!({
                "lifecyclecontextdata": {
                    "appid": "Demo 1.0.0 (1)",
                    "osversion": "iOS 17.2",
                    "devicename": "iPhone",
                    "locale": "en-US",
                    "resolution": "1170x2532"
                }
            }),
            SharedStateName::Identity => json!({}),
        })
    }

    fn dispatch(&self, event: ResponseEvent) {
        println!("{}: {}", event.name(), Value::Object(event.data()));
    }

    fn create_shared_state(&self, state: Map<String, Value>) {
        println!("shared state: {}", Value::Object(state));
    }
}

pub fn main() {
    env_logger::init();

    let client_code = std::env::var("TARGET_CLIENT_CODE").unwrap();
    let mut extension = ExtensionConfig::new(StaticRuntime { client_code }).to_extension();

    if !extension.ready_for_event() {
        eprintln!("shared states are not resolved");
        return;
    }

    let event = PrefetchRequestEvent::new(
        vec![
            PrefetchMbox::new("home-banner"),
            PrefetchMbox::new("checkout-offer").with_parameters(
                TargetParameters::default().parameter("cart", "full"),
            ),
        ],
        Some(TargetParameters::default().profile_parameter("tier", "gold")),
    );

    // Errors are also reported through the dispatched response event.
    if let Ok(merged) = extension.prefetch_content(&event) {
        for name in merged {
            println!("{name}: {:?}", extension.prefetched_content(&name));
        }
    }
}
