use std::{cell::RefCell, collections::HashMap, fs, rc::Rc};

use mbox_prefetch::{
    ErrorKind, ExtensionConfig, ExtensionRuntime, FileDataStore, HttpRequest, HttpResponse,
    PrefetchMbox, PrefetchRequestEvent, ResponseEvent, SharedStateName, TargetParameters,
    TargetRequest,
};
use serde_json::{json, Map, Value};

#[derive(Default)]
struct Recorded {
    states: HashMap<SharedStateName, Value>,
    events: Vec<ResponseEvent>,
    published: Vec<Map<String, Value>>,
}

#[derive(Clone, Default)]
struct Runtime(Rc<RefCell<Recorded>>);

impl Runtime {
    fn ready() -> Runtime {
        Runtime::with_configuration(json!({
            "global.privacy": "optedin",
            "target.clientCode": "acme",
            "target.timeout": 1
        }))
    }

    fn with_configuration(configuration: Value) -> Runtime {
        let runtime = Runtime::default();
        {
            let mut recorded = runtime.0.borrow_mut();
            recorded
                .states
                .insert(SharedStateName::Configuration, configuration);
            recorded.states.insert(
                SharedStateName::Lifecycle,
                json!({ "lifecyclecontextdata": { "osversion": "iOS 17.2", "devicename": "iPhone" } }),
            );
            recorded
                .states
                .insert(SharedStateName::Identity, json!({ "mid": "ecid-1" }));
        }
        runtime
    }

    fn last_error(&self) -> Option<String> {
        match self.0.borrow().events.last() {
            Some(ResponseEvent::Prefetch(event)) => event.error.clone(),
            other => panic!("expected a prefetch response event, got {other:?}"),
        }
    }

    fn published(&self) -> Vec<Value> {
        self.0
            .borrow()
            .published
            .iter()
            .cloned()
            .map(Value::Object)
            .collect()
    }
}

impl ExtensionRuntime for Runtime {
    fn shared_state(&self, name: SharedStateName) -> Option<Value> {
        self.0.borrow().states.get(&name).cloned()
    }

    fn dispatch(&self, event: ResponseEvent) {
        self.0.borrow_mut().events.push(event);
    }

    fn create_shared_state(&self, state: Map<String, Value>) {
        self.0.borrow_mut().published.push(state);
    }
}

type Sent = Rc<RefCell<Vec<HttpRequest>>>;

/// A transport answering every call with `status` and `body`, recording requests in `sent`.
fn scripted(
    sent: &Sent,
    status: u16,
    body: &'static str,
) -> impl FnMut(&HttpRequest) -> mbox_prefetch::Result<HttpResponse> {
    let sent = sent.clone();
    move |request: &HttpRequest| -> mbox_prefetch::Result<HttpResponse> {
        sent.borrow_mut().push(request.clone());
        Ok(HttpResponse {
            status,
            body: body.as_bytes().to_vec(),
        })
    }
}

fn prefetch(mboxes: &[&str]) -> PrefetchRequestEvent {
    PrefetchRequestEvent::new(mboxes.iter().map(|name| PrefetchMbox::new(*name)).collect(), None)
}

const SUCCESS_BODY: &str = r#"{"id":{"tntId":"abc"},"edgeHost":"mboxedge35.tt.omtrdc.net","prefetch":{"mboxes":[{"name":"mbox1","content":"X"}]}}"#;

#[test]
fn successful_prefetch_updates_state_and_cache() {
    let _ = env_logger::builder().is_test(true).try_init();

    let runtime = Runtime::ready();
    let sent = Sent::default();
    let mut extension = ExtensionConfig::new(runtime.clone())
        .transport(scripted(&sent, 200, SUCCESS_BODY))
        .to_extension();

    let merged = extension.prefetch_content(&prefetch(&["mbox1"])).unwrap();

    assert_eq!(merged, ["mbox1"]);
    assert_eq!(extension.session().tnt_id(), Some("abc"));
    assert_eq!(
        extension.session().edge_host(),
        Some("mboxedge35.tt.omtrdc.net")
    );
    assert!(extension.session().session_timestamp().is_some());
    assert_eq!(
        extension.prefetched_content("mbox1"),
        Some(&json!({ "content": "X" }))
    );
    assert_eq!(runtime.published(), [json!({ "tntId": "abc" })]);
    assert_eq!(runtime.last_error(), None);

    let sent = sent.borrow();
    let url = &sent[0].url;
    assert_eq!(url.host_str(), Some("acme.tt.omtrdc.net"));
    assert_eq!(url.path(), "/rest/v1/delivery/");
    let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
    assert_eq!(query["client"], "acme");
    assert_eq!(
        query["sessionId"],
        extension.session().stored_session_id()
    );
    assert_eq!(sent[0].timeout, std::time::Duration::from_secs(1));

    let body: Value = serde_json::from_slice(&sent[0].body).unwrap();
    assert_eq!(body["id"], json!({ "marketingCloudVisitorId": "ecid-1" }));
    assert_eq!(body["context"]["mobilePlatform"]["platformType"], "ios");
    assert_eq!(body["prefetch"]["mboxes"][0]["name"], "mbox1");
}

#[test]
fn follow_up_call_uses_edge_host_and_tnt_id() {
    let runtime = Runtime::ready();
    let sent = Sent::default();
    let mut extension = ExtensionConfig::new(runtime)
        .transport(scripted(&sent, 200, SUCCESS_BODY))
        .to_extension();

    extension.prefetch_content(&prefetch(&["mbox1"])).unwrap();
    extension.prefetch_content(&prefetch(&["mbox1"])).unwrap();

    let sent = sent.borrow();
    assert_eq!(sent[1].url.host_str(), Some("mboxedge35.tt.omtrdc.net"));
    let body: Value = serde_json::from_slice(&sent[1].body).unwrap();
    assert_eq!(body["id"]["tntId"], "abc");
}

#[test]
fn remote_error_reports_message_and_keeps_cache() {
    let runtime = Runtime::ready();
    let sent = Sent::default();
    let mut extension = ExtensionConfig::new(runtime.clone())
        .transport(scripted(&sent, 404, r#"{"message":"notfound"}"#))
        .to_extension();

    let err = extension.prefetch_content(&prefetch(&["mbox1"])).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Remote);
    assert!(runtime.last_error().unwrap().contains("notfound"));
    assert!(extension.prefetch_cache().is_empty());
    assert_eq!(extension.session().tnt_id(), None);
    assert_eq!(extension.session().edge_host(), None);
    assert!(extension.session().session_timestamp().is_some());
    assert_eq!(runtime.published(), [json!({})]);
}

#[test]
fn preconditions_fail_without_network() {
    let cases = [
        (
            Runtime::with_configuration(
                json!({ "global.privacy": "optedout", "target.clientCode": "acme" }),
            ),
            prefetch(&["mbox1"]),
            "Privacy status is not opted in (optedout)",
        ),
        (
            Runtime::with_configuration(
                json!({ "global.privacy": "optunknown", "target.clientCode": "acme" }),
            ),
            prefetch(&["mbox1"]),
            "Privacy status is not opted in (optunknown)",
        ),
        (
            Runtime::with_configuration(json!({ "target.clientCode": "acme" })),
            prefetch(&["mbox1"]),
            "Privacy status is not opted in (missing)",
        ),
        (
            Runtime::ready(),
            prefetch(&[]),
            "Empty or null prefetch requests list",
        ),
        (
            Runtime::with_configuration(json!({ "global.privacy": "optedin" })),
            prefetch(&["mbox1"]),
            "Missing client code",
        ),
    ];

    for (runtime, event, message) in cases {
        let sent = Sent::default();
        let mut extension = ExtensionConfig::new(runtime.clone())
            .transport(scripted(&sent, 200, SUCCESS_BODY))
            .to_extension();

        let err = extension.prefetch_content(&event).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert_eq!(runtime.last_error().as_deref(), Some(message));
        assert!(sent.borrow().is_empty());
        assert!(runtime.published().is_empty());
        assert_eq!(extension.session().session_timestamp(), None);
    }
}

#[test]
fn unresolved_shared_state_fails_without_network() {
    let runtime = Runtime::ready();
    runtime
        .0
        .borrow_mut()
        .states
        .remove(&SharedStateName::Identity);
    let sent = Sent::default();
    let mut extension = ExtensionConfig::new(runtime.clone())
        .transport(scripted(&sent, 200, SUCCESS_BODY))
        .to_extension();

    extension.handle(TargetRequest::Prefetch(prefetch(&["mbox1"])));

    assert_eq!(
        runtime.last_error().as_deref(),
        Some("Missing shared state - identity")
    );
    assert!(sent.borrow().is_empty());
}

#[test]
fn oversized_timeout_uses_default() {
    let runtime = Runtime::with_configuration(json!({
        "global.privacy": "optedin",
        "target.clientCode": "acme",
        "target.timeout": 1e30
    }));
    let sent = Sent::default();
    let mut extension = ExtensionConfig::new(runtime.clone())
        .transport(scripted(&sent, 200, SUCCESS_BODY))
        .to_extension();

    extension.prefetch_content(&prefetch(&["mbox1"])).unwrap();

    assert_eq!(runtime.last_error(), None);
    assert_eq!(sent.borrow()[0].timeout, std::time::Duration::from_secs(2));
}

#[test]
fn mistyped_response_fields_do_not_drop_the_rest() {
    let runtime = Runtime::ready();
    let sent = Sent::default();
    let mut extension = ExtensionConfig::new(runtime.clone())
        .transport(scripted(
            &sent,
            200,
            r#"{"id":{"tntId":"abc"},"edgeHost":5,"prefetch":{"mboxes":[{"name":"mbox1","content":"X"}]}}"#,
        ))
        .to_extension();

    let merged = extension.prefetch_content(&prefetch(&["mbox1"])).unwrap();

    assert_eq!(merged, ["mbox1"]);
    assert_eq!(extension.session().tnt_id(), Some("abc"));
    assert_eq!(extension.session().edge_host(), None);
    assert!(extension.session().session_timestamp().is_some());
    assert_eq!(runtime.last_error(), None);
}

#[test]
fn unparseable_body_leaves_state_untouched() {
    let runtime = Runtime::ready();
    let sent = Sent::default();
    let mut extension = ExtensionConfig::new(runtime.clone())
        .transport(scripted(&sent, 200, "<html>oops</html>"))
        .to_extension();

    let err = extension.prefetch_content(&prefetch(&["mbox1"])).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(
        runtime.last_error().as_deref(),
        Some("Target response parser initialization failed")
    );
    assert_eq!(extension.session().session_timestamp(), None);
    assert!(runtime.published().is_empty());
}

#[test]
fn refused_connection_is_reported() {
    let runtime = Runtime::with_configuration(json!({
        "global.privacy": "optedin",
        "target.clientCode": "acme",
        "target.server": "127.0.0.1:9",
        "target.timeout": 1
    }));
    let mut extension = ExtensionConfig::new(runtime.clone()).to_extension();

    let err = extension.prefetch_content(&prefetch(&["mbox1"])).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(runtime.last_error().is_some());
    assert_eq!(extension.session().session_timestamp(), None);
}

#[test]
fn cache_keys_match_requested_names() {
    let runtime = Runtime::ready();
    let mut extension = ExtensionConfig::new(runtime)
        .transport(|request: &HttpRequest| -> mbox_prefetch::Result<HttpResponse> {
            // Echo every requested mbox back with some content.
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            let mboxes: Vec<Value> = body["prefetch"]["mboxes"]
                .as_array()
                .unwrap()
                .iter()
                .map(|mbox| json!({ "name": mbox["name"], "index": mbox["index"], "options": [] }))
                .collect();
            Ok(HttpResponse {
                status: 200,
                body: serde_json::to_vec(&json!({ "prefetch": { "mboxes": mboxes } })).unwrap(),
            })
        })
        .to_extension();

    let requested = ["hero", "footer", "checkout"];
    let event = PrefetchRequestEvent::new(
        requested.iter().map(|name| PrefetchMbox::new(*name)).collect(),
        Some(TargetParameters::default().parameter("page", "home")),
    );
    let merged = extension.prefetch_content(&event).unwrap();

    assert_eq!(merged, requested);
    let mut cached: Vec<_> = extension.prefetch_cache().names().collect();
    cached.sort_unstable();
    let mut expected = requested.to_vec();
    expected.sort_unstable();
    assert_eq!(cached, expected);
}

#[test]
fn cache_survives_partial_batches_until_cleared() {
    let runtime = Runtime::ready();
    let responses = Rc::new(RefCell::new(vec![
        r#"{"prefetch":{"mboxes":[{"name":"b","content":"B"}]}}"#,
        r#"{"prefetch":{"mboxes":[{"name":"a","content":"A"}]}}"#,
    ]));
    let mut extension = ExtensionConfig::new(runtime)
        .transport(move |_: &HttpRequest| -> mbox_prefetch::Result<HttpResponse> {
            let body = responses.borrow_mut().pop().unwrap_or("{}");
            Ok(HttpResponse {
                status: 200,
                body: body.as_bytes().to_vec(),
            })
        })
        .to_extension();

    extension.prefetch_content(&prefetch(&["a"])).unwrap();
    extension.prefetch_content(&prefetch(&["b"])).unwrap();
    assert_eq!(extension.prefetched_content("a"), Some(&json!({ "content": "A" })));
    assert_eq!(extension.prefetched_content("b"), Some(&json!({ "content": "B" })));

    extension.handle(TargetRequest::ClearPrefetchCache);
    assert!(extension.prefetch_cache().is_empty());
}

#[test]
fn identity_persists_across_restarts() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("target.json");

    {
        let sent = Sent::default();
        let mut extension = ExtensionConfig::new(Runtime::ready())
            .data_store(FileDataStore::open(&path).unwrap())
            .transport(scripted(&sent, 200, SUCCESS_BODY))
            .to_extension();
        extension.prefetch_content(&prefetch(&["mbox1"])).unwrap();
        extension.set_third_party_id("alias");
    }

    let stored: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(stored["TNT_ID"], "abc");

    let runtime = Runtime::ready();
    let mut extension = ExtensionConfig::new(runtime.clone())
        .data_store(FileDataStore::open(&path).unwrap())
        .to_extension();
    assert_eq!(extension.session().tnt_id(), Some("abc"));
    assert_eq!(extension.session().third_party_id(), Some("alias"));
    assert_eq!(
        extension.session().edge_host(),
        Some("mboxedge35.tt.omtrdc.net")
    );
    assert!(extension.prefetch_cache().is_empty());

    extension.handle(TargetRequest::RequestIdentity);
    assert_eq!(
        Value::Object(runtime.0.borrow().events[0].data()),
        json!({ "tntid": "abc", "thirdpartyid": "alias" })
    );
}
