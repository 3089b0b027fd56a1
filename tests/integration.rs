//! Integration tests for netconf-yang

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use quick_xml::escape::escape;
use tokio::io::{DuplexStream, duplex};
use tokio_util::codec::Framed;

use netconf_yang::codec::NetconfCodec;
use netconf_yang::command::{Flow, Shell};
use netconf_yang::registry::MONITORING_NS;
use netconf_yang::session::Reply;
use netconf_yang::testing::{MockConnector, MockSession, device_with};
use netconf_yang::transport::{BASE_NS, StreamSession};
use netconf_yang::{
    ClientOptions, Datastore, Decoded, NetconfClient, NetconfError, Outcome, Session,
};

const IF_NS: &str = "urn:ietf:params:xml:ns:yang:ietf-interfaces";

const INTERFACES_YANG: &str = r#"
module ietf-interfaces {
  namespace "urn:ietf:params:xml:ns:yang:ietf-interfaces";
  prefix if;

  container interfaces {
    list interface {
      key "name";
      leaf name { type string; }
      leaf description { type string; }
      leaf enabled { type boolean; }
      leaf mtu { type uint32; }
      container statistics {
        config false;
        leaf in-octets { type uint64; }
      }
    }
  }
}
"#;

const SYSTEM_YANG: &str = r#"
module example-system {
  namespace "urn:example:system";
  prefix sys;
  container system {
    leaf hostname { type string; }
    leaf contact { type string; }
  }
}
"#;

const BROKEN_YANG: &str = "module broken { namespace \"urn:broken\"; prefix b; container x {";

fn interfaces_reply() -> String {
    format!(
        "<data><interfaces xmlns=\"{IF_NS}\">\
         <interface><name>eth0</name><enabled>true</enabled><mtu>1500</mtu></interface>\
         <interface><name>eth1</name><enabled>false</enabled><mtu>9000</mtu></interface>\
         </interfaces></data>"
    )
}

fn device() -> Arc<MockSession> {
    device_with(&[
        ("ietf-interfaces", INTERFACES_YANG),
        ("example-system", SYSTEM_YANG),
        ("broken", BROKEN_YANG),
    ])
}

async fn logged_in(mock: &Arc<MockSession>, options: ClientOptions) -> NetconfClient {
    let mut client = NetconfClient::new(options);
    client.login(mock.clone()).await.unwrap();
    client
}

// ============================================================================
// Client over a scripted session
// ============================================================================

#[tokio::test]
async fn test_login_discovers_modules_and_skips_broken() {
    let mock = device();
    let mut client = logged_in(&mock, ClientOptions::default()).await;

    let registry = client.registry().unwrap();
    assert!(registry.module("ietf-interfaces").is_some());
    assert!(registry.module("example-system").is_some());
    assert!(registry.module("broken").is_none());
    assert_eq!(mock.count("<get-schema"), 3);
    assert!(client.keepalive_running());

    client.logout().await;
    assert!(!client.is_logged_in());
    assert!(mock.is_closed());
}

#[tokio::test]
async fn test_get_leaf_end_to_end() {
    let mock = device();
    mock.on("<get><filter", Reply::new(interfaces_reply()));
    let mut client = logged_in(&mock, ClientOptions::default()).await;

    let decoded = client
        .get("/interfaces/interface[name='eth0']/enabled")
        .await
        .unwrap();
    assert_eq!(decoded.to_string(), "enabled = true");

    let sent = mock
        .requests()
        .into_iter()
        .rfind(|r| r.starts_with("<get><filter"))
        .unwrap();
    assert_eq!(
        sent,
        format!(
            "<get><filter type=\"subtree\" xmlns:ietf-interfaces='{IF_NS}'>\
             <interfaces xmlns=\"{IF_NS}\"><interface><name>eth0</name></interface></interfaces>\
             </filter></get>"
        )
    );
    client.logout().await;
}

#[tokio::test]
async fn test_get_list_returns_every_entry() {
    let mock = device();
    mock.on("<get><filter", Reply::new(interfaces_reply()));
    let mut client = logged_in(&mock, ClientOptions::default()).await;

    match client.get("/interfaces/interface").await.unwrap() {
        Decoded::Matches(selection) => {
            assert_eq!(selection.len(), 2);
            let json = selection.to_json();
            assert!(json.is_array());
            assert_eq!(json[1]["mtu"], 9000);
        }
        Decoded::NoData => panic!("expected both interfaces"),
    }
    client.logout().await;
}

#[tokio::test]
async fn test_set_end_to_end() {
    let mock = device();
    let mut client = logged_in(&mock, ClientOptions::default()).await;

    client
        .set("/interfaces/interface[name='eth0']/enabled", "true")
        .await
        .unwrap();
    assert_eq!(
        mock.count(&format!(
            "<edit-config><target><running/></target><config>\
             <interfaces xmlns=\"{IF_NS}\"><interface><name>eth0</name><enabled>true</enabled></interface></interfaces>\
             </config></edit-config>"
        )),
        1
    );
    client.logout().await;
}

#[tokio::test]
async fn test_no_data_differs_from_unknown_path() {
    let mock = device();
    mock.on("<get-config>", Reply::new(interfaces_reply()));
    let mut client = logged_in(&mock, ClientOptions::default()).await;

    let missing = client
        .get_config("/interfaces/interface[name='eth9']/mtu")
        .await
        .unwrap();
    assert!(missing.is_no_data());
    assert_eq!(missing.to_string(), "no data");

    let err = client
        .get_config("/interfaces/interface[name='eth0']/speed")
        .await
        .unwrap_err();
    assert!(matches!(err, NetconfError::PathEncoding(_) | NetconfError::PathLookup(_)));
    client.logout().await;
}

#[tokio::test]
async fn test_newer_device_leaves_are_ignored() {
    let mock = device();
    mock.on(
        "<get><filter",
        Reply::new(format!(
            "<data><interfaces xmlns=\"{IF_NS}\">\
             <interface><name>eth0</name><speed>10</speed><enabled>true</enabled></interface>\
             </interfaces></data>"
        )),
    );
    let mut client = logged_in(&mock, ClientOptions::default()).await;

    let enabled = client
        .get("/interfaces/interface[name='eth0']/enabled")
        .await
        .unwrap();
    assert_eq!(enabled.to_string(), "enabled = true");

    let missing = client
        .get("/interfaces/interface[name='eth9']/enabled")
        .await
        .unwrap();
    assert!(missing.is_no_data());
    client.logout().await;
}

#[tokio::test]
async fn test_set_cannot_rename_list_entry() {
    let mock = device();
    let mut client = logged_in(&mock, ClientOptions::default()).await;

    let err = client
        .set("/interfaces/interface[name='eth0']/name", "eth1")
        .await
        .unwrap_err();
    assert!(matches!(err, NetconfError::PathEncoding(_)));
    assert_eq!(mock.count("<edit-config>"), 0);
    client.logout().await;
}

#[tokio::test]
async fn test_get_config_rejects_state_data() {
    let mock = device();
    mock.on(
        "<get-config>",
        Reply::new(format!(
            "<data><interfaces xmlns=\"{IF_NS}\"><interface><name>eth0</name>\
             <statistics><in-octets>42</in-octets></statistics></interface></interfaces></data>"
        )),
    );
    let mut client = logged_in(&mock, ClientOptions::default()).await;

    let err = client.get_config("/interfaces").await.unwrap_err();
    assert!(matches!(err, NetconfError::SchemaReparse(_)));
    client.logout().await;
}

#[tokio::test]
async fn test_rpc_error_on_read() {
    let mock = device();
    mock.on(
        "<get><filter",
        Reply::new("<rpc-error><error-tag>access-denied</error-tag></rpc-error>"),
    );
    let mut client = logged_in(&mock, ClientOptions::default()).await;

    let err = client.get("/system/hostname").await.unwrap_err();
    assert!(matches!(err, NetconfError::RpcError(m) if m == "access-denied"));
    client.logout().await;
}

#[tokio::test]
async fn test_xpath_get_config_filter() {
    let mock = device();
    mock.on(
        "<get-config>",
        Reply::new("<data><system xmlns=\"urn:example:system\"><hostname>r1</hostname></system></data>"),
    );
    let options = ClientOptions {
        datastore: Datastore::Startup,
        get_config_filter: netconf_yang::request_builder::FilterKind::Xpath,
        ..ClientOptions::default()
    };
    let mut client = logged_in(&mock, options).await;

    let decoded = client.get_config("/system/hostname").await.unwrap();
    assert_eq!(decoded.to_string(), "hostname = r1");
    assert_eq!(
        mock.count(
            "<get-config><source><startup/></source><filter type=\"xpath\" \
             xmlns:example-system='urn:example:system' select=\"/system/hostname\"/></get-config>"
        ),
        1
    );
    client.logout().await;
}

#[tokio::test]
async fn test_execute_outcomes() {
    let mock = device();
    mock.on("<get><filter", Reply::new(interfaces_reply()));
    let mut client = logged_in(&mock, ClientOptions::default()).await;

    let read = netconf_yang::Operation::from_parts(
        "get",
        "/interfaces/interface[name='eth1']/mtu",
        None,
        client.datastore(),
    )
    .unwrap();
    match client.execute(&read).await.unwrap() {
        Outcome::Data(decoded) => assert_eq!(decoded.to_string(), "mtu = 9000"),
        Outcome::Ok => panic!("read returned an ack"),
    }

    let edit = netconf_yang::Operation::from_parts(
        "set",
        "/system/contact",
        Some("noc@example.net"),
        client.datastore(),
    )
    .unwrap();
    assert!(matches!(client.execute(&edit).await.unwrap(), Outcome::Ok));
    client.logout().await;
}

// ============================================================================
// Command shell
// ============================================================================

#[tokio::test]
async fn test_shell_script() {
    let mock = device();
    mock.on("<get><filter", Reply::new(interfaces_reply()));
    let connector = Arc::new(MockConnector::new(mock.clone()));
    let mut shell = Shell::new(NetconfClient::new(ClientOptions::default()), connector.clone());

    let mut output = Vec::new();
    for line in [
        "help",
        "login",
        "",
        "get /interfaces/interface[name='eth1']/enabled",
        "datastore candidate",
        "set /system/hostname core router",
        "logout",
        "quit",
        "get /never/reached",
    ] {
        match shell.handle_line(line).await.unwrap() {
            Flow::Continue(Some(text)) => output.push(text),
            Flow::Continue(None) => {}
            Flow::Quit => break,
        }
    }

    assert_eq!(output.len(), 2);
    assert_eq!(output[1], "enabled = false");
    assert_eq!(connector.connects(), 1);
    assert_eq!(
        mock.count("<target><candidate/></target><config><system xmlns=\"urn:example:system\"><hostname>core router</hostname>"),
        1
    );
    assert!(mock.is_closed());
}

// ============================================================================
// Full stack over a framed byte stream
// ============================================================================

const DEVICE_HELLO: &str = "<hello xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\"><capabilities>\
    <capability>urn:ietf:params:netconf:base:1.0</capability></capabilities>\
    <session-id>12</session-id></hello>";

/// Answers RPCs like a small device with the interfaces module
async fn run_device(stream: DuplexStream) -> Vec<String> {
    let mut framed = Framed::new(stream, NetconfCodec::new());
    let mut seen = Vec::new();
    framed.send(DEVICE_HELLO.to_string()).await.unwrap();
    framed.next().await.unwrap().unwrap();

    while let Some(Ok(rpc)) = framed.next().await {
        let id = rpc
            .split("message-id=\"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .unwrap_or("0")
            .to_string();
        let body = if rpc.contains("<schemas/>") {
            format!(
                "<data><netconf-state xmlns=\"{MONITORING_NS}\"><schemas><schema>\
                 <identifier>ietf-interfaces</identifier><version>2018-02-20</version>\
                 <format>yang</format><namespace>{IF_NS}</namespace><location>NETCONF</location>\
                 </schema></schemas></netconf-state></data>"
            )
        } else if rpc.contains("<get-schema") {
            format!("<data xmlns=\"{MONITORING_NS}\">{}</data>", escape(INTERFACES_YANG))
        } else if rpc.contains("<get>") {
            interfaces_reply()
        } else {
            "<ok/>".to_string()
        };
        framed
            .send(format!(
                "<rpc-reply message-id=\"{id}\" xmlns=\"{BASE_NS}\">{body}</rpc-reply>"
            ))
            .await
            .unwrap();

        let closing = rpc.contains("<close-session/>");
        seen.push(rpc);
        if closing {
            break;
        }
    }
    seen
}

#[tokio::test]
async fn test_full_stack_over_stream() {
    let (client_end, device_end) = duplex(64 * 1024);
    let device = tokio::spawn(run_device(device_end));

    let session = StreamSession::open(client_end).await.unwrap();
    assert_eq!(session.session_id(), Some("12"));

    let mut client = NetconfClient::new(ClientOptions::default());
    client.login(Arc::new(session) as Arc<dyn Session>).await.unwrap();

    let decoded = client
        .get("/interfaces/interface[name='eth0']/mtu")
        .await
        .unwrap();
    assert_eq!(decoded.to_string(), "mtu = 1500");

    client
        .set("/interfaces/interface[name='eth1']/description", "backup")
        .await
        .unwrap();
    client.logout().await;

    let seen = device.await.unwrap();
    assert_eq!(seen.len(), 5);
    assert!(seen[0].contains("<schemas/>"));
    assert!(seen[1].contains("<identifier>ietf-interfaces</identifier>"));
    assert!(seen[3].contains("<description>backup</description>"));
    assert!(seen[4].contains("<close-session/>"));
    for (i, rpc) in seen.iter().enumerate() {
        assert!(rpc.starts_with(&format!("<rpc message-id=\"{}\"", i + 1)), "{rpc}");
    }
}
