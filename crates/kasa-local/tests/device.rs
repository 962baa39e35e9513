mod common;

use std::{sync::Arc, time::Duration};

use common::{TcpDevice, plug_sysinfo, strip_sysinfo};
use kasa_local::{
    ChildScope, Client, ClientOptions, DeviceEvent, Error, FailureReason, SendOptions,
    TransportKind,
};
use parking_lot::Mutex;
use serde_json::{Value, json};

/// A plug that keeps its relay state and has no energy meter.
async fn stateful_plug() -> TcpDevice {
    let sysinfo = Arc::new(Mutex::new(plug_sysinfo("PLUG1")));
    sysinfo.lock()["feature"] = json!("TIM");

    TcpDevice::start(move |request| {
        let mut reply = serde_json::Map::new();
        if let Some(state) = request["system"]["set_relay_state"]["state"].as_u64() {
            sysinfo.lock()["relay_state"] = json!(state);
            reply.insert("system".into(), json!({"set_relay_state": {"err_code": 0}}));
        }
        if request["system"].get("get_sysinfo").is_some() {
            reply.insert("system".into(), json!({"get_sysinfo": sysinfo.lock().clone()}));
        }
        if request["system"].get("set_dev_alias").is_some() {
            reply.insert(
                "system".into(),
                json!({"set_dev_alias": {"err_code": -3, "err_msg": "invalid argument"}}),
            );
        }
        if request.get("emeter").is_some() {
            reply.insert("emeter".into(), json!({"err_code": -1, "err_msg": "module not support"}));
        }
        Value::Object(reply)
    })
    .await
}

fn client() -> Client {
    let defaults = SendOptions::new().with_timeout(Duration::from_secs(5));
    Client::new(ClientOptions::new().with_send_options(defaults))
}

#[tokio::test]
async fn test_get_device_and_switch_relay() {
    common::init_tracing();
    let plug = stateful_plug().await;
    let client = client();

    let device = client.get_device("127.0.0.1", plug.port, SendOptions::new()).await.unwrap();
    assert_eq!(device.alias(), "Kitchen Plug");
    assert_eq!(device.mac_normalized(), "50C7BF000001");
    assert!(!device.relay_state());

    let mut events = device.subscribe();
    device.set_power_state(true, SendOptions::new()).await.unwrap();

    let received: Vec<DeviceEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert_eq!(
        received,
        vec![
            DeviceEvent::InUse,
            DeviceEvent::InUseUpdate(true),
            DeviceEvent::PowerOn,
            DeviceEvent::PowerUpdate(true),
        ]
    );

    // The device agrees after a refresh
    let sysinfo = device.refresh(SendOptions::new()).await.unwrap();
    assert_eq!(sysinfo["relay_state"], 1);
    assert!(device.relay_state());
}

#[tokio::test]
async fn test_get_info_tolerates_unsupported_emeter() {
    common::init_tracing();
    let plug = stateful_plug().await;
    let client = client();
    let device = client.device("127.0.0.1", plug.port);

    let info = device.get_info(SendOptions::new()).await.unwrap();
    assert_eq!(info.sysinfo["deviceId"], "PLUG1");
    assert!(info.emeter.is_none());
    assert_eq!(device.alias(), "Kitchen Plug");
}

#[tokio::test]
async fn test_single_failure_surfaces_response_error() {
    common::init_tracing();
    let plug = stateful_plug().await;
    let client = client();
    let device = client.get_device("127.0.0.1", plug.port, SendOptions::new()).await.unwrap();

    let err = device.set_alias("Renamed", SendOptions::new()).await.unwrap_err();
    let Error::Response(err) = err else {
        panic!("expected a response error, got {err:?}");
    };
    assert_eq!(err.message, "err_code not zero (-3)");
    assert_eq!(err.failures[0].reason, FailureReason::NonZero(-3));
    assert_eq!(err.response["err_msg"], "invalid argument");
    assert_eq!(device.alias(), "Kitchen Plug");
}

#[tokio::test]
async fn test_outlet_commands_carry_routing_context() {
    common::init_tracing();
    let strip = TcpDevice::start(|request| {
        json!({"system": {"set_relay_state": {"err_code": 0}}, "echo": request.clone()})
    })
    .await;
    let client = client();
    let outlet =
        client.device_from_sysinfo(strip_sysinfo("STRIP"), "127.0.0.1", strip.port, Some("1"));
    assert_eq!(outlet.id(), "STRIP01");
    assert!(!outlet.relay_state());

    outlet.set_power_state(true, SendOptions::new()).await.unwrap();
    assert_eq!(
        strip.requests.lock()[0],
        json!({
            "system": {"set_relay_state": {"state": 1}},
            "context": {"child_ids": ["STRIP01"]}
        })
    );
    assert!(outlet.relay_state());
    assert!(outlet.child("00").unwrap().is_on());

    // An explicit parent scope drops the context
    outlet
        .send_command(
            json!({"system": {"set_relay_state": {"state": 0}}}),
            ChildScope::Parent,
            SendOptions::new(),
        )
        .await
        .unwrap();
    assert!(strip.requests.lock()[1].get("context").is_none());
}

#[tokio::test]
async fn test_udp_send_option_override() {
    common::init_tracing();
    let device = common::UdpDevice::start(plug_sysinfo("PLUG2")).await;
    let client = client();

    let sysinfo = client
        .get_sysinfo(
            "127.0.0.1",
            device.addr.port(),
            SendOptions::new().with_transport(TransportKind::Udp),
        )
        .await
        .unwrap();
    assert_eq!(sysinfo["deviceId"], "PLUG2");
}
