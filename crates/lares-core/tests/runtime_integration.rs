/// Integration tests: two device runtimes live on one LocalBus.
///
/// The switch runtime transmits a command; the lamp runtime accepts it and
/// surfaces the change as an event. Everything flows through the spawned
/// loops, no manual pumping.
use std::time::Duration;

use tokio::time::timeout;

use lares_core::{
    Access, Binding, DatapointConfig, DeviceConfig, DeviceEvent, DeviceRuntime, FrameService,
    GroupAddress, IndividualAddress, LaresError, LinkConfig, LocalBus, Priority, RuntimeChannels,
    RuntimeConfig, Value, ValueKind,
};

const TICK: Duration = Duration::from_secs(5);

fn gad(s: &str) -> GroupAddress {
    s.parse().unwrap()
}

fn addr(s: &str) -> IndividualAddress {
    s.parse().unwrap()
}

fn spawn_switch(bus: &LocalBus, light: GroupAddress) -> RuntimeChannels {
    let device = DeviceConfig::new("switch")
        .datapoint(DatapointConfig::new("cmd", ValueKind::Bool, Access::Output))
        .link(LinkConfig::new("cmd").flags("CWT".parse().unwrap()))
        .build()
        .unwrap();
    let tap = bus.attach(addr("1.1.1")).unwrap();
    DeviceRuntime::spawn(
        device,
        tap,
        RuntimeConfig {
            bindings: vec![Binding {
                datapoint: "cmd".into(),
                group: light,
            }],
            ..Default::default()
        },
    )
}

fn spawn_lamp(bus: &LocalBus, light: GroupAddress) -> RuntimeChannels {
    let device = DeviceConfig::new("lamp")
        .datapoint(DatapointConfig::new("state", ValueKind::Bool, Access::Input))
        .link(LinkConfig::new("state").flags("CRWU".parse().unwrap()))
        .build()
        .unwrap();
    let tap = bus.attach(addr("1.1.2")).unwrap();
    DeviceRuntime::spawn(
        device,
        tap,
        RuntimeConfig {
            bindings: vec![Binding {
                datapoint: "state".into(),
                group: light,
            }],
            ..Default::default()
        },
    )
}

/// Wait for the next ValueChanged on this runtime's event stream.
async fn next_change(channels: &mut RuntimeChannels) -> lares_core::ValueChange {
    loop {
        let event = timeout(TICK, channels.events.recv())
            .await
            .expect("event timed out")
            .expect("events closed");
        if let DeviceEvent::ValueChanged { change } = event {
            return change;
        }
    }
}

#[tokio::test]
async fn command_propagates_between_runtimes() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .try_init();

    let bus = LocalBus::new();
    let light = gad("6/0/1");
    let mut switch = spawn_switch(&bus, light);
    let mut lamp = spawn_lamp(&bus, light);

    switch
        .handle
        .set_value("cmd", Value::Bool(true))
        .await
        .unwrap();

    // Both sides observe the commit: the switch locally, the lamp off the
    // bus.
    let change = next_change(&mut switch).await;
    assert_eq!(change.datapoint, "cmd");
    assert_eq!(change.current, Value::Bool(true));

    let change = next_change(&mut lamp).await;
    assert_eq!(change.datapoint, "state");
    assert_eq!(change.current, Value::Bool(true));

    assert_eq!(
        lamp.handle.value("state").await,
        Some(Value::Bool(true))
    );
    assert_eq!(lamp.handle.value("nope").await, None);

    switch.handle.shutdown().await;
    lamp.handle.shutdown().await;
}

/// Binding and unbinding while the runtime is live moves the link.
#[tokio::test]
async fn live_rebind_redirects_traffic() {
    let bus = LocalBus::new();
    let mut observer = bus.attach(addr("4.1.9")).unwrap();

    let device = DeviceConfig::new("switch")
        .datapoint(DatapointConfig::new("cmd", ValueKind::Bool, Access::Output))
        .link(LinkConfig::new("cmd").flags("CWT".parse().unwrap()))
        .build()
        .unwrap();
    let tap = bus.attach(addr("4.1.1")).unwrap();
    let mut switch = DeviceRuntime::spawn(device, tap, RuntimeConfig::default());

    // Unbound: the commit happens but nothing reaches the bus.
    switch
        .handle
        .set_value("cmd", Value::Bool(true))
        .await
        .unwrap();
    next_change(&mut switch).await;
    assert!(observer.try_recv().is_none());

    switch.handle.bind("cmd", gad("6/0/7")).await.unwrap();
    switch
        .handle
        .set_value("cmd", Value::Bool(false))
        .await
        .unwrap();
    let frame = timeout(TICK, observer.recv())
        .await
        .expect("frame timed out")
        .expect("bus closed");
    assert_eq!(frame.group, gad("6/0/7"));
    assert_eq!(frame.service, FrameService::Write(vec![0]));

    // Unbound again: silence returns.
    switch.handle.unbind("cmd").await.unwrap();
    switch
        .handle
        .set_value("cmd", Value::Bool(true))
        .await
        .unwrap();
    next_change(&mut switch).await;
    assert!(observer.try_recv().is_none());

    switch.handle.shutdown().await;
}

/// A binding with C+I issues its initial read when the runtime starts.
#[tokio::test]
async fn startup_binding_issues_init_read() {
    let bus = LocalBus::new();
    let mut observer = bus.attach(addr("2.1.9")).unwrap();

    let device = DeviceConfig::new("mirror")
        .datapoint(DatapointConfig::new("state", ValueKind::Uint8, Access::Input))
        .link(LinkConfig::new("state").flags("CWUI".parse().unwrap()))
        .build()
        .unwrap();
    let tap = bus.attach(addr("2.1.1")).unwrap();
    let channels = DeviceRuntime::spawn(
        device,
        tap,
        RuntimeConfig {
            bindings: vec![Binding {
                datapoint: "state".into(),
                group: gad("6/0/2"),
            }],
            ..Default::default()
        },
    );

    let frame = timeout(TICK, observer.recv())
        .await
        .expect("init read timed out")
        .expect("bus closed");
    assert_eq!(frame.service, FrameService::Read);
    assert_eq!(frame.group, gad("6/0/2"));
    assert_eq!(frame.priority, Priority::Low);
    assert!(observer.try_recv().is_none(), "exactly one init read");

    channels.handle.shutdown().await;
}

/// A garbage payload surfaces as DecodeFailed and leaves the value alone.
#[tokio::test]
async fn garbage_payload_reports_decode_failure() {
    let bus = LocalBus::new();
    let light = gad("6/0/1");
    let mut lamp = spawn_lamp(&bus, light);
    let rogue = bus.attach(addr("3.1.9")).unwrap();

    rogue.write(light, Priority::Low, vec![0xAB, 0xCD]).unwrap();

    let event = timeout(TICK, lamp.events.recv())
        .await
        .expect("event timed out")
        .expect("events closed");
    let DeviceEvent::DecodeFailed {
        group,
        datapoint,
        reason,
    } = event
    else {
        panic!("expected DecodeFailed, got {event:?}");
    };
    assert_eq!(group, light);
    assert_eq!(datapoint, "state");
    assert!(reason.contains("decode"), "reason: {reason}");
    assert_eq!(lamp.handle.value("state").await, Some(Value::Bool(false)));

    lamp.handle.shutdown().await;
}

/// Tearing the bus down surfaces as a Detached event and ends the loop.
#[tokio::test]
async fn bus_teardown_detaches_the_runtime() {
    let bus = LocalBus::new();
    let mut lamp = spawn_lamp(&bus, gad("6/0/1"));

    bus.close();

    let event = timeout(TICK, lamp.events.recv())
        .await
        .expect("event timed out")
        .expect("events closed");
    assert!(matches!(event, DeviceEvent::Detached), "got {event:?}");

    // The loop exits; the event stream ends and commands bounce.
    while lamp.events.recv().await.is_some() {}
    let err = lamp
        .handle
        .set_value("state", Value::Bool(true))
        .await
        .unwrap_err();
    assert!(matches!(err, LaresError::RuntimeShutDown));
}

/// Commands referencing unknown datapoints fail as events, not crashes.
#[tokio::test]
async fn unknown_datapoint_reports_command_failure() {
    let bus = LocalBus::new();
    let mut lamp = spawn_lamp(&bus, gad("6/0/1"));

    lamp.handle
        .set_value("nope", Value::Bool(true))
        .await
        .unwrap();

    let event = timeout(TICK, lamp.events.recv())
        .await
        .expect("event timed out")
        .expect("events closed");
    let DeviceEvent::CommandFailed { description } = event else {
        panic!("expected CommandFailed, got {event:?}");
    };
    assert!(description.contains("nope"), "description: {description}");

    lamp.handle.shutdown().await;
}

/// After shutdown the handle reports the runtime as gone.
#[tokio::test]
async fn shutdown_closes_the_handle() {
    let bus = LocalBus::new();
    let mut lamp = spawn_lamp(&bus, gad("6/0/1"));

    lamp.handle.shutdown().await;
    // The loop exits and drops its end; the event stream ends.
    while lamp.events.recv().await.is_some() {}

    let err = lamp
        .handle
        .set_value("state", Value::Bool(true))
        .await
        .unwrap_err();
    assert!(matches!(err, LaresError::RuntimeShutDown));
    assert_eq!(lamp.handle.value("state").await, None);
}
