//! End-to-end tests: a full RilService driven against scripted modems.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ril_core::events::RilEvent;
use ril_core::transport::Transport;
use ril_core::types::{CallState, CardStatus, RadioState, RilErrno, SimStatus, SmsResponse};
use ril_modem::{Connector, Request, Response, RilBuilder, RilConfig, RilService};
use ril_test_harness::{MockModem, MockModemHandle};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(30);

/// Hands out modems in order, then blocks until shutdown.
struct Scripted(Mutex<VecDeque<MockModem>>);

impl Scripted {
    fn new(modems: Vec<MockModem>) -> Self {
        Scripted(Mutex::new(modems.into()))
    }
}

#[async_trait]
impl Connector for Scripted {
    async fn connect(&self, cancel: &CancellationToken) -> Option<Box<dyn Transport>> {
        let next = self.0.lock().unwrap().pop_front();
        match next {
            Some(modem) => Some(Box::new(modem)),
            None => {
                cancel.cancelled().await;
                None
            }
        }
    }
}

/// A modem with the radio on and the SIM ready.
fn healthy_modem() -> (MockModem, MockModemHandle) {
    let modem = MockModem::new();
    let handle = modem.handle();
    handle.on("AT+CFUN?", &["+CFUN: 1", "OK"]);
    handle.on("AT+CPIN?", &["+CPIN: READY", "OK"]);
    handle.on("AT+CSMS=1", &["+CSMS: 1,1,1", "OK"]);
    handle.fallback(&["OK"]);
    (modem, handle)
}

fn start(modems: Vec<MockModem>) -> RilService {
    start_with(RilConfig::default(), modems)
}

fn start_with(config: RilConfig, modems: Vec<MockModem>) -> RilService {
    RilBuilder::new()
        .config(config)
        .build_with_connector(Scripted::new(modems))
}

async fn wait_for_state(ril: &RilService, state: RadioState) {
    let mut rx = ril.core().radio().watch();
    let reached = matches!(
        tokio::time::timeout(WAIT, rx.wait_for(|snap| snap.state == state)).await,
        Ok(Ok(_))
    );
    assert!(
        reached,
        "radio never reached {state}, now {}",
        ril.current_state()
    );
}

/// Radio states announced on `events` until `last` shows up.
async fn states_until(
    events: &mut broadcast::Receiver<RilEvent>,
    last: RadioState,
) -> Vec<RadioState> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for events")
            .expect("event channel closed");
        if let RilEvent::RadioStateChanged { state } = event {
            seen.push(state);
            if state == last {
                return seen;
            }
        }
    }
}

async fn next_matching<F>(events: &mut broadcast::Receiver<RilEvent>, pred: F) -> RilEvent
where
    F: Fn(&RilEvent) -> bool,
{
    loop {
        let event = tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for events")
            .expect("event channel closed");
        if pred(&event) {
            return event;
        }
    }
}

// ---------------------------------------------------------------
// Bring-up
// ---------------------------------------------------------------

#[tokio::test]
async fn bring_up_reaches_sim_ready() {
    let (modem, handle) = healthy_modem();
    let ril = start(vec![modem]);
    let mut events = ril.subscribe();

    let states = states_until(&mut events, RadioState::SimReady).await;
    assert_eq!(
        states,
        vec![RadioState::Off, RadioState::SimNotReady, RadioState::SimReady]
    );

    assert!(handle.wait_for_command("AT+CSMS=1", WAIT).await);
    let received = handle.received();
    assert_eq!(received[0], "ATE0Q0V1");
    let pos = |cmd: &str| received.iter().position(|c| c == cmd).unwrap();
    assert!(pos("AT+CMEE=1") < pos("AT+CREG=2"));
    assert!(pos("AT+CGREG=2") < pos("AT+CFUN?"));
    assert!(pos("AT+CPIN?") < pos("AT+CNMI=1,2,2,1,1"));
    assert!(handle.unexpected().is_empty());

    ril.shutdown().await;
}

#[tokio::test]
async fn creg_falls_back_to_mode_one() {
    let (modem, handle) = healthy_modem();
    handle.on("AT+CREG=2", &["ERROR"]);
    let ril = start(vec![modem]);

    wait_for_state(&ril, RadioState::SimReady).await;
    assert_eq!(handle.count("AT+CREG=1"), 1);
    ril.shutdown().await;
}

#[tokio::test]
async fn radio_off_waits_for_power_request() {
    let (modem, handle) = healthy_modem();
    handle.on("AT+CFUN?", &["+CFUN: 0", "OK"]);
    let ril = start(vec![modem]);

    wait_for_state(&ril, RadioState::Off).await;
    assert!(handle.wait_for_command("AT+CFUN?", WAIT).await);
    assert_eq!(
        ril.request(Request::SignalStrength).await,
        Err(RilErrno::RadioNotAvailable)
    );
    assert_eq!(handle.count("AT+CSQ"), 0);

    assert_eq!(
        ril.request(Request::RadioPower { on: true }).await,
        Ok(Response::Empty)
    );
    assert_eq!(handle.count("AT+CFUN=1"), 1);
    wait_for_state(&ril, RadioState::SimReady).await;
    ril.shutdown().await;
}

#[tokio::test]
async fn sim_polling_continues_until_ready() {
    let (modem, handle) = healthy_modem();
    handle.on("AT+CPIN?", &["+CME ERROR: 14"]);
    let mut config = RilConfig::default();
    config.sim_poll_interval = Duration::from_millis(20);
    let ril = start_with(config, vec![modem]);

    wait_for_state(&ril, RadioState::SimNotReady).await;
    while handle.count("AT+CPIN?") < 3 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(ril.current_state(), RadioState::SimNotReady);

    handle.on("AT+CPIN?", &["+CPIN: READY", "OK"]);
    wait_for_state(&ril, RadioState::SimReady).await;
    ril.shutdown().await;
}

// ---------------------------------------------------------------
// SIM PIN
// ---------------------------------------------------------------

#[tokio::test]
async fn sim_pin_unlocks_to_sim_ready() {
    let (modem, handle) = healthy_modem();
    handle.on("AT+CPIN?", &["+CPIN: SIM PIN", "OK"]);
    handle.on("AT+CPIN=\"0000\"", &["+CME ERROR: 16"]);
    handle.on("AT+CPIN=\"1234\"", &["OK"]);
    let ril = start(vec![modem]);

    wait_for_state(&ril, RadioState::SimLockedOrAbsent).await;
    assert_eq!(
        ril.request(Request::GetSimStatus).await,
        Ok(Response::CardStatus(CardStatus::from(SimStatus::Pin)))
    );

    assert_eq!(
        ril.request(Request::EnterSimPin { pin: "0000".into() }).await,
        Err(RilErrno::PasswordIncorrect)
    );
    assert_eq!(ril.current_state(), RadioState::SimLockedOrAbsent);

    handle.on("AT+CPIN?", &["+CPIN: READY", "OK"]);
    assert_eq!(
        ril.request(Request::EnterSimPin { pin: "1234".into() }).await,
        Ok(Response::Empty)
    );
    wait_for_state(&ril, RadioState::SimReady).await;

    assert!(handle.wait_for_command("AT+CSMS=1", WAIT).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.count("AT+CSMS=1"), 1);
    assert_eq!(handle.count("AT+COPS=0"), 1);
    ril.shutdown().await;
}

#[tokio::test]
async fn missing_sim_reads_absent() {
    let (modem, handle) = healthy_modem();
    handle.on("AT+CPIN?", &["+CME ERROR: 10"]);
    let ril = start(vec![modem]);

    wait_for_state(&ril, RadioState::SimLockedOrAbsent).await;
    assert_eq!(
        ril.request(Request::GetSimStatus).await,
        Ok(Response::CardStatus(CardStatus::from(SimStatus::Absent)))
    );
    ril.shutdown().await;
}

#[tokio::test]
async fn sim_status_in_sim_ready_has_no_side_effects() {
    let (modem, handle) = healthy_modem();
    let ril = start(vec![modem]);

    wait_for_state(&ril, RadioState::SimReady).await;
    assert!(handle.wait_for_command("AT+CSMS=1", WAIT).await);
    let mut events = ril.subscribe();

    for _ in 0..5 {
        assert_eq!(
            ril.request(Request::GetSimStatus).await,
            Ok(Response::CardStatus(CardStatus::from(SimStatus::Ready)))
        );
        assert_eq!(ril.current_state(), RadioState::SimReady);
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.count("AT+CSMS=1"), 1);
    assert_eq!(handle.count("AT+COPS=0"), 1);
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, RilEvent::RadioStateChanged { .. }),
            "unexpected {event:?}"
        );
    }
    ril.shutdown().await;
}

// ---------------------------------------------------------------
// Faults
// ---------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn command_timeout_drops_to_unavailable() {
    let (modem, handle) = healthy_modem();
    let mut config = RilConfig::default();
    config.command_timeout = Duration::from_secs(5);
    let ril = start_with(config, vec![modem]);
    let mut events = ril.subscribe();

    wait_for_state(&ril, RadioState::SimReady).await;
    assert!(handle.wait_for_command("AT+CSMS=1", WAIT).await);

    handle.expect_silence("AT+CSQ");
    assert_eq!(
        ril.request(Request::SignalStrength).await,
        Err(RilErrno::GenericFailure)
    );
    wait_for_state(&ril, RadioState::Unavailable).await;
    assert!(ril.core().radio().is_closed());

    let event = next_matching(&mut events, |e| {
        matches!(e, RilEvent::RadioStateChanged { state: RadioState::Unavailable })
    })
    .await;
    assert_eq!(
        event,
        RilEvent::RadioStateChanged {
            state: RadioState::Unavailable
        }
    );
    assert_eq!(
        ril.request(Request::SignalStrength).await,
        Err(RilErrno::RadioNotAvailable)
    );
    ril.shutdown().await;
}

#[tokio::test]
async fn link_loss_reconnects_and_reinitializes() {
    let (first, first_handle) = healthy_modem();
    let (second, second_handle) = healthy_modem();
    let ril = start(vec![first, second]);

    wait_for_state(&ril, RadioState::SimReady).await;
    let mut events = ril.subscribe();
    first_handle.hang_up();

    let states = states_until(&mut events, RadioState::SimReady).await;
    assert_eq!(
        states,
        vec![
            RadioState::Unavailable,
            RadioState::Off,
            RadioState::SimNotReady,
            RadioState::SimReady
        ]
    );
    assert_eq!(second_handle.count("ATE0Q0V1"), 1);
    assert!(second_handle.wait_for_command("AT+CSMS=1", WAIT).await);
    ril.shutdown().await;
}

// ---------------------------------------------------------------
// Requests and events
// ---------------------------------------------------------------

#[tokio::test]
async fn unsolicited_lines_become_events() {
    let (modem, handle) = healthy_modem();
    let ril = start(vec![modem]);
    wait_for_state(&ril, RadioState::SimReady).await;
    let mut events = ril.subscribe();

    handle.push_unsolicited("+CREG: 1");
    next_matching(&mut events, |e| *e == RilEvent::VoiceNetworkStateChanged).await;

    handle.push_unsolicited("+CMT: ,23");
    handle.push_unsolicited("07911326040000F0040B911346610089F60000208062917314080CC8F71D14969741F977FD07");
    let event = next_matching(&mut events, |e| matches!(e, RilEvent::NewSms { .. })).await;
    assert_eq!(
        event,
        RilEvent::NewSms {
            pdu: "07911326040000F0040B911346610089F60000208062917314080CC8F71D14969741F977FD07"
                .into()
        }
    );

    handle.push_unsolicited("RING");
    next_matching(&mut events, |e| *e == RilEvent::CallStateChanged).await;
    ril.shutdown().await;
}

#[tokio::test]
async fn call_list_includes_waiting_call() {
    let (modem, handle) = healthy_modem();
    handle.on(
        "AT+CLCC",
        &["+CLCC: 1,0,0,0,0,\"5551234\",129", "+CLCC: 2,0,0,1,0", "OK"],
    );
    let ril = start(vec![modem]);
    wait_for_state(&ril, RadioState::SimReady).await;
    let mut events = ril.subscribe();

    handle.push_unsolicited("+CCWA: \"5559876\",129,1");
    next_matching(&mut events, |e| *e == RilEvent::CallStateChanged).await;

    let Ok(Response::Calls(calls)) = ril.request(Request::GetCurrentCalls).await else {
        panic!("expected a call list");
    };
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].number.as_deref(), Some("5551234"));
    assert_eq!(calls[1].index, 2);
    assert_eq!(calls[1].state, CallState::Waiting);
    assert_eq!(calls[1].number.as_deref(), Some("5559876"));

    // The waiting entry is reported once.
    let Ok(Response::Calls(calls)) = ril.request(Request::GetCurrentCalls).await else {
        panic!("expected a call list");
    };
    assert_eq!(calls.len(), 1);
    ril.shutdown().await;
}

#[tokio::test]
async fn send_sms_uses_modem_smsc() {
    let (modem, handle) = healthy_modem();
    let ril = start(vec![modem]);
    wait_for_state(&ril, RadioState::SimReady).await;

    handle.on("AT+CSCA?", &["+CSCA: \"+31624000000\",145", "OK"]);
    handle.expect_raw("AT+CMGS=4", b"\r\n> ");
    handle.expect("07911326040000F001000100", &["+CMGS: 42", "OK"]);
    let result = ril
        .request(Request::SendSms {
            smsc: None,
            pdu: "01000100".into(),
        })
        .await;
    assert_eq!(
        result,
        Ok(Response::Sms(SmsResponse {
            message_ref: 42,
            ack_pdu: None,
            error_code: -1,
        }))
    );
    assert_eq!(handle.remaining_expectations(), 0);
    ril.shutdown().await;
}

#[tokio::test]
async fn registration_and_signal_queries() {
    let (modem, handle) = healthy_modem();
    handle.on("AT+CSQ", &["+CSQ: 17,99", "OK"]);
    handle.on("AT+CREG?", &["+CREG: 2,1,\"00C3\",\"0000ABCD\"", "OK"]);
    handle.on("AT+CGREG?", &["+CGREG: 2,1,\"00C3\",\"0000ABCD\"", "OK"]);
    handle.on("AT+COPS?", &["+COPS: 0,0,\"Operator\",2", "OK"]);
    let ril = start(vec![modem]);
    wait_for_state(&ril, RadioState::SimReady).await;

    let Ok(Response::SignalStrength(signal)) = ril.request(Request::SignalStrength).await else {
        panic!("expected signal strength");
    };
    assert_eq!((signal.rssi, signal.ber), (17, 99));

    let Ok(Response::Registration(voice)) = ril.request(Request::VoiceRegistrationState).await
    else {
        panic!("expected voice registration");
    };
    assert_eq!(voice.stat, 1);
    assert_eq!(voice.lac, Some(0xC3));
    assert_eq!(voice.cid, Some(0xABCD));
    assert_eq!(voice.network_type, 1);

    let Ok(Response::Registration(data)) = ril.request(Request::DataRegistrationState).await
    else {
        panic!("expected data registration");
    };
    assert_eq!(data.stat, 1);
    assert_eq!(handle.count("AT+COPS?"), 1);
    ril.shutdown().await;
}

#[tokio::test]
async fn registration_retries_then_fails() {
    let (modem, handle) = healthy_modem();
    handle.on("AT+CREG?", &["ERROR"]);
    let ril = start(vec![modem]);
    wait_for_state(&ril, RadioState::SimReady).await;

    assert_eq!(
        ril.request(Request::VoiceRegistrationState).await,
        Err(RilErrno::GenericFailure)
    );
    assert_eq!(handle.count("AT+CREG?"), 4);
    ril.shutdown().await;
}

#[tokio::test]
async fn identity_queries() {
    let (modem, handle) = healthy_modem();
    handle.on("AT+CIMI", &["310260000000000", "OK"]);
    handle.on("AT+CGSN", &["490154203237518", "OK"]);
    handle.on("AT+CGMR", &["+CGMR: 11.608.12.01.00", "OK"]);
    let ril = start(vec![modem]);
    wait_for_state(&ril, RadioState::SimReady).await;

    assert_eq!(
        ril.request(Request::GetImsi).await,
        Ok(Response::Text("310260000000000".into()))
    );
    assert_eq!(
        ril.request(Request::GetImei).await,
        Ok(Response::Text("490154203237518".into()))
    );
    assert_eq!(
        ril.request(Request::BasebandVersion).await,
        Ok(Response::Text("11.608.12.01.00".into()))
    );
    assert_eq!(
        ril.request(Request::OemHookRaw(vec![1, 2, 3])).await,
        Ok(Response::Raw(vec![1, 2, 3]))
    );
    ril.shutdown().await;
}

#[tokio::test]
async fn baseband_version_skips_interleaved_unsolicited_lines() {
    let (modem, handle) = healthy_modem();
    handle.on("AT+CGMR", &["RING", "+CREG: 1", "M6290A-KEVLHWZM-3.0.2", "OK"]);
    let ril = start(vec![modem]);
    wait_for_state(&ril, RadioState::SimReady).await;
    let mut events = ril.subscribe();

    assert_eq!(
        ril.request(Request::BasebandVersion).await,
        Ok(Response::Text("M6290A-KEVLHWZM-3.0.2".into()))
    );
    next_matching(&mut events, |e| matches!(e, RilEvent::CallStateChanged)).await;
    next_matching(&mut events, |e| {
        matches!(e, RilEvent::VoiceNetworkStateChanged)
    })
    .await;

    handle.on("AT+CGMR", &["RING", "OK"]);
    assert!(ril.request(Request::BasebandVersion).await.is_err());
    ril.shutdown().await;
}

#[tokio::test]
async fn unsupported_request_reports_as_such() {
    let (modem, _handle) = healthy_modem();
    let ril = RilBuilder::new()
        .request_table(ril_modem::RequestTable::new())
        .build_with_connector(Scripted::new(vec![modem]));
    wait_for_state(&ril, RadioState::SimReady).await;
    assert_eq!(
        ril.request(Request::SignalStrength).await,
        Err(RilErrno::RequestNotSupported)
    );
    ril.shutdown().await;
}
