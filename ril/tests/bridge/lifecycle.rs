use std::{path::PathBuf, sync::Arc, thread, time::Duration};

use orb_ril::{
    Ril, RilConfig,
    at::port::Endpoint,
    config::Timings,
    env::{RilEnvironment, RilError, Unsolicited},
    radio::RadioState,
    request::{CardState, Request, RequestCode, Response},
};

use crate::harness::{
    AT_TIMEOUT, Bridge, FakeModem, RecordingEnv, Reply, eventually, permissive_props,
};

#[test_log::test]
fn test_bring_up_sequence() {
    let bridge = Bridge::start(FakeModem::start(), permissive_props());
    let received = bridge.modem.received();
    let position = |command: &str| {
        received
            .iter()
            .position(|c| c == command)
            .unwrap_or_else(|| panic!("{command} never sent"))
    };

    assert_eq!(received[0], "ATE0Q0V1");
    assert!(position("AT#CGMR") < position("AT#CGMM"));
    assert!(position("AT+CGATT=1") < position("AT+CFUN=4"));
    assert!(position("AT+CFUN=4") < position("AT&W"));
    assert!(position("AT+CMEE=1") < position("AT+CREG=2"));
    assert!(!received.iter().any(|c| c == "AT+CREG=1"));

    assert_eq!(bridge.ril.current_state(), RadioState::Off);
    assert!(bridge.ril.version().ends_with(" - HE910"));
    // Only a HE910 or UE910 gets the extra indications.
    eventually("AT+WIND=32", || bridge.modem.count("AT+WIND=32") == 1);
}

#[test]
fn test_creg_falls_back_without_location_info() {
    let modem = FakeModem::start();
    modem.script("AT+CREG=2", Reply::lines(&["ERROR"]));
    let bridge = Bridge::start(modem, permissive_props());

    eventually("AT+CREG=1", || bridge.modem.count("AT+CREG=1") == 1);
}

#[test]
fn test_le910_skips_he910_indications() {
    let modem = FakeModem::start();
    modem.script("AT#CGMM", Reply::lines(&["#CGMM: LE910-EU1", "OK"]));
    let bridge = Bridge::start(modem, permissive_props());

    assert!(bridge.ril.version().ends_with(" - LE910"));
    let result = bridge.request(1, Request::GetSimStatus);
    assert!(result.is_ok());
    assert_eq!(bridge.modem.count("AT+WIND=32"), 0);
}

#[test]
fn test_requests_gated_while_off() {
    let modem = FakeModem::start();
    modem.script("AT+CPIN?", Reply::lines(&["+CPIN: READY", "OK"]));
    let bridge = Bridge::start(modem, permissive_props());

    let result = bridge.request(1, Request::GetImei);
    assert!(matches!(result, Err(RilError::RadioNotAvailable)), "{result:?}");
    assert_eq!(result.unwrap_err().code(), 1);
    assert_eq!(bridge.modem.count("AT#CGSN"), 0);

    let Ok(Response::CardStatus(status)) = bridge.request(2, Request::GetSimStatus) else {
        panic!("no card status");
    };
    assert_eq!(status.card_state, CardState::Present);
    assert_eq!(status.gsm_umts_subscription_app_index, 0);
}

#[test]
fn test_unreachable_modem_stays_unavailable() {
    let env = Arc::new(RecordingEnv::default());
    let config = RilConfig::builder()
        .env(Arc::clone(&env) as Arc<dyn RilEnvironment>)
        .endpoint(Endpoint::LocalSocket(PathBuf::from(
            "/nonexistent/orb-ril/modem.sock",
        )))
        .properties(Box::new(permissive_props()))
        .timings(Timings::immediate(AT_TIMEOUT))
        .build();
    let ril = Ril::start(config).unwrap();

    assert_eq!(ril.current_state(), RadioState::Unavailable);
    assert!(ril.version().ends_with("Unidentified modem"));
    assert!(ril.on_supports(RequestCode::SetupDataCall));

    ril.on_request(Request::SignalStrength, 1);
    assert!(matches!(
        env.completion(1),
        Err(RilError::RadioNotAvailable)
    ));

    // The card status is always answered, if only as not ready.
    ril.on_request(Request::GetSimStatus, 2);
    let Ok(Response::CardStatus(status)) = env.completion(2) else {
        panic!("no card status");
    };
    assert_eq!(status.card_state, CardState::Present);

    ril.stop();
    assert!(env.events().is_empty());
}

#[test_log::test]
fn test_timeout_closes_and_reinitializes() {
    let modem = FakeModem::start();
    modem.script("AT+CSQ", Reply::Silent);
    let bridge = Bridge::start(modem, permissive_props());
    bridge.radio_on();
    bridge.env.clear_events();

    let result = bridge.request(1, Request::SignalStrength);
    assert!(matches!(result, Err(RilError::Timeout)), "{result:?}");
    assert_eq!(result.unwrap_err().code(), 2);

    bridge
        .env
        .wait_for(&Unsolicited::RadioStateChanged(RadioState::Unavailable));
    bridge
        .env
        .wait_for(&Unsolicited::RadioStateChanged(RadioState::Off));
    let events = bridge.env.events();
    let unavailable = events
        .iter()
        .position(|e| *e == Unsolicited::RadioStateChanged(RadioState::Unavailable));
    let off = events
        .iter()
        .position(|e| *e == Unsolicited::RadioStateChanged(RadioState::Off));
    assert!(unavailable < off);

    assert_eq!(bridge.modem.connections(), 2);
    assert_eq!(bridge.modem.count("AT+CFUN=4"), 2);
}

fn radio_changes(bridge: &Bridge) -> Vec<RadioState> {
    bridge
        .env
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Unsolicited::RadioStateChanged(state) => Some(state),
            _ => None,
        })
        .collect()
}

#[test]
fn test_radio_power_off() {
    let bridge = Bridge::start(FakeModem::start(), permissive_props());
    bridge.radio_on();
    bridge.env.clear_events();

    let result = bridge.request(1, Request::RadioPower { on: false });
    assert!(matches!(result, Ok(Response::Empty)), "{result:?}");
    assert_eq!(bridge.ril.current_state(), RadioState::Off);
    assert_eq!(radio_changes(&bridge), [RadioState::Off]);
    // Once at bring-up, once on request.
    assert_eq!(bridge.modem.count("AT+CFUN=4"), 2);
}

#[test]
fn test_rejected_power_off_restores_state() {
    let bridge = Bridge::start(FakeModem::start(), permissive_props());
    bridge.radio_on();
    bridge.env.clear_events();
    bridge
        .modem
        .script("AT+CFUN=4", Reply::lines(&["+CME ERROR: 4"]));

    let result = bridge.request(1, Request::RadioPower { on: false });
    assert!(
        matches!(result, Err(RilError::CommandFailure { .. })),
        "{result:?}"
    );
    assert_eq!(bridge.ril.current_state(), RadioState::On);
    assert_eq!(radio_changes(&bridge), [RadioState::Off, RadioState::On]);
}

#[test]
fn test_power_on_confirmed_by_cfun_query() {
    let modem = FakeModem::start();
    modem.script("AT+CFUN=1", Reply::lines(&["ERROR"]));
    modem.script("AT+CFUN?", Reply::lines(&["+CFUN: 1", "OK"]));
    let bridge = Bridge::start(modem, permissive_props());
    bridge.env.clear_events();

    bridge.radio_on();
    assert_eq!(radio_changes(&bridge), [RadioState::On]);
    assert_eq!(bridge.modem.count("AT+CFUN?"), 1);
}

#[test]
fn test_power_on_fails_while_rf_stays_off() {
    let modem = FakeModem::start();
    modem.script("AT+CFUN=1", Reply::lines(&["ERROR"]));
    modem.script("AT+CFUN?", Reply::lines(&["+CFUN: 4", "OK"]));
    let bridge = Bridge::start(modem, permissive_props());
    bridge.env.clear_events();

    let result = bridge.request(1, Request::RadioPower { on: true });
    assert!(
        matches!(result, Err(RilError::CommandFailure { cme: None })),
        "{result:?}"
    );
    assert_eq!(bridge.ril.current_state(), RadioState::Off);
    assert!(radio_changes(&bridge).is_empty());
}

#[test]
fn test_shutdown_leaves_radio_unavailable() {
    let bridge = Bridge::start(FakeModem::start(), permissive_props());
    bridge.radio_on();

    bridge.request(1, Request::Shutdown).unwrap();
    assert_eq!(bridge.ril.current_state(), RadioState::Unavailable);
    assert_eq!(bridge.modem.count("AT#SHDN"), 1);

    // Shutdown leaves the channel open, requests stay gated.
    let result = bridge.request(2, Request::GetImei);
    assert!(matches!(result, Err(RilError::RadioNotAvailable)));
}

#[test]
fn test_stop_runs_queued_requests() {
    let modem = FakeModem::start();
    modem.script("AT#CGSN", Reply::lines(&["#CGSN: 356938035643809", "OK"]));
    let bridge = Bridge::start(modem, permissive_props());
    bridge.radio_on();

    let Bridge { ril, env, modem } = bridge;
    ril.on_request(Request::GetImei, 7);
    ril.stop();

    assert!(matches!(
        env.completion(7),
        Ok(Response::String(imei)) if imei == "356938035643809"
    ));
    // Nothing is reopened once stopped.
    thread::sleep(Duration::from_millis(200));
    assert_eq!(modem.connections(), 1);
}
