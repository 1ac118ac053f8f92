use std::{thread, time::Duration};

use mockall::Sequence;
use orb_ril::{
    env::{RilError, Unsolicited},
    properties::{CLEAN_SERVICE, CTL_START, CTL_STOP, DHCP_SERVICE},
    request::{CallState, DataProfile, NetworkStatus, Request, Response},
};

use crate::harness::{Bridge, FakeModem, MockProps, Reply, permissive_props};

fn profile(apn: &str) -> DataProfile {
    DataProfile {
        radio_technology: None,
        profile: None,
        apn: Some(apn.to_owned()),
        user: None,
        password: None,
        auth_type: 0,
        protocol: None,
    }
}

#[test]
fn test_active_call_is_not_repolled() {
    let modem = FakeModem::start();
    modem.script(
        "AT+CLCC",
        Reply::lines(&["+CLCC: 1,0,0,0,0,\"+18005551212\",145", "OK"]),
    );
    let bridge = Bridge::start(modem, permissive_props());
    bridge.radio_on();

    let Ok(Response::Calls(calls)) = bridge.request(1, Request::GetCurrentCalls) else {
        panic!("no call list");
    };
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert_eq!(call.index, 1);
    assert!(!call.is_mt);
    assert_eq!(call.state, CallState::Active);
    assert!(call.is_voice);
    assert!(!call.is_multiparty);
    assert_eq!(call.number.as_deref(), Some("+18005551212"));
    assert_eq!(call.toa, 145);

    thread::sleep(Duration::from_millis(300));
    assert!(!bridge.env.events().contains(&Unsolicited::CallStateChanged));
}

#[test]
fn test_incoming_call_is_repolled() {
    let modem = FakeModem::start();
    modem.script("AT+CLCC", Reply::lines(&["+CLCC: 2,1,4,0,0", "OK"]));
    let bridge = Bridge::start(modem, permissive_props());
    bridge.radio_on();

    let Ok(Response::Calls(calls)) = bridge.request(1, Request::GetCurrentCalls) else {
        panic!("no call list");
    };
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].state, CallState::Incoming);
    assert!(calls[0].is_mt);
    assert_eq!(calls[0].number, None);

    bridge.env.wait_for(&Unsolicited::CallStateChanged);
}

#[test]
fn test_call_list_without_sim_is_empty() {
    let modem = FakeModem::start();
    modem.script("AT+CLCC", Reply::lines(&["+CME ERROR: 10"]));
    let bridge = Bridge::start(modem, permissive_props());
    bridge.radio_on();

    let result = bridge.request(1, Request::GetCurrentCalls);
    assert!(matches!(result, Ok(Response::Calls(calls)) if calls.is_empty()));
}

#[test]
fn test_network_scan_is_deduplicated() {
    let modem = FakeModem::start();
    modem.script(
        "AT+COPS=?",
        Reply::lines(&[
            "+COPS: (2,\"TIM\",\"TIM\",\"22201\"),(1,\"vodafone\",\"voda\",\"22210\"),\
             (3,\"TIM 3G\",\"TIM\",\"22201\"),,(0-4),(0-2)",
            "OK",
        ]),
    );
    let bridge = Bridge::start(modem, permissive_props());
    bridge.radio_on();

    let Ok(Response::Networks(networks)) = bridge.request(1, Request::QueryAvailableNetworks)
    else {
        panic!("no networks");
    };
    assert_eq!(networks.len(), 2);
    assert_eq!(networks[0].numeric, "22201");
    assert_eq!(networks[0].long_name, "TIM");
    assert_eq!(networks[0].status, NetworkStatus::Current);
    assert_eq!(networks[1].numeric, "22210");
    assert_eq!(networks[1].status, NetworkStatus::Available);
}

#[test]
fn test_setup_data_call() {
    let modem = FakeModem::start();
    modem.script("AT#ECM?", Reply::lines(&["#ECM: 0,0", "OK"]));
    modem.script(
        "AT#ECMC?",
        Reply::lines(&[
            "#ECMC: 1,1,\"10.0.0.2\",\"255.255.255.0\",\"10.0.0.1\",\"8.8.8.8\",\"8.8.4.4\"",
            "OK",
        ]),
    );

    let mut props = MockProps::new();
    let mut seq = Sequence::new();
    props
        .expect_set()
        .withf(|key, value| key == CTL_STOP && value == CLEAN_SERVICE)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    props
        .expect_set()
        .withf(|key, value| key == CTL_START && value == DHCP_SERVICE)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    let bridge = Bridge::start(modem, props);
    bridge.radio_on();

    let Ok(Response::DataCalls(calls)) =
        bridge.request(1, Request::SetupDataCall(profile("internet")))
    else {
        panic!("no data call");
    };
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].ifname, "wwan0");
    assert_eq!(calls[0].addresses, "10.0.0.2");
    assert_eq!(calls[0].dnses, "8.8.8.8 8.8.4.4");
    assert_eq!(calls[0].gateways, "10.0.0.1");

    let received = bridge.modem.received();
    assert!(received.contains(&"AT+CGDCONT=1,\"IP\",\"internet\",,0,0".to_owned()));
    assert!(received.contains(&"AT#ECM=1,0".to_owned()));
    assert_eq!(bridge.modem.count("AT#ECMD=0"), 0);
}

#[test]
fn test_data_call_list_without_session_is_empty() {
    let modem = FakeModem::start();
    modem.script("AT#ECMC?", Reply::lines(&["#ECMC: 1,0", "OK"]));
    let bridge = Bridge::start(modem, permissive_props());
    bridge.radio_on();

    let result = bridge.request(1, Request::DataCallList);
    assert!(
        matches!(&result, Ok(Response::DataCalls(calls)) if calls.is_empty()),
        "{result:?}"
    );
    assert_eq!(bridge.modem.count("AT#ECMC?"), 1);
}

#[test]
fn test_failed_data_call_stops_dhcp() {
    let modem = FakeModem::start();
    modem.script("AT#ECM?", Reply::lines(&["#ECM: 0,1", "OK"]));
    modem.script("AT#ECM=1,0", Reply::lines(&["+CME ERROR: 4"]));

    let mut props = MockProps::new();
    let mut seq = Sequence::new();
    for (key, value) in [
        (CTL_STOP, CLEAN_SERVICE),
        (CTL_START, DHCP_SERVICE),
        (CTL_STOP, DHCP_SERVICE),
        (CTL_START, CLEAN_SERVICE),
    ] {
        props
            .expect_set()
            .withf(move |k, v| k == key && v == value)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
    }
    let bridge = Bridge::start(modem, props);
    bridge.radio_on();

    let result = bridge.request(1, Request::SetupDataCall(profile("internet")));
    assert!(matches!(result, Err(RilError::CommandFailure { .. })), "{result:?}");
    // The stale session went down first.
    assert_eq!(bridge.modem.count("AT#ECMD=0"), 1);
}

#[test]
fn test_data_call_needs_an_apn() {
    let bridge = Bridge::start(FakeModem::start(), MockProps::new());
    bridge.radio_on();

    let mut profile = profile("");
    profile.apn = None;
    let result = bridge.request(1, Request::SetupDataCall(profile));
    assert!(matches!(result, Err(RilError::GenericFailure)));
    assert_eq!(bridge.modem.count("AT#ECM?"), 0);
}

#[test]
fn test_send_sms_through_prompt() {
    let modem = FakeModem::start();
    modem.script("AT+CMGS=3", Reply::Prompt("+CMGS: 42\nOK".to_owned()));
    let bridge = Bridge::start(modem, permissive_props());
    bridge.radio_on();

    let result = bridge.request(
        1,
        Request::SendSms {
            smsc: None,
            pdu: "0100AA".to_owned(),
        },
    );
    let Ok(Response::SmsSent(sent)) = &result else {
        panic!("SMS not sent: {result:?}");
    };
    assert_eq!(sent.message_ref, 42);
    assert_eq!(sent.error_code, 0);
    assert!(bridge.modem.received().contains(&"000100AA".to_owned()));
}

#[test]
fn test_wrong_pin_reports_retries() {
    let modem = FakeModem::start();
    modem.script("AT+CPIN=\"0000\"", Reply::lines(&["+CME ERROR: 16"]));
    modem.script("AT#PCT", Reply::lines(&["#PCT: 2", "OK"]));
    let bridge = Bridge::start(modem, permissive_props());
    bridge.radio_on();

    let result = bridge.request(
        1,
        Request::EnterSimPin {
            pin: "0000".to_owned(),
        },
    );
    assert!(matches!(
        result,
        Err(RilError::PasswordIncorrect { retries: Some(2) })
    ));
    assert_eq!(result.unwrap_err().code(), 3);
}

#[test]
fn test_accepted_pin_raises_sim_status() {
    let bridge = Bridge::start(FakeModem::start(), permissive_props());
    bridge.radio_on();
    bridge.env.clear_events();

    let result = bridge.request(
        1,
        Request::EnterSimPin {
            pin: "1234".to_owned(),
        },
    );
    assert!(matches!(result, Ok(Response::Empty)));
    bridge.env.wait_for(&Unsolicited::SimStatusChanged);
}

#[test]
fn test_facility_lock_sums_services() {
    let modem = FakeModem::start();
    modem.script(
        "AT+CLCK=\"AO\",2,\"1234\",7",
        Reply::lines(&["+CLCK: 1,1", "+CLCK: 0,2", "+CLCK: 1,4", "OK"]),
    );
    modem.script("AT+CLCK=\"SC\",2", Reply::lines(&["+CME ERROR: 10"]));
    let bridge = Bridge::start(modem, permissive_props());
    bridge.radio_on();

    let result = bridge.request(
        1,
        Request::QueryFacilityLock {
            facility: "AO".to_owned(),
            password: Some("1234".to_owned()),
            service_class: 7,
        },
    );
    assert!(matches!(result, Ok(Response::Int(5))), "{result:?}");

    let result = bridge.request(
        2,
        Request::QueryFacilityLock {
            facility: "SC".to_owned(),
            password: None,
            service_class: 0,
        },
    );
    assert!(matches!(result, Ok(Response::Int(0))), "{result:?}");
}

#[test]
fn test_unmapped_network_type_is_rejected() {
    let bridge = Bridge::start(FakeModem::start(), permissive_props());
    bridge.radio_on();

    let result = bridge.request(
        1,
        Request::SetPreferredNetworkType { network_type: 99 },
    );
    assert!(matches!(result, Err(RilError::ModeNotSupported)));
    assert_eq!(result.unwrap_err().code(), 13);
}

#[test]
fn test_oem_hooks_echo() {
    let bridge = Bridge::start(FakeModem::start(), permissive_props());
    bridge.radio_on();

    let result = bridge.request(
        1,
        Request::OemHookRaw {
            data: vec![1, 2, 3],
        },
    );
    assert!(matches!(result, Ok(Response::Raw(data)) if data == [1, 2, 3]));
}
