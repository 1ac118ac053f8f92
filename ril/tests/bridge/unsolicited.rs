use std::{thread, time::Duration};

use orb_ril::{
    env::{SuppSvcNotification, Unsolicited},
    properties::ECC_LIST,
    request::Request,
};

use crate::harness::{Bridge, FakeModem, MockProps, Reply, permissive_props};

#[test_log::test]
fn test_registration_change_refreshes_data_calls() {
    let bridge = Bridge::start(FakeModem::start(), permissive_props());
    bridge.radio_on();
    bridge.env.clear_events();

    bridge.modem.unsolicited("+CREG: 1");
    bridge.env.wait_for(&Unsolicited::VoiceNetworkStateChanged);
    // No ECM session to report.
    bridge
        .env
        .wait_for(&Unsolicited::DataCallListChanged(Vec::new()));
    assert_eq!(bridge.modem.count("AT#ECMC?"), 1);
}

#[test]
fn test_sms_and_time_notifications() {
    let bridge = Bridge::start(FakeModem::start(), permissive_props());
    bridge.radio_on();

    bridge
        .modem
        .unsolicited("+CMT: ,24\n07911326040000F0040B911346610089F60000208062917314080CC8F71D14969741F977FD07");
    bridge.env.wait_for(&Unsolicited::NewSms(
        "07911326040000F0040B911346610089F60000208062917314080CC8F71D14969741F977FD07"
            .to_owned(),
    ));

    bridge.modem.unsolicited("#NITZ: 24/01/31,12:30:00+04,0");
    bridge.env.wait_for(&Unsolicited::NitzTimeReceived(
        "24/01/31,12:30:00+04,0".to_owned(),
    ));

    bridge.modem.unsolicited("+CUSD: 0,\"Balance 5.00\",15");
    bridge.env.wait_for(&Unsolicited::OnUssd {
        mode: "0".to_owned(),
        message: Some("Balance 5.00".to_owned()),
    });

    bridge.modem.unsolicited("+CSSU: 2,1,\"+3912345\",145");
    bridge
        .env
        .wait_for(&Unsolicited::SuppSvcNotification(SuppSvcNotification {
            notification_type: 1,
            code: 2,
            index: 1,
            toa: 145,
            number: Some("+3912345".to_owned()),
        }));
}

#[test]
fn test_ring_raises_call_state() {
    let bridge = Bridge::start(FakeModem::start(), permissive_props());
    bridge.env.clear_events();

    bridge.modem.unsolicited("RING");
    bridge.env.wait_for(&Unsolicited::CallStateChanged);
}

#[test]
fn test_ignored_while_unavailable() {
    let bridge = Bridge::start(FakeModem::start(), permissive_props());
    bridge.radio_on();
    bridge.request(1, Request::Shutdown).unwrap();
    bridge.env.clear_events();

    bridge.modem.unsolicited("RING\n+CREG: 1");
    thread::sleep(Duration::from_millis(300));
    assert!(bridge.env.events().is_empty());
    assert_eq!(bridge.modem.count("AT#ECMC?"), 0);
}

#[test_log::test]
fn test_sim_ready_finishes_initialization_once() {
    let modem = FakeModem::start();
    modem.script("AT+CPBR=?", Reply::lines(&["+CPBR: (1-2),20,18", "OK"]));
    modem.script("AT+CPBR=1", Reply::lines(&["+CPBR: 1,\"112\",129", "OK"]));
    modem.script("AT+CPBR=2", Reply::lines(&["+CPBR: 2,\"999\",129", "OK"]));

    let mut props = MockProps::new();
    props
        .expect_set()
        .withf(|key, value| key == ECC_LIST && value == "112,911,999")
        .times(1)
        .returning(|_, _| Ok(()));
    let bridge = Bridge::start(modem, props);

    bridge.modem.unsolicited("#QSS: 2");
    bridge.env.wait_for(&Unsolicited::SimStatusChanged);
    let received = bridge.modem.received();
    for command in [
        "AT#PSNT=1",
        "AT+CNMI=2,2,2,1,1",
        "AT+CSCS=\"UCS2\"",
        "AT+CMGF=0",
        "AT+CPBS=\"EC\"",
        "AT+CPBS=\"SM\"",
    ] {
        assert!(received.iter().any(|c| c == command), "{command} never sent");
    }
    assert!(
        bridge
            .env
            .events()
            .contains(&Unsolicited::VoiceNetworkStateChanged)
    );

    // A second ready SIM only redoes the SMS routing.
    bridge.modem.unsolicited("#QSS: 2");
    bridge.env.wait_for_nth(&Unsolicited::SimStatusChanged, 2);
    assert_eq!(bridge.modem.count("AT+CNMI=2,2,2,1,1"), 2);
    assert_eq!(bridge.modem.count("AT+CSCS=\"UCS2\""), 1);
    assert_eq!(bridge.modem.count("AT+CPBR=?"), 1);

    bridge.modem.unsolicited("#QSS: 0");
    bridge.env.wait_for_nth(&Unsolicited::SimStatusChanged, 3);
    assert_eq!(bridge.modem.count("AT+CNMI=2,2,2,1,1"), 2);
}
