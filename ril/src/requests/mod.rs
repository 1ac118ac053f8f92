//! Request gating and routing.
//!
//! Every request completes exactly once: either here when the radio state
//! does not allow it, or with whatever its handler returns.

mod call;
mod data;
mod device;
mod network;
mod power;
mod sim;
mod sms;
mod supp_svc;

use tracing::{debug, info, warn};

pub use self::{
    call::parse_clcc,
    data::refresh_data_call_list,
    network::{parse_available_networks, PreferredNetwork},
    sim::{SimStatus, get_sim_status},
};
use crate::{
    at::{
        response::{AtError, AtResponse},
        tok::Tokenizer,
    },
    context::Context,
    env::{RilError, Token},
    radio::RadioState,
    request::{Request, RequestCode, Response},
};

pub type HandlerResult = Result<Response, RilError>;

/// Whether `code` may be processed while the radio is in `state`.
pub fn is_permitted(state: RadioState, code: RequestCode) -> bool {
    match state {
        RadioState::Unavailable => code == RequestCode::GetSimStatus,
        RadioState::Off => {
            matches!(code, RequestCode::GetSimStatus | RequestCode::RadioPower)
        }
        RadioState::On => true,
    }
}

pub fn dispatch(ctx: &Context, request: Request, token: Token) {
    let code = request.code();
    let state = ctx.session.radio_state();
    if !is_permitted(state, code) {
        debug!(%code, %state, token, "rejecting request, radio not available");
        ctx.session
            .env()
            .complete_request(token, Err(RilError::RadioNotAvailable));
        return;
    }

    debug!(%code, token, "processing request");
    let result = handle(ctx, request);
    match &result {
        Ok(_) => debug!(%code, token, "request succeeded"),
        Err(e) => warn!(%code, token, "request failed: {e}"),
    }
    ctx.session.env().complete_request(token, result);
}

fn handle(ctx: &Context, request: Request) -> HandlerResult {
    match request {
        Request::GetSimStatus => sim::card_status(ctx),
        Request::EnterSimPin { pin } => sim::enter_pin(ctx, sim::PinOp::Pin { pin }),
        Request::EnterSimPuk { puk, new_pin } => {
            sim::enter_pin(ctx, sim::PinOp::Puk { puk, new_pin })
        }
        Request::EnterSimPin2 { pin2 } => sim::enter_pin(ctx, sim::PinOp::Pin2 { pin2 }),
        Request::EnterSimPuk2 { puk2, new_pin2 } => {
            sim::enter_pin(ctx, sim::PinOp::Puk2 { puk2, new_pin2 })
        }
        Request::ChangeSimPin { old_pin, new_pin } => {
            sim::enter_pin(ctx, sim::PinOp::ChangePin { old_pin, new_pin })
        }
        Request::ChangeSimPin2 { old_pin2, new_pin2 } => {
            sim::enter_pin(ctx, sim::PinOp::ChangePin2 { old_pin2, new_pin2 })
        }
        Request::SimIo(io) => sim::sim_io(ctx, io),
        Request::GetImsi => sim::imsi(ctx),
        Request::QueryFacilityLock {
            facility,
            password,
            service_class,
        } => sim::query_facility_lock(ctx, &facility, password.as_deref(), service_class),
        Request::SetFacilityLock {
            facility,
            lock,
            password,
            service_class,
        } => sim::set_facility_lock(ctx, &facility, lock, &password, service_class),

        Request::GetCurrentCalls => call::current_calls(ctx),
        Request::Dial { address, clir } => call::dial(ctx, &address, clir),
        Request::Hangup { index } => call::hangup(ctx, index),
        Request::HangupWaitingOrBackground => call::chld(ctx, "AT+CHLD=0"),
        Request::HangupForegroundResumeBackground => call::chld(ctx, "AT+CHLD=1"),
        Request::SwitchWaitingOrHoldingAndActive => call::chld(ctx, "AT+CHLD=2"),
        Request::Conference => call::chld(ctx, "AT+CHLD=3"),
        Request::Udub => call::udub(ctx),
        Request::Answer => call::answer(ctx),
        Request::SeparateConnection { party } => call::separate_connection(ctx, party),
        Request::ExplicitCallTransfer => call::explicit_transfer(ctx),
        Request::LastCallFailCause => call::last_fail_cause(ctx),
        Request::Dtmf { tone } => call::dtmf(ctx, tone),
        Request::QueryClip => call::query_clip(ctx),
        Request::GetClir => call::get_clir(ctx),
        Request::SetClir { mode } => call::set_clir(ctx, mode),
        Request::QueryCallWaiting { service_class } => {
            call::query_call_waiting(ctx, service_class)
        }
        Request::SetCallWaiting {
            enable,
            service_class,
        } => call::set_call_waiting(ctx, enable, service_class),
        Request::SetCallForward(forward) => call::set_call_forward(ctx, &forward),
        Request::QueryCallForwardStatus { reason } => {
            call::query_call_forward(ctx, reason)
        }
        Request::ChangeBarringPassword {
            facility,
            old_password,
            new_password,
        } => call::change_barring_password(ctx, &facility, &old_password, &new_password),
        Request::SetMute { mute } => call::set_mute(ctx, mute),
        Request::GetMute => call::get_mute(ctx),

        Request::SignalStrength => network::signal_strength(ctx),
        Request::VoiceRegistrationState => network::voice_registration(ctx),
        Request::DataRegistrationState => network::data_registration(ctx),
        Request::Operator => network::operator(ctx),
        Request::QueryNetworkSelectionMode => network::selection_mode(ctx),
        Request::SetNetworkSelectionAutomatic => network::select_automatic(ctx),
        Request::SetNetworkSelectionManual { numeric } => {
            network::select_manual(ctx, &numeric)
        }
        Request::QueryAvailableNetworks => network::available_networks(ctx),
        Request::GetPreferredNetworkType => network::preferred_network(ctx),
        Request::SetPreferredNetworkType { network_type } => {
            network::set_preferred_network(ctx, network_type)
        }
        Request::VoiceRadioTech => network::voice_radio_tech(ctx),
        Request::SetLocationUpdates { enable } => network::location_updates(ctx, enable),
        Request::SetBandMode { mode } => network::set_band_mode(ctx, mode),

        Request::SetInitialAttachApn(apn) => data::set_initial_attach_apn(ctx, apn),
        Request::SetupDataCall(profile) => data::setup_data_call(ctx, profile),
        Request::DeactivateDataCall { .. } => data::deactivate_data_call(ctx),
        Request::DataCallList => data::data_call_list(ctx),

        Request::RadioPower { on } => device::radio_power(ctx, on),
        Request::GetImei => device::imei(ctx),
        Request::GetImeiSv => device::imei_sv(ctx),
        Request::DeviceIdentity => device::device_identity(ctx),
        Request::BasebandVersion => device::baseband_version(ctx),
        Request::Shutdown => device::shutdown(ctx),
        Request::ScreenState { on } => power::screen_state(ctx, on),

        Request::SendSms { smsc, pdu } => sms::send(ctx, smsc.as_deref(), &pdu),
        Request::SendSmsExpectMore { smsc, pdu } => {
            sms::send_expect_more(ctx, smsc.as_deref(), &pdu)
        }
        Request::SmsAcknowledge { success, .. } => sms::acknowledge(ctx, success),
        Request::WriteSmsToSim { status, pdu, .. } => sms::write_to_sim(ctx, status, &pdu),
        Request::DeleteSmsOnSim { index } => sms::delete_on_sim(ctx, index),
        Request::GetSmscAddress => sms::smsc_address(ctx),
        Request::SetSmscAddress { address } => sms::set_smsc_address(ctx, &address),
        Request::ReportSmsMemoryStatus { .. } => sms::memory_status(ctx),
        Request::GsmSmsBroadcastActivation { disable } => {
            sms::broadcast_activation(ctx, disable)
        }

        Request::SendUssd { ussd } => supp_svc::send_ussd(ctx, &ussd),
        Request::CancelUssd => supp_svc::cancel_ussd(ctx),
        Request::SetSuppSvcNotification { enable } => {
            supp_svc::set_notification(ctx, enable)
        }

        Request::OemHookRaw { data } => {
            info!("echoing {} byte OEM hook payload", data.len());
            Ok(Response::Raw(data))
        }
        Request::OemHookStrings { strings } => {
            info!("echoing {} OEM hook strings", strings.len());
            Ok(Response::Strings(strings.into_iter().map(Some).collect()))
        }
    }
}

/// Turns a modem `ERROR` into [`RilError::CommandFailure`].
pub(crate) trait Checked {
    fn checked(self) -> Result<AtResponse, RilError>;
}

impl Checked for Result<AtResponse, AtError> {
    fn checked(self) -> Result<AtResponse, RilError> {
        let response = self?;
        if response.success {
            Ok(response)
        } else {
            Err(RilError::CommandFailure {
                cme: response.cme_error(),
            })
        }
    }
}

/// [`Response::Empty`] once the modem answered `OK`.
pub(crate) fn expect_ok(result: Result<AtResponse, AtError>) -> HandlerResult {
    result.checked().map(|_| Response::Empty)
}

/// First integer of the single intermediate line.
pub(crate) fn first_int(response: &AtResponse) -> Result<i32, RilError> {
    Ok(response.tokens()?.next_int()?)
}

/// First string of the single intermediate line.
pub(crate) fn first_str(response: &AtResponse) -> Result<String, RilError> {
    Ok(response.tokens()?.next_str()?.to_owned())
}

pub(crate) fn tokens(line: &str) -> Result<Tokenizer<'_>, RilError> {
    Ok(Tokenizer::start(line)?)
}
