//! Typed requests coming from the telephony stack and the payloads they
//! complete with.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Request codes, numbered like the upstream RIL interface.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum RequestCode {
    GetSimStatus = 1,
    EnterSimPin = 2,
    EnterSimPuk = 3,
    EnterSimPin2 = 4,
    EnterSimPuk2 = 5,
    ChangeSimPin = 6,
    ChangeSimPin2 = 7,
    GetCurrentCalls = 9,
    Dial = 10,
    GetImsi = 11,
    Hangup = 12,
    HangupWaitingOrBackground = 13,
    HangupForegroundResumeBackground = 14,
    SwitchWaitingOrHoldingAndActive = 15,
    Conference = 16,
    Udub = 17,
    LastCallFailCause = 18,
    SignalStrength = 19,
    VoiceRegistrationState = 20,
    DataRegistrationState = 21,
    Operator = 22,
    RadioPower = 23,
    Dtmf = 24,
    SendSms = 25,
    SendSmsExpectMore = 26,
    SetupDataCall = 27,
    SimIo = 28,
    SendUssd = 29,
    CancelUssd = 30,
    GetClir = 31,
    SetClir = 32,
    QueryCallForwardStatus = 33,
    SetCallForward = 34,
    QueryCallWaiting = 35,
    SetCallWaiting = 36,
    SmsAcknowledge = 37,
    GetImei = 38,
    GetImeiSv = 39,
    Answer = 40,
    DeactivateDataCall = 41,
    QueryFacilityLock = 42,
    SetFacilityLock = 43,
    ChangeBarringPassword = 44,
    QueryNetworkSelectionMode = 45,
    SetNetworkSelectionAutomatic = 46,
    SetNetworkSelectionManual = 47,
    QueryAvailableNetworks = 48,
    BasebandVersion = 51,
    SeparateConnection = 52,
    SetMute = 53,
    GetMute = 54,
    QueryClip = 55,
    DataCallList = 57,
    OemHookRaw = 59,
    OemHookStrings = 60,
    ScreenState = 61,
    SetSuppSvcNotification = 62,
    WriteSmsToSim = 63,
    DeleteSmsOnSim = 64,
    SetBandMode = 65,
    ExplicitCallTransfer = 72,
    SetPreferredNetworkType = 73,
    GetPreferredNetworkType = 74,
    SetLocationUpdates = 76,
    GsmSmsBroadcastActivation = 91,
    DeviceIdentity = 98,
    GetSmscAddress = 100,
    SetSmscAddress = 101,
    ReportSmsMemoryStatus = 102,
    VoiceRadioTech = 108,
    SetInitialAttachApn = 111,
    Shutdown = 129,
}

/// Caller line identity restriction mode for a dial.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Clir {
    #[default]
    Subscription,
    Invocation,
    Suppression,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallForward {
    /// 0 deactivate, 1 activate, 2 interrogate, 3 register, 4 erase.
    pub status: i32,
    pub reason: i32,
    pub service_class: i32,
    pub toa: i32,
    pub number: Option<String>,
    pub time_seconds: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimIo {
    pub command: i32,
    pub file_id: i32,
    pub path: Option<String>,
    pub p1: i32,
    pub p2: i32,
    pub p3: i32,
    pub data: Option<String>,
    pub pin2: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataProfile {
    pub radio_technology: Option<String>,
    pub profile: Option<String>,
    pub apn: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// 0 none, 1 PAP, 2 CHAP, 3 PAP or CHAP.
    #[serde(default)]
    pub auth_type: i32,
    /// `IP`, `IPV6` or `IPV4V6`.
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachApn {
    pub apn: Option<String>,
    pub protocol: Option<String>,
    #[serde(default)]
    pub auth_type: i32,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    GetSimStatus,
    EnterSimPin { pin: String },
    EnterSimPuk { puk: String, new_pin: String },
    EnterSimPin2 { pin2: String },
    EnterSimPuk2 { puk2: String, new_pin2: String },
    ChangeSimPin { old_pin: String, new_pin: String },
    ChangeSimPin2 { old_pin2: String, new_pin2: String },
    GetCurrentCalls,
    Dial {
        address: String,
        #[serde(default)]
        clir: Clir,
    },
    GetImsi,
    Hangup { index: i32 },
    HangupWaitingOrBackground,
    HangupForegroundResumeBackground,
    SwitchWaitingOrHoldingAndActive,
    Conference,
    Udub,
    LastCallFailCause,
    SignalStrength,
    VoiceRegistrationState,
    DataRegistrationState,
    Operator,
    RadioPower { on: bool },
    Dtmf { tone: char },
    SendSms { smsc: Option<String>, pdu: String },
    SendSmsExpectMore { smsc: Option<String>, pdu: String },
    SetupDataCall(DataProfile),
    SimIo(SimIo),
    SendUssd { ussd: String },
    CancelUssd,
    GetClir,
    SetClir { mode: i32 },
    QueryCallForwardStatus { reason: i32 },
    SetCallForward(CallForward),
    QueryCallWaiting { service_class: i32 },
    SetCallWaiting { enable: bool, service_class: i32 },
    SmsAcknowledge { success: bool, cause: i32 },
    GetImei,
    GetImeiSv,
    Answer,
    DeactivateDataCall { cid: String, reason: Option<String> },
    QueryFacilityLock {
        facility: String,
        password: Option<String>,
        service_class: i32,
    },
    SetFacilityLock {
        facility: String,
        lock: bool,
        password: String,
        service_class: i32,
    },
    ChangeBarringPassword {
        facility: String,
        old_password: String,
        new_password: String,
    },
    QueryNetworkSelectionMode,
    SetNetworkSelectionAutomatic,
    SetNetworkSelectionManual { numeric: String },
    QueryAvailableNetworks,
    BasebandVersion,
    SeparateConnection { party: i32 },
    SetMute { mute: bool },
    GetMute,
    QueryClip,
    DataCallList,
    OemHookRaw { data: Vec<u8> },
    OemHookStrings { strings: Vec<String> },
    ScreenState { on: bool },
    SetSuppSvcNotification { enable: bool },
    WriteSmsToSim { status: i32, pdu: String, smsc: Option<String> },
    DeleteSmsOnSim { index: i32 },
    SetBandMode { mode: i32 },
    ExplicitCallTransfer,
    SetPreferredNetworkType { network_type: i32 },
    GetPreferredNetworkType,
    SetLocationUpdates { enable: bool },
    GsmSmsBroadcastActivation { disable: bool },
    DeviceIdentity,
    GetSmscAddress,
    SetSmscAddress { address: String },
    ReportSmsMemoryStatus { available: bool },
    VoiceRadioTech,
    SetInitialAttachApn(AttachApn),
    Shutdown,
}

impl Request {
    pub fn code(&self) -> RequestCode {
        use RequestCode as C;

        match self {
            Self::GetSimStatus => C::GetSimStatus,
            Self::EnterSimPin { .. } => C::EnterSimPin,
            Self::EnterSimPuk { .. } => C::EnterSimPuk,
            Self::EnterSimPin2 { .. } => C::EnterSimPin2,
            Self::EnterSimPuk2 { .. } => C::EnterSimPuk2,
            Self::ChangeSimPin { .. } => C::ChangeSimPin,
            Self::ChangeSimPin2 { .. } => C::ChangeSimPin2,
            Self::GetCurrentCalls => C::GetCurrentCalls,
            Self::Dial { .. } => C::Dial,
            Self::GetImsi => C::GetImsi,
            Self::Hangup { .. } => C::Hangup,
            Self::HangupWaitingOrBackground => C::HangupWaitingOrBackground,
            Self::HangupForegroundResumeBackground => C::HangupForegroundResumeBackground,
            Self::SwitchWaitingOrHoldingAndActive => C::SwitchWaitingOrHoldingAndActive,
            Self::Conference => C::Conference,
            Self::Udub => C::Udub,
            Self::LastCallFailCause => C::LastCallFailCause,
            Self::SignalStrength => C::SignalStrength,
            Self::VoiceRegistrationState => C::VoiceRegistrationState,
            Self::DataRegistrationState => C::DataRegistrationState,
            Self::Operator => C::Operator,
            Self::RadioPower { .. } => C::RadioPower,
            Self::Dtmf { .. } => C::Dtmf,
            Self::SendSms { .. } => C::SendSms,
            Self::SendSmsExpectMore { .. } => C::SendSmsExpectMore,
            Self::SetupDataCall(_) => C::SetupDataCall,
            Self::SimIo(_) => C::SimIo,
            Self::SendUssd { .. } => C::SendUssd,
            Self::CancelUssd => C::CancelUssd,
            Self::GetClir => C::GetClir,
            Self::SetClir { .. } => C::SetClir,
            Self::QueryCallForwardStatus { .. } => C::QueryCallForwardStatus,
            Self::SetCallForward(_) => C::SetCallForward,
            Self::QueryCallWaiting { .. } => C::QueryCallWaiting,
            Self::SetCallWaiting { .. } => C::SetCallWaiting,
            Self::SmsAcknowledge { .. } => C::SmsAcknowledge,
            Self::GetImei => C::GetImei,
            Self::GetImeiSv => C::GetImeiSv,
            Self::Answer => C::Answer,
            Self::DeactivateDataCall { .. } => C::DeactivateDataCall,
            Self::QueryFacilityLock { .. } => C::QueryFacilityLock,
            Self::SetFacilityLock { .. } => C::SetFacilityLock,
            Self::ChangeBarringPassword { .. } => C::ChangeBarringPassword,
            Self::QueryNetworkSelectionMode => C::QueryNetworkSelectionMode,
            Self::SetNetworkSelectionAutomatic => C::SetNetworkSelectionAutomatic,
            Self::SetNetworkSelectionManual { .. } => C::SetNetworkSelectionManual,
            Self::QueryAvailableNetworks => C::QueryAvailableNetworks,
            Self::BasebandVersion => C::BasebandVersion,
            Self::SeparateConnection { .. } => C::SeparateConnection,
            Self::SetMute { .. } => C::SetMute,
            Self::GetMute => C::GetMute,
            Self::QueryClip => C::QueryClip,
            Self::DataCallList => C::DataCallList,
            Self::OemHookRaw { .. } => C::OemHookRaw,
            Self::OemHookStrings { .. } => C::OemHookStrings,
            Self::ScreenState { .. } => C::ScreenState,
            Self::SetSuppSvcNotification { .. } => C::SetSuppSvcNotification,
            Self::WriteSmsToSim { .. } => C::WriteSmsToSim,
            Self::DeleteSmsOnSim { .. } => C::DeleteSmsOnSim,
            Self::SetBandMode { .. } => C::SetBandMode,
            Self::ExplicitCallTransfer => C::ExplicitCallTransfer,
            Self::SetPreferredNetworkType { .. } => C::SetPreferredNetworkType,
            Self::GetPreferredNetworkType => C::GetPreferredNetworkType,
            Self::SetLocationUpdates { .. } => C::SetLocationUpdates,
            Self::GsmSmsBroadcastActivation { .. } => C::GsmSmsBroadcastActivation,
            Self::DeviceIdentity => C::DeviceIdentity,
            Self::GetSmscAddress => C::GetSmscAddress,
            Self::SetSmscAddress { .. } => C::SetSmscAddress,
            Self::ReportSmsMemoryStatus { .. } => C::ReportSmsMemoryStatus,
            Self::VoiceRadioTech => C::VoiceRadioTech,
            Self::SetInitialAttachApn(_) => C::SetInitialAttachApn,
            Self::Shutdown => C::Shutdown,
        }
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallState {
    Active,
    Holding,
    Dialing,
    Alerting,
    Incoming,
    Waiting,
}

impl CallState {
    pub fn from_clcc(state: i32) -> Option<Self> {
        Some(match state {
            0 => Self::Active,
            1 => Self::Holding,
            2 => Self::Dialing,
            3 => Self::Alerting,
            4 => Self::Incoming,
            5 => Self::Waiting,
            _ => return None,
        })
    }

    pub fn is_settled(self) -> bool {
        matches!(self, Self::Active | Self::Holding)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Call {
    pub index: i32,
    pub is_mt: bool,
    pub state: CallState,
    pub is_voice: bool,
    pub is_multiparty: bool,
    pub number: Option<String>,
    pub toa: i32,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NetworkStatus {
    #[display("unknown")]
    Unknown,
    #[display("available")]
    Available,
    #[display("current")]
    Current,
    #[display("forbidden")]
    Forbidden,
}

impl NetworkStatus {
    pub fn from_cops(status: i32) -> Self {
        match status {
            1 => Self::Available,
            2 => Self::Current,
            3 => Self::Forbidden,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInfo {
    pub long_name: String,
    pub short_name: String,
    pub numeric: String,
    pub status: NetworkStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CardState {
    Absent,
    Present,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AppType {
    Unknown,
    Sim,
    Usim,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AppState {
    Unknown,
    Detected,
    Pin,
    Puk,
    SubscriptionPerso,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PersoSubstate {
    Unknown,
    Ready,
    SimNetwork,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PinState {
    Unknown,
    EnabledNotVerified,
    EnabledBlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppStatus {
    pub app_type: AppType,
    pub app_state: AppState,
    pub perso_substate: PersoSubstate,
    pub pin1: PinState,
    pub pin2: PinState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardStatus {
    pub card_state: CardState,
    pub universal_pin_state: PinState,
    /// Index into `applications`, `-1` without one.
    pub gsm_umts_subscription_app_index: i32,
    pub applications: Vec<AppStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimIoResponse {
    pub sw1: i32,
    pub sw2: i32,
    pub response: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmsSent {
    pub message_ref: i32,
    pub ack_pdu: Option<String>,
    pub error_code: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataCall {
    pub status: i32,
    pub cid: i32,
    /// 0 inactive, 1 dormant, 2 up.
    pub active: i32,
    pub protocol: String,
    pub ifname: String,
    pub addresses: String,
    pub dnses: String,
    pub gateways: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalStrength {
    pub rssi: i32,
    pub bit_error_rate: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Response {
    Empty,
    Int(i32),
    Ints(Vec<i32>),
    String(String),
    Strings(Vec<Option<String>>),
    Raw(Vec<u8>),
    Calls(Vec<Call>),
    CardStatus(CardStatus),
    Networks(Vec<NetworkInfo>),
    DataCalls(Vec<DataCall>),
    SignalStrength(SignalStrength),
    SimIo(SimIoResponse),
    SmsSent(SmsSent),
    CallForwards(Vec<CallForward>),
}
